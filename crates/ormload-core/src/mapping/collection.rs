//! Collection persisters.

use ormload_dialect::Dialect;
use serde::{Deserialize, Serialize};

use super::filter::{FilterMapping, LoadQueryInfluencers};
use super::{column_alias, template};
use crate::error::Result;
use crate::plan::FetchStyle;
use crate::value::ValueType;

fn default_true() -> bool {
    true
}

/// One column of a composite element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementColumn {
    pub name: String,
    pub column: String,
    #[serde(default)]
    pub value_type: ValueType,
}

/// What a collection holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementDef {
    /// Values stored in the collection table.
    Basic {
        column: String,
        #[serde(default)]
        value_type: ValueType,
    },
    /// Entities whose table holds the collection key. `columns` are the
    /// element identifier columns, filled from the element mapping.
    OneToMany {
        entity: String,
        #[serde(default)]
        columns: Vec<String>,
    },
    /// Entities referenced through an association table.
    ManyToMany { entity: String, columns: Vec<String> },
    /// Embedded values stored in the collection table.
    Composite { properties: Vec<ElementColumn> },
}

/// Index of a list or map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexDef {
    /// Position or map key column.
    Basic {
        column: String,
        #[serde(default)]
        value_type: ValueType,
    },
    /// Map keyed by an entity.
    Entity { entity: String, columns: Vec<String> },
}

impl IndexDef {
    pub fn columns(&self) -> Vec<String> {
        match self {
            IndexDef::Basic { column, .. } => vec![column.clone()],
            IndexDef::Entity { columns, .. } => columns.clone(),
        }
    }
}

/// Collection semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionSemantics {
    /// Unordered, duplicates allowed, no key of its own.
    #[default]
    Bag,
    /// Bag with a surrogate identifier column.
    IdBag,
    Set,
    List,
    Map,
}

impl CollectionSemantics {
    /// Whether a row may legitimately repeat an element.
    pub fn allows_duplicates(&self) -> bool {
        matches!(self, CollectionSemantics::Bag | CollectionSemantics::IdBag)
    }
}

/// Column aliases for one collection reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionAliases {
    pub suffix: String,
    pub key: Vec<String>,
    pub index: Vec<String>,
    pub identifier: Option<String>,
    pub element: Vec<String>,
}

/// Mapping of one collection role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionPersister {
    /// Role, `Owner.property`.
    pub role: String,
    /// Owning entity name.
    pub owner: String,
    /// Collection table. Filled from the element entity for one-to-many.
    #[serde(default)]
    pub table: Option<String>,
    /// Columns referencing the owner's identifier.
    pub key_columns: Vec<String>,
    pub element: ElementDef,
    #[serde(default)]
    pub index: Option<IndexDef>,
    #[serde(default)]
    pub identifier_column: Option<String>,
    #[serde(default)]
    pub semantics: CollectionSemantics,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub many_to_many_order_by: Option<String>,
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
    #[serde(default)]
    pub many_to_many_where: Option<String>,
    #[serde(default)]
    pub filters: Vec<FilterMapping>,
    #[serde(default)]
    pub many_to_many_filters: Vec<FilterMapping>,
    #[serde(default)]
    pub fetch: FetchStyle,
    #[serde(default = "default_true")]
    pub lazy: bool,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

impl CollectionPersister {
    /// Create a collection mapping.
    pub fn new(role: impl Into<String>, owner: impl Into<String>, key_columns: Vec<String>, element: ElementDef) -> Self {
        Self {
            role: role.into(),
            owner: owner.into(),
            table: None,
            key_columns,
            element,
            index: None,
            identifier_column: None,
            semantics: CollectionSemantics::Bag,
            order_by: None,
            many_to_many_order_by: None,
            where_clause: None,
            many_to_many_where: None,
            filters: Vec::new(),
            many_to_many_filters: Vec::new(),
            fetch: FetchStyle::Select,
            lazy: true,
            batch_size: None,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_semantics(mut self, semantics: CollectionSemantics) -> Self {
        self.semantics = semantics;
        self
    }

    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_identifier_column(mut self, column: impl Into<String>) -> Self {
        self.identifier_column = Some(column.into());
        self
    }

    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn with_many_to_many_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.many_to_many_order_by = Some(order_by.into());
        self
    }

    pub fn with_where(mut self, condition: impl Into<String>) -> Self {
        self.where_clause = Some(condition.into());
        self
    }

    pub fn with_many_to_many_where(mut self, condition: impl Into<String>) -> Self {
        self.many_to_many_where = Some(condition.into());
        self
    }

    pub fn with_filter(mut self, filter: FilterMapping) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_many_to_many_filter(mut self, filter: FilterMapping) -> Self {
        self.many_to_many_filters.push(filter);
        self
    }

    pub fn with_fetch(mut self, fetch: FetchStyle) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Table holding the collection key.
    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or_default()
    }

    pub fn is_one_to_many(&self) -> bool {
        matches!(self.element, ElementDef::OneToMany { .. })
    }

    pub fn is_many_to_many(&self) -> bool {
        matches!(self.element, ElementDef::ManyToMany { .. })
    }

    /// Element entity name for entity-valued collections.
    pub fn element_entity(&self) -> Option<&str> {
        match &self.element {
            ElementDef::OneToMany { entity, .. } | ElementDef::ManyToMany { entity, .. } => Some(entity),
            _ => None,
        }
    }

    /// Columns holding the element, or the element's key for entities.
    pub fn element_columns(&self) -> Vec<String> {
        match &self.element {
            ElementDef::Basic { column, .. } => vec![column.clone()],
            ElementDef::OneToMany { columns, .. } | ElementDef::ManyToMany { columns, .. } => columns.clone(),
            ElementDef::Composite { properties } => properties.iter().map(|p| p.column.clone()).collect(),
        }
    }

    pub fn index_columns(&self) -> Vec<String> {
        self.index.as_ref().map(IndexDef::columns).unwrap_or_default()
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// Generate column aliases for one reference to this collection.
    pub fn collection_aliases(&self, suffix: &str, dialect: &Dialect) -> CollectionAliases {
        let max = dialect.max_alias_length();
        let mut position = 0;
        let mut next = |column: &str| {
            position += 1;
            format!("{}{suffix}", column_alias(column, position, max))
        };
        let key = self.key_columns.iter().map(|c| next(c)).collect();
        let index = self.index_columns().iter().map(|c| next(c)).collect();
        let identifier = self.identifier_column.as_deref().map(&mut next);
        let element = self.element_columns().iter().map(|c| next(c)).collect();
        CollectionAliases {
            suffix: suffix.to_string(),
            key,
            index,
            identifier,
            element,
        }
    }

    /// Key, index, identifier and element columns read through `aliases`.
    pub fn select_fragment(&self, table_alias: &str, aliases: &CollectionAliases) -> String {
        let mut columns: Vec<String> = Vec::new();
        let mut push = |column: &str, alias: &str| columns.push(format!("{table_alias}.{column} as {alias}"));
        for (column, alias) in self.key_columns.iter().zip(&aliases.key) {
            push(column, alias);
        }
        for (column, alias) in self.index_columns().iter().zip(&aliases.index) {
            push(column, alias);
        }
        if let (Some(column), Some(alias)) = (&self.identifier_column, &aliases.identifier) {
            push(column, alias);
        }
        for (column, alias) in self.element_columns().iter().zip(&aliases.element) {
            push(column, alias);
        }
        columns.join(", ")
    }

    /// Enabled filters followed by the mapped where clause.
    pub fn filter_fragment(
        &self,
        alias: &str,
        influencers: &LoadQueryInfluencers,
        dialect: &Dialect,
    ) -> Result<String> {
        render_restrictions(&self.filters, self.where_clause.as_deref(), alias, influencers, dialect)
    }

    /// Restrictions on the element table of a many-to-many collection.
    pub fn many_to_many_filter_fragment(
        &self,
        alias: &str,
        influencers: &LoadQueryInfluencers,
        dialect: &Dialect,
    ) -> Result<String> {
        render_restrictions(
            &self.many_to_many_filters,
            self.many_to_many_where.as_deref(),
            alias,
            influencers,
            dialect,
        )
    }

    /// Mapped order-by qualified with `alias`, empty when none.
    pub fn sql_order_by(&self, alias: &str, dialect: &Dialect) -> Result<String> {
        match &self.order_by {
            Some(order_by) => template::render(order_by, alias, dialect),
            None => Ok(String::new()),
        }
    }

    /// Many-to-many order-by against the element table alias.
    pub fn many_to_many_order_by(&self, alias: &str, dialect: &Dialect) -> Result<String> {
        match &self.many_to_many_order_by {
            Some(order_by) if self.is_many_to_many() => template::render(order_by, alias, dialect),
            _ => Ok(String::new()),
        }
    }
}

fn render_restrictions(
    filters: &[FilterMapping],
    where_clause: Option<&str>,
    alias: &str,
    influencers: &LoadQueryInfluencers,
    dialect: &Dialect,
) -> Result<String> {
    let mut conditions = Vec::new();
    for filter in filters {
        if influencers.is_enabled(&filter.name) {
            conditions.push(template::render_filter(&filter.condition, &filter.name, alias, dialect)?);
        }
    }
    if let Some(condition) = where_clause {
        conditions.push(template::render(condition, alias, dialect)?);
    }
    Ok(conditions.join(" and "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles() -> CollectionPersister {
        CollectionPersister::new(
            "User.roles",
            "User",
            vec!["user_id".into()],
            ElementDef::ManyToMany {
                entity: "Role".into(),
                columns: vec!["role_id".into()],
            },
        )
        .with_table("user_roles")
        .with_semantics(CollectionSemantics::Set)
        .with_many_to_many_order_by("name")
        .with_many_to_many_where("active = 1")
    }

    #[test]
    fn test_collection_aliases_and_select() {
        let dialect = Dialect::ansi();
        let persister = roles();
        let aliases = persister.collection_aliases("1_", &dialect);
        assert_eq!(aliases.key, vec!["user_id1_1_"]);
        assert_eq!(aliases.element, vec!["role_id2_1_"]);
        assert_eq!(
            persister.select_fragment("roles1_", &aliases),
            "roles1_.user_id as user_id1_1_, roles1_.role_id as role_id2_1_"
        );
    }

    #[test]
    fn test_indexed_collection_aliases() {
        let dialect = Dialect::ansi();
        let persister = CollectionPersister::new(
            "User.tags",
            "User",
            vec!["user_id".into()],
            ElementDef::Basic {
                column: "tag".into(),
                value_type: ValueType::String,
            },
        )
        .with_table("user_tags")
        .with_semantics(CollectionSemantics::List)
        .with_index(IndexDef::Basic {
            column: "position".into(),
            value_type: ValueType::Integer,
        });
        let aliases = persister.collection_aliases("0_", &dialect);
        assert_eq!(aliases.index, vec!["position2_0_"]);
        assert_eq!(aliases.element, vec!["tag3_0_"]);
    }

    #[test]
    fn test_many_to_many_fragments() {
        let dialect = Dialect::ansi();
        let persister = roles();
        let none = LoadQueryInfluencers::new();
        assert_eq!(
            persister.many_to_many_filter_fragment("role2_", &none, &dialect).unwrap(),
            "role2_.active = 1"
        );
        assert_eq!(persister.filter_fragment("roles1_", &none, &dialect).unwrap(), "");
        assert_eq!(persister.many_to_many_order_by("role2_", &dialect).unwrap(), "role2_.name");
        assert_eq!(persister.sql_order_by("roles1_", &dialect).unwrap(), "");
        assert_eq!(persister.element_entity(), Some("Role"));
        assert!(persister.is_many_to_many());
    }

    #[test]
    fn test_semantics() {
        assert!(CollectionSemantics::Bag.allows_duplicates());
        assert!(!CollectionSemantics::Set.allows_duplicates());
    }
}
