//! Entity persisters.

use ormload_dialect::{Dialect, JoinFragment, JoinType};
use serde::{Deserialize, Serialize};

use super::filter::{FilterMapping, LoadQueryInfluencers};
use super::{column_alias, qualify, template};
use crate::error::{Error, Result};
use crate::plan::FetchStyle;
use crate::value::ValueType;

fn default_true() -> bool {
    true
}

/// Identifier mapping of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierDef {
    /// Identifier property name.
    pub name: String,
    /// Key columns, more than one for composite identifiers.
    pub columns: Vec<String>,
    /// Identifier type.
    #[serde(default)]
    pub value_type: ValueType,
    /// Associations embedded in a composite key.
    #[serde(default)]
    pub key_associations: Vec<KeyAssociationDef>,
}

impl IdentifierDef {
    /// Single-column identifier.
    pub fn new(name: impl Into<String>, column: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            columns: vec![column.into()],
            value_type,
            key_associations: Vec::new(),
        }
    }

    /// Composite identifier over several columns.
    pub fn composite(name: impl Into<String>, columns: Vec<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            columns,
            value_type,
            key_associations: Vec::new(),
        }
    }

    /// Add a key-many-to-one association over some of the key columns.
    pub fn with_key_association(mut self, association: KeyAssociationDef) -> Self {
        self.key_associations.push(association);
        self
    }

    pub fn is_composite(&self) -> bool {
        self.columns.len() > 1
    }
}

/// A many-to-one association that is part of a composite identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAssociationDef {
    pub name: String,
    pub target: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub fetch: FetchStyle,
}

/// Association from an entity property to another entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationDef {
    /// Target entity name.
    pub target: String,
    /// Foreign key columns in the owner's table. Empty when `mapped_by`
    /// names the owning side.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Inverse property on the target holding the foreign key.
    #[serde(default)]
    pub mapped_by: Option<String>,
    /// Non-nullable association, rendered as an inner join.
    #[serde(default)]
    pub required: bool,
    /// Mapped fetch style.
    #[serde(default)]
    pub fetch: FetchStyle,
    /// Whether non-join fetching is deferred.
    #[serde(default = "default_true")]
    pub lazy: bool,
}

impl AssociationDef {
    /// Association owning the given foreign key columns.
    pub fn new(target: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            target: target.into(),
            columns,
            mapped_by: None,
            required: false,
            fetch: FetchStyle::Select,
            lazy: true,
        }
    }

    /// Inverse association whose key lives on the target.
    pub fn mapped_by(target: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            mapped_by: Some(property.into()),
            ..Self::new(target, Vec::new())
        }
    }

    pub fn with_fetch(mut self, fetch: FetchStyle) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }
}

/// A mapped property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    #[serde(flatten)]
    pub kind: PropertyKind,
}

/// What a property maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyKind {
    /// Plain column values.
    Basic {
        columns: Vec<String>,
        #[serde(default)]
        value_type: ValueType,
    },
    /// Foreign key to another entity.
    ManyToOne(AssociationDef),
    /// One-to-one association, either owning a key or `mapped_by`.
    OneToOne(AssociationDef),
    /// Collection property, described by a collection persister.
    Collection { role: String },
    /// Embedded component.
    Component { properties: Vec<PropertyDef> },
    /// Polymorphic association discriminated by a type column.
    Any {
        type_column: String,
        id_column: String,
        #[serde(default)]
        fetch: FetchStyle,
    },
}

impl PropertyDef {
    /// Basic property over one column.
    pub fn basic(name: impl Into<String>, column: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Basic {
                columns: vec![column.into()],
                value_type,
            },
        }
    }

    pub fn many_to_one(name: impl Into<String>, association: AssociationDef) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::ManyToOne(association),
        }
    }

    pub fn one_to_one(name: impl Into<String>, association: AssociationDef) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::OneToOne(association),
        }
    }

    pub fn collection(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Collection { role: role.into() },
        }
    }

    pub fn component(name: impl Into<String>, properties: Vec<PropertyDef>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Component { properties },
        }
    }

    pub fn any(name: impl Into<String>, type_column: impl Into<String>, id_column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Any {
                type_column: type_column.into(),
                id_column: id_column.into(),
                fetch: FetchStyle::Select,
            },
        }
    }

    /// The entity association, if this is a to-one property.
    pub fn association(&self) -> Option<&AssociationDef> {
        match &self.kind {
            PropertyKind::ManyToOne(a) | PropertyKind::OneToOne(a) => Some(a),
            _ => None,
        }
    }
}

/// A joined subclass table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubclassDef {
    /// Subclass entity name.
    pub name: String,
    pub table: String,
    /// Columns referencing the root table's identifier.
    pub key_columns: Vec<String>,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
}

/// What a hydrated column group holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HydratedKind {
    /// Property value.
    Basic(ValueType),
    /// Foreign key of a to-one association.
    Association { target: String },
    /// Type discriminator plus identifier of an any-type association.
    Any,
}

/// A property read from the entity's own row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydratedProperty {
    /// Property path, dotted for component members.
    pub path: String,
    pub kind: HydratedKind,
    /// 0 for the root table, n for the n-th subclass table.
    pub table: usize,
    pub columns: Vec<String>,
}

/// Column aliases for one entity reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityAliases {
    /// Suffix shared by every column alias, e.g. `0_`.
    pub suffix: String,
    pub identifier: Vec<String>,
    /// One alias group per hydrated property, in hydration order.
    pub properties: Vec<Vec<String>>,
    /// Subclass discriminator alias.
    pub discriminator: Option<String>,
}

/// Mapping of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPersister {
    pub name: String,
    pub table: String,
    pub identifier: IdentifierDef,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    /// Restriction applied whenever the entity is loaded.
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
    #[serde(default)]
    pub filters: Vec<FilterMapping>,
    #[serde(default)]
    pub subclasses: Vec<SubclassDef>,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

impl EntityPersister {
    /// Create an entity mapping.
    pub fn new(name: impl Into<String>, table: impl Into<String>, identifier: IdentifierDef) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            identifier,
            properties: Vec::new(),
            where_clause: None,
            filters: Vec::new(),
            subclasses: Vec::new(),
            batch_size: None,
        }
    }

    /// Add a property.
    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    /// Set the mapped where clause.
    pub fn with_where(mut self, condition: impl Into<String>) -> Self {
        self.where_clause = Some(condition.into());
        self
    }

    /// Apply a filter.
    pub fn with_filter(mut self, filter: FilterMapping) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add a joined subclass.
    pub fn with_subclass(mut self, subclass: SubclassDef) -> Self {
        self.subclasses.push(subclass);
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn identifier_columns(&self) -> &[String] {
        &self.identifier.columns
    }

    /// Get a root property by name.
    pub fn property(&self, name: &str) -> Result<&PropertyDef> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| Error::UnknownProperty {
                entity: self.name.clone(),
                property: name.to_string(),
            })
    }

    /// Columns of a basic or to-one property, for unique key loads.
    pub fn property_columns(&self, name: &str) -> Result<Vec<String>> {
        match &self.property(name)?.kind {
            PropertyKind::Basic { columns, .. } => Ok(columns.clone()),
            PropertyKind::ManyToOne(a) | PropertyKind::OneToOne(a) if !a.columns.is_empty() => {
                Ok(a.columns.clone())
            }
            _ => Err(Error::illegal_argument(format!(
                "property {}.{name} has no columns of its own",
                self.name
            ))),
        }
    }

    /// Type of a basic property or the identifier, by name.
    pub fn property_type(&self, name: &str) -> Result<ValueType> {
        if name == self.identifier.name {
            return Ok(self.identifier.value_type.clone());
        }
        match &self.property(name)?.kind {
            PropertyKind::Basic { value_type, .. } => Ok(value_type.clone()),
            _ => Err(Error::illegal_argument(format!(
                "property {}.{name} is not a basic property",
                self.name
            ))),
        }
    }

    /// Properties read from the entity's row, components flattened.
    pub fn hydrated_properties(&self) -> Vec<HydratedProperty> {
        let mut hydrated = Vec::new();
        for association in &self.identifier.key_associations {
            hydrated.push(HydratedProperty {
                path: association.name.clone(),
                kind: HydratedKind::Association {
                    target: association.target.clone(),
                },
                table: 0,
                columns: association.columns.clone(),
            });
        }
        collect_hydrated(&self.properties, "", 0, &mut hydrated);
        for (index, subclass) in self.subclasses.iter().enumerate() {
            collect_hydrated(&subclass.properties, "", index + 1, &mut hydrated);
        }
        hydrated
    }

    /// Generate column aliases for one reference to this entity.
    pub fn entity_aliases(&self, suffix: &str, dialect: &Dialect) -> EntityAliases {
        let max = dialect.max_alias_length();
        let mut position = 0;
        let mut next = |column: &str| {
            position += 1;
            format!("{}{suffix}", column_alias(column, position, max))
        };
        let identifier: Vec<String> = self.identifier.columns.iter().map(|c| next(c)).collect();
        let properties = self
            .hydrated_properties()
            .iter()
            .map(|p| {
                p.columns
                    .iter()
                    .map(|c| match self.root_identifier_position(p.table, c) {
                        Some(index) => identifier[index].clone(),
                        None => next(c),
                    })
                    .collect()
            })
            .collect();
        let discriminator = (!self.subclasses.is_empty()).then(|| format!("clazz_{suffix}"));
        EntityAliases {
            suffix: suffix.to_string(),
            identifier,
            properties,
            discriminator,
        }
    }

    /// Position of `column` in the identifier when it sits in the root table.
    fn root_identifier_position(&self, table: usize, column: &str) -> Option<usize> {
        if table != 0 {
            return None;
        }
        self.identifier.columns.iter().position(|c| c == column)
    }

    /// Alias of the n-th subclass table, derived from the root alias.
    pub fn generate_table_alias(root_alias: &str, table_number: usize) -> String {
        if table_number == 0 {
            root_alias.to_string()
        } else {
            format!("{root_alias}{table_number}_")
        }
    }

    /// `table alias` for the root table.
    pub fn from_table_fragment(&self, alias: &str) -> String {
        format!("{} {alias}", self.table)
    }

    fn subclass_joins(&self, alias: &str, dialect: &Dialect) -> JoinFragment {
        let mut fragment = dialect.create_outer_join_fragment();
        let lhs = qualify(alias, &self.identifier.columns);
        for (index, subclass) in self.subclasses.iter().enumerate() {
            fragment.add_join(
                &subclass.table,
                &Self::generate_table_alias(alias, index + 1),
                &lhs,
                &subclass.key_columns,
                JoinType::LeftOuter,
                "",
            );
        }
        fragment
    }

    /// Joins to subclass tables, placed after the root table reference.
    pub fn from_join_fragment(&self, alias: &str, dialect: &Dialect) -> String {
        self.subclass_joins(alias, dialect)
            .to_from_fragment_string()
            .to_string()
    }

    /// Conditions the subclass joins place in the WHERE clause.
    pub fn where_join_fragment(&self, alias: &str, dialect: &Dialect) -> String {
        self.subclass_joins(alias, dialect)
            .to_where_fragment_string()
            .to_string()
    }

    /// Enabled filters followed by the mapped where clause, qualified
    /// with `alias`.
    pub fn filter_fragment(
        &self,
        alias: &str,
        influencers: &LoadQueryInfluencers,
        dialect: &Dialect,
    ) -> Result<String> {
        let mut conditions = Vec::new();
        for filter in &self.filters {
            if influencers.is_enabled(&filter.name) {
                conditions.push(template::render_filter(&filter.condition, &filter.name, alias, dialect)?);
            }
        }
        if let Some(condition) = &self.where_clause {
            conditions.push(template::render(condition, alias, dialect)?);
        }
        Ok(conditions.join(" and "))
    }

    /// Select-clause columns for this entity read through `aliases`.
    pub fn select_fragment(&self, table_alias: &str, aliases: &EntityAliases, dialect: &Dialect) -> String {
        let mut columns = Vec::new();
        for (column, alias) in self.identifier.columns.iter().zip(&aliases.identifier) {
            columns.push(format!("{table_alias}.{column} as {alias}"));
        }
        for (property, property_aliases) in self.hydrated_properties().iter().zip(&aliases.properties) {
            let alias_of_table = Self::generate_table_alias(table_alias, property.table);
            for (column, alias) in property.columns.iter().zip(property_aliases) {
                // already selected with the identifier
                if self.root_identifier_position(property.table, column).is_some() {
                    continue;
                }
                columns.push(format!("{alias_of_table}.{column} as {alias}"));
            }
        }
        if let Some(discriminator) = &aliases.discriminator {
            let mut case = dialect.create_case_fragment();
            for (index, subclass) in self.subclasses.iter().enumerate() {
                let subclass_alias = Self::generate_table_alias(table_alias, index + 1);
                if let Some(key) = subclass.key_columns.first() {
                    case.add_when_column_not_null(&subclass_alias, key, (index + 1).to_string());
                }
            }
            if let Some(id) = self.identifier.columns.first() {
                case.add_when_column_not_null(table_alias, id, "0");
            }
            case.set_return_column_name(discriminator.clone());
            columns.push(case.to_fragment_string());
        }
        columns.join(", ")
    }

    /// Subclass name for a discriminator value read from a row.
    pub fn subclass_for_discriminator(&self, value: i64) -> &str {
        usize::try_from(value)
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|n| self.subclasses.get(n))
            .map(|s| s.name.as_str())
            .unwrap_or(&self.name)
    }
}

fn collect_hydrated(properties: &[PropertyDef], prefix: &str, table: usize, out: &mut Vec<HydratedProperty>) {
    for property in properties {
        let path = format!("{prefix}{}", property.name);
        match &property.kind {
            PropertyKind::Basic { columns, value_type } => out.push(HydratedProperty {
                path,
                kind: HydratedKind::Basic(value_type.clone()),
                table,
                columns: columns.clone(),
            }),
            PropertyKind::ManyToOne(a) | PropertyKind::OneToOne(a) if !a.columns.is_empty() => {
                out.push(HydratedProperty {
                    path,
                    kind: HydratedKind::Association {
                        target: a.target.clone(),
                    },
                    table,
                    columns: a.columns.clone(),
                })
            }
            PropertyKind::Any {
                type_column,
                id_column,
                ..
            } => out.push(HydratedProperty {
                path,
                kind: HydratedKind::Any,
                table,
                columns: vec![type_column.clone(), id_column.clone()],
            }),
            PropertyKind::Component { properties } => {
                collect_hydrated(properties, &format!("{path}."), table, out)
            }
            PropertyKind::ManyToOne(_) | PropertyKind::OneToOne(_) | PropertyKind::Collection { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{EnabledFilter, FilterDef};

    fn user() -> EntityPersister {
        EntityPersister::new("User", "users", IdentifierDef::new("id", "id", ValueType::Long))
            .with_property(PropertyDef::basic("username", "username", ValueType::String))
            .with_property(PropertyDef::many_to_one(
                "team",
                AssociationDef::new("Team", vec!["team_id".into()]),
            ))
            .with_property(PropertyDef::collection("posts", "User.posts"))
            .with_property(PropertyDef::component(
                "address",
                vec![PropertyDef::basic("city", "city", ValueType::String)],
            ))
    }

    #[test]
    fn test_hydrated_properties() {
        let hydrated = user().hydrated_properties();
        let paths: Vec<_> = hydrated.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["username", "team", "address.city"]);
        assert_eq!(
            hydrated[1].kind,
            HydratedKind::Association {
                target: "Team".into()
            }
        );
    }

    #[test]
    fn test_select_fragment() {
        let dialect = Dialect::ansi();
        let persister = user();
        let aliases = persister.entity_aliases("0_", &dialect);
        assert_eq!(aliases.identifier, vec!["id1_0_"]);
        assert_eq!(
            persister.select_fragment("user0_", &aliases, &dialect),
            "user0_.id as id1_0_, user0_.username as username2_0_, user0_.team_id as team_id3_0_, user0_.city as city4_0_"
        );
    }

    #[test]
    fn test_key_association_columns_are_selected_once() {
        let dialect = Dialect::ansi();
        let persister = EntityPersister::new(
            "Line",
            "order_lines",
            IdentifierDef::composite(
                "id",
                vec!["order_id".into(), "line_no".into()],
                ValueType::Composite(vec![ValueType::Long, ValueType::Integer]),
            )
            .with_key_association(KeyAssociationDef {
                name: "order".into(),
                target: "Order".into(),
                columns: vec!["order_id".into()],
                fetch: FetchStyle::Join,
            }),
        )
        .with_property(PropertyDef::basic("quantity", "quantity", ValueType::Integer));
        let aliases = persister.entity_aliases("0_", &dialect);
        assert_eq!(aliases.identifier, vec!["order_id1_0_", "line_no2_0_"]);
        assert_eq!(aliases.properties[0], vec!["order_id1_0_"]);
        assert_eq!(
            persister.select_fragment("line0_", &aliases, &dialect),
            "line0_.order_id as order_id1_0_, line0_.line_no as line_no2_0_, line0_.quantity as quantity3_0_"
        );
    }

    #[test]
    fn test_subclass_fragments() {
        let dialect = Dialect::ansi();
        let persister = user().with_subclass(SubclassDef {
            name: "Admin".into(),
            table: "admins".into(),
            key_columns: vec!["user_id".into()],
            properties: vec![PropertyDef::basic("level", "level", ValueType::Integer)],
        });
        assert_eq!(
            persister.from_join_fragment("user0_", &dialect),
            " left outer join admins user0_1_ on user0_.id=user0_1_.user_id"
        );
        assert_eq!(persister.where_join_fragment("user0_", &dialect), "");
        let aliases = persister.entity_aliases("0_", &dialect);
        let select = persister.select_fragment("user0_", &aliases, &dialect);
        assert!(select.contains("user0_1_.level as level5_0_"));
        assert!(select.ends_with(
            "case when user0_1_.user_id is not null then 1 when user0_.id is not null then 0 end as clazz_0_"
        ));
        assert_eq!(persister.subclass_for_discriminator(1), "Admin");
        assert_eq!(persister.subclass_for_discriminator(0), "User");
    }

    #[test]
    fn test_filter_fragment() {
        let dialect = Dialect::ansi();
        let persister = user()
            .with_where("deleted = 0")
            .with_filter(FilterMapping::new("tenant", "tenant_id = :tenantId"));
        let none = LoadQueryInfluencers::new();
        assert_eq!(
            persister.filter_fragment("user0_", &none, &dialect).unwrap(),
            "user0_.deleted = 0"
        );
        let enabled = LoadQueryInfluencers::new().with_filter(
            EnabledFilter::new(FilterDef::new("tenant").with_parameter("tenantId", ValueType::Long))
                .with_parameter("tenantId", 1i64),
        );
        assert_eq!(
            persister.filter_fragment("user0_", &enabled, &dialect).unwrap(),
            "user0_.tenant_id = :tenant.tenantId and user0_.deleted = 0"
        );
    }

    #[test]
    fn test_unknown_property() {
        assert!(matches!(
            user().property("missing"),
            Err(Error::UnknownProperty { .. })
        ));
        assert_eq!(user().property_columns("team").unwrap(), vec!["team_id"]);
    }

    #[test]
    fn test_json_mapping() {
        let json = r#"{
            "name": "Post",
            "table": "posts",
            "identifier": {"name": "id", "columns": ["id"], "value_type": "long"},
            "properties": [
                {"name": "title", "kind": "basic", "columns": ["title"], "value_type": "string"},
                {"name": "author", "kind": "many_to_one", "target": "User", "columns": ["author_id"], "fetch": "join"}
            ]
        }"#;
        let persister: EntityPersister = serde_json::from_str(json).unwrap();
        let author = persister.property("author").unwrap().association().unwrap();
        assert_eq!(author.fetch, FetchStyle::Join);
        assert!(author.lazy);
    }
}
