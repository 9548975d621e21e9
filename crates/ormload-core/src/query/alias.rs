//! Table alias and column suffix bookkeeping for one query build.

use std::collections::HashMap;

use tracing::trace;

use crate::error::{Error, Result};
use crate::mapping::{CollectionAliases, CollectionPersister, EntityAliases, EntityPersister, MappingRegistry};

/// Longest alias root kept from an entity name or role.
const ALIAS_TRUNCATE_LENGTH: usize = 10;

/// Aliases of one entity query space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityReferenceAliases {
    pub table_alias: String,
    pub columns: EntityAliases,
}

/// Aliases of one collection query space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionReferenceAliases {
    /// Alias of the table holding the collection key. For many-to-many this
    /// is the association table.
    pub collection_table_alias: String,
    /// Alias of the element table. Same as the collection table alias
    /// unless the collection is many-to-many.
    pub element_table_alias: String,
    pub collection_columns: CollectionAliases,
    /// Aliases of the element entity for entity-valued collections.
    pub element: Option<EntityReferenceAliases>,
}

/// Aliases generated for the query spaces of one query build.
///
/// Every generation call registers the table alias against the query
/// space uid. Registering a different alias for a uid that already has one
/// is an error.
#[derive(Debug)]
pub struct AliasResolutionContext<'a> {
    registry: &'a MappingRegistry,
    current_alias_suffix: usize,
    current_table_alias_uniqueness: usize,
    query_space_aliases: HashMap<String, String>,
    registration_order: Vec<String>,
    composite_aliases: HashMap<String, String>,
    entity_aliases: HashMap<String, EntityReferenceAliases>,
    collection_aliases: HashMap<String, CollectionReferenceAliases>,
}

impl<'a> AliasResolutionContext<'a> {
    pub fn new(registry: &'a MappingRegistry) -> Self {
        Self {
            registry,
            current_alias_suffix: 0,
            current_table_alias_uniqueness: 0,
            query_space_aliases: HashMap::new(),
            registration_order: Vec::new(),
            composite_aliases: HashMap::new(),
            entity_aliases: HashMap::new(),
            collection_aliases: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &'a MappingRegistry {
        self.registry
    }

    fn create_suffix(&mut self) -> String {
        let suffix = format!("{}_", self.current_alias_suffix);
        self.current_alias_suffix += 1;
        suffix
    }

    fn create_table_alias(&mut self, description: &str) -> String {
        let alias = generate_alias(description, self.current_table_alias_uniqueness);
        self.current_table_alias_uniqueness += 1;
        alias
    }

    /// Allocate a table alias and column suffix for an entity query space.
    pub fn generate_entity_reference_aliases(
        &mut self,
        uid: &str,
        persister: &EntityPersister,
    ) -> Result<EntityReferenceAliases> {
        let table_alias = self.create_table_alias(&persister.name);
        self.generate_entity_aliases_with_table(uid, table_alias, persister)
    }

    fn generate_entity_aliases_with_table(
        &mut self,
        uid: &str,
        table_alias: String,
        persister: &EntityPersister,
    ) -> Result<EntityReferenceAliases> {
        let suffix = self.create_suffix();
        let aliases = EntityReferenceAliases {
            columns: persister.entity_aliases(&suffix, self.registry.dialect()),
            table_alias,
        };
        self.register_query_space_alias(uid, &aliases.table_alias)?;
        self.entity_aliases.insert(uid.to_string(), aliases.clone());
        Ok(aliases)
    }

    /// Allocate aliases for a collection query space.
    ///
    /// Many-to-many collections get one alias for the association table and
    /// one for the element table; other collections share a single alias.
    /// `element_uid` is required when the element is an entity.
    pub fn generate_collection_reference_aliases(
        &mut self,
        uid: &str,
        persister: &CollectionPersister,
        element_uid: Option<&str>,
    ) -> Result<CollectionReferenceAliases> {
        let (collection_table_alias, element_table_alias) = if persister.is_many_to_many() {
            let element = self.element_persister(persister)?;
            let association_alias = self.create_table_alias(&persister.role);
            (association_alias, self.create_table_alias(&element.name))
        } else {
            let alias = self.create_table_alias(&persister.role);
            (alias.clone(), alias)
        };

        let suffix = self.create_suffix();
        let collection_columns = persister.collection_aliases(&suffix, self.registry.dialect());

        let element = match persister.element_entity() {
            Some(_) => {
                let element_uid = element_uid.ok_or_else(|| {
                    Error::illegal_argument(format!(
                        "query space uid for entity elements of collection [{}] was not given",
                        persister.role
                    ))
                })?;
                let element_persister = self.element_persister(persister)?;
                Some(self.generate_entity_aliases_with_table(
                    element_uid,
                    element_table_alias.clone(),
                    element_persister,
                )?)
            }
            None => None,
        };

        let aliases = CollectionReferenceAliases {
            collection_table_alias,
            element_table_alias,
            collection_columns,
            element,
        };
        self.register_query_space_alias(uid, &aliases.collection_table_alias)?;
        self.collection_aliases.insert(uid.to_string(), aliases.clone());
        Ok(aliases)
    }

    fn element_persister(&self, persister: &CollectionPersister) -> Result<&'a EntityPersister> {
        let entity = persister.element_entity().ok_or_else(|| {
            Error::illegal_state(format!("collection [{}] does not hold entities", persister.role))
        })?;
        self.registry.entity(entity)
    }

    fn register_query_space_alias(&mut self, uid: &str, alias: &str) -> Result<()> {
        match self.query_space_aliases.get(uid) {
            Some(existing) if existing == alias => Ok(()),
            Some(existing) => Err(Error::illegal_state(format!(
                "query space [{uid}] already has table alias [{existing}], cannot register [{alias}]"
            ))),
            None => {
                trace!(uid, alias, "registered query space alias");
                self.query_space_aliases.insert(uid.to_string(), alias.to_string());
                self.registration_order.push(uid.to_string());
                Ok(())
            }
        }
    }

    /// Resolve a composite query space to its owner's table alias.
    pub fn register_composite_query_space_uid_resolution(&mut self, rhs_uid: &str, lhs_table_alias: &str) {
        self.composite_aliases
            .insert(rhs_uid.to_string(), lhs_table_alias.to_string());
    }

    /// Table alias of a query space, including composite spaces.
    pub fn resolve_sql_table_alias(&self, uid: &str) -> Option<&str> {
        self.query_space_aliases
            .get(uid)
            .or_else(|| self.composite_aliases.get(uid))
            .map(String::as_str)
    }

    pub fn resolve_entity_reference_aliases(&self, uid: &str) -> Option<&EntityReferenceAliases> {
        self.entity_aliases.get(uid)
    }

    pub fn resolve_collection_reference_aliases(&self, uid: &str) -> Option<&CollectionReferenceAliases> {
        self.collection_aliases.get(uid)
    }

    /// Registered `(uid, table alias)` pairs in registration order.
    pub fn table_aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.registration_order.iter().filter_map(|uid| {
            self.query_space_aliases
                .get(uid)
                .map(|alias| (uid.as_str(), alias.as_str()))
        })
    }
}

/// Alias root of an entity name or collection role plus `{unique}_`.
pub fn generate_alias(description: &str, unique: usize) -> String {
    format!("{}{unique}_", alias_root(description))
}

fn alias_root(description: &str) -> String {
    let unqualified = description.rsplit('.').next().unwrap_or(description);
    let truncated: String = unqualified.chars().take(ALIAS_TRUNCATE_LENGTH).collect();
    let lowered = truncated.to_lowercase().replace(['/', '$'], "_");
    let mut root = lowered
        .trim_start_matches(|c: char| !c.is_alphabetic())
        .to_string();
    if root.is_empty() {
        root.push_str("alias");
    }
    if root.ends_with(|c: char| c.is_ascii_digit()) {
        root.push('x');
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{CollectionSemantics, ElementDef, IdentifierDef, PropertyDef};
    use crate::value::ValueType;
    use ormload_dialect::Dialect;

    fn registry() -> MappingRegistry {
        MappingRegistry::builder(Dialect::ansi())
            .with_entity(
                EntityPersister::new("User", "users", IdentifierDef::new("id", "id", ValueType::Long))
                    .with_property(PropertyDef::basic("name", "name", ValueType::String))
                    .with_property(PropertyDef::collection("roles", "User.roles"))
                    .with_property(PropertyDef::collection("posts", "User.posts")),
            )
            .with_entity(EntityPersister::new("Role", "roles", IdentifierDef::new("id", "id", ValueType::Long)))
            .with_entity(EntityPersister::new("Post", "posts", IdentifierDef::new("id", "id", ValueType::Long)))
            .with_collection(
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
                .with_semantics(CollectionSemantics::Set),
            )
            .with_collection(CollectionPersister::new(
                "User.posts",
                "User",
                vec!["author_id".into()],
                ElementDef::OneToMany {
                    entity: "Post".into(),
                    columns: Vec::new(),
                },
            ))
            .build()
            .unwrap()
    }

    #[test]
    fn test_alias_root() {
        assert_eq!(generate_alias("User", 0), "user0_");
        assert_eq!(generate_alias("com.acme.LineItem", 3), "lineitem3_");
        assert_eq!(generate_alias("User.posts", 1), "posts1_");
        assert_eq!(generate_alias("Entity2", 4), "entity2x4_");
        assert_eq!(generate_alias("$Proxy", 5), "proxy5_");
        assert_eq!(generate_alias("VeryLongEntityName", 6), "verylongen6_");
    }

    #[test]
    fn test_entity_aliases() {
        let registry = registry();
        let mut context = AliasResolutionContext::new(&registry);
        let user = registry.entity("User").unwrap();
        let aliases = context.generate_entity_reference_aliases("<gen:0>", user).unwrap();
        assert_eq!(aliases.table_alias, "user0_");
        assert_eq!(aliases.columns.suffix, "0_");
        assert_eq!(context.resolve_sql_table_alias("<gen:0>"), Some("user0_"));
        assert!(context.resolve_entity_reference_aliases("<gen:0>").is_some());
        assert!(context.resolve_entity_reference_aliases("<gen:1>").is_none());

        // a second generation would register a different alias
        let again = context.generate_entity_reference_aliases("<gen:0>", user);
        assert!(matches!(again, Err(Error::IllegalState(_))));
    }

    #[test]
    fn test_many_to_many_aliases() {
        let registry = registry();
        let mut context = AliasResolutionContext::new(&registry);
        let roles = registry.collection("User.roles").unwrap();
        let aliases = context
            .generate_collection_reference_aliases("<gen:1>", roles, Some("<gen:2>"))
            .unwrap();
        assert_eq!(aliases.collection_table_alias, "roles0_");
        assert_eq!(aliases.element_table_alias, "role1_");
        assert_eq!(aliases.collection_columns.suffix, "0_");
        assert_eq!(aliases.element.as_ref().unwrap().columns.suffix, "1_");
        assert_eq!(context.resolve_sql_table_alias("<gen:1>"), Some("roles0_"));
        assert_eq!(context.resolve_sql_table_alias("<gen:2>"), Some("role1_"));
        let order: Vec<_> = context.table_aliases().map(|(uid, _)| uid).collect();
        assert_eq!(order, vec!["<gen:2>", "<gen:1>"]);
    }

    #[test]
    fn test_one_to_many_shares_alias() {
        let registry = registry();
        let mut context = AliasResolutionContext::new(&registry);
        let posts = registry.collection("User.posts").unwrap();
        let aliases = context
            .generate_collection_reference_aliases("<gen:1>", posts, Some("<gen:2>"))
            .unwrap();
        assert_eq!(aliases.collection_table_alias, "posts0_");
        assert_eq!(aliases.element_table_alias, "posts0_");
        assert_eq!(context.resolve_sql_table_alias("<gen:2>"), Some("posts0_"));
    }

    #[test]
    fn test_entity_elements_need_uid() {
        let registry = registry();
        let mut context = AliasResolutionContext::new(&registry);
        let posts = registry.collection("User.posts").unwrap();
        assert!(matches!(
            context.generate_collection_reference_aliases("<gen:1>", posts, None),
            Err(Error::IllegalArgument(_))
        ));
    }

    #[test]
    fn test_composite_resolution() {
        let registry = registry();
        let mut context = AliasResolutionContext::new(&registry);
        context.register_composite_query_space_uid_resolution("<gen:3>", "user0_");
        assert_eq!(context.resolve_sql_table_alias("<gen:3>"), Some("user0_"));
        assert!(context.resolve_sql_table_alias("<gen:4>").is_none());
    }
}
