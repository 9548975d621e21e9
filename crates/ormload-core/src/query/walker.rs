//! Walks query space joins and fetches of a load plan.
//!
//! The join walk renders FROM/JOIN text and allocates aliases. The fetch
//! walk appends select fragments for the fetched entities and collections
//! and registers a reader for each of them. Joins are always walked before
//! fetches, so every alias a fetch needs already exists.

use ormload_dialect::{JoinFragment, JoinType};
use tracing::trace;

use crate::error::{Error, Result};
use crate::mapping::{template, CollectionSemantics, LoadQueryInfluencers, MappingRegistry};
use crate::plan::{
    CollectionFetch, CollectionReference, EntityFetch, EntityReference, Fetch, Join, JoinKind, QuerySpace,
    QuerySpaces, SpaceKind,
};
use crate::process::{CollectionReader, EntityReader, EntityReaderKind, ReaderCollector};

use super::alias::AliasResolutionContext;
use super::select::SelectStatementBuilder;

/// What the fetch walk observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchStats {
    has_subselect_fetches: bool,
    joined_bag_roles: Vec<String>,
}

impl FetchStats {
    fn process_fetch(&mut self, fetch: &Fetch) {
        if fetch.strategy().is_subselect() {
            self.has_subselect_fetches = true;
        }
    }

    pub fn has_subselect_fetches(&self) -> bool {
        self.has_subselect_fetches
    }

    /// Roles of the join fetched bag collections.
    pub fn joined_bag_roles(&self) -> &[String] {
        &self.joined_bag_roles
    }

    pub(crate) fn record_bag(&mut self, role: &str) {
        self.joined_bag_roles.push(role.to_string());
    }
}

/// Owner of a group of fetches.
#[derive(Debug, Clone, Copy)]
pub struct FetchSource<'s> {
    /// Space of the owning entity.
    pub entity_uid: &'s str,
    /// Space the fetches hang off. A composite space for component members.
    pub space_uid: &'s str,
    /// Path prefix of the owning entity, e.g. `posts.`.
    pub prefix: &'s str,
}

impl<'s> FetchSource<'s> {
    pub fn entity(reference: &'s EntityReference, prefix: &'s str) -> Self {
        Self {
            entity_uid: &reference.space_uid,
            space_uid: &reference.space_uid,
            prefix,
        }
    }
}

/// Join and fetch walker for one query build.
pub struct LoadQueryJoinAndFetchProcessor<'a, 'c> {
    aliases: &'c mut AliasResolutionContext<'a>,
    influencers: &'c LoadQueryInfluencers,
    spaces: &'c QuerySpaces,
    registry: &'a MappingRegistry,
}

impl<'a, 'c> LoadQueryJoinAndFetchProcessor<'a, 'c> {
    pub fn new(
        aliases: &'c mut AliasResolutionContext<'a>,
        influencers: &'c LoadQueryInfluencers,
        spaces: &'c QuerySpaces,
    ) -> Self {
        let registry = aliases.registry();
        Self {
            aliases,
            influencers,
            spaces,
            registry,
        }
    }

    /// Render every join reachable from `space_uid`, depth first.
    pub fn process_query_space_joins(&mut self, space_uid: &str, fragment: &mut JoinFragment) -> Result<()> {
        let spaces = self.spaces;
        let space = spaces.get(space_uid)?;
        for join in &space.joins {
            self.render_join(space, join, fragment)?;
            self.process_query_space_joins(&join.rhs, fragment)?;
        }
        Ok(())
    }

    fn render_join(&mut self, lhs: &QuerySpace, join: &Join, fragment: &mut JoinFragment) -> Result<()> {
        if let SpaceKind::Collection { role } = &lhs.kind {
            if !matches!(join.kind, JoinKind::CollectionElement | JoinKind::CollectionIndex) {
                return Err(Error::NotYetImplemented(format!(
                    "{:?} join from collection [{role}] to query space [{}]",
                    join.kind, join.rhs
                )));
            }
        }
        let spaces = self.spaces;
        let rhs = spaces.get(&join.rhs)?;
        match &rhs.kind {
            SpaceKind::Composite { .. } => {
                let lhs_alias = self.resolve_lhs_alias(join)?.to_string();
                self.aliases
                    .register_composite_query_space_uid_resolution(&rhs.uid, &lhs_alias);
                Ok(())
            }
            SpaceKind::Entity { entity } => {
                if join.kind == JoinKind::CollectionElement && self.is_one_to_many_space(lhs)? {
                    // element rows live in the collection table itself
                    trace!(rhs = %rhs.uid, "one-to-many element join folded into the collection join");
                    return Ok(());
                }
                self.render_entity_join(lhs, join, entity, fragment)
            }
            SpaceKind::Collection { role } => self.render_collection_join(join, rhs, role, fragment),
        }
    }

    fn is_one_to_many_space(&self, space: &QuerySpace) -> Result<bool> {
        match &space.kind {
            SpaceKind::Collection { role } => Ok(self.registry.collection(role)?.is_one_to_many()),
            _ => Ok(false),
        }
    }

    fn resolve_lhs_alias(&self, join: &Join) -> Result<&str> {
        self.aliases.resolve_sql_table_alias(&join.lhs).ok_or_else(|| {
            Error::illegal_state(format!(
                "could not resolve table alias of query space [{}] joined to [{}]",
                join.lhs, join.rhs
            ))
        })
    }

    fn render_entity_join(
        &mut self,
        lhs: &QuerySpace,
        join: &Join,
        entity: &str,
        fragment: &mut JoinFragment,
    ) -> Result<()> {
        let registry = self.registry;
        let dialect = registry.dialect();
        let persister = registry.entity(entity)?;
        let lhs_alias = self.resolve_lhs_alias(join)?.to_string();
        let rhs_alias = match self.aliases.resolve_entity_reference_aliases(&join.rhs) {
            Some(existing) => existing.table_alias.clone(),
            None => {
                self.aliases
                    .generate_entity_reference_aliases(&join.rhs, persister)?
                    .table_alias
            }
        };

        let mut on = Vec::new();
        on.push(persister.filter_fragment(&rhs_alias, self.influencers, dialect)?);
        if let Some(condition) = &join.with_condition {
            on.push(template::render(condition, &rhs_alias, dialect)?);
        }
        if let (JoinKind::CollectionElement, SpaceKind::Collection { role }) = (join.kind, &lhs.kind) {
            let collection = registry.collection(role)?;
            if collection.is_many_to_many() {
                on.push(collection.many_to_many_filter_fragment(&rhs_alias, self.influencers, dialect)?);
            }
        }

        trace!(lhs = %join.lhs, rhs = %join.rhs, alias = %rhs_alias, "rendering entity join");
        fragment.add_join(
            &persister.table,
            &rhs_alias,
            &join.aliased_lhs_columns(&lhs_alias),
            &join.rhs_columns,
            JoinType::for_required(join.required),
            &join_conditions(on),
        );
        fragment.add_joins(
            &persister.from_join_fragment(&rhs_alias, dialect),
            &persister.where_join_fragment(&rhs_alias, dialect),
        );
        Ok(())
    }

    fn render_collection_join(
        &mut self,
        join: &Join,
        rhs: &QuerySpace,
        role: &str,
        fragment: &mut JoinFragment,
    ) -> Result<()> {
        let registry = self.registry;
        let dialect = registry.dialect();
        let persister = registry.collection(role)?;
        let element_uid = rhs
            .joins
            .iter()
            .find(|j| j.kind == JoinKind::CollectionElement)
            .map(|j| j.rhs.as_str());
        let aliases = self
            .aliases
            .generate_collection_reference_aliases(&rhs.uid, persister, element_uid)?;
        let lhs_alias = self.resolve_lhs_alias(join)?.to_string();
        let alias = &aliases.collection_table_alias;

        let mut on = vec![persister.filter_fragment(alias, self.influencers, dialect)?];
        let element = match persister.element_entity() {
            Some(entity) if persister.is_one_to_many() => Some(registry.entity(entity)?),
            _ => None,
        };
        if let Some(element) = element {
            on.push(element.filter_fragment(alias, self.influencers, dialect)?);
        }
        if let Some(condition) = &join.with_condition {
            on.push(template::render(condition, alias, dialect)?);
        }

        trace!(lhs = %join.lhs, rhs = %rhs.uid, alias = %alias, role, "rendering collection join");
        fragment.add_join(
            persister.table_name(),
            alias,
            &join.aliased_lhs_columns(&lhs_alias),
            &join.rhs_columns,
            JoinType::for_required(join.required),
            &join_conditions(on),
        );
        if let Some(element) = element {
            fragment.add_joins(
                &element.from_join_fragment(alias, dialect),
                &element.where_join_fragment(alias, dialect),
            );
        }
        Ok(())
    }

    /// Append select fragments and register readers for `fetches`.
    pub fn process_fetches(
        &mut self,
        fetches: &[Fetch],
        source: FetchSource<'_>,
        select: &mut SelectStatementBuilder<'_>,
        readers: &mut ReaderCollector,
        stats: &mut FetchStats,
    ) -> Result<()> {
        for fetch in fetches {
            stats.process_fetch(fetch);
            match fetch {
                Fetch::Any(any) if any.strategy.is_join_fetched() => {
                    return Err(Error::AnyTypeJoin(any.property.clone()));
                }
                Fetch::Any(_) | Fetch::Deferred(_) => {}
                Fetch::BidirectionalEntity(fetch) => {
                    trace!(property = %fetch.property, "skipping bidirectional fetch");
                }
                Fetch::Entity(fetch) => self.process_entity_fetch(fetch, source, select, readers, stats)?,
                Fetch::Collection(fetch) => {
                    self.process_collection_fetch(fetch, source, select, readers, stats)?
                }
                Fetch::Composite(composite) => {
                    let nested = FetchSource {
                        space_uid: &composite.space_uid,
                        ..source
                    };
                    self.process_fetches(&composite.fetches, nested, select, readers, stats)?;
                }
            }
        }
        Ok(())
    }

    fn process_entity_fetch(
        &mut self,
        fetch: &EntityFetch,
        source: FetchSource<'_>,
        select: &mut SelectStatementBuilder<'_>,
        readers: &mut ReaderCollector,
        stats: &mut FetchStats,
    ) -> Result<()> {
        let reference = &fetch.reference;
        let aliases = self
            .aliases
            .resolve_entity_reference_aliases(&reference.space_uid)
            .cloned()
            .ok_or_else(|| {
                Error::illegal_state(format!(
                    "could not locate entity aliases for query space [{}]",
                    reference.space_uid
                ))
            })?;
        let registry = self.registry;
        let persister = registry.entity(&reference.entity)?;
        select.append_select_clause_fragment(&persister.select_fragment(
            &aliases.table_alias,
            &aliases.columns,
            registry.dialect(),
        ));

        let prefix = format!("{}.", fetch.property);
        self.process_identifier_fetches(reference, &prefix, select, readers, stats)?;

        let kind = if fetch.one_to_one {
            EntityReaderKind::OneToOne {
                owner_uid: source.entity_uid.to_string(),
                property: relative_property(&fetch.property, source.prefix),
            }
        } else {
            EntityReaderKind::Generic
        };
        readers.add_entity_reader(EntityReader {
            uid: reference.space_uid.clone(),
            entity: reference.entity.clone(),
            aliases,
            kind,
        });

        self.process_fetches(
            &reference.fetches,
            FetchSource::entity(reference, &prefix),
            select,
            readers,
            stats,
        )
    }

    /// Walk the fetches of a composite identifier.
    pub fn process_identifier_fetches(
        &mut self,
        reference: &EntityReference,
        prefix: &str,
        select: &mut SelectStatementBuilder<'_>,
        readers: &mut ReaderCollector,
        stats: &mut FetchStats,
    ) -> Result<()> {
        if reference.identifier_fetches.is_empty() {
            return Ok(());
        }
        let source = FetchSource {
            entity_uid: &reference.space_uid,
            space_uid: reference
                .identifier_space_uid
                .as_deref()
                .unwrap_or(&reference.space_uid),
            prefix,
        };
        self.process_fetches(&reference.identifier_fetches, source, select, readers, stats)
    }

    fn process_collection_fetch(
        &mut self,
        fetch: &CollectionFetch,
        source: FetchSource<'_>,
        select: &mut SelectStatementBuilder<'_>,
        readers: &mut ReaderCollector,
        stats: &mut FetchStats,
    ) -> Result<()> {
        let registry = self.registry;
        let dialect = registry.dialect();
        let reference = &fetch.reference;
        let persister = registry.collection(&reference.role)?;
        let aliases = self
            .aliases
            .resolve_collection_reference_aliases(&reference.space_uid)
            .cloned()
            .ok_or_else(|| {
                Error::illegal_state(format!(
                    "could not locate collection aliases for query space [{}]",
                    reference.space_uid
                ))
            })?;
        if persister.semantics == CollectionSemantics::Bag {
            stats.record_bag(&persister.role);
        }

        select.append_select_clause_fragment(
            &persister.select_fragment(&aliases.collection_table_alias, &aliases.collection_columns),
        );
        if let (Some(element), Some(element_aliases)) = (&reference.element, &aliases.element) {
            let element_persister = registry.entity(&element.entity)?;
            select.append_select_clause_fragment(&element_persister.select_fragment(
                &element_aliases.table_alias,
                &element_aliases.columns,
                dialect,
            ));
            readers.add_entity_reader(EntityReader {
                uid: element.space_uid.clone(),
                entity: element.entity.clone(),
                aliases: element_aliases.clone(),
                kind: EntityReaderKind::Generic,
            });
        }
        self.process_collection_index(reference, select, readers)?;
        select.append_order_by_fragment(&persister.many_to_many_order_by(&aliases.element_table_alias, dialect)?);
        select.append_order_by_fragment(&persister.sql_order_by(&aliases.collection_table_alias, dialect)?);

        readers.add_collection_reader(CollectionReader {
            uid: reference.space_uid.clone(),
            role: reference.role.clone(),
            aliases,
            owner_uid: Some(source.entity_uid.to_string()),
            element_uid: reference.element.as_ref().map(|e| e.space_uid.clone()),
        });

        if let Some(element) = &reference.element {
            let prefix = format!("{}.", fetch.property);
            self.process_identifier_fetches(element, &prefix, select, readers, stats)?;
            self.process_fetches(
                &element.fetches,
                FetchSource::entity(element, &prefix),
                select,
                readers,
                stats,
            )?;
        }
        Ok(())
    }

    /// Select the entity keying a map and register its reader.
    pub fn process_collection_index(
        &mut self,
        reference: &CollectionReference,
        select: &mut SelectStatementBuilder<'_>,
        readers: &mut ReaderCollector,
    ) -> Result<()> {
        let Some(index) = &reference.index else {
            return Ok(());
        };
        let aliases = self
            .aliases
            .resolve_entity_reference_aliases(&index.space_uid)
            .cloned()
            .ok_or_else(|| {
                Error::illegal_state(format!(
                    "could not locate map key aliases for query space [{}]",
                    index.space_uid
                ))
            })?;
        let registry = self.registry;
        let persister = registry.entity(&index.entity)?;
        select.append_select_clause_fragment(&persister.select_fragment(
            &aliases.table_alias,
            &aliases.columns,
            registry.dialect(),
        ));
        readers.add_entity_reader(EntityReader {
            uid: index.space_uid.clone(),
            entity: index.entity.clone(),
            aliases,
            kind: EntityReaderKind::Generic,
        });
        Ok(())
    }
}

/// `property` relative to the owning entity's path prefix.
fn relative_property(property: &str, prefix: &str) -> String {
    property.strip_prefix(prefix).unwrap_or(property).to_string()
}

fn join_conditions(conditions: Vec<String>) -> String {
    conditions
        .into_iter()
        .filter(|c| !c.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" and ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{AssociationDef, EntityPersister, IdentifierDef, PropertyDef};
    use crate::plan::{FetchStrategy, FetchStyle, FetchTiming, LoadPlanBuilder, Return};
    use crate::value::ValueType;
    use ormload_dialect::Dialect;

    fn registry() -> MappingRegistry {
        MappingRegistry::builder(Dialect::ansi())
            .with_entity(
                EntityPersister::new("Post", "posts", IdentifierDef::new("id", "id", ValueType::Long))
                    .with_property(PropertyDef::many_to_one(
                        "author",
                        AssociationDef::new("User", vec!["author_id".into()])
                            .with_fetch(FetchStyle::Join)
                            .with_required(true),
                    ))
                    .with_property(PropertyDef::any("target", "target_type", "target_id")),
            )
            .with_entity(
                EntityPersister::new("User", "users", IdentifierDef::new("id", "id", ValueType::Long))
                    .with_where("deleted = 0"),
            )
            .build()
            .unwrap()
    }

    fn walk(registry: &MappingRegistry, plan_builder: LoadPlanBuilder<'_>) -> Result<(String, String, FetchStats)> {
        let plan = plan_builder.entity_load_plan("Post")?;
        let Return::Entity(root) = plan.single_return()?.clone() else {
            panic!("expected entity return");
        };
        let mut aliases = AliasResolutionContext::new(registry);
        let root_persister = registry.entity("Post")?;
        aliases.generate_entity_reference_aliases(&root.space_uid, root_persister)?;
        let influencers = LoadQueryInfluencers::new();
        let mut fragment = registry.dialect().create_outer_join_fragment();
        let mut select = SelectStatementBuilder::new(registry.dialect());
        let mut readers = ReaderCollector::new();
        let mut stats = FetchStats::default();
        let mut walker = LoadQueryJoinAndFetchProcessor::new(&mut aliases, &influencers, &plan.query_spaces);
        walker.process_query_space_joins(&root.space_uid, &mut fragment)?;
        walker.process_fetches(&root.fetches, FetchSource::entity(&root, ""), &mut select, &mut readers, &mut stats)?;
        select.append_from_clause_fragment("posts post0_");
        Ok((fragment.to_from_fragment_string().to_string(), select.to_statement_string(), stats))
    }

    #[test]
    fn test_entity_join_with_mapped_where() {
        let registry = registry();
        let (from, sql, stats) = walk(&registry, LoadPlanBuilder::new(&registry)).unwrap();
        assert_eq!(from, " inner join users user1_ on post0_.author_id=user1_.id and user1_.deleted = 0");
        assert!(sql.starts_with("select user1_.id as id1_1_ from posts post0_"));
        assert!(!stats.has_subselect_fetches());
    }

    #[test]
    fn test_join_fetched_any_is_rejected() {
        let registry = registry();
        let result = walk(&registry, LoadPlanBuilder::new(&registry).with_fetch("target"));
        assert!(matches!(result, Err(Error::AnyTypeJoin(property)) if property == "target"));
    }

    #[test]
    fn test_subselect_fetch_is_reported() {
        let registry = registry();
        let strategy = FetchStrategy::new(FetchTiming::Delayed, FetchStyle::Subselect);
        let (_, _, stats) = walk(&registry, LoadPlanBuilder::new(&registry).with_fetch_strategy("target", strategy))
            .unwrap();
        assert!(stats.has_subselect_fetches());
    }

    #[test]
    fn test_entity_join_from_collection_is_not_supported() {
        let registry = registry();
        let mut spaces = QuerySpaces::new();
        spaces
            .add_root(QuerySpace::new(
                "<gen:0>",
                SpaceKind::Collection {
                    role: "Post.tags".into(),
                },
            ))
            .unwrap();
        spaces
            .add(QuerySpace::new(
                "<gen:1>",
                SpaceKind::Entity {
                    entity: "User".into(),
                },
            ))
            .unwrap();
        spaces
            .add_join(Join {
                lhs: "<gen:0>".into(),
                rhs: "<gen:1>".into(),
                kind: JoinKind::Entity,
                required: false,
                lhs_columns: vec!["user_id".into()],
                rhs_columns: vec!["id".into()],
                with_condition: None,
            })
            .unwrap();
        let mut aliases = AliasResolutionContext::new(&registry);
        let influencers = LoadQueryInfluencers::new();
        let mut fragment = registry.dialect().create_outer_join_fragment();
        let mut walker = LoadQueryJoinAndFetchProcessor::new(&mut aliases, &influencers, &spaces);
        let result = walker.process_query_space_joins("<gen:0>", &mut fragment);
        assert!(matches!(result, Err(Error::NotYetImplemented(message)) if message.contains("[Post.tags]")));
        assert_eq!(fragment.to_from_fragment_string(), "");
    }

    #[test]
    fn test_relative_property() {
        assert_eq!(relative_property("posts.profile", "posts."), "profile");
        assert_eq!(relative_property("profile", ""), "profile");
    }
}
