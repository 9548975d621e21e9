//! Builds load plans from mapping metadata.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, trace};

use super::fetch::{
    AnyFetch, BidirectionalEntityFetch, CollectionFetch, CollectionReference, CompositeFetch,
    DeferredFetch, DeferredTarget, EntityFetch, EntityReference, Fetch, Return,
};
use super::space::{Join, JoinKind, QuerySpace, QuerySpaces, SpaceKind};
use super::strategy::{FetchStrategy, FetchStyle, FetchTiming};
use super::{LoadPlan, PlanDisposition};
use crate::error::{Error, Result};
use crate::mapping::{
    CollectionPersister, ElementDef, EntityPersister, IndexDef, MappingRegistry, PropertyDef, PropertyKind,
};

/// Table plus columns identifying one side of an association.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AssociationKey {
    table: String,
    columns: Vec<String>,
}

impl AssociationKey {
    fn new(table: &str, columns: &[String]) -> Self {
        Self {
            table: table.to_string(),
            columns: columns.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct FetchOverride {
    strategy: Option<FetchStrategy>,
    condition: Option<String>,
}

/// Builds entity loader and collection initializer plans.
///
/// Associations are fetched the way the mapping says unless a fetch path
/// overrides it. Query space uids are `<gen:N>` in creation order, so
/// identical mappings and paths give identical plans.
pub struct LoadPlanBuilder<'a> {
    registry: &'a MappingRegistry,
    overrides: BTreeMap<String, FetchOverride>,
    max_fetch_depth: Option<usize>,
}

struct BuildState {
    next_uid: usize,
    spaces: QuerySpaces,
    association_keys: HashMap<AssociationKey, String>,
    visited_paths: BTreeSet<String>,
}

impl BuildState {
    fn generate_uid(&mut self) -> String {
        let uid = format!("<gen:{}>", self.next_uid);
        self.next_uid += 1;
        uid
    }
}

impl<'a> LoadPlanBuilder<'a> {
    /// Create a builder using the registry's settings.
    pub fn new(registry: &'a MappingRegistry) -> Self {
        Self {
            registry,
            overrides: BTreeMap::new(),
            max_fetch_depth: registry.settings().max_fetch_depth,
        }
    }

    /// Join fetch the association at `path`, e.g. `posts.comments`.
    pub fn with_fetch(self, path: impl Into<String>) -> Self {
        self.with_fetch_strategy(path, FetchStrategy::IMMEDIATE_JOIN)
    }

    /// Fetch the association at `path` with an explicit strategy.
    pub fn with_fetch_strategy(mut self, path: impl Into<String>, strategy: FetchStrategy) -> Self {
        self.overrides.entry(path.into()).or_default().strategy = Some(strategy);
        self
    }

    /// Add an ON condition to the join of the association at `path`.
    pub fn with_fetch_condition(mut self, path: impl Into<String>, condition: impl Into<String>) -> Self {
        self.overrides.entry(path.into()).or_default().condition = Some(condition.into());
        self
    }

    /// Stop join fetching mapped associations below this depth.
    pub fn with_max_fetch_depth(mut self, depth: usize) -> Self {
        self.max_fetch_depth = Some(depth);
        self
    }

    fn new_state(&self) -> BuildState {
        BuildState {
            next_uid: 0,
            spaces: QuerySpaces::new(),
            association_keys: HashMap::new(),
            visited_paths: BTreeSet::new(),
        }
    }

    /// Plan loading one entity with its fetch graph.
    pub fn entity_load_plan(&self, entity: &str) -> Result<LoadPlan> {
        let persister = self.registry.entity(entity)?;
        let mut state = self.new_state();
        let uid = state.generate_uid();
        state.spaces.add_root(QuerySpace::new(
            uid.clone(),
            SpaceKind::Entity {
                entity: persister.name.clone(),
            },
        ))?;
        state.association_keys.insert(
            AssociationKey::new(&persister.table, &persister.identifier.columns),
            uid.clone(),
        );
        let reference = self.expand_entity(&mut state, &uid, persister, "", 0)?;
        self.finish(state, PlanDisposition::EntityLoader, Return::Entity(reference))
    }

    /// Plan initializing one collection role.
    pub fn collection_load_plan(&self, role: &str) -> Result<LoadPlan> {
        let persister = self.registry.collection(role)?;
        let mut state = self.new_state();
        let uid = state.generate_uid();
        state.spaces.add_root(QuerySpace::new(
            uid.clone(),
            SpaceKind::Collection {
                role: persister.role.clone(),
            },
        ))?;
        state.association_keys.insert(
            AssociationKey::new(persister.table_name(), &persister.key_columns),
            uid.clone(),
        );
        let reference = self.expand_collection(&mut state, &uid, persister, "", 0)?;
        self.finish(
            state,
            PlanDisposition::CollectionInitializer,
            Return::Collection(reference),
        )
    }

    fn finish(&self, state: BuildState, disposition: PlanDisposition, root: Return) -> Result<LoadPlan> {
        if let Some(path) = self
            .overrides
            .keys()
            .find(|path| !state.visited_paths.contains(*path))
        {
            return Err(Error::illegal_argument(format!(
                "fetch path [{path}] does not name an association reachable through join fetches"
            )));
        }
        debug!(
            root = root.space_uid(),
            query_spaces = state.spaces.len(),
            "load plan built"
        );
        Ok(LoadPlan {
            disposition,
            returns: vec![root],
            query_spaces: state.spaces,
        })
    }

    fn strategy_for(&self, state: &mut BuildState, path: &str, mapped: FetchStrategy, depth: usize) -> FetchStrategy {
        if let Some(strategy) = self.overrides.get(path).and_then(|o| o.strategy) {
            state.visited_paths.insert(path.to_string());
            return strategy;
        }
        if self.overrides.contains_key(path) {
            state.visited_paths.insert(path.to_string());
        }
        match self.max_fetch_depth {
            Some(max) if mapped.is_join_fetched() && depth > max => {
                trace!(path, depth, "join fetch beyond maximum depth, using select");
                FetchStrategy::new(FetchTiming::Immediate, FetchStyle::Select)
            }
            _ => mapped,
        }
    }

    fn condition_for(&self, path: &str) -> Option<String> {
        self.overrides.get(path).and_then(|o| o.condition.clone())
    }

    fn expand_entity(
        &self,
        state: &mut BuildState,
        uid: &str,
        persister: &EntityPersister,
        prefix: &str,
        depth: usize,
    ) -> Result<EntityReference> {
        let mut reference = EntityReference::new(uid, persister.name.clone());
        if !persister.identifier.key_associations.is_empty() {
            let identifier_uid = state.generate_uid();
            state.spaces.add(QuerySpace::new(
                identifier_uid.clone(),
                SpaceKind::Composite {
                    property: persister.identifier.name.clone(),
                },
            ))?;
            state.spaces.add_join(Join::composite(uid, identifier_uid.clone()))?;
            for association in &persister.identifier.key_associations {
                let path = format!("{prefix}{}", association.name);
                let strategy = self.strategy_for(
                    state,
                    &path,
                    FetchStrategy::from_mapping(association.fetch, true),
                    depth + 1,
                );
                let target = self.registry.entity(&association.target)?;
                let fetch = self.entity_fetch(
                    state,
                    EntityFetchSpec {
                        source_uid: uid,
                        lhs_uid: &identifier_uid,
                        path,
                        target,
                        key: AssociationKey::new(&persister.table, &association.columns),
                        lhs_columns: association.columns.clone(),
                        rhs_columns: target.identifier.columns.clone(),
                        required: true,
                        one_to_one: false,
                        strategy,
                        depth: depth + 1,
                    },
                )?;
                reference.identifier_fetches.push(fetch);
            }
            reference.identifier_space_uid = Some(identifier_uid);
        }
        reference.fetches =
            self.expand_properties(state, uid, uid, persister, &persister.properties, prefix, depth)?;
        Ok(reference)
    }

    #[allow(clippy::too_many_arguments)]
    fn expand_properties(
        &self,
        state: &mut BuildState,
        source_uid: &str,
        lhs_uid: &str,
        persister: &EntityPersister,
        properties: &[PropertyDef],
        prefix: &str,
        depth: usize,
    ) -> Result<Vec<Fetch>> {
        let mut fetches = Vec::new();
        for property in properties {
            let path = format!("{prefix}{}", property.name);
            match &property.kind {
                PropertyKind::Basic { .. } => {}
                PropertyKind::ManyToOne(association) | PropertyKind::OneToOne(association) => {
                    let target = self.registry.entity(&association.target)?;
                    let (key, lhs_columns, rhs_columns) = match &association.mapped_by {
                        Some(inverse) => {
                            let columns = target.property_columns(inverse)?;
                            (
                                AssociationKey::new(&target.table, &columns),
                                persister.identifier.columns.clone(),
                                columns,
                            )
                        }
                        None => (
                            AssociationKey::new(&persister.table, &association.columns),
                            association.columns.clone(),
                            target.identifier.columns.clone(),
                        ),
                    };
                    let strategy = self.strategy_for(
                        state,
                        &path,
                        FetchStrategy::from_mapping(association.fetch, association.lazy),
                        depth + 1,
                    );
                    fetches.push(self.entity_fetch(
                        state,
                        EntityFetchSpec {
                            source_uid,
                            lhs_uid,
                            path,
                            target,
                            key,
                            lhs_columns,
                            rhs_columns,
                            required: association.required && association.mapped_by.is_none(),
                            one_to_one: matches!(property.kind, PropertyKind::OneToOne(_)),
                            strategy,
                            depth: depth + 1,
                        },
                    )?);
                }
                PropertyKind::Collection { role } => {
                    let collection = self.registry.collection(role)?;
                    if let Some(fetch) =
                        self.collection_fetch(state, source_uid, lhs_uid, persister, collection, path, depth + 1)?
                    {
                        fetches.push(fetch);
                    }
                }
                PropertyKind::Component { properties } if has_associations(properties) => {
                    let component_uid = state.generate_uid();
                    state.spaces.add(QuerySpace::new(
                        component_uid.clone(),
                        SpaceKind::Composite {
                            property: path.clone(),
                        },
                    ))?;
                    state
                        .spaces
                        .add_join(Join::composite(lhs_uid, component_uid.clone()))?;
                    let nested = self.expand_properties(
                        state,
                        source_uid,
                        &component_uid,
                        persister,
                        properties,
                        &format!("{path}."),
                        depth,
                    )?;
                    fetches.push(Fetch::Composite(CompositeFetch {
                        property: path,
                        space_uid: component_uid,
                        fetches: nested,
                    }));
                }
                PropertyKind::Component { .. } => {}
                PropertyKind::Any { fetch, .. } => {
                    let strategy =
                        self.strategy_for(state, &path, FetchStrategy::from_mapping(*fetch, true), depth + 1);
                    fetches.push(Fetch::Any(AnyFetch {
                        property: path,
                        strategy,
                    }));
                }
            }
        }
        Ok(fetches)
    }

    fn entity_fetch(&self, state: &mut BuildState, spec: EntityFetchSpec<'_>) -> Result<Fetch> {
        if let Some(source) = state.association_keys.get(&spec.key) {
            trace!(path = %spec.path, source = %source, "bidirectional association");
            return Ok(Fetch::BidirectionalEntity(BidirectionalEntityFetch {
                property: spec.path,
                strategy: spec.strategy,
                entity: spec.target.name.clone(),
                target_space_uid: source.clone(),
            }));
        }
        if !spec.strategy.is_join_fetched() {
            return Ok(Fetch::Deferred(DeferredFetch {
                property: spec.path,
                strategy: spec.strategy,
                target: DeferredTarget::Entity(spec.target.name.clone()),
            }));
        }
        state
            .association_keys
            .insert(spec.key, spec.source_uid.to_string());
        let uid = state.generate_uid();
        state.spaces.add(QuerySpace::new(
            uid.clone(),
            SpaceKind::Entity {
                entity: spec.target.name.clone(),
            },
        ))?;
        state.spaces.add_join(Join {
            lhs: spec.lhs_uid.to_string(),
            rhs: uid.clone(),
            kind: JoinKind::Entity,
            required: spec.required,
            lhs_columns: spec.lhs_columns,
            rhs_columns: spec.rhs_columns,
            with_condition: self.condition_for(&spec.path),
        })?;
        let reference =
            self.expand_entity(state, &uid, spec.target, &format!("{}.", spec.path), spec.depth)?;
        Ok(Fetch::Entity(EntityFetch {
            property: spec.path,
            strategy: spec.strategy,
            one_to_one: spec.one_to_one,
            reference,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    fn collection_fetch(
        &self,
        state: &mut BuildState,
        source_uid: &str,
        lhs_uid: &str,
        owner: &EntityPersister,
        collection: &CollectionPersister,
        path: String,
        depth: usize,
    ) -> Result<Option<Fetch>> {
        let key = AssociationKey::new(collection.table_name(), &collection.key_columns);
        if state.association_keys.contains_key(&key) {
            trace!(path = %path, role = %collection.role, "circular collection, not fetched");
            return Ok(None);
        }
        let strategy = self.strategy_for(
            state,
            &path,
            FetchStrategy::from_mapping(collection.fetch, collection.lazy),
            depth,
        );
        if !strategy.is_join_fetched() {
            return Ok(Some(Fetch::Deferred(DeferredFetch {
                property: path,
                strategy,
                target: DeferredTarget::Collection(collection.role.clone()),
            })));
        }
        state.association_keys.insert(key, source_uid.to_string());
        let uid = state.generate_uid();
        state.spaces.add(QuerySpace::new(
            uid.clone(),
            SpaceKind::Collection {
                role: collection.role.clone(),
            },
        ))?;
        state.spaces.add_join(Join {
            lhs: lhs_uid.to_string(),
            rhs: uid.clone(),
            kind: JoinKind::Collection,
            required: false,
            lhs_columns: owner.identifier.columns.clone(),
            rhs_columns: collection.key_columns.clone(),
            with_condition: self.condition_for(&path),
        })?;
        let reference = self.expand_collection(state, &uid, collection, &format!("{path}."), depth)?;
        Ok(Some(Fetch::Collection(CollectionFetch {
            property: path,
            strategy,
            reference,
        })))
    }

    fn expand_collection(
        &self,
        state: &mut BuildState,
        uid: &str,
        collection: &CollectionPersister,
        prefix: &str,
        depth: usize,
    ) -> Result<CollectionReference> {
        let element = match &collection.element {
            ElementDef::OneToMany { entity, columns } | ElementDef::ManyToMany { entity, columns } => {
                let target = self.registry.entity(entity)?;
                let element_uid = state.generate_uid();
                state.spaces.add(QuerySpace::new(
                    element_uid.clone(),
                    SpaceKind::Entity {
                        entity: target.name.clone(),
                    },
                ))?;
                state.spaces.add_join(Join {
                    lhs: uid.to_string(),
                    rhs: element_uid.clone(),
                    kind: JoinKind::CollectionElement,
                    required: false,
                    lhs_columns: columns.clone(),
                    rhs_columns: target.identifier.columns.clone(),
                    with_condition: None,
                })?;
                Some(self.expand_entity(state, &element_uid, target, prefix, depth)?)
            }
            ElementDef::Basic { .. } | ElementDef::Composite { .. } => None,
        };
        let index = match &collection.index {
            Some(IndexDef::Entity { entity, columns }) => {
                let target = self.registry.entity(entity)?;
                let index_uid = state.generate_uid();
                state.spaces.add(QuerySpace::new(
                    index_uid.clone(),
                    SpaceKind::Entity {
                        entity: target.name.clone(),
                    },
                ))?;
                state.spaces.add_join(Join {
                    lhs: uid.to_string(),
                    rhs: index_uid.clone(),
                    kind: JoinKind::CollectionIndex,
                    required: false,
                    lhs_columns: columns.clone(),
                    rhs_columns: target.identifier.columns.clone(),
                    with_condition: None,
                })?;
                Some(EntityReference::new(index_uid, target.name.clone()))
            }
            Some(IndexDef::Basic { .. }) | None => None,
        };
        Ok(CollectionReference {
            space_uid: uid.to_string(),
            role: collection.role.clone(),
            element,
            index,
        })
    }
}

struct EntityFetchSpec<'p> {
    source_uid: &'p str,
    lhs_uid: &'p str,
    path: String,
    target: &'p EntityPersister,
    key: AssociationKey,
    lhs_columns: Vec<String>,
    rhs_columns: Vec<String>,
    required: bool,
    one_to_one: bool,
    strategy: FetchStrategy,
    depth: usize,
}

fn has_associations(properties: &[PropertyDef]) -> bool {
    properties.iter().any(|p| match &p.kind {
        PropertyKind::Basic { .. } => false,
        PropertyKind::Component { properties } => has_associations(properties),
        _ => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{
        AssociationDef, CollectionPersister, CollectionSemantics, EntityPersister, IdentifierDef,
        PropertyDef,
    };
    use crate::value::ValueType;
    use ormload_dialect::Dialect;

    fn registry() -> MappingRegistry {
        MappingRegistry::builder(Dialect::ansi())
            .with_entity(
                EntityPersister::new("User", "users", IdentifierDef::new("id", "id", ValueType::Long))
                    .with_property(PropertyDef::basic("name", "name", ValueType::String))
                    .with_property(PropertyDef::collection("posts", "User.posts")),
            )
            .with_entity(
                EntityPersister::new("Post", "posts", IdentifierDef::new("id", "id", ValueType::Long))
                    .with_property(PropertyDef::many_to_one(
                        "author",
                        AssociationDef::new("User", vec!["author_id".into()]).with_fetch(FetchStyle::Join),
                    ))
                    .with_property(PropertyDef::many_to_one(
                        "editor",
                        AssociationDef::new("User", vec!["editor_id".into()]),
                    )),
            )
            .with_collection(
                CollectionPersister::new(
                    "User.posts",
                    "User",
                    vec!["author_id".into()],
                    ElementDef::OneToMany {
                        entity: "Post".into(),
                        columns: Vec::new(),
                    },
                )
                .with_semantics(CollectionSemantics::Set),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_plan_has_single_space() {
        let registry = registry();
        let plan = LoadPlanBuilder::new(&registry).entity_load_plan("User").unwrap();
        assert_eq!(plan.query_spaces.len(), 1);
        let Return::Entity(root) = plan.single_return().unwrap() else {
            panic!("expected entity return");
        };
        assert_eq!(root.space_uid, "<gen:0>");
        assert!(matches!(
            &root.fetches[0],
            Fetch::Deferred(DeferredFetch { target: DeferredTarget::Collection(role), .. }) if role == "User.posts"
        ));
    }

    #[test]
    fn test_inverse_many_to_one_is_bidirectional() {
        let registry = registry();
        let plan = LoadPlanBuilder::new(&registry)
            .with_fetch("posts")
            .entity_load_plan("User")
            .unwrap();
        // root, collection, element
        assert_eq!(plan.query_spaces.len(), 3);
        let Return::Entity(root) = plan.single_return().unwrap() else {
            panic!("expected entity return");
        };
        let Fetch::Collection(posts) = &root.fetches[0] else {
            panic!("expected collection fetch");
        };
        let element = posts.reference.element.as_ref().unwrap();
        assert_eq!(element.space_uid, "<gen:2>");
        match &element.fetches[0] {
            Fetch::BidirectionalEntity(fetch) => {
                assert_eq!(fetch.property, "posts.author");
                assert_eq!(fetch.target_space_uid, "<gen:0>");
            }
            other => panic!("unexpected fetch {other:?}"),
        }
        assert!(matches!(element.fetches[1], Fetch::Deferred(_)));
    }

    #[test]
    fn test_identical_builds_are_identical() {
        let registry = registry();
        let builder = LoadPlanBuilder::new(&registry).with_fetch("posts").with_fetch("posts.editor");
        assert_eq!(
            builder.entity_load_plan("User").unwrap(),
            builder.entity_load_plan("User").unwrap()
        );
    }

    #[test]
    fn test_max_depth_downgrades_join() {
        let registry = registry();
        let plan = LoadPlanBuilder::new(&registry)
            .with_max_fetch_depth(0)
            .entity_load_plan("Post")
            .unwrap();
        let Return::Entity(root) = plan.single_return().unwrap() else {
            panic!("expected entity return");
        };
        assert_eq!(root.fetches[0].strategy().style, FetchStyle::Select);
        assert_eq!(plan.query_spaces.len(), 1);
    }

    #[test]
    fn test_unknown_fetch_path_is_rejected() {
        let registry = registry();
        let result = LoadPlanBuilder::new(&registry)
            .with_fetch("posts.nothing")
            .entity_load_plan("User");
        assert!(matches!(result, Err(Error::IllegalArgument(_))));
    }

    #[test]
    fn test_collection_plan() {
        let registry = registry();
        let plan = LoadPlanBuilder::new(&registry)
            .collection_load_plan("User.posts")
            .unwrap();
        assert_eq!(plan.disposition, PlanDisposition::CollectionInitializer);
        let Return::Collection(collection) = plan.single_return().unwrap() else {
            panic!("expected collection return");
        };
        let element = collection.element.as_ref().unwrap();
        // Post.author shares the collection key and is recognized as a back reference.
        assert!(matches!(element.fetches[0], Fetch::BidirectionalEntity(_)));
    }
}
