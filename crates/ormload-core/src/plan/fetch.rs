//! Returns, references and fetches of a load plan.

use super::strategy::FetchStrategy;

/// An entity reached by a return or a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityReference {
    pub space_uid: String,
    pub entity: String,
    /// Composite space of an identifier with key associations.
    pub identifier_space_uid: Option<String>,
    /// Fetches of key associations, walked before `fetches`.
    pub identifier_fetches: Vec<Fetch>,
    pub fetches: Vec<Fetch>,
}

impl EntityReference {
    pub fn new(space_uid: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            space_uid: space_uid.into(),
            entity: entity.into(),
            identifier_space_uid: None,
            identifier_fetches: Vec::new(),
            fetches: Vec::new(),
        }
    }
}

/// A collection reached by a return or a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionReference {
    pub space_uid: String,
    pub role: String,
    /// Element graph of an entity-valued collection.
    pub element: Option<EntityReference>,
    /// Entity keying a map. Its own associations are not expanded.
    pub index: Option<EntityReference>,
}

/// To-one association folded into the statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFetch {
    pub property: String,
    pub strategy: FetchStrategy,
    pub one_to_one: bool,
    pub reference: EntityReference,
}

/// Association pointing back at an entity already in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidirectionalEntityFetch {
    pub property: String,
    pub strategy: FetchStrategy,
    pub entity: String,
    /// Space of the fetch source that first reached the association.
    pub target_space_uid: String,
}

/// Collection folded into the statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionFetch {
    pub property: String,
    pub strategy: FetchStrategy,
    pub reference: CollectionReference,
}

/// Embedded component whose members hold associations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeFetch {
    pub property: String,
    pub space_uid: String,
    pub fetches: Vec<Fetch>,
}

/// Any-type association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnyFetch {
    pub property: String,
    pub strategy: FetchStrategy,
}

/// Target of an association loaded outside the statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredTarget {
    Entity(String),
    Collection(String),
}

/// Association loaded by a later select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredFetch {
    pub property: String,
    pub strategy: FetchStrategy,
    pub target: DeferredTarget,
}

/// A non-root association of a load plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch {
    Entity(EntityFetch),
    BidirectionalEntity(BidirectionalEntityFetch),
    Collection(CollectionFetch),
    Composite(CompositeFetch),
    Any(AnyFetch),
    Deferred(DeferredFetch),
}

impl Fetch {
    /// Property path relative to the return.
    pub fn property(&self) -> &str {
        match self {
            Fetch::Entity(f) => &f.property,
            Fetch::BidirectionalEntity(f) => &f.property,
            Fetch::Collection(f) => &f.property,
            Fetch::Composite(f) => &f.property,
            Fetch::Any(f) => &f.property,
            Fetch::Deferred(f) => &f.property,
        }
    }

    /// Strategy of the fetch. Composite fetches follow their owner.
    pub fn strategy(&self) -> FetchStrategy {
        match self {
            Fetch::Entity(f) => f.strategy,
            Fetch::BidirectionalEntity(f) => f.strategy,
            Fetch::Collection(f) => f.strategy,
            Fetch::Composite(_) => FetchStrategy::IMMEDIATE_JOIN,
            Fetch::Any(f) => f.strategy,
            Fetch::Deferred(f) => f.strategy,
        }
    }
}

/// A root of a load plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Return {
    Entity(EntityReference),
    Collection(CollectionReference),
}

impl Return {
    pub fn space_uid(&self) -> &str {
        match self {
            Return::Entity(r) => &r.space_uid,
            Return::Collection(r) => &r.space_uid,
        }
    }
}
