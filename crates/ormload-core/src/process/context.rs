//! Minimal persistence context receiving the side effects of loads.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::json;

use crate::mapping::CollectionSemantics;
use crate::value::Value;

/// Identity of an entity instance: root entity name plus identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EntityKey {
    pub entity: String,
    pub id: Value,
}

impl EntityKey {
    pub fn new(entity: impl Into<String>, id: Value) -> Self {
        Self {
            entity: entity.into(),
            id,
        }
    }
}

/// Identity of a collection instance: role plus owner key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CollectionKey {
    pub role: String,
    pub owner: Value,
}

impl CollectionKey {
    pub fn new(role: impl Into<String>, owner: Value) -> Self {
        Self {
            role: role.into(),
            owner,
        }
    }
}

/// A loaded entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityEntry {
    pub key: EntityKey,
    /// Concrete entity name, a subclass name for joined subclasses.
    pub concrete: String,
    /// Hydrated property values by path. Associations hold the target id.
    pub state: BTreeMap<String, Value>,
    pub read_only: bool,
}

/// One element of a collection, with its index for lists and maps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<Value>,
    /// Element value, or the element id for entity collections.
    pub element: Value,
}

/// A loaded collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistentCollection {
    pub key: CollectionKey,
    pub semantics: CollectionSemantics,
    pub entries: Vec<CollectionEntry>,
    pub initialized: bool,
}

impl PersistentCollection {
    fn new(key: CollectionKey, semantics: CollectionSemantics) -> Self {
        Self {
            key,
            semantics,
            entries: Vec::new(),
            initialized: false,
        }
    }

    /// Add an entry read from a row. Bags keep every row; other semantics
    /// keep one entry per distinct element and index.
    pub fn read_entry(&mut self, entry: CollectionEntry) {
        if !self.semantics.allows_duplicates() && self.entries.contains(&entry) {
            return;
        }
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Keys loaded by a statement whose subselect fetches can reuse it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubselectFetch {
    pub entity: String,
    pub sql: String,
    pub keys: Vec<Value>,
}

/// What one row yields for a return.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LoadedObject {
    Entity(EntityKey),
    Collection(CollectionKey),
    /// Every object read from one row, the return first.
    Tuple(Vec<LoadedObject>),
}

/// Entities and collections known to one session.
#[derive(Debug, Default)]
pub struct PersistenceContext {
    entities: HashMap<EntityKey, EntityEntry>,
    entity_order: Vec<EntityKey>,
    collections: HashMap<CollectionKey, PersistentCollection>,
    collection_order: Vec<CollectionKey>,
    subselects: Vec<SubselectFetch>,
    default_read_only: bool,
}

impl PersistenceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entities loaded without an explicit read-only request become
    /// read-only.
    pub fn with_default_read_only(mut self, read_only: bool) -> Self {
        self.default_read_only = read_only;
        self
    }

    pub fn is_default_read_only(&self) -> bool {
        self.default_read_only
    }

    pub fn contains_entity(&self, key: &EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    pub fn entity(&self, key: &EntityKey) -> Option<&EntityEntry> {
        self.entities.get(key)
    }

    pub fn entity_mut(&mut self, key: &EntityKey) -> Option<&mut EntityEntry> {
        self.entities.get_mut(key)
    }

    /// Register a hydrated entity. An entity already present is kept.
    pub fn add_entity(&mut self, entry: EntityEntry) {
        if self.entities.contains_key(&entry.key) {
            return;
        }
        self.entity_order.push(entry.key.clone());
        self.entities.insert(entry.key.clone(), entry);
    }

    /// Entities in the order they were first loaded.
    pub fn entities(&self) -> impl Iterator<Item = &EntityEntry> {
        self.entity_order.iter().filter_map(|k| self.entities.get(k))
    }

    pub fn collection(&self, key: &CollectionKey) -> Option<&PersistentCollection> {
        self.collections.get(key)
    }

    /// The collection with this key, created uninitialized when missing.
    pub fn get_or_create_collection(
        &mut self,
        key: CollectionKey,
        semantics: CollectionSemantics,
    ) -> &mut PersistentCollection {
        if !self.collections.contains_key(&key) {
            self.collection_order.push(key.clone());
        }
        self.collections
            .entry(key.clone())
            .or_insert_with(|| PersistentCollection::new(key, semantics))
    }

    pub fn collections(&self) -> impl Iterator<Item = &PersistentCollection> {
        self.collection_order.iter().filter_map(|k| self.collections.get(k))
    }

    pub fn register_subselect(&mut self, fetch: SubselectFetch) {
        self.subselects.push(fetch);
    }

    pub fn subselects(&self) -> &[SubselectFetch] {
        &self.subselects
    }

    /// Everything loaded so far as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "entities": self.entities().collect::<Vec<_>>(),
            "collections": self.collections().collect::<Vec<_>>(),
            "subselects": self.subselects,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_kept() {
        let mut context = PersistenceContext::new();
        let key = EntityKey::new("User", Value::Int(1));
        let mut state = BTreeMap::new();
        state.insert("name".to_string(), Value::Text("ann".into()));
        context.add_entity(EntityEntry {
            key: key.clone(),
            concrete: "User".into(),
            state,
            read_only: false,
        });
        context.add_entity(EntityEntry {
            key: key.clone(),
            concrete: "User".into(),
            state: BTreeMap::new(),
            read_only: true,
        });
        assert_eq!(context.entities().count(), 1);
        assert!(!context.entity(&key).unwrap().read_only);
    }

    #[test]
    fn test_bag_and_set_entries() {
        let mut context = PersistenceContext::new();
        let entry = CollectionEntry {
            index: None,
            element: Value::Int(7),
        };
        let bag = context.get_or_create_collection(
            CollectionKey::new("User.tags", Value::Int(1)),
            CollectionSemantics::Bag,
        );
        bag.read_entry(entry.clone());
        bag.read_entry(entry.clone());
        assert_eq!(bag.len(), 2);

        let set = context.get_or_create_collection(
            CollectionKey::new("User.roles", Value::Int(1)),
            CollectionSemantics::Set,
        );
        set.read_entry(entry.clone());
        set.read_entry(entry);
        assert_eq!(set.len(), 1);
        assert_eq!(context.collections().count(), 2);
    }

    #[test]
    fn test_json_shape() {
        let mut context = PersistenceContext::new();
        context.add_entity(EntityEntry {
            key: EntityKey::new("User", Value::Int(1)),
            concrete: "User".into(),
            state: BTreeMap::new(),
            read_only: false,
        });
        let json = context.to_json();
        assert_eq!(json["entities"][0]["key"]["id"], 1);
        assert_eq!(json["collections"].as_array().unwrap().len(), 0);
    }
}
