//! Readers pulling entities and collections out of result rows.
//!
//! The join/fetch walk registers one reader per fetched entity or
//! collection. A [`RowReader`] applies them in registration order.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::jdbc::ResultSet;
use crate::mapping::{ElementDef, EntityPersister, HydratedKind, IndexDef, MappingRegistry};
use crate::query::{CollectionReferenceAliases, EntityReferenceAliases};
use crate::value::{Value, ValueType};

use super::context::{CollectionEntry, CollectionKey, EntityEntry, EntityKey, LoadedObject, PersistenceContext};

/// Entity keys resolved for the current row, by query space uid.
pub type RowKeys = HashMap<String, Option<EntityKey>>;

/// How a fetched entity is attached to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityReaderKind {
    /// The owner holds the foreign key, nothing to link.
    Generic,
    /// One-to-one fetch; the owner's property is set to the target key.
    OneToOne { owner_uid: String, property: String },
}

/// Reads one entity query space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityReader {
    pub uid: String,
    pub entity: String,
    pub aliases: EntityReferenceAliases,
    pub kind: EntityReaderKind,
}

impl EntityReader {
    /// Read the identifier and build the key, None when the row holds no
    /// entity for this space.
    pub fn resolve_key(&self, rs: &dyn ResultSet, persister: &EntityPersister) -> Result<Option<EntityKey>> {
        let id = read_columns(rs, &self.aliases.columns.identifier, &persister.identifier.value_type)?;
        Ok((!id.is_null()).then(|| EntityKey::new(persister.name.clone(), id)))
    }

    /// Read the entity's own columns.
    pub fn hydrate(
        &self,
        rs: &dyn ResultSet,
        registry: &MappingRegistry,
        persister: &EntityPersister,
        key: EntityKey,
        read_only: bool,
    ) -> Result<EntityEntry> {
        let subclass = match &self.aliases.columns.discriminator {
            Some(alias) => rs
                .get_by_label(alias)?
                .as_i64()
                .ok_or_else(|| Error::illegal_state(format!("no discriminator value for {}", self.entity)))?,
            None => 0,
        };
        let concrete = persister.subclass_for_discriminator(subclass).to_string();

        let mut state = BTreeMap::new();
        let hydrated = persister.hydrated_properties();
        for (property, aliases) in hydrated.iter().zip(&self.aliases.columns.properties) {
            if property.table != 0 && i64::try_from(property.table).ok() != Some(subclass) {
                continue;
            }
            let value = match &property.kind {
                HydratedKind::Basic(ty) => read_columns(rs, aliases, ty)?,
                HydratedKind::Association { target } => {
                    let ty = &registry.entity(target)?.identifier.value_type;
                    read_columns(rs, aliases, ty)?
                }
                HydratedKind::Any => read_raw(rs, aliases)?,
            };
            state.insert(property.path.clone(), value);
        }
        Ok(EntityEntry {
            key,
            concrete,
            state,
            read_only,
        })
    }
}

/// Reads one collection query space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionReader {
    pub uid: String,
    pub role: String,
    pub aliases: CollectionReferenceAliases,
    /// Space of the owning entity. None when the collection is the return
    /// and its key is read from the row.
    pub owner_uid: Option<String>,
    /// Space of the element entity for entity collections.
    pub element_uid: Option<String>,
}

impl CollectionReader {
    /// Resolve the collection key of the current row.
    pub fn resolve_key(
        &self,
        rs: &dyn ResultSet,
        registry: &MappingRegistry,
        keys: &RowKeys,
    ) -> Result<Option<CollectionKey>> {
        let owner = match &self.owner_uid {
            Some(owner_uid) => match keys.get(owner_uid) {
                Some(Some(owner)) => owner.id.clone(),
                Some(None) => return Ok(None),
                None => {
                    return Err(Error::illegal_state(format!(
                        "collection [{}] read before its owner space [{owner_uid}]",
                        self.role
                    )))
                }
            },
            None => {
                let persister = registry.collection(&self.role)?;
                let ty = &registry.entity(&persister.owner)?.identifier.value_type;
                read_columns(rs, &self.aliases.collection_columns.key, ty)?
            }
        };
        Ok((!owner.is_null()).then(|| CollectionKey::new(self.role.clone(), owner)))
    }

    /// Read the element and index of the current row, None when the row
    /// holds no element.
    pub fn read_entry(
        &self,
        rs: &dyn ResultSet,
        registry: &MappingRegistry,
        keys: &RowKeys,
    ) -> Result<Option<CollectionEntry>> {
        let persister = registry.collection(&self.role)?;
        let columns = &self.aliases.collection_columns;
        let element = match (&persister.element, &self.element_uid) {
            (ElementDef::OneToMany { .. } | ElementDef::ManyToMany { .. }, Some(element_uid)) => {
                match keys.get(element_uid) {
                    Some(Some(key)) => key.id.clone(),
                    _ => Value::Null,
                }
            }
            (ElementDef::OneToMany { entity, .. } | ElementDef::ManyToMany { entity, .. }, None) => {
                let ty = &registry.entity(entity)?.identifier.value_type;
                read_columns(rs, &columns.element, ty)?
            }
            (ElementDef::Basic { value_type, .. }, _) => read_columns(rs, &columns.element, value_type)?,
            (ElementDef::Composite { properties }, _) => {
                let ty = ValueType::Composite(properties.iter().map(|p| p.value_type.clone()).collect());
                read_columns(rs, &columns.element, &ty)?
            }
        };
        if element.is_null() {
            return Ok(None);
        }
        let index = match &persister.index {
            Some(IndexDef::Basic { value_type, .. }) => Some(read_columns(rs, &columns.index, value_type)?),
            Some(IndexDef::Entity { entity, .. }) => {
                let ty = &registry.entity(entity)?.identifier.value_type;
                Some(read_columns(rs, &columns.index, ty)?)
            }
            None => None,
        };
        Ok(Some(CollectionEntry { index, element }))
    }
}

/// Produces the return object of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnReader {
    Entity { uid: String },
    Collection { uid: String },
}

/// Readers gathered while walking joins and fetches.
#[derive(Debug, Clone, Default)]
pub struct ReaderCollector {
    entity_readers: Vec<EntityReader>,
    collection_readers: Vec<CollectionReader>,
}

impl ReaderCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity_reader(&mut self, reader: EntityReader) {
        self.entity_readers.push(reader);
    }

    pub fn add_collection_reader(&mut self, reader: CollectionReader) {
        self.collection_readers.push(reader);
    }

    pub fn entity_readers(&self) -> &[EntityReader] {
        &self.entity_readers
    }

    pub fn collection_readers(&self) -> &[CollectionReader] {
        &self.collection_readers
    }

    pub fn build_row_reader(self, return_reader: ReturnReader) -> RowReader {
        RowReader {
            entity_readers: self.entity_readers,
            collection_readers: self.collection_readers,
            return_reader,
        }
    }
}

/// Collection touched by the current row.
pub(crate) struct RowCollection {
    pub key: CollectionKey,
    pub entry: Option<CollectionEntry>,
}

/// Everything read from one row.
pub(crate) struct RowResult {
    pub tuple: Vec<LoadedObject>,
    pub collections: Vec<(usize, RowCollection)>,
}

/// All readers of one statement, applied to each row in a fixed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowReader {
    entity_readers: Vec<EntityReader>,
    collection_readers: Vec<CollectionReader>,
    return_reader: ReturnReader,
}

impl RowReader {
    pub fn entity_readers(&self) -> &[EntityReader] {
        &self.entity_readers
    }

    pub fn collection_readers(&self) -> &[CollectionReader] {
        &self.collection_readers
    }

    pub fn return_reader(&self) -> &ReturnReader {
        &self.return_reader
    }

    /// Read one row: entity keys, entity state, one-to-one links, then
    /// collections, then the return.
    pub(crate) fn read_row(
        &self,
        rs: &dyn ResultSet,
        registry: &MappingRegistry,
        context: &mut PersistenceContext,
        read_only: bool,
    ) -> Result<RowResult> {
        let mut keys = RowKeys::with_capacity(self.entity_readers.len());
        for reader in &self.entity_readers {
            let persister = registry.entity(&reader.entity)?;
            keys.insert(reader.uid.clone(), reader.resolve_key(rs, persister)?);
        }

        for reader in &self.entity_readers {
            let Some(Some(key)) = keys.get(&reader.uid) else {
                continue;
            };
            if context.contains_entity(key) {
                continue;
            }
            let persister = registry.entity(&reader.entity)?;
            let entry = reader.hydrate(rs, registry, persister, key.clone(), read_only)?;
            context.add_entity(entry);
        }

        for reader in &self.entity_readers {
            let EntityReaderKind::OneToOne { owner_uid, property } = &reader.kind else {
                continue;
            };
            let (Some(Some(owner)), Some(target)) = (keys.get(owner_uid), keys.get(&reader.uid)) else {
                continue;
            };
            let value = target.as_ref().map(|k| k.id.clone()).unwrap_or(Value::Null);
            if let Some(entry) = context.entity_mut(owner) {
                entry.state.insert(property.clone(), value);
            }
        }

        let mut collections = Vec::new();
        for (position, reader) in self.collection_readers.iter().enumerate() {
            if let Some(key) = reader.resolve_key(rs, registry, &keys)? {
                let entry = reader.read_entry(rs, registry, &keys)?;
                collections.push((position, RowCollection { key, entry }));
            }
        }

        let mut tuple = Vec::new();
        match &self.return_reader {
            ReturnReader::Entity { uid } => match keys.get(uid) {
                Some(Some(key)) => tuple.push(LoadedObject::Entity(key.clone())),
                _ => return Ok(RowResult { tuple, collections }),
            },
            ReturnReader::Collection { uid } => {
                let root = self
                    .collection_readers
                    .iter()
                    .position(|r| &r.uid == uid)
                    .and_then(|p| collections.iter().find(|(position, _)| *position == p));
                match root {
                    Some((_, row)) => tuple.push(LoadedObject::Collection(row.key.clone())),
                    None => return Ok(RowResult { tuple, collections }),
                }
            }
        }
        let return_uid = match &self.return_reader {
            ReturnReader::Entity { uid } | ReturnReader::Collection { uid } => uid,
        };
        for reader in &self.entity_readers {
            if &reader.uid == return_uid {
                continue;
            }
            if let Some(Some(key)) = keys.get(&reader.uid) {
                tuple.push(LoadedObject::Entity(key.clone()));
            }
        }
        Ok(RowResult { tuple, collections })
    }
}

/// Read `aliases` as one value of type `ty`, composite when several
/// columns are read.
fn read_columns(rs: &dyn ResultSet, aliases: &[String], ty: &ValueType) -> Result<Value> {
    match aliases {
        [single] => ty.coerce(rs.get_by_label(single)?),
        _ => {
            let raw = read_raw(rs, aliases)?;
            if raw.is_null() {
                return Ok(Value::Null);
            }
            match ty {
                ValueType::Composite(_) => ty.coerce(raw),
                _ => Ok(raw),
            }
        }
    }
}

fn read_raw(rs: &dyn ResultSet, aliases: &[String]) -> Result<Value> {
    let parts = aliases
        .iter()
        .map(|alias| rs.get_by_label(alias).map_err(Error::from))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::Composite(parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jdbc::{MaterializedResultSet, ScrollMode};
    use crate::mapping::{EntityAliases, IdentifierDef, PropertyDef};
    use ormload_dialect::Dialect;

    fn registry() -> MappingRegistry {
        MappingRegistry::builder(Dialect::ansi())
            .with_entity(
                EntityPersister::new("User", "users", IdentifierDef::new("id", "id", ValueType::Long))
                    .with_property(PropertyDef::basic("name", "name", ValueType::String)),
            )
            .build()
            .unwrap()
    }

    fn reader() -> EntityReader {
        EntityReader {
            uid: "<gen:0>".into(),
            entity: "User".into(),
            aliases: EntityReferenceAliases {
                table_alias: "user0_".into(),
                columns: EntityAliases {
                    suffix: "0_".into(),
                    identifier: vec!["id1_0_".into()],
                    properties: vec![vec!["name2_0_".into()]],
                    discriminator: None,
                },
            },
            kind: EntityReaderKind::Generic,
        }
    }

    fn rows(rows: Vec<Vec<Value>>) -> MaterializedResultSet {
        MaterializedResultSet::new(vec!["id1_0_".into(), "name2_0_".into()], rows, ScrollMode::ForwardOnly)
    }

    #[test]
    fn test_entity_reader() {
        let registry = registry();
        let persister = registry.entity("User").unwrap();
        let mut rs = rows(vec![
            vec![Value::Text("3".into()), Value::Text("ann".into())],
            vec![Value::Null, Value::Null],
        ]);
        assert!(rs.next().unwrap());
        let key = reader().resolve_key(&rs, persister).unwrap().unwrap();
        assert_eq!(key, EntityKey::new("User", Value::Int(3)));
        let entry = reader().hydrate(&rs, &registry, persister, key, true).unwrap();
        assert_eq!(entry.state["name"], Value::Text("ann".into()));
        assert!(entry.read_only);

        assert!(rs.next().unwrap());
        assert!(reader().resolve_key(&rs, persister).unwrap().is_none());
    }

    #[test]
    fn test_row_reader_identity() {
        let registry = registry();
        let mut collector = ReaderCollector::new();
        collector.add_entity_reader(reader());
        let row_reader = collector.build_row_reader(ReturnReader::Entity { uid: "<gen:0>".into() });
        let mut rs = rows(vec![
            vec![Value::Int(1), Value::Text("ann".into())],
            vec![Value::Int(1), Value::Text("changed".into())],
        ]);
        let mut context = PersistenceContext::new();
        while rs.next().unwrap() {
            let row = row_reader.read_row(&rs, &registry, &mut context, false).unwrap();
            assert_eq!(row.tuple.len(), 1);
        }
        let key = EntityKey::new("User", Value::Int(1));
        assert_eq!(context.entity(&key).unwrap().state["name"], Value::Text("ann".into()));
    }

    #[test]
    fn test_missing_column() {
        let registry = registry();
        let persister = registry.entity("User").unwrap();
        let mut rs = MaterializedResultSet::new(vec!["other".into()], vec![vec![Value::Int(1)]], ScrollMode::ForwardOnly);
        rs.next().unwrap();
        assert!(matches!(reader().resolve_key(&rs, persister), Err(Error::Jdbc(_))));
    }
}
