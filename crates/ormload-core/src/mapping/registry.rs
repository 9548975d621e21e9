//! Registry of entity and collection persisters.

use std::collections::BTreeMap;
use std::path::Path;

use ormload_dialect::Dialect;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::collection::{CollectionPersister, ElementDef, IndexDef};
use super::entity::{EntityPersister, PropertyDef, PropertyKind};
use super::filter::{EnabledFilter, FilterDef, FilterMapping};
use crate::config::LoaderSettings;
use crate::error::{Error, Result};

fn default_dialect() -> String {
    "ansi".to_string()
}

/// JSON mapping document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingDocument {
    /// Dialect name, see [`Dialect::by_name`].
    #[serde(default = "default_dialect")]
    pub dialect: String,
    #[serde(default)]
    pub settings: LoaderSettings,
    #[serde(default)]
    pub filters: Vec<FilterDef>,
    #[serde(default)]
    pub entities: Vec<EntityPersister>,
    #[serde(default)]
    pub collections: Vec<CollectionPersister>,
}

/// Validated mapping metadata plus the dialect and settings to load with.
#[derive(Debug, Clone)]
pub struct MappingRegistry {
    dialect: Dialect,
    settings: LoaderSettings,
    filters: BTreeMap<String, FilterDef>,
    entities: BTreeMap<String, EntityPersister>,
    collections: BTreeMap<String, CollectionPersister>,
}

/// Builder for [`MappingRegistry`].
#[derive(Debug, Clone)]
pub struct MappingRegistryBuilder {
    dialect: Dialect,
    settings: LoaderSettings,
    filters: Vec<FilterDef>,
    entities: Vec<EntityPersister>,
    collections: Vec<CollectionPersister>,
}

impl MappingRegistryBuilder {
    pub fn with_settings(mut self, settings: LoaderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_filter(mut self, filter: FilterDef) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_entity(mut self, entity: EntityPersister) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn with_collection(mut self, collection: CollectionPersister) -> Self {
        self.collections.push(collection);
        self
    }

    /// Resolve derived collection metadata and validate references.
    pub fn build(self) -> Result<MappingRegistry> {
        let filters: BTreeMap<_, _> = self.filters.into_iter().map(|f| (f.name.clone(), f)).collect();
        let mut entities = BTreeMap::new();
        for entity in self.entities {
            if entities.contains_key(&entity.name) {
                return Err(Error::mapping(format!("duplicate entity mapping [{}]", entity.name)));
            }
            entities.insert(entity.name.clone(), entity);
        }

        let mut collections = BTreeMap::new();
        for mut collection in self.collections {
            let owner = entities
                .get(&collection.owner)
                .ok_or_else(|| Error::UnknownEntity(collection.owner.clone()))?;
            if owner.identifier.columns.len() != collection.key_columns.len() {
                return Err(Error::mapping(format!(
                    "collection [{}] key columns do not match the identifier of [{}]",
                    collection.role, owner.name
                )));
            }
            if let ElementDef::OneToMany { entity, columns } = &mut collection.element {
                let element = entities
                    .get(entity.as_str())
                    .ok_or_else(|| Error::UnknownEntity(entity.clone()))?;
                if columns.is_empty() {
                    *columns = element.identifier.columns.clone();
                }
                if collection.table.is_none() {
                    collection.table = Some(element.table.clone());
                }
            }
            if let ElementDef::ManyToMany { entity, .. } = &collection.element {
                if !entities.contains_key(entity.as_str()) {
                    return Err(Error::UnknownEntity(entity.clone()));
                }
            }
            if let Some(IndexDef::Entity { entity, .. }) = &collection.index {
                if !entities.contains_key(entity.as_str()) {
                    return Err(Error::UnknownEntity(entity.clone()));
                }
            }
            if collection.table_name().is_empty() {
                return Err(Error::mapping(format!("collection [{}] has no table", collection.role)));
            }
            check_filters(&filters, &collection.filters)?;
            check_filters(&filters, &collection.many_to_many_filters)?;
            if collections.contains_key(&collection.role) {
                return Err(Error::mapping(format!("duplicate collection role [{}]", collection.role)));
            }
            collections.insert(collection.role.clone(), collection);
        }

        for entity in entities.values() {
            check_filters(&filters, &entity.filters)?;
            for association in &entity.identifier.key_associations {
                if !entities.contains_key(&association.target) {
                    return Err(Error::UnknownEntity(association.target.clone()));
                }
            }
            let subclass_properties = entity.subclasses.iter().flat_map(|s| s.properties.iter());
            for property in entity.properties.iter().chain(subclass_properties) {
                check_property(&entities, &collections, entity, property)?;
            }
        }

        debug!(
            entities = entities.len(),
            collections = collections.len(),
            dialect = self.dialect.name(),
            "mapping registry built"
        );
        Ok(MappingRegistry {
            dialect: self.dialect,
            settings: self.settings,
            filters,
            entities,
            collections,
        })
    }
}

fn check_filters(defined: &BTreeMap<String, FilterDef>, applied: &[FilterMapping]) -> Result<()> {
    for filter in applied {
        if !defined.contains_key(&filter.name) {
            return Err(Error::mapping(format!("undefined filter [{}]", filter.name)));
        }
    }
    Ok(())
}

fn check_property(
    entities: &BTreeMap<String, EntityPersister>,
    collections: &BTreeMap<String, CollectionPersister>,
    owner: &EntityPersister,
    property: &PropertyDef,
) -> Result<()> {
    match &property.kind {
        PropertyKind::ManyToOne(association) | PropertyKind::OneToOne(association) => {
            let target = entities
                .get(&association.target)
                .ok_or_else(|| Error::UnknownEntity(association.target.clone()))?;
            match &association.mapped_by {
                Some(inverse) => {
                    let columns = target.property_columns(inverse)?;
                    if columns.len() != owner.identifier.columns.len() {
                        return Err(Error::mapping(format!(
                            "[{}.{}] mapped by [{}.{inverse}] with mismatched key columns",
                            owner.name, property.name, target.name
                        )));
                    }
                }
                None if association.columns.len() != target.identifier.columns.len() => {
                    return Err(Error::mapping(format!(
                        "[{}.{}] foreign key does not match the identifier of [{}]",
                        owner.name, property.name, target.name
                    )));
                }
                None => {}
            }
            Ok(())
        }
        PropertyKind::Collection { role } => {
            let collection = collections
                .get(role)
                .ok_or_else(|| Error::UnknownCollection(role.clone()))?;
            if collection.owner != owner.name {
                return Err(Error::mapping(format!(
                    "collection [{role}] is owned by [{}], not [{}]",
                    collection.owner, owner.name
                )));
            }
            Ok(())
        }
        PropertyKind::Component { properties } => properties
            .iter()
            .try_for_each(|p| check_property(entities, collections, owner, p)),
        PropertyKind::Basic { .. } | PropertyKind::Any { .. } => Ok(()),
    }
}

impl MappingRegistry {
    /// Start building a registry for a dialect.
    pub fn builder(dialect: Dialect) -> MappingRegistryBuilder {
        MappingRegistryBuilder {
            dialect,
            settings: LoaderSettings::default(),
            filters: Vec::new(),
            entities: Vec::new(),
            collections: Vec::new(),
        }
    }

    /// Build from a parsed mapping document.
    pub fn from_document(document: MappingDocument) -> Result<Self> {
        let mut builder = Self::builder(Dialect::by_name(&document.dialect)?).with_settings(document.settings);
        builder.filters = document.filters;
        builder.entities = document.entities;
        builder.collections = document.collections;
        builder.build()
    }

    /// Parse a JSON mapping document.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_document(serde_json::from_str(json)?)
    }

    /// Read a JSON mapping document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::mapping(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    /// Replace the settings, e.g. with values read from the environment.
    pub fn with_settings(mut self, settings: LoaderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Get an entity persister by name.
    pub fn entity(&self, name: &str) -> Result<&EntityPersister> {
        self.entities
            .get(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Get a collection persister by role.
    pub fn collection(&self, role: &str) -> Result<&CollectionPersister> {
        self.collections
            .get(role)
            .ok_or_else(|| Error::UnknownCollection(role.to_string()))
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityPersister> {
        self.entities.values()
    }

    pub fn collections(&self) -> impl Iterator<Item = &CollectionPersister> {
        self.collections.values()
    }

    /// Enable a defined filter, ready for parameter values.
    pub fn enable_filter(&self, name: &str) -> Result<EnabledFilter> {
        self.filters
            .get(name)
            .cloned()
            .map(EnabledFilter::new)
            .ok_or_else(|| Error::illegal_argument(format!("no such filter [{name}]")))
    }
}
