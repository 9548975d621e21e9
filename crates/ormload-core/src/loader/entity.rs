//! Loading entities by identifier or unique key.

use std::collections::HashSet;

use ormload_dialect::{LockOptions, LockTimeout};
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::jdbc::JdbcCoordinator;
use crate::mapping::{LoadQueryInfluencers, MappingRegistry};
use crate::plan::LoadPlanBuilder;
use crate::process::{EntityKey, LoadedObject, PersistenceContext};
use crate::query::{LoadQueryDetails, QueryBuildingParameters};
use crate::value::{TypedValue, Value, ValueType};

use super::executor::LoadExecutor;
use super::parameters::QueryParameters;

/// Configures an [`EntityLoader`].
pub struct EntityLoaderBuilder<'r> {
    registry: &'r MappingRegistry,
    entity: String,
    fetches: Vec<String>,
    batch_size: Option<usize>,
    lock_options: LockOptions,
    influencers: LoadQueryInfluencers,
    unique_key: Option<String>,
    read_only: Option<bool>,
}

impl<'r> EntityLoaderBuilder<'r> {
    /// Join fetch the association at `path`.
    pub fn with_fetch(mut self, path: impl Into<String>) -> Self {
        self.fetches.push(path.into());
        self
    }

    /// Keys loaded per statement by [`EntityLoader::load_batch`].
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size.max(1));
        self
    }

    pub fn with_lock_options(mut self, lock_options: LockOptions) -> Self {
        self.lock_options = lock_options;
        self
    }

    pub fn with_influencers(mut self, influencers: LoadQueryInfluencers) -> Self {
        self.influencers = influencers;
        self
    }

    /// Look rows up by the columns of `property` instead of the identifier.
    pub fn keyed_on(mut self, property: impl Into<String>) -> Self {
        self.unique_key = Some(property.into());
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }

    /// Build the plan and the statements.
    #[instrument(level = "debug", skip_all, fields(entity = %self.entity))]
    pub fn build(self) -> Result<EntityLoader<'r>> {
        let registry = self.registry;
        let settings = registry.settings();
        let persister = registry.entity(&self.entity)?;
        self.influencers.validate()?;

        let mut lock_options = self.lock_options;
        if !lock_options.is_none() && lock_options.timeout == LockTimeout::WaitForever {
            lock_options.timeout = settings.default_lock_timeout;
        }

        let (key_columns, key_type) = match &self.unique_key {
            Some(property) => (Some(persister.property_columns(property)?), persister.property_type(property)?),
            None => (None, persister.identifier.value_type.clone()),
        };

        let plan = self
            .fetches
            .iter()
            .fold(LoadPlanBuilder::new(registry), |builder, path| builder.with_fetch(path.clone()))
            .entity_load_plan(&persister.name)?;

        let batch_size = self
            .batch_size
            .unwrap_or_else(|| persister.batch_size.unwrap_or(settings.default_batch_fetch_size))
            .max(1);
        let params = QueryBuildingParameters::new()
            .with_influencers(self.influencers.clone())
            .with_lock_options(lock_options.clone());
        let single = LoadQueryDetails::for_entity_keyed_on(&plan, key_columns.as_deref(), &params, registry)?;
        let batch = if batch_size > 1 {
            Some(LoadQueryDetails::for_entity_keyed_on(
                &plan,
                key_columns.as_deref(),
                &params.with_batch_size(batch_size),
                registry,
            )?)
        } else {
            None
        };
        debug!(sql = %single.sql(), batch_size, "entity loader built");

        Ok(EntityLoader {
            registry,
            entity: persister.name.clone(),
            single,
            batch,
            key_type,
            lock_options,
            influencers: self.influencers,
            read_only: self.read_only,
        })
    }
}

/// Loads instances of one entity into a [`PersistenceContext`].
#[derive(Debug, Clone)]
pub struct EntityLoader<'r> {
    registry: &'r MappingRegistry,
    entity: String,
    single: LoadQueryDetails,
    batch: Option<LoadQueryDetails>,
    key_type: ValueType,
    lock_options: LockOptions,
    influencers: LoadQueryInfluencers,
    read_only: Option<bool>,
}

impl<'r> EntityLoader<'r> {
    pub fn builder(registry: &'r MappingRegistry, entity: impl Into<String>) -> EntityLoaderBuilder<'r> {
        EntityLoaderBuilder {
            registry,
            entity: entity.into(),
            fetches: Vec::new(),
            batch_size: None,
            lock_options: LockOptions::none(),
            influencers: LoadQueryInfluencers::new(),
            unique_key: None,
            read_only: None,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Statement used for single-key loads.
    pub fn details(&self) -> &LoadQueryDetails {
        &self.single
    }

    /// Statement used for batched loads, when the batch size exceeds one.
    pub fn batch_details(&self) -> Option<&LoadQueryDetails> {
        self.batch.as_ref()
    }

    pub fn batch_size(&self) -> usize {
        self.batch.as_ref().map_or(1, LoadQueryDetails::batch_size)
    }

    /// Load the instance with key `id`. Fails with `NonUniqueResult` when
    /// the rows hold more than one distinct instance.
    #[instrument(level = "debug", skip_all, fields(entity = %self.entity, id = %id))]
    pub fn load<C: JdbcCoordinator>(
        &self,
        coordinator: &mut C,
        context: &mut PersistenceContext,
        id: Value,
    ) -> Result<Option<EntityKey>> {
        let id = self.key_type.coerce(id)?;
        let keys = self.execute(coordinator, context, &self.single, std::slice::from_ref(&id))?;
        match keys.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(only.clone())),
            _ => Err(Error::NonUniqueResult(format!("{} with key {id}", self.entity))),
        }
    }

    /// Load the instances with the given keys, `batch_size` keys per
    /// statement. The last statement repeats its last key to fill the
    /// batch.
    #[instrument(level = "debug", skip_all, fields(entity = %self.entity, ids = ids.len()))]
    pub fn load_batch<C: JdbcCoordinator>(
        &self,
        coordinator: &mut C,
        context: &mut PersistenceContext,
        ids: &[Value],
    ) -> Result<Vec<EntityKey>> {
        let ids = ids
            .iter()
            .map(|id| self.key_type.coerce(id.clone()))
            .collect::<Result<Vec<_>>>()?;
        let (details, batch_size) = match &self.batch {
            Some(batch) => (batch, batch.batch_size()),
            None => (&self.single, 1),
        };
        let mut loaded = Vec::new();
        let mut seen = HashSet::new();
        for group in ids.chunks(batch_size) {
            let padded = pad_batch(group, batch_size);
            for key in self.execute(coordinator, context, details, &padded)? {
                if seen.insert(key.clone()) {
                    loaded.push(key);
                }
            }
        }
        Ok(loaded)
    }

    fn execute<C: JdbcCoordinator>(
        &self,
        coordinator: &mut C,
        context: &mut PersistenceContext,
        details: &LoadQueryDetails,
        ids: &[Value],
    ) -> Result<Vec<EntityKey>> {
        let params = ids.iter().fold(
            QueryParameters::new()
                .with_lock_options(self.lock_options.clone())
                .with_influencers(self.influencers.clone())
                .with_read_only(self.read_only),
            |params, id| params.with_positional(TypedValue::new(id.clone(), self.key_type.clone())),
        );
        let results = LoadExecutor::new(self.registry).execute(coordinator, details, &params, context)?;
        let mut seen = HashSet::new();
        Ok(results
            .into_iter()
            .filter_map(|object| match object {
                LoadedObject::Entity(key) => Some(key),
                _ => None,
            })
            .filter(|key| seen.insert(key.clone()))
            .collect())
    }
}

/// Fill `group` up to `batch_size` by repeating its last key.
pub(crate) fn pad_batch(group: &[Value], batch_size: usize) -> Vec<Value> {
    let mut padded = group.to_vec();
    if let Some(last) = group.last() {
        padded.resize(batch_size.max(group.len()), last.clone());
    }
    padded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_batch() {
        let ids = [Value::Int(1), Value::Int(2)];
        assert_eq!(
            pad_batch(&ids, 4),
            vec![Value::Int(1), Value::Int(2), Value::Int(2), Value::Int(2)]
        );
        assert_eq!(pad_batch(&ids, 2), ids.to_vec());
        assert!(pad_batch(&[], 3).is_empty());
    }
}
