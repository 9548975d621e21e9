//! Initializing collections by owner key.

use ormload_dialect::LockOptions;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::jdbc::JdbcCoordinator;
use crate::mapping::{LoadQueryInfluencers, MappingRegistry};
use crate::plan::LoadPlanBuilder;
use crate::process::{CollectionKey, PersistenceContext};
use crate::query::{LoadQueryDetails, QueryBuildingParameters};
use crate::value::{TypedValue, Value, ValueType};

use super::entity::pad_batch;
use super::executor::LoadExecutor;
use super::parameters::QueryParameters;

/// Configures a [`CollectionLoader`].
pub struct CollectionLoaderBuilder<'r> {
    registry: &'r MappingRegistry,
    role: String,
    fetches: Vec<String>,
    batch_size: Option<usize>,
    lock_options: LockOptions,
    influencers: LoadQueryInfluencers,
    read_only: Option<bool>,
}

impl<'r> CollectionLoaderBuilder<'r> {
    /// Join fetch an association of the element, e.g. `author`.
    pub fn with_fetch(mut self, path: impl Into<String>) -> Self {
        self.fetches.push(path.into());
        self
    }

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

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }

    #[instrument(level = "debug", skip_all, fields(role = %self.role))]
    pub fn build(self) -> Result<CollectionLoader<'r>> {
        let registry = self.registry;
        let persister = registry.collection(&self.role)?;
        let owner = registry.entity(&persister.owner)?;
        self.influencers.validate()?;

        let plan = self
            .fetches
            .iter()
            .fold(LoadPlanBuilder::new(registry), |builder, path| builder.with_fetch(path.clone()))
            .collection_load_plan(&persister.role)?;
        let batch_size = self
            .batch_size
            .unwrap_or_else(|| {
                persister
                    .batch_size
                    .unwrap_or(registry.settings().default_batch_fetch_size)
            })
            .max(1);
        let params = QueryBuildingParameters::new()
            .with_influencers(self.influencers.clone())
            .with_lock_options(self.lock_options.clone())
            .with_batch_size(batch_size);
        let details = LoadQueryDetails::for_collection(&plan, &params, registry)?;
        debug!(sql = %details.sql(), batch_size, "collection loader built");

        Ok(CollectionLoader {
            registry,
            role: persister.role.clone(),
            details,
            key_type: owner.identifier.value_type.clone(),
            lock_options: self.lock_options,
            influencers: self.influencers,
            read_only: self.read_only,
        })
    }
}

/// Initializes collections of one role into a [`PersistenceContext`].
#[derive(Debug, Clone)]
pub struct CollectionLoader<'r> {
    registry: &'r MappingRegistry,
    role: String,
    details: LoadQueryDetails,
    key_type: ValueType,
    lock_options: LockOptions,
    influencers: LoadQueryInfluencers,
    read_only: Option<bool>,
}

impl<'r> CollectionLoader<'r> {
    pub fn builder(registry: &'r MappingRegistry, role: impl Into<String>) -> CollectionLoaderBuilder<'r> {
        CollectionLoaderBuilder {
            registry,
            role: role.into(),
            fetches: Vec::new(),
            batch_size: None,
            lock_options: LockOptions::none(),
            influencers: LoadQueryInfluencers::new(),
            read_only: None,
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn details(&self) -> &LoadQueryDetails {
        &self.details
    }

    /// Initialize the collection owned by `owner`. An owner without
    /// element rows gets an empty collection.
    pub fn initialize<C: JdbcCoordinator>(
        &self,
        coordinator: &mut C,
        context: &mut PersistenceContext,
        owner: Value,
    ) -> Result<CollectionKey> {
        let owner = self.key_type.coerce(owner)?;
        self.initialize_batch(coordinator, context, std::slice::from_ref(&owner))?;
        Ok(CollectionKey::new(self.role.clone(), owner))
    }

    /// Initialize the collections of several owners, one statement per
    /// batch of keys.
    #[instrument(level = "debug", skip_all, fields(role = %self.role, owners = owners.len()))]
    pub fn initialize_batch<C: JdbcCoordinator>(
        &self,
        coordinator: &mut C,
        context: &mut PersistenceContext,
        owners: &[Value],
    ) -> Result<()> {
        let owners = owners
            .iter()
            .map(|owner| self.key_type.coerce(owner.clone()))
            .collect::<Result<Vec<_>>>()?;
        let batch_size = self.details.batch_size();
        let executor = LoadExecutor::new(self.registry);
        for group in owners.chunks(batch_size) {
            let params = pad_batch(group, batch_size).into_iter().fold(
                QueryParameters::new()
                    .with_lock_options(self.lock_options.clone())
                    .with_influencers(self.influencers.clone())
                    .with_read_only(self.read_only)
                    .with_collection_keys(group.to_vec()),
                |params, owner| params.with_positional(TypedValue::new(owner, self.key_type.clone())),
            );
            executor.execute(coordinator, &self.details, &params, context)?;
        }
        Ok(())
    }
}
