//! ormload core - load plans, SQL generation and result reading.
//!
//! A [`LoadPlan`] describes what one load fetches. [`LoadQueryDetails`]
//! compiles it into a single SELECT plus the readers that turn rows back
//! into entities and collections, and the loaders run it against a
//! [`JdbcCoordinator`].

pub mod config;
pub mod error;
pub mod jdbc;
pub mod loader;
pub mod mapping;
pub mod plan;
pub mod process;
pub mod query;
pub mod value;

pub use config::LoaderSettings;
pub use error::{Error, Result};
pub use jdbc::{JdbcCoordinator, JdbcError, PreparedStatement, ResultSet, SqliteCoordinator};
pub use loader::{CollectionLoader, EntityLoader, LoadExecutor, QueryParameters};
pub use mapping::{CollectionPersister, EntityPersister, LoadQueryInfluencers, MappingRegistry};
pub use plan::{LoadPlan, LoadPlanBuilder, LoadPlanTreePrinter};
pub use process::{CollectionKey, EntityKey, LoadedObject, PersistenceContext, ResultTransformer};
pub use query::{AliasResolutionContext, LoadQueryDetails, QueryBuildingParameters};
pub use value::{TypedValue, Value, ValueType};

/// Re-export of the dialect crate.
pub use ormload_dialect as dialect;
