//! Executing load queries.
//!
//! [`EntityLoader`] and [`CollectionLoader`] build their statements once and
//! run them through a [`LoadExecutor`] for each call.

mod collection;
mod entity;
mod executor;
mod parameters;

pub use collection::{CollectionLoader, CollectionLoaderBuilder};
pub use entity::{EntityLoader, EntityLoaderBuilder};
pub use executor::{LoadExecutor, PreparedLoad};
pub use parameters::{ProcessedStatement, QueryParameters};
