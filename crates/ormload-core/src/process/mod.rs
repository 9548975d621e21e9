//! Result-set processing.
//!
//! Readers built during the join/fetch walk pull entities and collections
//! out of each row into a [`PersistenceContext`].

mod context;
mod processor;
mod readers;
mod transformer;

pub use context::{
    CollectionEntry, CollectionKey, EntityEntry, EntityKey, LoadedObject, PersistenceContext,
    PersistentCollection, SubselectFetch,
};
pub use processor::{ProcessingOptions, ResultSetProcessor};
pub use readers::{
    CollectionReader, EntityReader, EntityReaderKind, ReaderCollector, ReturnReader, RowKeys, RowReader,
};
pub use transformer::ResultTransformer;
