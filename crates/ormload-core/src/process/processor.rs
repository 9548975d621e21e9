//! Turns the rows of one executed statement into loaded objects.

use std::collections::HashSet;

use tracing::{debug, instrument, trace};

use crate::error::Result;
use crate::jdbc::ResultSet;
use crate::mapping::{CollectionSemantics, MappingRegistry};
use crate::value::Value;

use super::context::{CollectionKey, LoadedObject, PersistenceContext, SubselectFetch};
use super::readers::{ReturnReader, RowReader};

/// Per-execution inputs of [`ResultSetProcessor::extract_results`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessingOptions<'o> {
    /// Overrides the context's default read-only flag.
    pub read_only: Option<bool>,
    /// Owner keys of the collections a collection load was asked for.
    /// Those without rows are registered empty.
    pub collection_keys: &'o [Value],
    /// Statement text, remembered for subselect fetches.
    pub sql: &'o str,
    /// Stop after this many rows.
    pub max_rows: Option<u32>,
}

/// Reads every row of a result set with one [`RowReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSetProcessor {
    row_reader: RowReader,
    had_subselect_fetches: bool,
}

/// Collections filled by the current result set, in first-seen order.
#[derive(Default)]
struct LoadingCollections {
    seen: HashSet<CollectionKey>,
    skipped: HashSet<CollectionKey>,
    order: Vec<(CollectionKey, CollectionSemantics)>,
}

impl LoadingCollections {
    /// Whether rows for `key` should be read. Collections initialized by an
    /// earlier load are left alone.
    fn admit(&mut self, key: &CollectionKey, semantics: CollectionSemantics, context: &PersistenceContext) -> bool {
        if self.seen.contains(key) {
            return true;
        }
        if self.skipped.contains(key) {
            return false;
        }
        if context.collection(key).is_some_and(|c| c.initialized) {
            trace!(role = %key.role, owner = %key.owner, "collection already initialized, ignoring rows");
            self.skipped.insert(key.clone());
            return false;
        }
        self.seen.insert(key.clone());
        self.order.push((key.clone(), semantics));
        true
    }
}

impl ResultSetProcessor {
    pub fn new(row_reader: RowReader, had_subselect_fetches: bool) -> Self {
        Self {
            row_reader,
            had_subselect_fetches,
        }
    }

    pub fn row_reader(&self) -> &RowReader {
        &self.row_reader
    }

    /// Whether some fetch of the plan is a subselect fetch.
    pub fn had_subselect_fetches(&self) -> bool {
        self.had_subselect_fetches
    }

    /// Read every remaining row. Returns one tuple per row, the return
    /// object first.
    #[instrument(level = "debug", skip_all)]
    pub fn extract_results(
        &self,
        rs: &mut dyn ResultSet,
        registry: &MappingRegistry,
        context: &mut PersistenceContext,
        options: &ProcessingOptions<'_>,
    ) -> Result<Vec<Vec<LoadedObject>>> {
        let read_only = options.read_only.unwrap_or_else(|| context.is_default_read_only());
        let mut loading = LoadingCollections::default();
        let mut results = Vec::new();
        let mut row_count = 0usize;

        while rs.next()? {
            if options.max_rows.is_some_and(|max| row_count >= max as usize) {
                break;
            }
            row_count += 1;
            let row = self.row_reader.read_row(&*rs, registry, context, read_only)?;
            for (position, collection) in row.collections {
                let Some(reader) = self.row_reader.collection_readers().get(position) else {
                    continue;
                };
                let semantics = registry.collection(&reader.role)?.semantics;
                if !loading.admit(&collection.key, semantics, context) {
                    continue;
                }
                let target = context.get_or_create_collection(collection.key, semantics);
                if let Some(entry) = collection.entry {
                    target.read_entry(entry);
                }
            }
            if !row.tuple.is_empty() {
                results.push(row.tuple);
            }
        }

        if let ReturnReader::Collection { uid } = self.row_reader.return_reader() {
            if let Some(reader) = self.row_reader.collection_readers().iter().find(|r| &r.uid == uid) {
                let semantics = registry.collection(&reader.role)?.semantics;
                for owner in options.collection_keys {
                    let key = CollectionKey::new(reader.role.clone(), owner.clone());
                    if loading.admit(&key, semantics, context) {
                        context.get_or_create_collection(key, semantics);
                    }
                }
            }
        }

        for (key, semantics) in loading.order {
            context.get_or_create_collection(key, semantics).initialized = true;
        }

        if self.had_subselect_fetches {
            self.register_subselect(&results, options.sql, context);
        }

        debug!(rows = row_count, results = results.len(), "result set processed");
        Ok(results)
    }

    fn register_subselect(&self, results: &[Vec<LoadedObject>], sql: &str, context: &mut PersistenceContext) {
        let mut seen = HashSet::new();
        let mut entity = None;
        let mut keys = Vec::new();
        for row in results {
            if let Some(LoadedObject::Entity(key)) = row.first() {
                entity.get_or_insert_with(|| key.entity.clone());
                if seen.insert(key.id.clone()) {
                    keys.push(key.id.clone());
                }
            }
        }
        if let Some(entity) = entity {
            trace!(entity = %entity, keys = keys.len(), "registering subselect fetch");
            context.register_subselect(SubselectFetch {
                entity,
                sql: sql.to_string(),
                keys,
            });
        }
    }
}
