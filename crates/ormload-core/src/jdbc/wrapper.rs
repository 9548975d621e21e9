//! Result-set wrapping with a shared column-name cache.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{JdbcResult, ResultSet};
use crate::value::Value;

/// Column label to index lookups remembered across executions of the same
/// statement.
#[derive(Debug, Default)]
pub struct ColumnNameCache {
    columns: Mutex<HashMap<String, usize>>,
}

impl ColumnNameCache {
    pub fn new(expected_columns: usize) -> Self {
        Self {
            columns: Mutex::new(HashMap::with_capacity(expected_columns)),
        }
    }

    /// Cached index of `label`, asking the result set on a miss.
    pub fn index_for_column_name(&self, label: &str, rs: &dyn ResultSet) -> JdbcResult<usize> {
        let mut columns = self.columns.lock();
        if let Some(&index) = columns.get(label) {
            return Ok(index);
        }
        let index = rs.find_column(label)?;
        columns.insert(label.to_string(), index);
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.columns.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A result set resolving column labels through a [`ColumnNameCache`].
pub struct ResultSetWrapper {
    inner: Box<dyn ResultSet>,
    cache: Arc<ColumnNameCache>,
}

impl ResultSetWrapper {
    pub fn new(inner: Box<dyn ResultSet>, cache: Arc<ColumnNameCache>) -> Self {
        Self { inner, cache }
    }

    pub fn into_inner(self) -> Box<dyn ResultSet> {
        self.inner
    }
}

impl ResultSet for ResultSetWrapper {
    fn next(&mut self) -> JdbcResult<bool> {
        self.inner.next()
    }

    fn absolute(&mut self, row: usize) -> JdbcResult<bool> {
        self.inner.absolute(row)
    }

    fn find_column(&self, label: &str) -> JdbcResult<usize> {
        self.cache.index_for_column_name(label, self.inner.as_ref())
    }

    fn get_value(&self, column: usize) -> JdbcResult<Value> {
        self.inner.get_value(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jdbc::{MaterializedResultSet, ScrollMode};

    fn rows() -> Box<dyn ResultSet> {
        Box::new(MaterializedResultSet::new(
            vec!["id1_0_".into(), "name2_0_".into()],
            vec![vec![Value::Int(1), Value::Text("ann".into())]],
            ScrollMode::ForwardOnly,
        ))
    }

    #[test]
    fn test_cache_is_shared() {
        let cache = Arc::new(ColumnNameCache::new(2));
        let mut first = ResultSetWrapper::new(rows(), Arc::clone(&cache));
        assert!(first.next().unwrap());
        assert_eq!(first.get_by_label("name2_0_").unwrap(), Value::Text("ann".into()));
        assert_eq!(cache.len(), 1);

        let second = ResultSetWrapper::new(rows(), Arc::clone(&cache));
        assert_eq!(second.find_column("name2_0_").unwrap(), 2);
        assert_eq!(cache.len(), 1);
        assert!(second.find_column("missing").is_err());
    }
}
