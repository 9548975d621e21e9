//! SQLite backend over rusqlite.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use ormload_dialect::SqlTypeCode;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::Connection;
use tracing::{debug, trace};

use super::{JdbcCoordinator, JdbcError, JdbcResult, PreparedStatement, ResultSet, ScrollMode, StatementKind};
use crate::value::Value;

/// Coordinator owning one SQLite connection.
pub struct SqliteCoordinator {
    connection: Connection,
    released: usize,
}

impl SqliteCoordinator {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            released: 0,
        }
    }

    /// Open a database file.
    pub fn open(path: impl AsRef<Path>) -> JdbcResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening sqlite database");
        Ok(Self::new(Connection::open(path)?))
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> JdbcResult<Self> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Run a batch of `;` separated statements, e.g. DDL and fixtures.
    pub fn execute_batch(&self, sql: &str) -> JdbcResult<()> {
        self.connection.execute_batch(sql)?;
        Ok(())
    }

    /// Statements released so far.
    pub fn released_statements(&self) -> usize {
        self.released
    }
}

/// SQL plus bind values, executed on extraction.
#[derive(Debug, Clone)]
pub struct SqliteStatement {
    sql: String,
    scroll: ScrollMode,
    parameter_count: usize,
    binds: BTreeMap<usize, Value>,
    max_rows: Option<u32>,
    timeout: Option<u32>,
}

impl SqliteStatement {
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl PreparedStatement for SqliteStatement {
    fn bind(&mut self, position: usize, value: &Value) -> JdbcResult<()> {
        if position == 0 || position > self.parameter_count {
            return Err(JdbcError::ParameterIndex(position));
        }
        self.binds.insert(position, value.clone());
        Ok(())
    }

    fn register_out_parameter(&mut self, _position: usize, _sql_type: SqlTypeCode) -> JdbcResult<()> {
        Err(JdbcError::Unsupported("sqlite has no out parameters".into()))
    }

    fn set_max_rows(&mut self, max_rows: u32) -> JdbcResult<()> {
        self.max_rows = (max_rows > 0).then_some(max_rows);
        Ok(())
    }

    fn set_query_timeout(&mut self, seconds: u32) -> JdbcResult<()> {
        self.timeout = Some(seconds);
        Ok(())
    }

    fn set_fetch_size(&mut self, _rows: u32) -> JdbcResult<()> {
        // rows are always read in full
        Ok(())
    }
}

fn to_sqlite(value: &Value) -> JdbcResult<SqliteValue> {
    Ok(match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int(i) => SqliteValue::Integer(*i),
        Value::Float(f) => SqliteValue::Real(*f),
        Value::Text(s) => SqliteValue::Text(s.clone()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
        Value::Composite(_) => {
            return Err(JdbcError::Driver(format!("cannot bind composite value {value} to one parameter")))
        }
    })
}

fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

impl JdbcCoordinator for SqliteCoordinator {
    type Statement = SqliteStatement;

    fn prepare_statement(&mut self, sql: &str, kind: StatementKind, scroll: ScrollMode) -> JdbcResult<SqliteStatement> {
        if kind == StatementKind::Callable {
            return Err(JdbcError::Unsupported("sqlite has no callable statements".into()));
        }
        let statement = self.connection.prepare_cached(sql)?;
        let parameter_count = statement.parameter_count();
        trace!(sql, parameter_count, "prepared statement");
        Ok(SqliteStatement {
            sql: sql.to_string(),
            scroll,
            parameter_count,
            binds: BTreeMap::new(),
            max_rows: None,
            timeout: None,
        })
    }

    fn extract(&mut self, statement: &mut SqliteStatement) -> JdbcResult<Box<dyn ResultSet>> {
        if let Some(seconds) = statement.timeout {
            self.connection.busy_timeout(Duration::from_secs(u64::from(seconds)))?;
        }
        let mut prepared = self.connection.prepare_cached(&statement.sql)?;
        for (position, value) in &statement.binds {
            prepared.raw_bind_parameter(*position, to_sqlite(value)?)?;
        }
        let columns: Vec<String> = prepared.column_names().into_iter().map(String::from).collect();
        let limit = statement.max_rows.map(|max| max as usize);
        let mut rows = Vec::new();
        let mut cursor = prepared.raw_query();
        while let Some(row) = cursor.next()? {
            if limit.is_some_and(|max| rows.len() >= max) {
                break;
            }
            let values = (0..columns.len())
                .map(|i| row.get_ref(i).map(from_sqlite))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(values);
        }
        trace!(rows = rows.len(), "extracted result set");
        Ok(Box::new(MaterializedResultSet::new(columns, rows, statement.scroll)))
    }

    fn release(&mut self, statement: SqliteStatement) {
        trace!(sql = %statement.sql, "released statement");
        self.released += 1;
    }

    fn after_statement_execution(&mut self) {
        self.connection.flush_prepared_statement_cache();
    }
}

/// Result set holding every row in memory.
#[derive(Debug, Clone)]
pub struct MaterializedResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    scroll: ScrollMode,
    /// 1-based current row, 0 before the first row.
    position: usize,
}

impl MaterializedResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>, scroll: ScrollMode) -> Self {
        Self {
            columns,
            rows,
            scroll,
            position: 0,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

impl ResultSet for MaterializedResultSet {
    fn next(&mut self) -> JdbcResult<bool> {
        if self.position <= self.rows.len() {
            self.position += 1;
        }
        Ok(self.position <= self.rows.len())
    }

    fn absolute(&mut self, row: usize) -> JdbcResult<bool> {
        if self.scroll == ScrollMode::ForwardOnly {
            return Err(JdbcError::ForwardOnly);
        }
        self.position = row.min(self.rows.len() + 1);
        Ok(row >= 1 && row <= self.rows.len())
    }

    fn find_column(&self, label: &str) -> JdbcResult<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(label))
            .map(|i| i + 1)
            .ok_or_else(|| JdbcError::ColumnNotFound(label.to_string()))
    }

    fn get_value(&self, column: usize) -> JdbcResult<Value> {
        let row = self
            .position
            .checked_sub(1)
            .and_then(|i| self.rows.get(i))
            .ok_or(JdbcError::NoCurrentRow)?;
        column
            .checked_sub(1)
            .and_then(|i| row.get(i))
            .cloned()
            .ok_or(JdbcError::ColumnIndex(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> SqliteCoordinator {
        let coordinator = SqliteCoordinator::open_in_memory().unwrap();
        coordinator
            .execute_batch(
                "create table users (id integer primary key, name text);
                 insert into users values (1, 'ann'), (2, 'bob'), (3, 'cid');",
            )
            .unwrap();
        coordinator
    }

    #[test]
    fn test_prepare_bind_extract() {
        let mut coordinator = coordinator();
        let mut statement = coordinator
            .prepare_statement(
                "select id, name from users where id > ? order by id",
                StatementKind::Prepared,
                ScrollMode::ForwardOnly,
            )
            .unwrap();
        statement.bind(1, &Value::Int(1)).unwrap();
        assert!(matches!(statement.bind(2, &Value::Int(1)), Err(JdbcError::ParameterIndex(2))));
        statement.set_max_rows(1).unwrap();
        let mut rs = coordinator.extract(&mut statement).unwrap();
        assert!(rs.next().unwrap());
        assert_eq!(rs.get_by_label("NAME").unwrap(), Value::Text("bob".into()));
        assert!(!rs.next().unwrap());
        assert!(matches!(rs.absolute(1), Err(JdbcError::ForwardOnly)));
        coordinator.release(statement);
        assert_eq!(coordinator.released_statements(), 1);
    }

    #[test]
    fn test_scrollable_positioning() {
        let mut coordinator = coordinator();
        let mut statement = coordinator
            .prepare_statement(
                "select id from users order by id",
                StatementKind::Prepared,
                ScrollMode::ScrollInsensitive,
            )
            .unwrap();
        let mut rs = coordinator.extract(&mut statement).unwrap();
        assert!(rs.absolute(2).unwrap());
        assert!(rs.next().unwrap());
        assert_eq!(rs.get_value(1).unwrap(), Value::Int(3));
        assert!(matches!(rs.get_value(2), Err(JdbcError::ColumnIndex(2))));
    }

    #[test]
    fn test_bad_sql_and_callable() {
        let mut coordinator = coordinator();
        assert!(matches!(
            coordinator.prepare_statement("select nope from", StatementKind::Prepared, ScrollMode::ForwardOnly),
            Err(JdbcError::Sqlite(_))
        ));
        assert!(matches!(
            coordinator.prepare_statement("call p(?)", StatementKind::Callable, ScrollMode::ForwardOnly),
            Err(JdbcError::Unsupported(_))
        ));
    }
}
