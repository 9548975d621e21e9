//! Statement and result-set lifecycle.
//!
//! The loader talks to the database through a [`JdbcCoordinator`], which
//! prepares statements, extracts result sets and releases statements.
//! Releasing takes the statement by value, so it happens at most once.

mod sqlite;
mod wrapper;

pub use sqlite::{MaterializedResultSet, SqliteCoordinator, SqliteStatement};
pub use wrapper::{ColumnNameCache, ResultSetWrapper};

use ormload_dialect::SqlTypeCode;
use thiserror::Error;

use crate::value::Value;

/// Driver-level failures.
#[derive(Debug, Error)]
pub enum JdbcError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("no column labelled [{0}] in result set")]
    ColumnNotFound(String),

    #[error("column index {0} out of range")]
    ColumnIndex(usize),

    #[error("parameter index {0} out of range")]
    ParameterIndex(usize),

    #[error("result set is not positioned on a row")]
    NoCurrentRow,

    #[error("result set is forward only")]
    ForwardOnly,

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Driver(String),
}

/// Result alias for driver calls.
pub type JdbcResult<T> = std::result::Result<T, JdbcError>;

/// Cursor movement a result set must support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollMode {
    #[default]
    ForwardOnly,
    /// Absolute positioning, insensitive to concurrent changes.
    ScrollInsensitive,
}

/// Plain prepared statement or stored-procedure call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatementKind {
    #[default]
    Prepared,
    Callable,
}

/// A statement awaiting bind values. Positions are 1-based.
pub trait PreparedStatement {
    fn bind(&mut self, position: usize, value: &Value) -> JdbcResult<()>;

    /// Register the out parameter a callable statement returns its result
    /// set through.
    fn register_out_parameter(&mut self, position: usize, sql_type: SqlTypeCode) -> JdbcResult<()>;

    fn set_max_rows(&mut self, max_rows: u32) -> JdbcResult<()>;

    /// Timeout in seconds.
    fn set_query_timeout(&mut self, seconds: u32) -> JdbcResult<()>;

    fn set_fetch_size(&mut self, rows: u32) -> JdbcResult<()>;
}

/// Rows produced by an executed statement. Column indexes are 1-based.
pub trait ResultSet {
    /// Advance to the next row.
    fn next(&mut self) -> JdbcResult<bool>;

    /// Move to the given 1-based row. Only scrollable result sets support
    /// this.
    fn absolute(&mut self, row: usize) -> JdbcResult<bool>;

    /// Index of the column with this label.
    fn find_column(&self, label: &str) -> JdbcResult<usize>;

    /// Value of a column on the current row.
    fn get_value(&self, column: usize) -> JdbcResult<Value>;

    /// Value of a column found by label.
    fn get_by_label(&self, label: &str) -> JdbcResult<Value> {
        let column = self.find_column(label)?;
        self.get_value(column)
    }
}

/// Owner of statement resources for one session.
pub trait JdbcCoordinator {
    type Statement: PreparedStatement;

    fn prepare_statement(
        &mut self,
        sql: &str,
        kind: StatementKind,
        scroll: ScrollMode,
    ) -> JdbcResult<Self::Statement>;

    /// Execute the statement and return its rows.
    fn extract(&mut self, statement: &mut Self::Statement) -> JdbcResult<Box<dyn ResultSet>>;

    /// Release a statement and anything it holds.
    fn release(&mut self, statement: Self::Statement);

    /// Called once the statement of a failed execution has been released.
    fn after_statement_execution(&mut self);
}
