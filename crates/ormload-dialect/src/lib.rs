//! SQL dialect capabilities for the ormload query layer.
//!
//! A [`Dialect`] is a single capability record per database. It supplies
//! column type names, LIMIT/OFFSET rewriting, lock clauses and hints,
//! outer-join and case fragment builders, callable result-set support and
//! identifier generation strings.
//!
//! # Example
//!
//! ```
//! use ormload_dialect::{Dialect, RowSelection};
//!
//! let dialect = Dialect::postgres();
//! let selection = RowSelection::page(20, 10);
//! let handler = dialect.build_limit_handler(Some(&selection));
//! let sql = handler.process_sql("select u.id from users u", Some(&selection));
//! assert_eq!(sql, "select u.id from users u limit ? offset ?");
//! ```

pub mod case;
pub mod dialect;
pub mod error;
pub mod functions;
pub mod join;
pub mod limit;
pub mod lock;
pub mod types;

pub use case::{CaseFragment, CaseStyle};
pub use dialect::{CallableResultSets, Dialect, IdentitySupport, DEFAULT_MAX_ALIAS_LENGTH};
pub use error::{Error, Result};
pub use functions::{FunctionRegistry, SqlFunction};
pub use join::{JoinFragment, JoinStyle, JoinType};
pub use limit::{LimitHandler, LimitStyle, RowSelection};
pub use lock::{LockMode, LockOptions, LockSyntax, LockTimeout, WaitStyle};
pub use types::{SqlTypeCode, TypeNames};
