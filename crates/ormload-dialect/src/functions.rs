//! SQL function registry.
//!
//! The template renderer consults the registry to tell function names from
//! column references. The standard table is built once and shared; dialects
//! extend a clone of it with their own functions.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::types::SqlTypeCode;

/// A SQL function known to a dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFunction {
    pub name: String,
    /// Invoked without parentheses when it has no arguments
    /// (`current_timestamp` rather than `now()`).
    pub no_parens: bool,
    /// Fixed return type, if any.
    pub return_type: Option<SqlTypeCode>,
}

impl SqlFunction {
    pub fn standard(name: &str, return_type: Option<SqlTypeCode>) -> Self {
        Self {
            name: name.to_string(),
            no_parens: false,
            return_type,
        }
    }

    pub fn no_args(name: &str, return_type: SqlTypeCode) -> Self {
        Self {
            name: name.to_string(),
            no_parens: true,
            return_type: Some(return_type),
        }
    }
}

/// Immutable-after-construction function table keyed by lower-case name.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, SqlFunction>,
}

impl FunctionRegistry {
    /// The shared standard table.
    pub fn standard() -> &'static FunctionRegistry {
        static STANDARD: OnceLock<FunctionRegistry> = OnceLock::new();
        STANDARD.get_or_init(|| {
            use SqlTypeCode::*;
            FunctionRegistry::default()
                .with(SqlFunction::standard("count", Some(BigInt)))
                .with(SqlFunction::standard("avg", Some(Double)))
                .with(SqlFunction::standard("max", None))
                .with(SqlFunction::standard("min", None))
                .with(SqlFunction::standard("sum", None))
                .with(SqlFunction::standard("lower", Some(Varchar)))
                .with(SqlFunction::standard("upper", Some(Varchar)))
                .with(SqlFunction::standard("length", Some(Integer)))
                .with(SqlFunction::standard("trim", Some(Varchar)))
                .with(SqlFunction::standard("substring", Some(Varchar)))
                .with(SqlFunction::standard("concat", Some(Varchar)))
                .with(SqlFunction::standard("coalesce", None))
                .with(SqlFunction::standard("nullif", None))
                .with(SqlFunction::standard("abs", None))
                .with(SqlFunction::standard("mod", Some(Integer)))
                .with(SqlFunction::standard("sqrt", Some(Double)))
                .with(SqlFunction::no_args("current_date", Date))
                .with(SqlFunction::no_args("current_time", Time))
                .with(SqlFunction::no_args("current_timestamp", Timestamp))
        })
    }

    /// Add a function, replacing one with the same name.
    pub fn with(mut self, function: SqlFunction) -> Self {
        self.functions
            .insert(function.name.to_ascii_lowercase(), function);
        self
    }

    /// Look up a function by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&SqlFunction> {
        self.functions.get(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Whether `name` is a function written without parentheses.
    pub fn is_no_parens_function(&self, name: &str) -> bool {
        self.get(name).map(|f| f.no_parens).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
