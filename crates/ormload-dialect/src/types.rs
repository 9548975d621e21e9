//! SQL type codes and per-dialect column type names.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Generic SQL type codes (the JDBC `java.sql.Types` set the core cares about).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlTypeCode {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Double,
    Numeric,
    Decimal,
    Char,
    Varchar,
    LongVarchar,
    Date,
    Time,
    Timestamp,
    Binary,
    VarBinary,
    Blob,
    Clob,
    /// Driver-specific cursor type used for callable result sets.
    RefCursor,
}

/// Length/precision/scale used when no explicit size is mapped.
pub const DEFAULT_LENGTH: u64 = 255;
pub const DEFAULT_PRECISION: u32 = 19;
pub const DEFAULT_SCALE: u32 = 2;

/// Column type names for one dialect.
///
/// Each type code has an optional default name plus a set of names keyed by
/// maximum capacity. A lookup with a size picks the smallest registered
/// capacity that fits, falling back to the default. Templates may contain
/// `$l` (length), `$p` (precision) and `$s` (scale).
#[derive(Debug, Clone, Default)]
pub struct TypeNames {
    defaults: HashMap<SqlTypeCode, String>,
    weighted: HashMap<SqlTypeCode, BTreeMap<u64, String>>,
}

impl TypeNames {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the default name for a type code.
    pub fn put(&mut self, code: SqlTypeCode, name: impl Into<String>) {
        self.defaults.insert(code, name.into());
    }

    /// Register a name used for sizes up to `capacity`.
    pub fn put_sized(&mut self, code: SqlTypeCode, capacity: u64, name: impl Into<String>) {
        self.weighted
            .entry(code)
            .or_default()
            .insert(capacity, name.into());
    }

    /// Builder form of [`TypeNames::put`].
    pub fn with(mut self, code: SqlTypeCode, name: impl Into<String>) -> Self {
        self.put(code, name);
        self
    }

    /// Builder form of [`TypeNames::put_sized`].
    pub fn with_sized(mut self, code: SqlTypeCode, capacity: u64, name: impl Into<String>) -> Self {
        self.put_sized(code, capacity, name);
        self
    }

    /// Default type name, without size substitution.
    pub fn get_default(&self, code: SqlTypeCode) -> Result<&str> {
        self.defaults
            .get(&code)
            .map(String::as_str)
            .ok_or(Error::NoTypeMapping { code })
    }

    /// Type name for a column of the given size.
    pub fn get(&self, code: SqlTypeCode, length: u64, precision: u32, scale: u32) -> Result<String> {
        let template = self
            .weighted
            .get(&code)
            .and_then(|sized| sized.range(length..).next().map(|(_, name)| name.as_str()))
            .map(Ok)
            .unwrap_or_else(|| self.get_default(code))?;

        Ok(replace_placeholders(template, length, precision, scale))
    }

    /// Check whether any mapping exists for the type code.
    pub fn contains(&self, code: SqlTypeCode) -> bool {
        self.defaults.contains_key(&code) || self.weighted.contains_key(&code)
    }
}

fn replace_placeholders(template: &str, length: u64, precision: u32, scale: u32) -> String {
    template
        .replace("$l", &length.to_string())
        .replace("$s", &scale.to_string())
        .replace("$p", &precision.to_string())
}
