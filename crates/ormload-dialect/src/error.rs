//! Dialect error types.

use thiserror::Error;

use crate::types::SqlTypeCode;

/// Errors raised by a dialect capability lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// No column type registered for the requested type code.
    #[error("no dialect mapping for SQL type {code:?}")]
    NoTypeMapping { code: SqlTypeCode },

    /// The dialect does not support the requested capability.
    #[error("{dialect} does not support {feature}")]
    Unsupported { dialect: String, feature: String },

    /// Unknown dialect name in configuration.
    #[error("unknown dialect: {0}")]
    UnknownDialect(String),

    /// A fragment could not be rendered from the given inputs.
    #[error("invalid fragment: {0}")]
    InvalidFragment(String),
}

impl Error {
    /// Create an unsupported-capability error.
    pub fn unsupported(dialect: impl Into<String>, feature: impl Into<String>) -> Self {
        Self::Unsupported {
            dialect: dialect.into(),
            feature: feature.into(),
        }
    }
}

/// Result alias for dialect operations.
pub type Result<T> = std::result::Result<T, Error>;
