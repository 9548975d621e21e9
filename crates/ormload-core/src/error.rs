//! Core error types.

use thiserror::Error;

use crate::jdbc::JdbcError;

/// Errors raised while building or executing a load.
#[derive(Debug, Error)]
pub enum Error {
    /// A malformed load plan or a bookkeeping invariant was violated.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// An argument did not satisfy the operation's contract.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// An any-type association was asked to take part in a SQL join.
    #[error("any-type association cannot be joined: {0}")]
    AnyTypeJoin(String),

    /// The fetch owner shape is not handled.
    #[error("not yet implemented: {0}")]
    NotYetImplemented(String),

    /// No entity persister registered under this name.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// No collection persister registered under this role.
    #[error("unknown collection role: {0}")]
    UnknownCollection(String),

    /// The entity has no such property.
    #[error("unknown property {property} on {entity}")]
    UnknownProperty { entity: String, property: String },

    /// More than one bag collection would be join fetched.
    #[error("cannot simultaneously fetch multiple bags: {roles:?}")]
    MultipleBagFetch { roles: Vec<String> },

    /// A load expected at most one entity and the rows held several.
    #[error("more than one row with the given identifier was found: {0}")]
    NonUniqueResult(String),

    /// Driver-level failure, propagated unchanged.
    #[error(transparent)]
    Jdbc(#[from] JdbcError),

    /// The dialect lacks a required capability.
    #[error("dialect error: {0}")]
    Dialect(#[from] ormload_dialect::Error),

    /// The mapping document could not be read or is inconsistent.
    #[error("mapping error: {0}")]
    Mapping(String),
}

impl Error {
    pub(crate) fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }

    pub(crate) fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument(message.into())
    }

    pub(crate) fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping(message.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Mapping(err.to_string())
    }
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
