use crate::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("BSON: {0}")]
    Bson(#[from] bson::error::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Collection not found: {0}")]
    NoSuchCollection(String),

    #[error("Collection already exists: {0}")]
    CollectionAlreadyExists(String),

    #[error("Document not found: {0}")]
    NoSuchDocument(String),

    #[error("Invalid field path `{path}`: {reason}")]
    InvalidFieldPath { path: String, reason: String },

    #[error("Invalid regex `{pattern}`: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Query error: {0}")]
    InvalidQuery(String),

    #[error("Unknown sort field: {0}")]
    UnknownSortField(String),

    #[error("cursor cancelled")]
    Cancelled,

    #[error("query timed out after {0} ms")]
    Timeout(u64),

    #[error("storage error ({context}): {source}")]
    Storage {
        context: String,
        #[source]
        source: StorageError,
    },
}

impl DbError {
    pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        Self::InvalidFieldPath { path: path.to_string(), reason: reason.into() }
    }

    /// Wraps a storage failure with the operation or filter it happened under.
    pub(crate) fn storage(context: impl Into<String>, source: StorageError) -> Self {
        Self::Storage { context: context.into(), source }
    }

    /// True for errors raised while a cursor was running rather than when it was built.
    #[must_use]
    pub const fn is_iteration_error(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout(_) | Self::Storage { .. })
    }
}
