//! Error types for deltasearch.
//!
//! The taxonomy distinguishes error kinds structurally, never by matching on
//! message text:
//! - `AlreadyExists` — absorbed with a log note by the idempotent creation
//!   call sites; surfaced only from lower layers
//! - `Conflict` — transient, safe to retry
//! - `NotReady` — index has not reached ONLINE
//! - `InvalidArgument` — caller misuse, fails fast
//! - `Timeout` — readiness polling exceeded its bound
//! - `Upstream` — oracle or storage failure, not locally recoverable
//!
//! # Error Handling Pattern
//! ```rust,ignore
//! use deltasearch::{Config, DeltaSearch, Result};
//!
//! fn example() -> Result<()> {
//!     let db = DeltaSearch::open("./delta.db", Config::default())?;
//!     // ... operations that may fail ...
//!     db.close()?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

use crate::types::IndexState;

/// Result type alias for deltasearch operations.
pub type Result<T> = std::result::Result<T, DeltaSearchError>;

/// Top-level error enum for all deltasearch operations.
///
/// This is the only error type returned by public APIs.
/// Use pattern matching to handle specific error cases.
#[derive(Debug, Error)]
pub enum DeltaSearchError {
    /// A resource with the given name already exists.
    ///
    /// The idempotent creation paths (`create_endpoint`, `create_index`)
    /// absorb this internally; it escapes only when a caller bypasses them.
    #[error("{resource} already exists: {name}")]
    AlreadyExists {
        /// Kind of resource ("endpoint", "index", "table").
        resource: &'static str,
        /// Name of the existing resource.
        name: String,
    },

    /// Transient resource conflict; the operation is safe to retry.
    #[error("Resource conflict (retryable): {0}")]
    Conflict(String),

    /// The index has not reached ONLINE and cannot serve queries.
    #[error("Index '{index}' is not ready: state is {state}")]
    NotReady {
        /// Full name of the index.
        index: String,
        /// State the index was observed in.
        state: IndexState,
    },

    /// Caller supplied a bad argument (e.g. `k == 0`, unknown table).
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// Why the argument is invalid.
        reason: String,
    },

    /// Readiness polling exceeded its attempt bound.
    #[error("Timed out after {attempts} attempts ({waited:?}) waiting for index to come online")]
    Timeout {
        /// Number of polling attempts made.
        attempts: u32,
        /// Total time spent waiting.
        waited: Duration,
    },

    /// Oracle or storage failure; surfaced to the caller unmodified.
    #[error("Upstream failure: {0}")]
    Upstream(#[from] UpstreamError),

    /// Input validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration error.
    #[error("Configuration error: {reason}")]
    Config {
        /// Description of what's wrong with the configuration.
        reason: String,
    },

    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeltaSearchError {
    /// Creates an already-exists error for the given resource kind and name.
    pub fn already_exists(resource: &'static str, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            resource,
            name: name.into(),
        }
    }

    /// Creates a transient conflict error.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Creates a not-ready error for the given index and observed state.
    pub fn not_ready(index: impl Into<String>, state: IndexState) -> Self {
        Self::NotReady {
            index: index.into(),
            state,
        }
    }

    /// Creates an invalid-argument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Creates a configuration error with the given reason.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Creates an upstream oracle error.
    pub fn oracle(msg: impl Into<String>) -> Self {
        Self::Upstream(UpstreamError::Oracle(msg.into()))
    }

    /// Creates an upstream index build/sync error.
    pub fn index_failed(msg: impl Into<String>) -> Self {
        Self::Upstream(UpstreamError::Index(msg.into()))
    }

    /// Returns true if the operation is safe to retry as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns true if this is an "already exists" error.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns true if this is a "not ready" error.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady { .. })
    }

    /// Returns true if this is an invalid-argument error.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// Returns true if this is a polling timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if this is an upstream (oracle/storage) failure.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }

    /// Returns true if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Failures of external collaborators: the embedding oracle and the storage
/// layer. Neither is locally recoverable; reconciliation happens on the next
/// sync cycle.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The embedding oracle failed to produce a vector.
    #[error("Embedding oracle failure: {0}")]
    Oracle(String),

    /// The storage layer failed.
    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),

    /// An index build or sync cycle failed; the message is retained from the
    /// original failure.
    #[error("Index build/sync failure: {0}")]
    Index(String),
}

/// Storage-related errors.
///
/// These errors indicate problems with the underlying storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database file or data is corrupted.
    #[error("Store corrupted: {0}")]
    Corrupted(String),

    /// Database is locked by another process.
    #[error("Store is locked by another writer")]
    DatabaseLocked,

    /// Transaction failed (commit, rollback, etc.).
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error from the redb storage engine.
    #[error("Storage engine error: {0}")]
    Redb(String),

    /// Store schema version doesn't match expected version.
    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version.
        expected: u32,
        /// Actual schema version found in the store.
        found: u32,
    },
}

impl StorageError {
    /// Creates a corruption error with the given message.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    /// Creates a transaction error with the given message.
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// Creates a serialization error with the given message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates a redb error with the given message.
    pub fn redb(msg: impl Into<String>) -> Self {
        Self::Redb(msg.into())
    }
}

// Conversions from redb error types
impl From<redb::Error> for StorageError {
    fn from(err: redb::Error) -> Self {
        StorageError::Redb(err.to_string())
    }
}

impl From<redb::DatabaseError> for StorageError {
    fn from(err: redb::DatabaseError) -> Self {
        StorageError::Redb(err.to_string())
    }
}

impl From<redb::TransactionError> for StorageError {
    fn from(err: redb::TransactionError) -> Self {
        StorageError::Transaction(err.to_string())
    }
}

impl From<redb::CommitError> for StorageError {
    fn from(err: redb::CommitError) -> Self {
        StorageError::Transaction(format!("Commit failed: {}", err))
    }
}

impl From<redb::TableError> for StorageError {
    fn from(err: redb::TableError) -> Self {
        StorageError::Redb(format!("Table error: {}", err))
    }
}

impl From<redb::StorageError> for StorageError {
    fn from(err: redb::StorageError) -> Self {
        StorageError::Redb(format!("Storage error: {}", err))
    }
}

// Convert bincode errors to StorageError
impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

// Storage errors are upstream failures at the top level
impl From<StorageError> for DeltaSearchError {
    fn from(err: StorageError) -> Self {
        DeltaSearchError::Upstream(UpstreamError::Storage(err))
    }
}

// Also allow direct conversion to DeltaSearchError for convenience
impl From<redb::Error> for DeltaSearchError {
    fn from(err: redb::Error) -> Self {
        StorageError::from(err).into()
    }
}

impl From<redb::DatabaseError> for DeltaSearchError {
    fn from(err: redb::DatabaseError) -> Self {
        StorageError::from(err).into()
    }
}

impl From<redb::TransactionError> for DeltaSearchError {
    fn from(err: redb::TransactionError) -> Self {
        StorageError::from(err).into()
    }
}

impl From<redb::CommitError> for DeltaSearchError {
    fn from(err: redb::CommitError) -> Self {
        StorageError::from(err).into()
    }
}

impl From<redb::TableError> for DeltaSearchError {
    fn from(err: redb::TableError) -> Self {
        StorageError::from(err).into()
    }
}

impl From<redb::StorageError> for DeltaSearchError {
    fn from(err: redb::StorageError) -> Self {
        StorageError::from(err).into()
    }
}

impl From<bincode::Error> for DeltaSearchError {
    fn from(err: bincode::Error) -> Self {
        StorageError::from(err).into()
    }
}

/// Validation errors for input data.
///
/// These errors indicate problems with data provided by the caller.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Embedding dimension doesn't match the oracle's configured dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected dimension from the oracle contract.
        expected: usize,
        /// Actual dimension provided.
        got: usize,
    },

    /// A field has an invalid value.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Name of the invalid field.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// A required field is missing or empty.
    #[error("Required field missing: {field}")]
    RequiredField {
        /// Name of the missing field.
        field: String,
    },
}

impl ValidationError {
    /// Creates a dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, got: usize) -> Self {
        Self::DimensionMismatch { expected, got }
    }

    /// Creates an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a required field error.
    pub fn required_field(field: impl Into<String>) -> Self {
        Self::RequiredField {
            field: field.into(),
        }
    }
}
