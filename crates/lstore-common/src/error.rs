//! Error types for the L-Store record store
//!
//! Provides a unified error type hierarchy for the storage engine.

use thiserror::Error;

use crate::types::{Key, RecordId};

/// Result type alias using the store's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    // Storage Errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // Configuration Errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO Errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Internal Errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the error reports an absent or deleted key, or an unknown table
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Storage(StorageError::KeyNotFound(_) | StorageError::TableNotFound(_))
        )
    }

    /// True when an aggregate matched no live row
    #[must_use]
    pub fn is_no_match(&self) -> bool {
        matches!(self, Error::Storage(StorageError::NoMatch { .. }))
    }

    #[must_use]
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Error::Storage(StorageError::DuplicateKey(_)))
    }

    /// True when the error signals corrupted state. These must never be retried.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Storage(StorageError::CorruptData(_)))
    }
}

/// Storage-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Duplicate key: {0}")]
    DuplicateKey(Key),

    #[error("Key not found: {0}")]
    KeyNotFound(Key),

    #[error("No live record in key range [{start}, {end}]")]
    NoMatch { start: Key, end: Key },

    /// Raised by a full page. The table always recovers by opening a new page.
    #[error("Page capacity exceeded ({capacity} records)")]
    CapacityExceeded { capacity: usize },

    #[error("Column {column} out of range for table with {num_columns} columns")]
    ColumnOutOfRange { column: usize, num_columns: usize },

    #[error("Expected {expected} column values, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("Primary key {0} cannot be changed by an update")]
    PrimaryKeyImmutable(Key),

    #[error("Column {0} has no index")]
    IndexNotPresent(usize),

    #[error("Index on primary key column {0} cannot be dropped")]
    PrimaryIndexRequired(usize),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Corrupt data: {0}")]
    CorruptData(String),
}

impl StorageError {
    /// A rid the index or a chain knows about has no page directory entry
    #[must_use]
    pub fn missing_location(rid: RecordId) -> Self {
        StorageError::CorruptData(format!("rid {rid}: no page directory entry"))
    }

    /// The directory points at a slot that was never written or has been released
    #[must_use]
    pub fn missing_slot(rid: RecordId) -> Self {
        StorageError::CorruptData(format!("rid {rid}: unwritten or released slot"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
