//! Errors raised by the source index, checksummer and repositories.

use index_attest_core::CoreError;
use thiserror::Error;

/// Failure of a store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite rejected a statement or could not open a file.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A value failed core validation (range, chunk size, digest order).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A required table is missing from an existing database.
    #[error("missing schema in {path}: table {table} not found")]
    MissingSchema { path: String, table: String },

    /// A stored row could not be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The repository schema could not be brought up to date.
    #[error("migration error: {0}")]
    Migration(String),

    /// Filesystem failure outside SQLite.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking database task panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Task(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
