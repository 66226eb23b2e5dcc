//! Error types for the attestation service.

use index_attest_core::CoreError;
use index_attest_store::StoreError;
use thiserror::Error;

/// Errors that can occur while attesting chunks or serving lookups.
#[derive(Debug, Error)]
pub enum AttestError {
    /// Invalid range, chunk size or hash.
    #[error("invalid input: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Configuration could not be read or merged.
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration was read but is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Socket or file I/O outside the stores.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for attestation operations.
pub type Result<T> = std::result::Result<T, AttestError>;
