//! Error types for Index Attest Core.

use thiserror::Error;

/// Errors raised while constructing core values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid epoch range: start {start} is after stop {stop}")]
    InvalidRange { start: u64, stop: u64 },

    #[error("epoch {0} does not fit in a signed 64-bit integer")]
    EpochOverflow(u64),

    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("gap scan step must be greater than zero")]
    ZeroStep,

    #[error("malformed checksum hash: {0}")]
    MalformedHash(String),

    #[error("message at epoch {epoch} lies outside chunk {range}")]
    MessageOutOfRange { epoch: u64, range: String },

    #[error("messages not in canonical order at epoch {epoch}, cid {cid}")]
    UnorderedMessages { epoch: u64, cid: String },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
