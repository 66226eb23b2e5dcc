//! # Index Attest Core
//!
//! Pure primitives for chunk-level attestation of an epoch-ordered message
//! index.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over epoch intervals and message digests.
//!
//! ## Key Types
//!
//! - [`EpochRange`] - A closed, non-empty interval of epochs
//! - [`Gap`] - An interval of epochs missing from a data source
//! - [`ChecksumHash`] - The 32-byte digest of one chunk
//! - [`ChecksumRecord`] - A published `(range, hash)` attestation
//! - [`GapScanner`] - The interval-completeness scan shared by every data source
//! - [`ChunkHasher`] - Canonical, order-sensitive digest over a chunk's messages
//!
//! ## Gap Semantics
//!
//! A gap is a hole bounded by data on both sides. See [`gaps`] for how the
//! boundaries of a query are handled.

pub mod chunk;
pub mod digest;
pub mod error;
pub mod gaps;
pub mod types;

pub use chunk::{next_start_after, plan_chunk, DEFAULT_CHUNK_SIZE};
pub use digest::{ChunkHasher, MessageRecord, DIGEST_DOMAIN};
pub use error::{CoreError, Result};
pub use gaps::{find_gaps, GapScanner};
pub use types::{ChecksumHash, ChecksumRecord, Epoch, EpochRange, Gap, MAX_EPOCH};
