//! # Index Attest Store
//!
//! SQLite access for index attestation: the read-only source message index,
//! isolated chunk hashing, and the checksum repository.
//!
//! ## Overview
//!
//! The repository is abstracted behind the [`ChecksumRepository`] trait so
//! the attestor does not care where records live. The primary implementation
//! is [`SqliteChecksumRepo`], with [`MemoryChecksumRepo`] for testing.
//!
//! ## Key Types
//!
//! - [`SourceIndex`] - Read-only view of the ingestor's `msgindex.db`
//! - [`Checksummer`] - Copies a chunk into a throwaway database and hashes it
//! - [`ChecksumRepository`] - The async trait for published checksums
//! - [`SqliteChecksumRepo`] - SQLite-based persistent repository
//! - [`MemoryChecksumRepo`] - In-memory repository for tests
//! - [`PublishOutcome`] - Result of publishing a checksum
//!
//! ## Usage
//!
//! ```rust,no_run
//! use index_attest_core::ChecksumRecord;
//! use index_attest_store::{
//!     ChecksumRepository, ChecksumRepositoryExt, Checksummer, SqliteChecksumRepo,
//! };
//!
//! async fn example() {
//!     let repo = SqliteChecksumRepo::open_in_dir("/var/lib/attest", 2880).unwrap();
//!     let checksummer = Checksummer::new("/var/lib/index/msgindex.db");
//!
//!     let range = repo.plan_next_chunk().await.unwrap();
//!     let digest = checksummer.checksum(range).await.unwrap();
//!     repo.publish(&ChecksumRecord::new(range, digest.hash)).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent publish**: Publishing the same record twice returns `Unchanged`
//! - **Last write wins**: A different hash for a range replaces the old one
//! - **Isolation**: Hashing never reads the live source index directly
//! - **Gap tracking**: Holes are reported per epoch (source) or per chunk (repository)

pub mod checksummer;
mod conn;
pub mod error;
pub mod memory;
pub mod migration;
pub mod msgindex;
pub mod source;
pub mod sqlite;
pub mod traits;

pub use checksummer::{ChunkDigest, Checksummer};
pub use error::{Result, StoreError};
pub use memory::MemoryChecksumRepo;
pub use msgindex::{create_schema, MSGINDEX_DB_NAME, MSGINDEX_VERSION};
pub use source::SourceIndex;
pub use sqlite::{SqliteChecksumRepo, REPO_DB_NAME};
pub use traits::{ChecksumRepository, ChecksumRepositoryExt, PublishOutcome};
