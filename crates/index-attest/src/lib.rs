//! # Index Attest
//!
//! Chunk-level checksum attestation over an epoch-ordered message index.
//!
//! ## Overview
//!
//! An external ingestor fills a SQLite message index (`msgindex.db`) epoch by
//! epoch. This crate partitions the epoch line into fixed-size chunks, hashes
//! each finalized chunk from an isolated copy of its rows, and publishes
//! `(start, stop, hash)` records to a checksum repository that third parties
//! can query to check their own copy of the index.
//!
//! ## Key Concepts
//!
//! - **Chunk**: `[start, stop]` with `stop - start + 1 == chunk_size`, tiling
//!   the epoch line from 0 with no gaps or overlaps.
//! - **Finalized**: The source head is past the chunk and no epoch inside it
//!   is missing, so its contents will not change.
//! - **Gap**: A hole bounded by data on both sides, reported per epoch for the
//!   source and per chunk for the repository.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use index_attest::{AttestConfig, Attestor, ChunkOutcome, ConfigOverrides};
//!
//! async fn example() {
//!     let config = AttestConfig::load(None, &ConfigOverrides::default()).unwrap();
//!     let attestor = Attestor::open(&config).unwrap();
//!
//!     match attestor.process_next_chunk().await.unwrap() {
//!         ChunkOutcome::Published { record, .. } => println!("{}", record),
//!         ChunkOutcome::NotReady { reason, .. } => println!("waiting: {:?}", reason),
//!     }
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `index_attest::core` - Ranges, gap scanning, chunk planning, digests
//! - `index_attest::store` - Source index, isolated hashing, repositories

pub mod api;
pub mod attestor;
pub mod config;
pub mod error;
pub mod rpc;
pub mod telemetry;

// Re-export component crates
pub use index_attest_core as core;
pub use index_attest_store as store;

// Re-export main types for convenience
pub use api::AttestationApi;
pub use attestor::{Attestor, ChunkOutcome, GapReport, NotReady, PipelineSettings};
pub use config::{AttestConfig, ConfigOverrides};
pub use error::{AttestError, Result};

pub use index_attest_core::{ChecksumHash, ChecksumRecord, Epoch, EpochRange, Gap};
pub use index_attest_store::{ChecksumRepository, PublishOutcome, SqliteChecksumRepo};
