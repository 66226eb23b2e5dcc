//! ChecksumRepository trait: the abstract interface for published attestations.
//!
//! Implementations include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use index_attest_core::{
    next_start_after, plan_chunk, ChecksumHash, ChecksumRecord, Epoch, EpochRange, Gap,
};

use crate::error::Result;

/// Result of publishing a checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// No record existed for the range.
    Inserted,
    /// The identical record already existed; nothing was written.
    Unchanged,
    /// A different hash was recorded for the range and has been replaced.
    Replaced {
        /// The hash that was overwritten.
        previous: ChecksumHash,
    },
}

/// The ChecksumRepository trait: async interface to `(range, hash)` records.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Two unique keys**: `hash` and `(start, stop)` are both unique, and a
///   publish that collides on either replaces the existing row.
/// - **Absent is not an error**: lookups return `Option`.
/// - **No cross-call transactions**: every method is one atomic unit.
#[async_trait]
pub trait ChecksumRepository: Send + Sync {
    /// Epochs per chunk; the step of [`find_gaps`](Self::find_gaps).
    fn chunk_size(&self) -> u64;

    /// True iff some record has `hash`.
    async fn checksum_exists(&self, hash: &ChecksumHash) -> Result<bool>;

    /// The hash recorded for exactly `range`.
    async fn get_checksum(&self, range: EpochRange) -> Result<Option<ChecksumHash>>;

    /// Insert or replace the record for `record.range`.
    ///
    /// Idempotent: publishing the same record twice returns `Unchanged`.
    async fn publish(&self, record: &ChecksumRecord) -> Result<PublishOutcome>;

    /// The highest published `stop`, `None` when the repository is empty.
    async fn last_published_stop(&self) -> Result<Option<Epoch>>;

    /// Chunk-sized holes in `range`, scanned with step [`chunk_size`](Self::chunk_size).
    async fn find_gaps(&self, range: EpochRange) -> Result<Vec<Gap>>;

    /// Records whose `start` lies in `range`, ordered by `start`.
    async fn records_in(&self, range: EpochRange) -> Result<Vec<ChecksumRecord>>;
}

/// Chunk planning on top of a repository.
pub trait ChecksumRepositoryExt: ChecksumRepository {
    /// `last_published_stop + 1`, or 0 for an empty repository.
    fn next_start(&self) -> impl std::future::Future<Output = Result<Epoch>> + Send;

    /// The chunk that follows the last published one.
    fn plan_next_chunk(&self) -> impl std::future::Future<Output = Result<EpochRange>> + Send;
}

impl<R: ChecksumRepository + ?Sized> ChecksumRepositoryExt for R {
    async fn next_start(&self) -> Result<Epoch> {
        Ok(next_start_after(self.last_published_stop().await?))
    }

    async fn plan_next_chunk(&self) -> Result<EpochRange> {
        let start = self.next_start().await?;
        Ok(plan_chunk(start, self.chunk_size())?)
    }
}
