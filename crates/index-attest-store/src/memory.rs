//! In-memory implementation of the ChecksumRepository trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use index_attest_core::{
    find_gaps, ChecksumHash, ChecksumRecord, CoreError, Epoch, EpochRange, Gap,
};

use crate::error::Result;
use crate::traits::{ChecksumRepository, PublishOutcome};

/// In-memory checksum repository.
///
/// All data is lost when the repository is dropped. Thread-safe via RwLock.
pub struct MemoryChecksumRepo {
    chunk_size: u64,
    inner: RwLock<MemoryRepoInner>,
}

#[derive(Default)]
struct MemoryRepoInner {
    /// Records ordered by range.
    by_range: BTreeMap<EpochRange, ChecksumHash>,

    /// Reverse index: hash -> range.
    by_hash: HashMap<ChecksumHash, EpochRange>,
}

impl MemoryChecksumRepo {
    /// Create a new empty repository.
    pub fn new(chunk_size: u64) -> Result<Self> {
        if chunk_size == 0 {
            return Err(CoreError::ZeroChunkSize.into());
        }
        Ok(Self {
            chunk_size,
            inner: RwLock::new(MemoryRepoInner::default()),
        })
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_range
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ChecksumRepository for MemoryChecksumRepo {
    fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    async fn checksum_exists(&self, hash: &ChecksumHash) -> Result<bool> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.by_hash.contains_key(hash))
    }

    async fn get_checksum(&self, range: EpochRange) -> Result<Option<ChecksumHash>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.by_range.get(&range).copied())
    }

    async fn publish(&self, record: &ChecksumRecord) -> Result<PublishOutcome> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        let outcome = match inner.by_range.get(&record.range) {
            Some(prev) if *prev == record.hash => return Ok(PublishOutcome::Unchanged),
            Some(prev) => PublishOutcome::Replaced { previous: *prev },
            None => PublishOutcome::Inserted,
        };

        // Both keys are unique: drop whatever row holds either one.
        if let PublishOutcome::Replaced { previous } = outcome {
            inner.by_hash.remove(&previous);
        }
        if let Some(old_range) = inner.by_hash.remove(&record.hash) {
            inner.by_range.remove(&old_range);
        }

        inner.by_range.insert(record.range, record.hash);
        inner.by_hash.insert(record.hash, record.range);
        Ok(outcome)
    }

    async fn last_published_stop(&self) -> Result<Option<Epoch>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.by_range.keys().map(EpochRange::stop).max())
    }

    async fn find_gaps(&self, range: EpochRange) -> Result<Vec<Gap>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        // BTreeMap keys sort by start first.
        let starts = inner.by_range.keys().map(EpochRange::start);
        Ok(find_gaps(starts, self.chunk_size, range)?)
    }

    async fn records_in(&self, range: EpochRange) -> Result<Vec<ChecksumRecord>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .by_range
            .iter()
            .filter(|(r, _)| range.contains(r.start()))
            .map(|(r, h)| ChecksumRecord::new(*r, *h))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ChecksumRepositoryExt;

    fn range(start: u64, stop: u64) -> EpochRange {
        EpochRange::new(start, stop).unwrap()
    }

    fn record(start: u64, stop: u64, byte: u8) -> ChecksumRecord {
        ChecksumRecord::new(range(start, stop), ChecksumHash::from_bytes([byte; 32]))
    }

    #[tokio::test]
    async fn test_publish_and_replace() {
        let repo = MemoryChecksumRepo::new(10).unwrap();
        assert_eq!(repo.publish(&record(0, 9, 1)).await.unwrap(), PublishOutcome::Inserted);
        assert_eq!(repo.publish(&record(0, 9, 1)).await.unwrap(), PublishOutcome::Unchanged);

        let outcome = repo.publish(&record(0, 9, 2)).await.unwrap();
        assert_eq!(
            outcome,
            PublishOutcome::Replaced {
                previous: ChecksumHash::from_bytes([1; 32])
            }
        );
        assert!(!repo.checksum_exists(&ChecksumHash::from_bytes([1; 32])).await.unwrap());
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_hash_moves_to_latest_range() {
        let repo = MemoryChecksumRepo::new(10).unwrap();
        repo.publish(&record(0, 9, 7)).await.unwrap();
        repo.publish(&record(10, 19, 7)).await.unwrap();

        assert_eq!(repo.get_checksum(range(0, 9)).await.unwrap(), None);
        assert!(repo.get_checksum(range(10, 19)).await.unwrap().is_some());
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_gaps_and_next_chunk() {
        let repo = MemoryChecksumRepo::new(10).unwrap();
        assert!(repo.find_gaps(range(0, 100)).await.unwrap().is_empty());
        assert_eq!(repo.plan_next_chunk().await.unwrap(), range(0, 9));

        repo.publish(&record(0, 9, 1)).await.unwrap();
        repo.publish(&record(20, 29, 2)).await.unwrap();

        assert_eq!(repo.find_gaps(range(0, 29)).await.unwrap(), vec![Gap::new(10, 19)]);
        assert_eq!(repo.plan_next_chunk().await.unwrap(), range(30, 39));
    }

    #[tokio::test]
    async fn test_records_in_ordered_by_start() {
        let repo = MemoryChecksumRepo::new(10).unwrap();
        repo.publish(&record(20, 29, 3)).await.unwrap();
        repo.publish(&record(0, 9, 1)).await.unwrap();
        repo.publish(&record(10, 19, 2)).await.unwrap();

        let starts: Vec<u64> = repo
            .records_in(range(5, 25))
            .await
            .unwrap()
            .iter()
            .map(ChecksumRecord::start)
            .collect();
        assert_eq!(starts, vec![10, 20]);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(MemoryChecksumRepo::new(0).is_err());
    }
}
