//! SQLite implementation of the ChecksumRepository trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use index_attest_core::{
    ChecksumHash, ChecksumRecord, CoreError, Epoch, EpochRange, Gap, GapScanner,
};

use crate::conn::{epoch_from_sql, epoch_to_sql, shared, with_conn, SharedConn};
use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{ChecksumRepository, PublishOutcome};

/// File name of the repository inside its directory.
pub const REPO_DB_NAME: &str = "checksums.db";

/// How long a write waits on a concurrent reader's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Chunk starts inside `[?1, ?2]` plus the nearest start on either side.
const CHUNK_MARKERS: &str = "
    SELECT start FROM (SELECT MAX(start) AS start FROM checksums WHERE start < ?1)
        WHERE start IS NOT NULL
    UNION
    SELECT start FROM checksums WHERE start >= ?1 AND start <= ?2
    UNION
    SELECT start FROM (SELECT MIN(start) AS start FROM checksums WHERE start > ?2)
        WHERE start IS NOT NULL
    ORDER BY 1";

/// SQLite-based checksum repository.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteChecksumRepo {
    conn: SharedConn,
    chunk_size: u64,
    path: Option<PathBuf>,
    existed: bool,
}

impl SqliteChecksumRepo {
    /// Open the repository database at `path`.
    ///
    /// Creates the file (and its parent directory) and applies the schema if
    /// it doesn't exist.
    pub fn open(path: impl AsRef<Path>, chunk_size: u64) -> Result<Self> {
        check_chunk_size(chunk_size)?;
        let path = path.as_ref().to_path_buf();

        let existed = match std::fs::metadata(&path) {
            Ok(_) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(StoreError::Io(e)),
        };
        if !existed {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migration::migrate(&mut conn)?;

        tracing::info!(path = %path.display(), existed, chunk_size, "opened checksum repository");
        Ok(Self {
            conn: shared(conn),
            chunk_size,
            path: Some(path),
            existed,
        })
    }

    /// Open `checksums.db` inside `dir`.
    pub fn open_in_dir(dir: impl AsRef<Path>, chunk_size: u64) -> Result<Self> {
        Self::open(dir.as_ref().join(REPO_DB_NAME), chunk_size)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory(chunk_size: u64) -> Result<Self> {
        check_chunk_size(chunk_size)?;
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: shared(conn),
            chunk_size,
            path: None,
            existed: false,
        })
    }

    /// Whether the database file was present before this handle opened it.
    pub fn existed(&self) -> bool {
        self.existed
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Close the underlying connection, surfacing any error SQLite reports.
    ///
    /// If the connection is still shared by an in-flight operation it is
    /// released when that operation finishes instead.
    pub fn close(self) -> Result<()> {
        let Ok(mutex) = Arc::try_unwrap(self.conn) else {
            return Ok(());
        };
        let conn = mutex
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.close().map_err(|(_, e)| StoreError::Database(e))
    }
}

fn check_chunk_size(chunk_size: u64) -> Result<()> {
    if chunk_size == 0 {
        return Err(CoreError::ZeroChunkSize.into());
    }
    Ok(())
}

fn parse_hash(hex: &str) -> Result<ChecksumHash> {
    ChecksumHash::from_hex(hex)
        .map_err(|e| StoreError::InvalidData(format!("stored hash {:?}: {}", hex, e)))
}

fn row_to_record(hash: String, start: i64, stop: i64) -> Result<ChecksumRecord> {
    let range = EpochRange::new(epoch_from_sql(start)?, epoch_from_sql(stop)?)
        .map_err(|e| StoreError::InvalidData(format!("stored range: {}", e)))?;
    Ok(ChecksumRecord::new(range, parse_hash(&hash)?))
}

#[async_trait]
impl ChecksumRepository for SqliteChecksumRepo {
    fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    async fn checksum_exists(&self, hash: &ChecksumHash) -> Result<bool> {
        let hex = hash.to_hex();
        with_conn(&self.conn, move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM checksums WHERE hash = ?1)",
                params![hex],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    async fn get_checksum(&self, range: EpochRange) -> Result<Option<ChecksumHash>> {
        with_conn(&self.conn, move |conn| {
            let hex: Option<String> = conn
                .query_row(
                    "SELECT hash FROM checksums WHERE start = ?1 AND stop = ?2",
                    params![epoch_to_sql(range.start()), epoch_to_sql(range.stop())],
                    |row| row.get(0),
                )
                .optional()?;
            hex.as_deref().map(parse_hash).transpose()
        })
        .await
    }

    async fn publish(&self, record: &ChecksumRecord) -> Result<PublishOutcome> {
        let record = *record;
        let outcome = with_conn(&self.conn, move |conn| {
            let start = epoch_to_sql(record.start());
            let stop = epoch_to_sql(record.stop());
            let hex = record.hash.to_hex();

            let tx = conn.transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT hash FROM checksums WHERE start = ?1 AND stop = ?2",
                    params![start, stop],
                    |row| row.get(0),
                )
                .optional()?;

            let outcome = match existing {
                Some(prev) if prev == hex => return Ok(PublishOutcome::Unchanged),
                Some(prev) => PublishOutcome::Replaced {
                    previous: parse_hash(&prev)?,
                },
                None => PublishOutcome::Inserted,
            };

            let displaced: Option<(i64, i64)> = tx
                .query_row(
                    "SELECT start, stop FROM checksums WHERE hash = ?1",
                    params![hex],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            if let Some((old_start, old_stop)) = displaced {
                tracing::warn!(
                    hash = %record.hash,
                    old_start,
                    old_stop,
                    start = record.start(),
                    stop = record.stop(),
                    "hash moves to a different range"
                );
            }

            // Both unique keys resolve by REPLACE in the table definition.
            tx.execute(
                "INSERT INTO checksums (hash, start, stop) VALUES (?1, ?2, ?3)",
                params![hex, start, stop],
            )?;
            tx.commit()?;
            Ok(outcome)
        })
        .await?;

        match outcome {
            PublishOutcome::Replaced { previous } => tracing::warn!(
                start = record.start(),
                stop = record.stop(),
                previous = %previous,
                hash = %record.hash,
                "replaced checksum for range"
            ),
            _ => tracing::debug!(
                start = record.start(),
                stop = record.stop(),
                hash = %record.hash,
                ?outcome,
                "published checksum"
            ),
        }
        Ok(outcome)
    }

    async fn last_published_stop(&self) -> Result<Option<Epoch>> {
        with_conn(&self.conn, |conn| {
            let stop: Option<i64> =
                conn.query_row("SELECT MAX(stop) FROM checksums", [], |row| row.get(0))?;
            stop.map(epoch_from_sql).transpose()
        })
        .await
    }

    async fn find_gaps(&self, range: EpochRange) -> Result<Vec<Gap>> {
        let step = self.chunk_size;
        with_conn(&self.conn, move |conn| {
            let mut scanner = GapScanner::new(range, step)?;
            let mut stmt = conn.prepare_cached(CHUNK_MARKERS)?;
            let mut rows =
                stmt.query(params![epoch_to_sql(range.start()), epoch_to_sql(range.stop())])?;
            while let Some(row) = rows.next()? {
                scanner.push(epoch_from_sql(row.get(0)?)?);
            }
            Ok(scanner.finish())
        })
        .await
    }

    async fn records_in(&self, range: EpochRange) -> Result<Vec<ChecksumRecord>> {
        with_conn(&self.conn, move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT hash, start, stop FROM checksums
                 WHERE start >= ?1 AND start <= ?2
                 ORDER BY start, stop",
            )?;
            let rows = stmt
                .query_map(
                    params![epoch_to_sql(range.start()), epoch_to_sql(range.stop())],
                    |row| Ok((row.get::<_, String>(0)?, row.get(1)?, row.get(2)?)),
                )?
                .collect::<rusqlite::Result<Vec<(String, i64, i64)>>>()?;

            rows.into_iter()
                .map(|(hash, start, stop)| row_to_record(hash, start, stop))
                .collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ChecksumRepositoryExt;
    use tempfile::TempDir;

    fn range(start: u64, stop: u64) -> EpochRange {
        EpochRange::new(start, stop).unwrap()
    }

    fn hash(byte: u8) -> ChecksumHash {
        ChecksumHash::from_bytes([byte; 32])
    }

    fn record(start: u64, stop: u64, byte: u8) -> ChecksumRecord {
        ChecksumRecord::new(range(start, stop), hash(byte))
    }

    async fn row_count(repo: &SqliteChecksumRepo) -> i64 {
        with_conn(&repo.conn, |conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM checksums", [], |row| row.get(0))?)
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_publish_then_lookup() {
        let repo = SqliteChecksumRepo::open_memory(10).unwrap();
        let outcome = repo.publish(&record(0, 9, 0xaa)).await.unwrap();
        assert_eq!(outcome, PublishOutcome::Inserted);
        assert_eq!(repo.get_checksum(range(0, 9)).await.unwrap(), Some(hash(0xaa)));
    }

    #[tokio::test]
    async fn test_lookup_absent_is_not_error() {
        let repo = SqliteChecksumRepo::open_memory(10).unwrap();
        repo.publish(&record(0, 9, 0xaa)).await.unwrap();
        assert_eq!(repo.get_checksum(range(5, 8)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_publish_is_idempotent() {
        let repo = SqliteChecksumRepo::open_memory(10).unwrap();
        repo.publish(&record(0, 9, 0xaa)).await.unwrap();
        let again = repo.publish(&record(0, 9, 0xaa)).await.unwrap();
        assert_eq!(again, PublishOutcome::Unchanged);
        assert_eq!(row_count(&repo).await, 1);
    }

    #[tokio::test]
    async fn test_republish_replaces_hash() {
        let repo = SqliteChecksumRepo::open_memory(10).unwrap();
        repo.publish(&record(0, 9, 0xaa)).await.unwrap();
        let outcome = repo.publish(&record(0, 9, 0xbb)).await.unwrap();

        assert_eq!(outcome, PublishOutcome::Replaced { previous: hash(0xaa) });
        assert_eq!(repo.get_checksum(range(0, 9)).await.unwrap(), Some(hash(0xbb)));
        assert!(!repo.checksum_exists(&hash(0xaa)).await.unwrap());
        assert_eq!(row_count(&repo).await, 1);
    }

    #[tokio::test]
    async fn test_hash_moves_to_latest_range() {
        let repo = SqliteChecksumRepo::open_memory(10).unwrap();
        repo.publish(&record(0, 9, 0xaa)).await.unwrap();
        repo.publish(&record(10, 19, 0xaa)).await.unwrap();

        assert_eq!(repo.get_checksum(range(0, 9)).await.unwrap(), None);
        assert_eq!(repo.get_checksum(range(10, 19)).await.unwrap(), Some(hash(0xaa)));
        assert_eq!(row_count(&repo).await, 1);
    }

    #[tokio::test]
    async fn test_exists() {
        let repo = SqliteChecksumRepo::open_memory(10).unwrap();
        assert!(!repo.checksum_exists(&hash(0xaa)).await.unwrap());
        repo.publish(&record(0, 9, 0xaa)).await.unwrap();
        assert!(repo.checksum_exists(&hash(0xaa)).await.unwrap());
        assert!(!repo.checksum_exists(&hash(0xbb)).await.unwrap());
    }

    #[tokio::test]
    async fn test_next_start() {
        let repo = SqliteChecksumRepo::open_memory(10).unwrap();
        assert_eq!(repo.next_start().await.unwrap(), 0);
        assert_eq!(repo.plan_next_chunk().await.unwrap(), range(0, 9));

        repo.publish(&record(0, 9, 1)).await.unwrap();
        repo.publish(&record(10, 19, 2)).await.unwrap();
        assert_eq!(repo.next_start().await.unwrap(), 20);
        assert_eq!(repo.plan_next_chunk().await.unwrap(), range(20, 29));
    }

    #[tokio::test]
    async fn test_chunk_gaps() {
        let repo = SqliteChecksumRepo::open_memory(10).unwrap();
        repo.publish(&record(0, 9, 1)).await.unwrap();
        repo.publish(&record(20, 29, 2)).await.unwrap();

        assert_eq!(repo.find_gaps(range(0, 29)).await.unwrap(), vec![Gap::new(10, 19)]);
        assert_eq!(repo.find_gaps(range(15, 25)).await.unwrap(), vec![Gap::new(15, 19)]);
        assert!(repo.find_gaps(range(20, 29)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chunk_gap_straddling_query_edges() {
        let repo = SqliteChecksumRepo::open_memory(10).unwrap();
        repo.publish(&record(0, 9, 1)).await.unwrap();
        repo.publish(&record(40, 49, 2)).await.unwrap();

        // Neither query holds the chunk on the far side of the hole.
        assert_eq!(repo.find_gaps(range(0, 25)).await.unwrap(), vec![Gap::new(10, 25)]);
        assert_eq!(repo.find_gaps(range(15, 45)).await.unwrap(), vec![Gap::new(15, 39)]);
        assert_eq!(repo.find_gaps(range(12, 30)).await.unwrap(), vec![Gap::new(12, 30)]);
    }

    #[tokio::test]
    async fn test_empty_repository_reports_no_gaps() {
        let repo = SqliteChecksumRepo::open_memory(10).unwrap();
        assert!(repo.find_gaps(range(0, 1000)).await.unwrap().is_empty());
        assert_eq!(repo.last_published_stop().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_records_in() {
        let repo = SqliteChecksumRepo::open_memory(10).unwrap();
        for (i, start) in [20u64, 0, 10].into_iter().enumerate() {
            repo.publish(&record(start, start + 9, i as u8)).await.unwrap();
        }
        let starts: Vec<u64> = repo
            .records_in(range(0, 15))
            .await
            .unwrap()
            .iter()
            .map(|r| r.start())
            .collect();
        assert_eq!(starts, vec![0, 10]);
    }

    #[tokio::test]
    async fn test_zero_chunk_size_rejected() {
        assert!(matches!(
            SqliteChecksumRepo::open_memory(0),
            Err(StoreError::Core(CoreError::ZeroChunkSize))
        ));
    }

    #[tokio::test]
    async fn test_created_lazily_and_persists() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("repo");

        let repo = SqliteChecksumRepo::open_in_dir(&nested, 10).unwrap();
        assert!(!repo.existed());
        repo.publish(&record(0, 9, 0xaa)).await.unwrap();
        repo.close().unwrap();

        let reopened = SqliteChecksumRepo::open_in_dir(&nested, 10).unwrap();
        assert!(reopened.existed());
        assert_eq!(reopened.get_checksum(range(0, 9)).await.unwrap(), Some(hash(0xaa)));
        assert_eq!(reopened.next_start().await.unwrap(), 10);
    }
}
