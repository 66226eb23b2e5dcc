//! Read-only access to the source message index.
//!
//! The index is owned by an external ingestion process that may be writing
//! while we read. Reads are not isolated from ingestion; callers only hash a
//! chunk once its range is known to be final.

use std::path::{Path, PathBuf};
use std::time::Duration;

use index_attest_core::{Epoch, EpochRange, Gap, GapScanner, MessageRecord};
use rusqlite::{params, Connection, OpenFlags};

use crate::conn::{epoch_from_sql, epoch_to_sql, shared, with_conn, SharedConn};
use crate::error::{Result, StoreError};
use crate::msgindex::{require_table, MSGINDEX_DB_NAME};

/// How long a read waits on the ingestor's write lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Distinct epochs inside `[?1, ?2]` plus the nearest epoch on either side.
const EPOCH_MARKERS: &str = "
    SELECT epoch FROM (SELECT MAX(epoch) AS epoch FROM messages WHERE epoch < ?1)
        WHERE epoch IS NOT NULL
    UNION
    SELECT epoch FROM messages WHERE epoch >= ?1 AND epoch <= ?2
    UNION
    SELECT epoch FROM (SELECT MIN(epoch) AS epoch FROM messages WHERE epoch > ?2)
        WHERE epoch IS NOT NULL
    ORDER BY 1";

/// The source message index, opened read-only.
pub struct SourceIndex {
    path: PathBuf,
    conn: SharedConn,
}

impl SourceIndex {
    /// Open the index at `path`.
    ///
    /// Fails if the file does not exist or lacks the `messages` or `_meta`
    /// tables. The index is never created here.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let shown = path.display().to_string();
        require_table(&conn, &shown, "messages")?;
        require_table(&conn, &shown, "_meta")?;

        tracing::debug!(path = %shown, "opened source message index");
        Ok(Self {
            path,
            conn: shared(conn),
        })
    }

    /// Open `msgindex.db` inside `dir`.
    pub fn open_dir(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open(dir.as_ref().join(MSGINDEX_DB_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Highest version recorded in `_meta`, if any.
    pub async fn schema_version(&self) -> Result<Option<u64>> {
        with_conn(&self.conn, |conn| {
            let version: Option<i64> =
                conn.query_row("SELECT MAX(version) FROM _meta", [], |row| row.get(0))?;
            version
                .map(|v| {
                    u64::try_from(v)
                        .map_err(|_| StoreError::InvalidData(format!("negative schema version {}", v)))
                })
                .transpose()
        })
        .await
    }

    /// Lowest and highest indexed epoch, `None` when the index is empty.
    pub async fn epoch_bounds(&self) -> Result<Option<EpochRange>> {
        with_conn(&self.conn, |conn| {
            let (min, max): (Option<i64>, Option<i64>) = conn.query_row(
                "SELECT MIN(epoch), MAX(epoch) FROM messages",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            match (min, max) {
                (Some(min), Some(max)) => Ok(Some(EpochRange::new(
                    epoch_from_sql(min)?,
                    epoch_from_sql(max)?,
                )?)),
                _ => Ok(None),
            }
        })
        .await
    }

    /// Highest indexed epoch.
    pub async fn head(&self) -> Result<Option<Epoch>> {
        Ok(self.epoch_bounds().await?.map(|bounds| bounds.stop()))
    }

    /// Messages in `range`, ordered by epoch then cid.
    pub async fn messages_in(&self, range: EpochRange) -> Result<Vec<MessageRecord>> {
        with_conn(&self.conn, move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT cid, tipset_cid, epoch FROM messages
                 WHERE epoch >= ?1 AND epoch <= ?2
                 ORDER BY epoch, cid",
            )?;
            let rows = stmt
                .query_map(
                    params![epoch_to_sql(range.start()), epoch_to_sql(range.stop())],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    },
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(cid, tipset_cid, epoch)| {
                    Ok(MessageRecord::new(cid, tipset_cid, epoch_from_sql(epoch)?))
                })
                .collect()
        })
        .await
    }

    /// Epochs in `range` with no indexed message, at single-epoch granularity.
    ///
    /// Only holes with indexed epochs on both sides are reported; an empty
    /// index yields no gaps.
    pub async fn find_gaps(&self, range: EpochRange) -> Result<Vec<Gap>> {
        let gaps = with_conn(&self.conn, move |conn| {
            let mut scanner = GapScanner::new(range, 1)?;
            let mut stmt = conn.prepare_cached(EPOCH_MARKERS)?;
            let mut rows =
                stmt.query(params![epoch_to_sql(range.start()), epoch_to_sql(range.stop())])?;
            while let Some(row) = rows.next()? {
                scanner.push(epoch_from_sql(row.get(0)?)?);
            }
            Ok(scanner.finish())
        })
        .await?;

        if gaps.is_empty() {
            tracing::debug!(start = range.start(), stop = range.stop(), "no source gaps");
        }
        Ok(gaps)
    }
}
