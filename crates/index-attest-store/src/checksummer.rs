//! Isolated chunk extraction and hashing.
//!
//! Each chunk is copied into a fresh, empty database with the message index
//! schema, inside its own temporary directory. The digest is computed over
//! that copy only, so it reflects exactly the chunk's rows no matter what the
//! ingestor does to the source outside the range meanwhile.
//!
//! The temporary directory and its database live only for one call and are
//! removed on every exit path, including errors.

use std::path::{Path, PathBuf};

use index_attest_core::{ChecksumHash, ChunkHasher, EpochRange, MessageRecord};
use rusqlite::{params, Connection, OpenFlags};
use tempfile::TempDir;

use crate::conn::{epoch_from_sql, epoch_to_sql};
use crate::error::{Result, StoreError};
use crate::msgindex::{create_schema, MSGINDEX_DB_NAME};

const COPY_CHUNK: &str = "INSERT INTO messages (cid, tipset_cid, epoch)
    SELECT cid, tipset_cid, epoch FROM src.messages WHERE epoch >= ?1 AND epoch <= ?2";

const CANONICAL_ROWS: &str = "SELECT cid, tipset_cid, epoch FROM messages ORDER BY epoch, cid";

/// The result of hashing one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDigest {
    pub range: EpochRange,
    pub hash: ChecksumHash,
    /// Number of messages covered by the hash.
    pub message_count: u64,
}

/// Computes chunk digests from a source message index file.
#[derive(Debug, Clone)]
pub struct Checksummer {
    source: PathBuf,
    temp_root: Option<PathBuf>,
}

impl Checksummer {
    /// Hash chunks of the message index at `source`.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            temp_root: None,
        }
    }

    /// Place isolated working sets under `dir` instead of the system temp dir.
    pub fn with_temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(dir.into());
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Copy `range` into an isolated working set and hash it.
    pub async fn checksum(&self, range: EpochRange) -> Result<ChunkDigest> {
        let source = self.source.clone();
        let temp_root = self.temp_root.clone();

        let digest = tokio::task::spawn_blocking(move || {
            isolate_and_hash(&source, temp_root.as_deref(), range)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?;

        match &digest {
            Ok(d) => tracing::debug!(
                start = range.start(),
                stop = range.stop(),
                messages = d.message_count,
                hash = %d.hash,
                "hashed chunk"
            ),
            Err(e) => tracing::error!(
                start = range.start(),
                stop = range.stop(),
                error = %e,
                "failed to hash chunk"
            ),
        }
        digest
    }
}

fn isolate_and_hash(source: &Path, temp_root: Option<&Path>, range: EpochRange) -> Result<ChunkDigest> {
    // ATTACH would silently create a missing source file.
    std::fs::metadata(source)?;
    let source = source.to_str().ok_or_else(|| {
        StoreError::InvalidData(format!("source path is not UTF-8: {}", source.display()))
    })?;

    // Dropped after `conn`, so the database is closed before its directory is removed.
    let workdir = temp_dir(temp_root)?;
    let conn = Connection::open_with_flags(
        workdir.path().join(MSGINDEX_DB_NAME),
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    create_schema(&conn)?;

    attach_source(&conn, source)?;
    let copied = conn.execute(
        COPY_CHUNK,
        params![epoch_to_sql(range.start()), epoch_to_sql(range.stop())],
    )?;
    conn.execute("DETACH DATABASE src", [])?;

    let mut hasher = ChunkHasher::new(range);
    {
        let mut stmt = conn.prepare(CANONICAL_ROWS)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let message = MessageRecord::new(
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                epoch_from_sql(row.get(2)?)?,
            );
            hasher.update(&message)?;
        }
    }

    let message_count = hasher.count();
    if message_count != copied as u64 {
        return Err(StoreError::InvalidData(format!(
            "isolated copy of {} holds {} messages, hashed {}",
            range, copied, message_count
        )));
    }

    let hash = hasher.finalize();
    conn.close().map_err(|(_, e)| StoreError::Database(e))?;
    workdir.close()?;

    Ok(ChunkDigest {
        range,
        hash,
        message_count,
    })
}

/// Attach the source index as `src`, read-only.
///
/// `conn` must have been opened with `SQLITE_OPEN_URI`.
fn attach_source(conn: &Connection, source: &str) -> Result<()> {
    conn.execute("ATTACH DATABASE ?1 AS src", [read_only_uri(source)])?;
    Ok(())
}

/// `file:` URI for `path` with `mode=ro`.
fn read_only_uri(path: &str) -> String {
    let mut uri = String::with_capacity(path.len() + 13);
    uri.push_str("file:");
    for c in path.chars() {
        match c {
            '%' => uri.push_str("%25"),
            '?' => uri.push_str("%3f"),
            '#' => uri.push_str("%23"),
            _ => uri.push(c),
        }
    }
    uri.push_str("?mode=ro");
    uri
}

fn temp_dir(root: Option<&Path>) -> Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("index-attest-chunk-");
    let dir = match root {
        Some(root) => builder.tempdir_in(root)?,
        None => builder.tempdir()?,
    };
    Ok(dir)
}
