//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::cell::Cell;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tempfile::TempDir;

use index_attest_core::{Epoch, MessageRecord};
use index_attest_store::{create_schema, SourceIndex, MSGINDEX_DB_NAME};

/// A message index on disk, standing in for the ingestor's `msgindex.db`.
///
/// The database lives in its own temporary directory, removed on drop. The
/// fixture keeps a writable connection so tests can keep ingesting while the
/// code under test reads.
pub struct SourceIndexFixture {
    dir: TempDir,
    conn: Connection,
    next_cid: Cell<u64>,
}

impl SourceIndexFixture {
    /// Create an empty index with the full schema.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create fixture dir");
        let conn = Connection::open(dir.path().join(MSGINDEX_DB_NAME)).expect("open fixture index");
        create_schema(&conn).expect("create fixture schema");
        Self {
            dir,
            conn,
            next_cid: Cell::new(0),
        }
    }

    /// Create an index holding one message per listed epoch.
    pub fn with_epochs(epochs: impl IntoIterator<Item = Epoch>) -> Self {
        let fixture = Self::new();
        fixture.insert_epochs(epochs);
        fixture
    }

    /// Directory holding `msgindex.db`.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `msgindex.db`.
    pub fn path(&self) -> PathBuf {
        self.dir.path().join(MSGINDEX_DB_NAME)
    }

    /// Open the index the way the service does.
    pub fn open(&self) -> SourceIndex {
        SourceIndex::open(self.path()).expect("open fixture as source index")
    }

    /// Insert one message. An existing row with the same cid is replaced.
    pub fn insert(&self, message: &MessageRecord) {
        self.conn
            .execute(
                "INSERT INTO messages (cid, tipset_cid, epoch) VALUES (?1, ?2, ?3)",
                params![message.cid, message.tipset_cid, message.epoch as i64],
            )
            .expect("insert fixture message");
    }

    /// Insert one fresh message per listed epoch, returning what was written.
    pub fn insert_epochs(&self, epochs: impl IntoIterator<Item = Epoch>) -> Vec<MessageRecord> {
        epochs
            .into_iter()
            .map(|epoch| {
                let message = self.next_message(epoch);
                self.insert(&message);
                message
            })
            .collect()
    }

    /// Delete every message at `epoch`.
    pub fn remove_epoch(&self, epoch: Epoch) {
        self.conn
            .execute("DELETE FROM messages WHERE epoch = ?1", params![epoch as i64])
            .expect("delete fixture epoch");
    }

    /// Every message in the index, in canonical order.
    pub fn messages(&self) -> Vec<MessageRecord> {
        let mut stmt = self
            .conn
            .prepare("SELECT cid, tipset_cid, epoch FROM messages ORDER BY epoch, cid")
            .expect("prepare fixture query");
        stmt.query_map([], |row| {
            Ok(MessageRecord::new(
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)? as Epoch,
            ))
        })
        .expect("query fixture messages")
        .collect::<rusqlite::Result<Vec<_>>>()
        .expect("read fixture messages")
    }

    fn next_message(&self, epoch: Epoch) -> MessageRecord {
        let n = self.next_cid.get();
        self.next_cid.set(n + 1);
        MessageRecord::new(
            format!("bafy2bzace{:08}", n),
            format!("bafy2bzacets{:08}", epoch),
            epoch,
        )
    }
}

impl Default for SourceIndexFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use index_attest_core::EpochRange;

    #[test]
    fn test_fixture_assigns_unique_cids() {
        let fixture = SourceIndexFixture::with_epochs([3, 3, 4]);
        fixture.insert_epochs([3]);
        let messages = fixture.messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages.iter().filter(|m| m.epoch == 3).count(), 3);
    }

    #[tokio::test]
    async fn test_fixture_is_readable_as_source() {
        let fixture = SourceIndexFixture::with_epochs(0..=4);
        fixture.remove_epoch(2);

        let index = fixture.open();
        let bounds = index.epoch_bounds().await.unwrap();
        assert_eq!(bounds, Some(EpochRange::new(0, 4).unwrap()));
        assert_eq!(index.messages_in(EpochRange::new(0, 4).unwrap()).await.unwrap(), fixture.messages());
    }
}
