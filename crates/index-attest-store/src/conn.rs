//! Connection plumbing shared by the SQLite-backed types.

use std::sync::{Arc, Mutex};

use index_attest_core::Epoch;
use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// A connection shared between async callers.
pub(crate) type SharedConn = Arc<Mutex<Connection>>;

pub(crate) fn shared(conn: Connection) -> SharedConn {
    Arc::new(Mutex::new(conn))
}

/// Run `f` against the connection on the blocking thread pool.
pub(crate) async fn with_conn<F, T>(conn: &SharedConn, f: F) -> Result<T>
where
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let mut conn = conn.lock().map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                Some(format!("mutex poisoned: {}", e)),
            ))
        })?;
        f(&mut conn)
    })
    .await
    .map_err(|e| StoreError::Task(e.to_string()))?
}

/// Epochs are stored as SQLite INTEGER. `EpochRange` caps them at `i64::MAX`.
pub(crate) fn epoch_to_sql(epoch: Epoch) -> i64 {
    epoch as i64
}

pub(crate) fn epoch_from_sql(value: i64) -> Result<Epoch> {
    Epoch::try_from(value).map_err(|_| StoreError::InvalidData(format!("negative epoch {}", value)))
}
