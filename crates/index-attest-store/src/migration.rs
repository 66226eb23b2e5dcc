//! Checksum repository schema migrations.
//!
//! Each entry in [`MIGRATIONS`] moves the schema up one version. Applied
//! versions are recorded in `schema_migrations`, so opening a repository
//! only runs what it has not seen yet.

use rusqlite::{params, Connection};

use crate::error::{Result, StoreError};

/// One schema step.
struct Migration {
    version: u32,
    sql: &'static str,
}

/// Ordered by version, starting at 1 with no holes.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    // `IF NOT EXISTS` adopts repositories created before versions were tracked.
    // hash and (start, stop) are both unique; the later write wins either way.
    sql: r#"
        CREATE TABLE IF NOT EXISTS checksums (
            hash VARCHAR(66) PRIMARY KEY ON CONFLICT REPLACE,
            start INTEGER NOT NULL,
            stop INTEGER NOT NULL,
            UNIQUE (start, stop) ON CONFLICT REPLACE
        );
        CREATE INDEX IF NOT EXISTS checksum_hashes ON checksums (hash);
        CREATE INDEX IF NOT EXISTS checksum_starts ON checksums (start);
        CREATE INDEX IF NOT EXISTS checksum_stops ON checksums (stop);
    "#,
}];

/// Highest schema version this build understands.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Version recorded in `schema_migrations`, or 0 for a fresh database.
pub fn recorded_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}

/// Bring the repository schema up to [`latest_version`].
///
/// Safe to call on every open. A database written by a newer build is
/// refused rather than touched.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );",
    )?;

    let from = recorded_version(conn)?;
    let to = latest_version();
    if from > to {
        return Err(StoreError::Migration(format!(
            "repository schema is at version {} but this build only knows {}",
            from, to
        )));
    }

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > from).collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for step in pending {
        tx.execute_batch(step.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![step.version, unix_millis()],
        )?;
    }
    tx.commit()?;

    tracing::debug!(from, to, "checksum repository schema upgraded");
    Ok(())
}

fn unix_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}
