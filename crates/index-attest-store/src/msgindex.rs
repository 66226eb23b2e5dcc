//! Schema of the source message index.
//!
//! The index is written by the chain node's ingestion process. This crate
//! only reads it, except when building an isolated copy of one chunk, which
//! must use the identical schema.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// File name of the message index inside its directory.
pub const MSGINDEX_DB_NAME: &str = "msgindex.db";

/// Schema version written to `_meta` by [`create_schema`].
pub const MSGINDEX_VERSION: u64 = 1;

/// Statements creating the message index schema. Idempotent.
pub const MSGINDEX_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS messages (
        cid VARCHAR(80) PRIMARY KEY ON CONFLICT REPLACE,
        tipset_cid VARCHAR(80) NOT NULL,
        epoch INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS tipset_cids ON messages (tipset_cid)",
    "CREATE INDEX IF NOT EXISTS tipset_epochs ON messages (epoch)",
    "CREATE TABLE IF NOT EXISTS _meta (
        version UINT64 NOT NULL UNIQUE
    )",
    "INSERT OR IGNORE INTO _meta (version) VALUES (1)",
];

/// Apply [`MSGINDEX_SCHEMA`] to `conn`.
pub fn create_schema(conn: &Connection) -> Result<()> {
    for stmt in MSGINDEX_SCHEMA {
        conn.execute(stmt, []).map_err(|e| {
            StoreError::Migration(format!("create msgindex schema (stmt: {}): {}", stmt, e))
        })?;
    }
    Ok(())
}

/// Check that `conn` has `table`.
pub(crate) fn require_table(conn: &Connection, path: &str, table: &str) -> Result<()> {
    let found: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [table],
        |row| row.get(0),
    )?;
    if found {
        Ok(())
    } else {
        Err(StoreError::MissingSchema {
            path: path.to_string(),
            table: table.to_string(),
        })
    }
}
