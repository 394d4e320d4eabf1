//! Schema migrations.
//!
//! `PRAGMA user_version` records how many entries of [`MIGRATIONS`] have
//! been applied. Each pending step runs in its own transaction together
//! with the version bump.

use rusqlite::Connection;

use crate::error::LedgerError;

/// Ordered schema steps; step `n` upgrades version `n` to `n + 1`.
const MIGRATIONS: &[&str] = &[
    // Every durable queue is one row holding its serialized snapshot
    r"
    CREATE TABLE IF NOT EXISTS kv_store (
        key TEXT PRIMARY KEY,
        value BLOB NOT NULL,
        updated_at TEXT NOT NULL
    );
    ",
];

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub const CURRENT_VERSION: i32 = MIGRATIONS.len() as i32;

/// Schema version of `conn`; 0 for a new database.
pub fn get_version(conn: &Connection) -> Result<i32, LedgerError> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| LedgerError::Database(format!("Failed to read schema version: {e}")))
}

/// Apply every pending migration.
pub fn run(conn: &mut Connection) -> Result<(), LedgerError> {
    let current = get_version(conn)?;
    if current > CURRENT_VERSION {
        return Err(LedgerError::Database(format!(
            "Database schema v{current} is newer than this build (v{CURRENT_VERSION})"
        )));
    }

    for (index, sql) in MIGRATIONS.iter().enumerate().skip(current.unsigned_abs() as usize) {
        let version = index + 1;
        let fail = |e: rusqlite::Error| {
            LedgerError::Database(format!("Migration v{version} failed: {e}"))
        };

        let tx = conn.transaction().map_err(fail)?;
        tx.execute_batch(sql).map_err(fail)?;
        tx.execute_batch(&format!("PRAGMA user_version = {version};"))
            .map_err(fail)?;
        tx.commit().map_err(fail)?;
        tracing::debug!(version, "schema migrated");
    }
    Ok(())
}
