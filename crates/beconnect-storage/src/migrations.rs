//! Database schema setup and compatibility checks.
//!
//! Creates the `alerts` table and the `schema_migrations` metadata table,
//! and rejects databases written by a newer build or holding an `alerts`
//! table with a different layout.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use beconnect_core::error::CacheError;

/// Highest schema version this build understands.
pub const SCHEMA_VERSION: i64 = 1;

/// Expected `alerts` columns: (name, declared type, primary key).
const ALERT_COLUMNS: [(&str, &str, bool); 8] = [
    ("alertId", "TEXT", true),
    ("severity", "TEXT", false),
    ("headline", "TEXT", false),
    ("expires", "INTEGER", false),
    ("instructions", "TEXT", false),
    ("sourceUrl", "TEXT", false),
    ("verified", "INTEGER", false),
    ("fetchedAt", "INTEGER", false),
];

/// Run all pending database migrations and verify the resulting layout.
///
/// Fails with `SchemaMismatch` if the recorded version is newer than
/// [`SCHEMA_VERSION`] or the `alerts` table does not have the expected
/// columns.
pub fn run_migrations(conn: &Connection) -> Result<(), CacheError> {
    // Create the migrations tracking table first.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| CacheError::IoFailure(format!("Failed to create migrations table: {}", e)))?;

    let current_version = schema_version(conn)?;

    if current_version > SCHEMA_VERSION {
        return Err(CacheError::SchemaMismatch(format!(
            "database schema version {} is newer than supported version {}",
            current_version, SCHEMA_VERSION
        )));
    }

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: alerts_table");
    }

    verify_alerts_layout(conn)
}

/// Recorded schema version, 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<i64, CacheError> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| CacheError::IoFailure(format!("Failed to query migration version: {}", e)))
}

/// Version 1: the alerts table.
fn apply_v1(conn: &Connection) -> Result<(), CacheError> {
    // A pre-existing table must already match before we adopt it.
    if table_exists(conn, "alerts")? {
        verify_alerts_layout(conn)?;
    }

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS alerts (
            alertId         TEXT NOT NULL,
            severity        TEXT NOT NULL,
            headline        TEXT NOT NULL,
            expires         INTEGER NOT NULL,
            instructions    TEXT NOT NULL,
            sourceUrl       TEXT NOT NULL,
            verified        INTEGER NOT NULL,
            fetchedAt       INTEGER NOT NULL,
            PRIMARY KEY (alertId)
        );

        CREATE INDEX IF NOT EXISTS idx_alerts_fetched_at
            ON alerts (fetchedAt DESC);

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'alerts_table');
        ",
    )
    .map_err(|e| CacheError::IoFailure(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, CacheError> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(|e| CacheError::IoFailure(format!("Failed to inspect schema: {}", e)))
}

/// Compare the on-disk `alerts` columns against the expected layout.
fn verify_alerts_layout(conn: &Connection) -> Result<(), CacheError> {
    let mut stmt = conn
        .prepare("PRAGMA table_info(alerts)")
        .map_err(|e| CacheError::IoFailure(format!("Failed to inspect schema: {}", e)))?;

    let columns = stmt
        .query_map([], |row| {
            let name: String = row.get(1)?;
            let declared_type: String = row.get(2)?;
            let not_null: bool = row.get(3)?;
            let pk: i64 = row.get(5)?;
            Ok((name, declared_type, not_null, pk > 0))
        })
        .map_err(|e| CacheError::IoFailure(format!("Failed to inspect schema: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CacheError::IoFailure(format!("Failed to inspect schema: {}", e)))?;

    if columns.len() != ALERT_COLUMNS.len() {
        return Err(CacheError::SchemaMismatch(format!(
            "alerts table has {} columns, expected {}",
            columns.len(),
            ALERT_COLUMNS.len()
        )));
    }

    for (name, declared_type, pk) in ALERT_COLUMNS {
        let Some((_, found_type, not_null, found_pk)) =
            columns.iter().find(|(found, ..)| found == name)
        else {
            return Err(CacheError::SchemaMismatch(format!(
                "alerts table is missing column {}",
                name
            )));
        };

        if !found_type.eq_ignore_ascii_case(declared_type) || !*not_null || *found_pk != pk {
            return Err(CacheError::SchemaMismatch(format!(
                "alerts.{} is declared as {} (not null: {}, primary key: {}), expected {} NOT NULL",
                name, found_type, not_null, found_pk, declared_type
            )));
        }
    }

    Ok(())
}
