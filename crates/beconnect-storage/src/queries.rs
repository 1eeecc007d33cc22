//! Raw SQL operations on the `alerts` table.
//!
//! These run against a borrowed connection (or transaction) and perform no
//! locking or notification of their own; [`crate::store::AlertStore`] wraps
//! them in units of work.

use rusqlite::{Connection, OptionalExtension, Row};
use tracing::debug;

use beconnect_core::error::CacheError;
use beconnect_core::types::AlertRecord;

use crate::db::sqlite_error;

const SELECT_COLUMNS: &str =
    "alertId, severity, headline, expires, instructions, sourceUrl, verified, fetchedAt";

/// Insert a record, replacing any existing row with the same `alertId`.
///
/// The replacement is whole-row: no field of the previous record survives.
pub fn upsert_alert(conn: &Connection, record: &AlertRecord) -> Result<usize, CacheError> {
    conn.execute(
        "INSERT OR REPLACE INTO alerts (alertId, severity, headline, expires, instructions, sourceUrl, verified, fetchedAt)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            record.alert_id,
            record.severity,
            record.headline,
            record.expires,
            record.instructions,
            record.source_url,
            record.verified,
            record.fetched_at,
        ],
    )
    .map_err(sqlite_error("Failed to upsert alert"))
}

/// Point lookup by primary key.
pub fn get_alert(conn: &Connection, alert_id: &str) -> Result<Option<AlertRecord>, CacheError> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {} FROM alerts WHERE alertId = ?1",
            SELECT_COLUMNS
        ))
        .map_err(sqlite_error("Failed to prepare alert lookup"))?;

    stmt.query_row([alert_id], row_to_alert)
        .optional()
        .map_err(sqlite_error("Failed to look up alert"))
}

/// The `limit` most recently fetched alerts, newest first.
///
/// Ties on `fetchedAt` fall back to write order, most recent write first.
pub fn recent_alerts(conn: &Connection, limit: usize) -> Result<Vec<AlertRecord>, CacheError> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {} FROM alerts ORDER BY fetchedAt DESC, rowid DESC LIMIT ?1",
            SELECT_COLUMNS
        ))
        .map_err(sqlite_error("Failed to prepare snapshot query"))?;

    let rows = stmt
        .query_map([limit as i64], row_to_alert)
        .map_err(sqlite_error("Failed to query alerts"))?;

    let mut alerts = Vec::new();
    for row in rows {
        alerts.push(row.map_err(sqlite_error("Failed to read alert row"))?);
    }
    Ok(alerts)
}

pub fn count_alerts(conn: &Connection) -> Result<usize, CacheError> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))
        .map_err(sqlite_error("Failed to count alerts"))?;
    Ok(count as usize)
}

/// Delete every alert. Returns the number of rows removed.
pub fn delete_all_alerts(conn: &Connection) -> Result<usize, CacheError> {
    conn.execute("DELETE FROM alerts", [])
        .map_err(sqlite_error("Failed to clear alerts"))
}

/// Checkpoint the WAL and, when no transaction is open on `conn`, VACUUM.
pub fn compact(conn: &Connection) -> Result<(), CacheError> {
    let (busy, log_frames, checkpointed): (i64, i64, i64) = conn
        .query_row("PRAGMA wal_checkpoint(FULL)", [], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .map_err(sqlite_error("WAL checkpoint failed"))?;
    debug!(busy, log_frames, checkpointed, "WAL checkpoint finished");

    if conn.is_autocommit() {
        conn.execute_batch("VACUUM")
            .map_err(sqlite_error("VACUUM failed"))?;
    } else {
        debug!("Transaction open, skipping VACUUM");
    }
    Ok(())
}

fn row_to_alert(row: &Row<'_>) -> rusqlite::Result<AlertRecord> {
    Ok(AlertRecord {
        alert_id: row.get(0)?,
        severity: row.get(1)?,
        headline: row.get(2)?,
        expires: row.get(3)?,
        instructions: row.get(4)?,
        source_url: row.get(5)?,
        verified: row.get(6)?,
        fetched_at: row.get(7)?,
    })
}
