//! Retention enforcement for the alert cache.
//!
//! The cap is applied only when a prune runs; between prunes the table may
//! hold more rows than the retention count.

use rusqlite::Connection;
use tracing::info;

use beconnect_core::error::CacheError;

use crate::db::sqlite_error;
use crate::queries::count_alerts;

/// Result of a prune operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneResult {
    /// Number of alerts deleted.
    pub records_deleted: usize,
    /// Number of alerts left in the table.
    pub records_retained: usize,
}

/// Delete every alert outside the `keep` most recently fetched ones.
///
/// The selection and the delete are a single statement, so run inside a
/// transaction they see the same table state. Ordering matches
/// [`crate::queries::recent_alerts`], so survivors are exactly what a
/// snapshot shows.
pub fn prune_alerts(conn: &Connection, keep: usize) -> Result<PruneResult, CacheError> {
    let records_deleted = conn
        .execute(
            "DELETE FROM alerts WHERE alertId NOT IN (
                SELECT alertId FROM alerts ORDER BY fetchedAt DESC, rowid DESC LIMIT ?1
             )",
            rusqlite::params![keep as i64],
        )
        .map_err(sqlite_error("Prune failed"))?;

    let records_retained = count_alerts(conn)?;

    info!(
        records_deleted = records_deleted,
        records_retained = records_retained,
        keep = keep,
        "Prune completed"
    );

    Ok(PruneResult {
        records_deleted,
        records_retained,
    })
}
