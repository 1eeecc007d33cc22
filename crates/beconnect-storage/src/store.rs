//! Async facade over the alert table.
//!
//! `AlertStore` is the only entry point collaborators use. Each operation is
//! one unit of work on tokio's blocking pool; writes run in their own
//! transaction and, once committed, refresh every live subscription.

use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use beconnect_core::config::{CacheConfig, StorageConfig};
use beconnect_core::error::CacheError;
use beconnect_core::types::AlertRecord;

use crate::db::{in_transaction, Database};
use crate::queries;
use crate::retention::{self, PruneResult};
use crate::subscription::{AlertSubscription, ObserverRegistry};

/// SQLite VM instructions between cancellation checks during a lookup.
const CANCEL_CHECK_INTERVAL: i32 = 1000;

/// Durable single-table alert store with capped retention and change
/// notification.
///
/// Cheap to clone; all clones share one connection and one observer list.
#[derive(Clone)]
pub struct AlertStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    db: Database,
    observers: Arc<ObserverRegistry>,
    retention: usize,
    compact_on_clear: bool,
}

impl AlertStore {
    /// Open the store at the database path described by `config`.
    ///
    /// Schema problems surface here as `SchemaMismatch`, before any
    /// operation is accepted.
    pub fn open(config: &CacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        let path = config.db_path();
        let db = Database::new(
            &path,
            Duration::from_millis(config.storage.busy_timeout_ms),
        )?;
        info!(
            path = %path.display(),
            retention = config.storage.retention_count,
            "Alert store opened"
        );
        Ok(Self::with_database(db, &config.storage))
    }

    /// Open the store at an explicit path with default storage settings.
    pub fn open_at(path: &Path) -> Result<Self, CacheError> {
        let storage = StorageConfig::default();
        let db = Database::new(path, Duration::from_millis(storage.busy_timeout_ms))?;
        Ok(Self::with_database(db, &storage))
    }

    /// In-memory store (for testing).
    pub fn in_memory() -> Result<Self, CacheError> {
        Ok(Self::with_database(
            Database::in_memory()?,
            &StorageConfig::default(),
        ))
    }

    pub fn with_database(db: Database, storage: &StorageConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                db,
                observers: Arc::new(ObserverRegistry::default()),
                retention: storage.retention_count,
                compact_on_clear: storage.compact_on_clear,
            }),
        }
    }

    /// Number of alerts a prune keeps and a snapshot shows.
    pub fn retention(&self) -> usize {
        self.inner.retention
    }

    /// Insert or fully replace the alert with `record.alert_id`.
    pub async fn upsert(&self, record: AlertRecord) -> Result<(), CacheError> {
        self.run_blocking("upsert", move |inner| {
            inner.write(|conn| {
                let changed = queries::upsert_alert(conn, &record)?;
                debug!(alert_id = %record.alert_id, "Alert upserted");
                Ok(((), changed))
            })
        })
        .await
    }

    /// Delete every alert outside the retention window.
    pub async fn prune(&self) -> Result<PruneResult, CacheError> {
        self.run_blocking("prune", |inner| {
            let keep = inner.retention;
            inner.write(|conn| {
                let result = retention::prune_alerts(conn, keep)?;
                Ok((result, result.records_deleted))
            })
        })
        .await
    }

    /// Subscribe to the live list of the most recent alerts.
    ///
    /// The snapshot and the registration happen under the connection lock,
    /// so no committed write can slip between them unseen.
    pub async fn subscribe_all(&self) -> Result<AlertSubscription, CacheError> {
        let (id, rx) = self
            .run_blocking("subscribe", |inner| {
                inner.db.with_conn(|conn| {
                    let snapshot = queries::recent_alerts(conn, inner.retention)?;
                    Ok(inner.observers.register(snapshot))
                })
            })
            .await?;
        Ok(AlertSubscription::new(id, &self.inner.observers, rx))
    }

    /// Point lookup. A miss is `Ok(None)`.
    pub async fn get_by_id(&self, alert_id: &str) -> Result<Option<AlertRecord>, CacheError> {
        self.get_by_id_with_cancel(alert_id, CancellationToken::new())
            .await
    }

    /// Point lookup that stops with `CacheError::Cancelled` once `cancel`
    /// fires.
    ///
    /// An in-flight scan is interrupted from inside SQLite, and the call
    /// only returns after the statement has been released.
    pub async fn get_by_id_with_cancel(
        &self,
        alert_id: &str,
        cancel: CancellationToken,
    ) -> Result<Option<AlertRecord>, CacheError> {
        if cancel.is_cancelled() {
            return Err(CacheError::Cancelled);
        }

        let alert_id = alert_id.to_string();
        let token = cancel.clone();
        let result = self
            .run_blocking("get_by_id", move |inner| {
                inner.db.with_conn(|conn| lookup_with_cancel(conn, &alert_id, token))
            })
            .await;

        if cancel.is_cancelled() {
            return Err(CacheError::Cancelled);
        }
        result
    }

    /// Delete every alert, then try to reclaim the freed space.
    ///
    /// Compaction failures are logged and do not fail the call once the
    /// delete has committed.
    pub async fn clear_all(&self) -> Result<(), CacheError> {
        self.run_blocking("clear_all", |inner| {
            let deleted = inner.write(|conn| {
                let deleted = queries::delete_all_alerts(conn)?;
                Ok((deleted, deleted))
            })?;
            info!(records_deleted = deleted, "Alert cache cleared");

            if inner.compact_on_clear {
                if let Err(e) = inner.db.with_conn(queries::compact) {
                    warn!(error = %e, "Compaction after clear failed");
                }
            }
            Ok(())
        })
        .await
    }

    /// Number of alerts currently stored.
    pub async fn count(&self) -> Result<usize, CacheError> {
        self.run_blocking("count", |inner| inner.db.with_conn(queries::count_alerts))
            .await
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.observers.len()
    }

    async fn run_blocking<F, T>(&self, op: &'static str, f: F) -> Result<T, CacheError>
    where
        F: FnOnce(&StoreInner) -> Result<T, CacheError> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| CacheError::Closed(format!("{} task failed: {}", op, e)))?
    }
}

impl StoreInner {
    /// Run a mutation in its own transaction.
    ///
    /// `f` returns its value plus the number of rows it changed. When rows
    /// changed, subscribers get a fresh snapshot after the commit, still
    /// under the connection lock so snapshots arrive in commit order.
    fn write<F, T>(&self, f: F) -> Result<T, CacheError>
    where
        F: FnOnce(&Connection) -> Result<(T, usize), CacheError>,
    {
        self.db.with_conn_mut(|conn| {
            let (value, changed) = in_transaction(conn, f)?;
            if changed > 0 {
                self.notify(conn);
            }
            Ok(value)
        })
    }

    fn notify(&self, conn: &Connection) {
        if self.observers.is_empty() {
            return;
        }
        match queries::recent_alerts(conn, self.retention) {
            Ok(snapshot) => self.observers.publish(snapshot),
            // The write is already committed; report and carry on.
            Err(e) => warn!(error = %e, "Failed to refresh alert snapshot"),
        }
    }
}

fn lookup_with_cancel(
    conn: &Connection,
    alert_id: &str,
    token: CancellationToken,
) -> Result<Option<AlertRecord>, CacheError> {
    if token.is_cancelled() {
        return Err(CacheError::Cancelled);
    }

    let handler_token = AssertUnwindSafe(token);
    conn.progress_handler(
        CANCEL_CHECK_INTERVAL,
        Some(move || handler_token.is_cancelled()),
    );
    let result = queries::get_alert(conn, alert_id);
    conn.progress_handler(0, None::<fn() -> bool>);
    result
}

impl std::fmt::Debug for AlertStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertStore")
            .field("retention", &self.inner.retention)
            .field("subscribers", &self.inner.observers.len())
            .finish()
    }
}
