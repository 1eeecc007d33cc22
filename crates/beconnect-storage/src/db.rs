//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access.
//! Configures WAL mode and recommended PRAGMAs on initialization and runs
//! the schema setup, so a schema mismatch is reported before the handle is
//! handed out.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, ErrorCode};
use tracing::info;

use beconnect_core::error::CacheError;

use crate::migrations;

/// Busy timeout used when none is configured.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Thread-safe SQLite database wrapper.
///
/// Every unit of work holds the mutex for its whole duration, so writes
/// serialize and readers never observe a half-applied transaction.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path.
    ///
    /// Configures WAL mode, synchronous=NORMAL and the busy timeout, then
    /// runs the schema setup and compatibility check.
    pub fn new(path: &Path, busy_timeout: Duration) -> Result<Self, CacheError> {
        // Ensure parent directory exists.
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| CacheError::IoFailure(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| CacheError::IoFailure(format!("Failed to set pragmas: {}", e)))?;
        conn.busy_timeout(busy_timeout)
            .map_err(|e| CacheError::IoFailure(format!("Failed to set busy timeout: {}", e)))?;

        info!("Database opened at {}", path.display());

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CacheError::IoFailure(format!("Failed to open in-memory db: {}", e)))?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, CacheError> {
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// The mutex is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, CacheError>
    where
        F: FnOnce(&Connection) -> Result<T, CacheError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CacheError::IoFailure(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Like [`Database::with_conn`], with mutable access for opening
    /// transactions.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, CacheError>
    where
        F: FnOnce(&mut Connection) -> Result<T, CacheError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| CacheError::IoFailure(format!("Database lock poisoned: {}", e)))?;
        f(&mut conn)
    }
}

/// Run `f` inside a transaction on `conn`.
///
/// Commits when `f` succeeds. On error or panic the transaction is dropped
/// uncommitted, which rolls it back.
pub fn in_transaction<F, T>(conn: &mut Connection, f: F) -> Result<T, CacheError>
where
    F: FnOnce(&Connection) -> Result<T, CacheError>,
{
    let tx = conn
        .transaction()
        .map_err(sqlite_error("Failed to begin transaction"))?;
    let value = f(&tx)?;
    tx.commit()
        .map_err(sqlite_error("Failed to commit transaction"))?;
    Ok(value)
}

/// Map a rusqlite error to a cache error with some context.
///
/// Interrupted statements are reported as cancellation; everything else is
/// a storage I/O failure.
pub fn sqlite_error(context: &'static str) -> impl Fn(rusqlite::Error) -> CacheError {
    move |e| match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::OperationInterrupted => {
            CacheError::Cancelled
        }
        _ => CacheError::IoFailure(format!("{}: {}", context, e)),
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}
