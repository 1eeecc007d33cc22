//! BeConnect storage crate - SQLite-backed alert cache.
//!
//! Provides a WAL-mode SQLite database holding a single `alerts` table,
//! schema version checks, retention pruning, and an async [`AlertStore`]
//! whose subscribers receive a fresh snapshot after every committed change.

pub mod db;
pub mod migrations;
pub mod queries;
pub mod retention;
pub mod store;
pub mod subscription;

pub use db::Database;
pub use retention::PruneResult;
pub use store::AlertStore;
pub use subscription::AlertSubscription;
pub use tokio_util::sync::CancellationToken;
