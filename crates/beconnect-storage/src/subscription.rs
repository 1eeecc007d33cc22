//! Live snapshot subscriptions over the `alerts` table.
//!
//! Each subscriber owns a `watch` channel. After a committed write changes
//! the table, the store re-runs the snapshot query and pushes the result to
//! every registered channel. A subscriber that falls behind only ever sees
//! the latest snapshot.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use beconnect_core::types::AlertRecord;

/// Observer list held by the store.
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    next_id: AtomicU64,
    observers: Mutex<HashMap<u64, watch::Sender<Vec<AlertRecord>>>>,
}

impl ObserverRegistry {
    /// Register a new observer seeded with `initial`.
    pub(crate) fn register(&self, initial: Vec<AlertRecord>) -> (u64, watch::Receiver<Vec<AlertRecord>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(initial);
        match self.observers.lock() {
            Ok(mut observers) => {
                observers.insert(id, tx);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(id, tx);
            }
        }
        debug!(subscriber = id, "Subscriber registered");
        (id, rx)
    }

    pub(crate) fn unregister(&self, id: u64) {
        let removed = match self.observers.lock() {
            Ok(mut observers) => observers.remove(&id),
            Err(poisoned) => poisoned.into_inner().remove(&id),
        };
        if removed.is_some() {
            debug!(subscriber = id, "Subscriber removed");
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.observers
            .lock()
            .map(|observers| observers.is_empty())
            .unwrap_or(true)
    }

    pub(crate) fn len(&self) -> usize {
        self.observers
            .lock()
            .map(|observers| observers.len())
            .unwrap_or(0)
    }

    /// Push a snapshot to every observer, dropping those whose receiver is
    /// gone.
    pub(crate) fn publish(&self, snapshot: Vec<AlertRecord>) {
        let mut observers = match self.observers.lock() {
            Ok(observers) => observers,
            Err(_) => {
                warn!("Observer registry lock poisoned, snapshot not published");
                return;
            }
        };
        observers.retain(|id, tx| {
            let delivered = tx.send(snapshot.clone()).is_ok();
            if !delivered {
                debug!(subscriber = *id, "Dropping closed subscriber");
            }
            delivered
        });
    }
}

/// A live view of the most recent alerts.
///
/// Yields the snapshot taken at subscription time first, then a fresh
/// snapshot after every committed change to the table. Dropping the
/// subscription unsubscribes it. The stream ends when the store is dropped.
pub struct AlertSubscription {
    id: u64,
    registry: Weak<ObserverRegistry>,
    inner: WatchStream<Vec<AlertRecord>>,
}

impl AlertSubscription {
    pub(crate) fn new(
        id: u64,
        registry: &Arc<ObserverRegistry>,
        rx: watch::Receiver<Vec<AlertRecord>>,
    ) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
            inner: WatchStream::new(rx),
        }
    }

    /// Wait for the next snapshot. `None` once the store has gone away.
    pub async fn next_snapshot(&mut self) -> Option<Vec<AlertRecord>> {
        self.next().await
    }

    /// Stop receiving snapshots. Equivalent to dropping the subscription.
    pub fn unsubscribe(self) {}
}

impl Stream for AlertSubscription {
    type Item = Vec<AlertRecord>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

impl Drop for AlertSubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
    }
}

impl std::fmt::Debug for AlertSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertSubscription")
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(id: &str, fetched_at: i64) -> AlertRecord {
        AlertRecord {
            alert_id: id.to_string(),
            severity: "Minor".to_string(),
            headline: "Frost Advisory".to_string(),
            expires: fetched_at + 1,
            instructions: "Protect sensitive plants.".to_string(),
            source_url: "https://www.weather.gov".to_string(),
            verified: false,
            fetched_at,
        }
    }

    fn subscribe(registry: &Arc<ObserverRegistry>, initial: Vec<AlertRecord>) -> AlertSubscription {
        let (id, rx) = registry.register(initial);
        AlertSubscription::new(id, registry, rx)
    }

    #[tokio::test]
    async fn test_initial_snapshot_delivered_first() {
        let registry = Arc::new(ObserverRegistry::default());
        let mut sub = subscribe(&registry, vec![alert("a", 1)]);
        let first = sub.next_snapshot().await.unwrap();
        assert_eq!(first, vec![alert("a", 1)]);
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let registry = Arc::new(ObserverRegistry::default());
        let mut one = subscribe(&registry, Vec::new());
        let mut two = subscribe(&registry, Vec::new());
        assert!(one.next_snapshot().await.unwrap().is_empty());
        assert!(two.next_snapshot().await.unwrap().is_empty());

        registry.publish(vec![alert("b", 2)]);
        assert_eq!(one.next_snapshot().await.unwrap(), vec![alert("b", 2)]);
        assert_eq!(two.next_snapshot().await.unwrap(), vec![alert("b", 2)]);
    }

    #[tokio::test]
    async fn test_slow_subscriber_sees_latest_only() {
        let registry = Arc::new(ObserverRegistry::default());
        let mut sub = subscribe(&registry, Vec::new());
        sub.next_snapshot().await.unwrap();

        registry.publish(vec![alert("a", 1)]);
        registry.publish(vec![alert("b", 2), alert("a", 1)]);

        let latest = sub.next_snapshot().await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].alert_id, "b");
    }

    #[test]
    fn test_drop_unregisters() {
        let registry = Arc::new(ObserverRegistry::default());
        let one = subscribe(&registry, Vec::new());
        let two = subscribe(&registry, Vec::new());
        assert_eq!(registry.len(), 2);

        one.unsubscribe();
        assert_eq!(registry.len(), 1);
        drop(two);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_stream_ends_when_registry_dropped() {
        let registry = Arc::new(ObserverRegistry::default());
        let mut sub = subscribe(&registry, Vec::new());
        sub.next_snapshot().await.unwrap();
        drop(registry);
        assert!(sub.next_snapshot().await.is_none());
    }

    #[test]
    fn test_publish_prunes_closed_receivers() {
        let registry = ObserverRegistry::default();
        let (_id, rx) = registry.register(Vec::new());
        drop(rx);
        registry.publish(vec![alert("a", 1)]);
        assert!(registry.is_empty());
    }
}
