//! Coalescing of backend change notifications.
//!
//! The backend posts one webhook per changed row. A bulk edit (clearing a
//! cart, restocking a catalog) therefore arrives as a burst. Each event is
//! reduced to the [`InvalidationKey`]s it makes stale and pushed onto an
//! [`InvalidationQueue`]. The queue collects keys for one debounce window
//! starting at the first key, then applies each distinct key exactly once.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use verdant_core::{CompanyId, UserId};

use super::catalog::ProductCache;
use super::dashboard::DashboardCache;

/// Something that went stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum InvalidationKey {
    /// One user's cart lines.
    Cart(UserId),
    /// One user's order list.
    Orders(UserId),
    /// The public product listing.
    Products,
    /// One company's dashboard.
    Company(CompanyId),
}

// =============================================================================
// Change events
// =============================================================================

/// Row operation reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A database webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub table: String,
    #[serde(default)]
    pub record: Option<serde_json::Value>,
    #[serde(default)]
    pub old_record: Option<serde_json::Value>,
}

impl ChangeEvent {
    /// The keys this change makes stale.
    ///
    /// Both the new and the old row are inspected so moving a row between
    /// owners invalidates both.
    #[must_use]
    pub fn keys(&self) -> Vec<InvalidationKey> {
        let rows = || self.record.iter().chain(self.old_record.iter());
        let mut keys = Vec::new();

        match self.table.as_str() {
            "cart_items" => {
                keys.extend(rows().filter_map(|r| id_field::<UserId>(r, "user_id")).map(InvalidationKey::Cart));
            }
            "orders" => {
                keys.extend(rows().filter_map(|r| id_field::<UserId>(r, "user_id")).map(InvalidationKey::Orders));
                for row in rows() {
                    let items = row.get("items").and_then(serde_json::Value::as_array);
                    keys.extend(
                        items
                            .into_iter()
                            .flatten()
                            .filter_map(|item| id_field::<CompanyId>(item, "company_id"))
                            .map(InvalidationKey::Company),
                    );
                }
            }
            "products" => {
                keys.push(InvalidationKey::Products);
                keys.extend(
                    rows()
                        .filter_map(|r| id_field::<CompanyId>(r, "company_id"))
                        .map(InvalidationKey::Company),
                );
            }
            "companies" => {
                keys.push(InvalidationKey::Products);
                keys.extend(rows().filter_map(|r| id_field::<CompanyId>(r, "id")).map(InvalidationKey::Company));
            }
            _ => {}
        }

        let mut seen = HashSet::new();
        keys.retain(|k| seen.insert(*k));
        keys
    }
}

fn id_field<T: std::str::FromStr>(row: &serde_json::Value, field: &str) -> Option<T> {
    row.get(field)?.as_str()?.parse().ok()
}

// =============================================================================
// Queue
// =============================================================================

/// Applies coalesced invalidations.
pub trait InvalidationSink: Send + Sync + 'static {
    fn apply(&self, key: InvalidationKey);
}

/// Handle for pushing keys onto the debounce loop.
#[derive(Debug, Clone)]
pub struct InvalidationQueue {
    tx: mpsc::UnboundedSender<InvalidationKey>,
}

impl InvalidationQueue {
    /// Start the debounce loop on the current runtime.
    ///
    /// The loop ends once every queue handle is dropped, after flushing what
    /// it holds.
    pub fn spawn<S: InvalidationSink>(sink: Arc<S>, window: Duration) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(rx, sink, window));
        (Self { tx }, handle)
    }

    /// Queue one key.
    pub fn push(&self, key: InvalidationKey) {
        if self.tx.send(key).is_err() {
            tracing::warn!(?key, "Invalidation loop has stopped; dropping key");
        }
    }

    /// Queue every key of a change event. Returns how many were queued.
    pub fn push_event(&self, event: &ChangeEvent) -> usize {
        let keys = event.keys();
        for key in &keys {
            self.push(*key);
        }
        keys.len()
    }
}

async fn run<S: InvalidationSink>(
    mut rx: mpsc::UnboundedReceiver<InvalidationKey>,
    sink: Arc<S>,
    window: Duration,
) {
    while let Some(first) = rx.recv().await {
        let mut pending = HashSet::from([first]);
        let mut received = 1usize;
        let deadline = Instant::now() + window;

        loop {
            tokio::select! {
                next = rx.recv() => match next {
                    Some(key) => {
                        pending.insert(key);
                        received += 1;
                    }
                    None => break,
                },
                () = tokio::time::sleep_until(deadline) => break,
            }
        }

        tracing::debug!(received, applied = pending.len(), "Applying coalesced invalidations");
        for key in pending {
            sink.apply(key);
        }
    }
    tracing::debug!("Invalidation loop stopped");
}

// =============================================================================
// Application sink
// =============================================================================

/// Per-key change counters clients poll to decide when to refetch.
#[derive(Debug, Default)]
pub struct ChangeRevisions {
    counters: Mutex<HashMap<InvalidationKey, u64>>,
}

impl ChangeRevisions {
    pub fn bump(&self, key: InvalidationKey) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        *counters.entry(key).or_insert(0) += 1;
    }

    /// Current revision of a key; 0 if it never changed.
    #[must_use]
    pub fn get(&self, key: InvalidationKey) -> u64 {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied()
            .unwrap_or(0)
    }
}

/// Drops stale cache entries and bumps revisions.
pub struct CacheInvalidator {
    products: ProductCache,
    dashboard: Arc<DashboardCache>,
    revisions: Arc<ChangeRevisions>,
}

impl CacheInvalidator {
    #[must_use]
    pub const fn new(
        products: ProductCache,
        dashboard: Arc<DashboardCache>,
        revisions: Arc<ChangeRevisions>,
    ) -> Self {
        Self {
            products,
            dashboard,
            revisions,
        }
    }
}

impl InvalidationSink for CacheInvalidator {
    fn apply(&self, key: InvalidationKey) {
        match key {
            InvalidationKey::Products => self.products.invalidate_all(),
            InvalidationKey::Company(company) => self.dashboard.invalidate(company),
            InvalidationKey::Cart(_) | InvalidationKey::Orders(_) => {}
        }
        self.revisions.bump(key);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        applied: Mutex<Vec<InvalidationKey>>,
    }

    impl InvalidationSink for RecordingSink {
        fn apply(&self, key: InvalidationKey) {
            self.applied.lock().unwrap().push(key);
        }
    }

    fn event(table: &str, record: serde_json::Value) -> ChangeEvent {
        serde_json::from_value(json!({
            "type": "UPDATE",
            "table": table,
            "schema": "public",
            "record": record,
            "old_record": null,
        }))
        .unwrap()
    }

    #[test]
    fn test_order_event_keys() {
        let user = UserId::random();
        let (a, b) = (CompanyId::random(), CompanyId::random());
        let e = event(
            "orders",
            json!({
                "user_id": user,
                "items": [{"company_id": a}, {"company_id": b}, {"company_id": a}],
            }),
        );
        let keys = e.keys();
        assert_eq!(
            keys,
            vec![
                InvalidationKey::Orders(user),
                InvalidationKey::Company(a),
                InvalidationKey::Company(b),
            ]
        );
    }

    #[test]
    fn test_product_delete_uses_old_record() {
        let company = CompanyId::random();
        let e: ChangeEvent = serde_json::from_value(json!({
            "type": "DELETE",
            "table": "products",
            "record": null,
            "old_record": {"id": "x", "company_id": company},
        }))
        .unwrap();
        assert_eq!(e.kind, ChangeKind::Delete);
        assert_eq!(
            e.keys(),
            vec![InvalidationKey::Products, InvalidationKey::Company(company)]
        );
    }

    #[test]
    fn test_unrelated_table_has_no_keys() {
        assert!(event("favorites", json!({"user_id": UserId::random()})).keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_apply_per_key() {
        let sink = Arc::new(RecordingSink::default());
        let (queue, _handle) = InvalidationQueue::spawn(sink.clone(), Duration::from_millis(500));
        let user = UserId::random();

        for _ in 0..20 {
            queue.push(InvalidationKey::Cart(user));
        }
        queue.push(InvalidationKey::Products);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(sink.applied.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(500)).await;
        let mut applied = sink.applied.lock().unwrap().clone();
        applied.sort_by_key(|k| matches!(k, InvalidationKey::Products));
        assert_eq!(applied, vec![InvalidationKey::Cart(user), InvalidationKey::Products]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_after_window_start_new_batch() {
        let sink = Arc::new(RecordingSink::default());
        let (queue, _handle) = InvalidationQueue::spawn(sink.clone(), Duration::from_millis(500));

        queue.push(InvalidationKey::Products);
        tokio::time::sleep(Duration::from_millis(600)).await;
        queue.push(InvalidationKey::Products);
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(sink.applied.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_queue_flushes_and_stops() {
        let sink = Arc::new(RecordingSink::default());
        let (queue, handle) = InvalidationQueue::spawn(sink.clone(), Duration::from_secs(60));

        queue.push(InvalidationKey::Products);
        drop(queue);
        handle.await.unwrap();

        assert_eq!(*sink.applied.lock().unwrap(), vec![InvalidationKey::Products]);
    }

    #[test]
    fn test_revisions() {
        let revisions = ChangeRevisions::default();
        let key = InvalidationKey::Cart(UserId::random());
        assert_eq!(revisions.get(key), 0);
        revisions.bump(key);
        revisions.bump(key);
        assert_eq!(revisions.get(key), 2);
    }
}
