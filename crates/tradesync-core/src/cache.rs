//! Cache invalidation seam and an in-memory query cache.
//!
//! The router only ever needs [`CacheInvalidator`]. [`QueryCache`] is the
//! in-process implementation used by the client binary; embedding
//! applications can plug in their own data layer instead.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default capacity of the staleness notification channel.
const DEFAULT_NOTIFY_CAPACITY: usize = 256;

/// Something that can mark cache resources stale.
///
/// Implementations must be idempotent: invalidating an already-stale key
/// has no additional effect.
pub trait CacheInvalidator: Send + Sync {
    /// Mark the resource stored under `key` as stale.
    fn invalidate(&self, key: &str);
}

impl<T: CacheInvalidator + ?Sized> CacheInvalidator for Arc<T> {
    fn invalidate(&self, key: &str) {
        (**self).invalidate(key);
    }
}

/// Result of reading a cache entry.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheRead {
    /// Fresh data is available.
    Data(Arc<Value>),
    /// No fresh data; a fetch is needed or in flight.
    Pending,
    /// The last fetch failed.
    Error(String),
}

#[derive(Debug, Clone)]
enum Entry {
    Fresh(Arc<Value>),
    Stale(Option<Arc<Value>>),
    Failed(String),
}

/// In-memory cache keyed by resource key.
///
/// Staleness transitions are broadcast to subscribers so that a refetch
/// driver (or a view layer) can react.
#[derive(Debug)]
pub struct QueryCache {
    entries: DashMap<String, Entry>,
    notify: broadcast::Sender<String>,
}

impl QueryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(DEFAULT_NOTIFY_CAPACITY);
        Self {
            entries: DashMap::new(),
            notify,
        }
    }

    /// Store fetched data for a key, making it fresh.
    pub fn put(&self, key: impl Into<String>, data: Value) {
        let key = key.into();
        trace!(key = %key, "Cache entry stored");
        self.entries.insert(key, Entry::Fresh(Arc::new(data)));
    }

    /// Record a failed fetch for a key.
    pub fn fail(&self, key: impl Into<String>, error: impl Into<String>) {
        self.entries.insert(key.into(), Entry::Failed(error.into()));
    }

    /// Read a key.
    ///
    /// Stale and missing entries read as [`CacheRead::Pending`].
    #[must_use]
    pub fn get(&self, key: &str) -> CacheRead {
        match self.entries.get(key).as_deref() {
            Some(Entry::Fresh(data)) => CacheRead::Data(Arc::clone(data)),
            Some(Entry::Failed(error)) => CacheRead::Error(error.clone()),
            Some(Entry::Stale(_)) | None => CacheRead::Pending,
        }
    }

    /// Last known data for a key, fresh or stale.
    #[must_use]
    pub fn last_known(&self, key: &str) -> Option<Arc<Value>> {
        match self.entries.get(key).as_deref() {
            Some(Entry::Fresh(data)) => Some(Arc::clone(data)),
            Some(Entry::Stale(data)) => data.clone(),
            _ => None,
        }
    }

    /// Mark a key stale.
    ///
    /// Returns `true` if the entry changed state. Already-stale entries are
    /// left untouched; keys never fetched are recorded as stale with no data.
    pub fn mark_stale(&self, key: &str) -> bool {
        match self.entries.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let next = match occupied.get() {
                    Entry::Fresh(data) => Entry::Stale(Some(Arc::clone(data))),
                    Entry::Failed(_) => Entry::Stale(None),
                    Entry::Stale(_) => {
                        trace!(key = %key, "Already stale");
                        return false;
                    }
                };
                occupied.insert(next);
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Entry::Stale(None));
            }
        }

        debug!(key = %key, "Cache entry marked stale");
        // No receivers is fine; nobody is refetching yet.
        let _ = self.notify.send(key.to_string());
        true
    }

    /// Check if a key is stale.
    #[must_use]
    pub fn is_stale(&self, key: &str) -> bool {
        matches!(self.entries.get(key).as_deref(), Some(Entry::Stale(_)))
    }

    /// All stale keys, sorted.
    #[must_use]
    pub fn stale_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| matches!(e.value(), Entry::Stale(_)))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Subscribe to staleness transitions.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.notify.subscribe()
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheInvalidator for QueryCache {
    fn invalidate(&self, key: &str) {
        self.mark_stale(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_states() {
        let cache = QueryCache::new();
        assert_eq!(cache.get("/api/jobs/active"), CacheRead::Pending);

        cache.put("/api/jobs/active", json!([{"id": 1}]));
        assert!(matches!(cache.get("/api/jobs/active"), CacheRead::Data(_)));

        cache.fail("/api/vehicles", "503");
        assert_eq!(cache.get("/api/vehicles"), CacheRead::Error("503".into()));
    }

    #[test]
    fn test_mark_stale_is_idempotent() {
        let cache = QueryCache::new();
        cache.put("/api/jobs/active", json!([]));
        let mut rx = cache.subscribe();

        assert!(cache.mark_stale("/api/jobs/active"));
        assert!(!cache.mark_stale("/api/jobs/active"));

        assert!(cache.is_stale("/api/jobs/active"));
        assert_eq!(cache.get("/api/jobs/active"), CacheRead::Pending);
        assert_eq!(cache.stale_keys(), vec!["/api/jobs/active".to_string()]);

        // One transition, one notification.
        assert_eq!(rx.try_recv().unwrap(), "/api/jobs/active");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stale_keeps_last_known_data() {
        let cache = QueryCache::new();
        cache.put("/api/payments/recent", json!([{"amount": 50}]));
        cache.invalidate("/api/payments/recent");

        let data = cache.last_known("/api/payments/recent").unwrap();
        assert_eq!(data[0]["amount"], 50);

        cache.put("/api/payments/recent", json!([]));
        assert!(!cache.is_stale("/api/payments/recent"));
    }

    #[test]
    fn test_invalidate_uncached_key() {
        let cache = QueryCache::new();
        assert!(cache.mark_stale("/api/metrics/summary"));
        assert!(!cache.mark_stale("/api/metrics/summary"));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("/api/metrics/summary"), CacheRead::Pending);
        assert!(cache.last_known("/api/metrics/summary").is_none());
    }

    #[test]
    fn test_invalidate_failed_entry() {
        let cache = QueryCache::new();
        cache.fail("/api/vehicles", "timeout");
        assert!(cache.mark_stale("/api/vehicles"));
        assert!(cache.is_stale("/api/vehicles"));
        assert!(cache.last_known("/api/vehicles").is_none());
    }

    #[test]
    fn test_invalidate_through_arc() {
        let cache = Arc::new(QueryCache::new());
        cache.put("/api/vehicles", json!([]));

        let invalidator: Arc<dyn CacheInvalidator> = cache.clone();
        invalidator.invalidate("/api/vehicles");
        assert!(cache.is_stale("/api/vehicles"));
    }
}
