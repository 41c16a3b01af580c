//! Event router for tradesync.
//!
//! The router decodes raw frames, looks their kind up in the
//! [`RoutingTable`] and marks each associated target stale on the cache.
//! All invalidations for one frame are issued synchronously, in table order,
//! before the call returns.

use crate::cache::CacheInvalidator;
use crate::routing::{InvalidationTarget, RoutingTable};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};
use tradesync_protocol::{DecodeError, EventKind, FrameDecoder, InboundEvent};

/// Outcome of routing one decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The listed targets were invalidated, in order.
    Invalidated(&'static [InvalidationTarget]),
    /// The event kind has no routing entry.
    Ignored,
}

/// Outcome of handling one raw frame.
#[derive(Debug)]
pub enum FrameOutcome {
    /// Decoded and routed.
    Routed {
        /// Kind of the decoded event.
        kind: EventKind,
        /// Targets invalidated.
        targets: &'static [InvalidationTarget],
    },
    /// Decoded, but the tag has no routing entry.
    Unknown(String),
    /// The frame could not be decoded and was dropped.
    Malformed(DecodeError),
}

impl FrameOutcome {
    /// Number of invalidations issued for the frame.
    #[must_use]
    pub fn invalidation_count(&self) -> usize {
        match self {
            FrameOutcome::Routed { targets, .. } => targets.len(),
            _ => 0,
        }
    }
}

/// Routes inbound events to cache invalidations.
pub struct EventRouter<C> {
    table: RoutingTable,
    decoder: FrameDecoder,
    cache: C,
    frames: AtomicU64,
    routed: AtomicU64,
    unknown: AtomicU64,
    malformed: AtomicU64,
    invalidations: AtomicU64,
}

impl<C: CacheInvalidator> EventRouter<C> {
    /// Create a router with the default decoder.
    #[must_use]
    pub fn new(cache: C) -> Self {
        Self::with_decoder(cache, FrameDecoder::new())
    }

    /// Create a router with a custom decoder.
    #[must_use]
    pub fn with_decoder(cache: C, decoder: FrameDecoder) -> Self {
        Self {
            table: RoutingTable::new(),
            decoder,
            cache,
            frames: AtomicU64::new(0),
            routed: AtomicU64::new(0),
            unknown: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Route a decoded event.
    pub fn route(&self, event: &InboundEvent) -> RouteOutcome {
        let Some(targets) = self.table.lookup(&event.kind) else {
            debug!(event_type = %event.kind, "No route for event type, ignoring");
            self.unknown.fetch_add(1, Ordering::Relaxed);
            return RouteOutcome::Ignored;
        };

        for target in targets {
            debug!(event_type = %event.kind, target = %target, "Invalidating");
            self.cache.invalidate(target.resource_key());
        }

        self.routed.fetch_add(1, Ordering::Relaxed);
        self.invalidations
            .fetch_add(targets.len() as u64, Ordering::Relaxed);
        debug!(event_type = %event.kind, targets = targets.len(), "Event routed");

        RouteOutcome::Invalidated(targets)
    }

    /// Decode and route a raw frame.
    ///
    /// Malformed frames are logged and dropped; they never affect later frames.
    pub fn handle_frame(&self, data: &[u8]) -> FrameOutcome {
        self.frames.fetch_add(1, Ordering::Relaxed);

        let event = match self.decoder.decode(data) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, len = data.len(), "Dropping malformed frame");
                self.malformed.fetch_add(1, Ordering::Relaxed);
                return FrameOutcome::Malformed(e);
            }
        };

        match self.route(&event) {
            RouteOutcome::Invalidated(targets) => FrameOutcome::Routed {
                kind: event.kind,
                targets,
            },
            RouteOutcome::Ignored => FrameOutcome::Unknown(event.event_type().to_string()),
        }
    }

    /// Get router statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            frames: self.frames.load(Ordering::Relaxed),
            routed: self.routed.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Router statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    /// Raw frames handled.
    pub frames: u64,
    /// Events with a routing entry.
    pub routed: u64,
    /// Events with an unknown tag.
    pub unknown: u64,
    /// Frames dropped as malformed.
    pub malformed: u64,
    /// Total invalidations issued.
    pub invalidations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingCache {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingCache {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CacheInvalidator for RecordingCache {
        fn invalidate(&self, key: &str) {
            self.calls.lock().unwrap().push(key.to_string());
        }
    }

    fn router() -> (EventRouter<Arc<RecordingCache>>, Arc<RecordingCache>) {
        let cache = Arc::new(RecordingCache::default());
        (EventRouter::new(Arc::clone(&cache)), cache)
    }

    #[test]
    fn test_job_update_invalidates_active_jobs_once() {
        let (router, cache) = router();

        let outcome = router.handle_frame(br#"{"type":"job_update","payload":{}}"#);
        assert_eq!(outcome.invalidation_count(), 1);
        assert_eq!(cache.calls(), vec!["/api/jobs/active"]);
    }

    #[test]
    fn test_payment_received_invalidates_in_table_order() {
        let (router, cache) = router();

        router.handle_frame(br#"{"type":"payment_received","payload":{"amount":50}}"#);
        assert_eq!(
            cache.calls(),
            vec!["/api/payments/recent", "/api/metrics/summary"]
        );
    }

    #[test]
    fn test_every_known_kind_routes_exactly_its_targets() {
        let table = RoutingTable::new();

        for (kind, targets) in table.entries() {
            let (router, cache) = router();
            let frame = format!(r#"{{"type":"{}","payload":{{"id":"x"}}}}"#, kind);
            router.handle_frame(frame.as_bytes());

            let expected: Vec<&str> = targets.iter().map(|t| t.resource_key()).collect();
            assert_eq!(cache.calls(), expected, "wrong invalidations for {}", kind);
        }
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let (router, cache) = router();

        let outcome = router.handle_frame(br#"{"type":"estimate_signed","payload":{}}"#);
        assert!(matches!(outcome, FrameOutcome::Unknown(ref tag) if tag == "estimate_signed"));
        assert!(cache.calls().is_empty());
        assert_eq!(router.stats().unknown, 1);
    }

    #[test]
    fn test_malformed_frame_does_not_poison_router() {
        let (router, cache) = router();

        let outcome = router.handle_frame(b"not json");
        assert!(matches!(outcome, FrameOutcome::Malformed(_)));
        assert!(cache.calls().is_empty());

        router.handle_frame(br#"{"type":"vehicle_update","payload":{}}"#);
        assert_eq!(cache.calls(), vec!["/api/vehicles"]);

        let stats = router.stats();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.routed, 1);
    }

    #[test]
    fn test_frames_processed_in_arrival_order() {
        let (router, cache) = router();

        router.handle_frame(br#"{"type":"client_message","payload":{}}"#);
        router.handle_frame(br#"{"type":"expense_processed","payload":{}}"#);
        router.handle_frame(br#"{"type":"contractor_update","payload":{}}"#);

        assert_eq!(
            cache.calls(),
            vec![
                "/api/messages/threads",
                "/api/expenses/recent",
                "/api/contractors/active"
            ]
        );
        assert_eq!(router.stats().invalidations, 3);
    }

    #[test]
    fn test_repeated_frames_are_not_coalesced() {
        let (router, cache) = router();

        router.handle_frame(br#"{"type":"job_update","payload":{}}"#);
        router.handle_frame(br#"{"type":"job_update","payload":{}}"#);
        assert_eq!(cache.calls().len(), 2);
    }

    #[test]
    fn test_route_decoded_event() {
        let (router, _cache) = router();
        let event = InboundEvent::new(EventKind::PaymentReceived, serde_json::json!({}));

        match router.route(&event) {
            RouteOutcome::Invalidated(targets) => assert_eq!(targets.len(), 2),
            RouteOutcome::Ignored => panic!("payment_received should route"),
        }
    }

    #[test]
    fn test_duplicate_invalidation_is_idempotent_on_query_cache() {
        use crate::cache::QueryCache;

        let cache = Arc::new(QueryCache::new());
        cache.put("/api/jobs/active", serde_json::json!([]));
        let router = EventRouter::new(Arc::clone(&cache));
        let mut rx = cache.subscribe();

        router.handle_frame(br#"{"type":"job_update","payload":{}}"#);
        let once = cache.stale_keys();
        router.handle_frame(br#"{"type":"job_update","payload":{}}"#);

        assert_eq!(cache.stale_keys(), once);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
