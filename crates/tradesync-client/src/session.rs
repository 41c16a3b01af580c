//! Per-session resource bundle.
//!
//! A [`SyncSession`] owns the stream connection and the jitter timer. Both run
//! as tasks that watch one shutdown signal. [`SyncSession::shutdown`] signals
//! and joins them; dropping the session signals and aborts them.

use crate::metrics::{self, ConnectionMetricsGuard};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use tradesync_core::{
    CacheInvalidator, EventRouter, JitterConfig, JitterSimulator, MarkerBoard, MarkerId,
    MarkerSource, Position, RouterStats,
};
use tradesync_protocol::FrameDecoder;
use tradesync_transport::{
    Connection, ConnectionState, Connector, StateTracker, Transition, TransportError,
};

/// Cache handle shared by the router.
pub type SharedInvalidator = Arc<dyn CacheInvalidator>;

type SharedRouter = Arc<EventRouter<SharedInvalidator>>;

/// Settings for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Stream endpoint, e.g. `wss://app.example.com/ws`.
    pub endpoint: String,
    /// Frame decoder.
    pub decoder: FrameDecoder,
    /// Jitter simulator settings.
    pub jitter: JitterConfig,
    /// Fixed RNG seed for the simulator.
    pub rng_seed: Option<u64>,
}

/// Read-only view of a running session.
#[derive(Clone)]
pub struct SessionView {
    tracker: Arc<StateTracker>,
    board: Arc<MarkerBoard>,
    router: SharedRouter,
}

impl SessionView {
    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.tracker.current()
    }

    /// Whether the stream is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Snapshot of marker positions.
    #[must_use]
    pub fn markers(&self) -> BTreeMap<MarkerId, Position> {
        self.board.snapshot()
    }

    /// Router counters.
    #[must_use]
    pub fn router_stats(&self) -> RouterStats {
        self.router.stats()
    }
}

/// One connection plus one jitter timer, released together.
pub struct SyncSession {
    tracker: Arc<StateTracker>,
    board: Arc<MarkerBoard>,
    router: SharedRouter,
    shutdown: watch::Sender<bool>,
    connection_task: Option<JoinHandle<()>>,
    jitter_task: Option<JoinHandle<()>>,
}

impl SyncSession {
    /// Open the connection and start the jitter timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        cache: SharedInvalidator,
        markers: Arc<dyn MarkerSource>,
    ) -> Self {
        let tracker = Arc::new(StateTracker::new());
        let board = Arc::new(MarkerBoard::new());
        let router = Arc::new(EventRouter::with_decoder(cache, config.decoder));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let simulator = match config.rng_seed {
            Some(seed) => JitterSimulator::with_seed(config.jitter, Arc::clone(&board), seed),
            None => JitterSimulator::new(config.jitter, Arc::clone(&board)),
        };

        info!(
            endpoint = %config.endpoint,
            transport = connector.name(),
            "Starting sync session"
        );

        let connection_task = tokio::spawn(run_connection(
            config.endpoint,
            connector,
            Arc::clone(&router),
            Arc::clone(&tracker),
            shutdown_rx.clone(),
        ));
        let jitter_task = tokio::spawn(run_jitter(simulator, markers, shutdown_rx));

        Self {
            tracker,
            board,
            router,
            shutdown,
            connection_task: Some(connection_task),
            jitter_task: Some(jitter_task),
        }
    }

    /// Marker positions written by the simulator.
    #[must_use]
    pub fn board(&self) -> &Arc<MarkerBoard> {
        &self.board
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.tracker.current()
    }

    /// Whether the stream is open.
    ///
    /// Reflects the last transport callback; no probe is made.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.tracker.subscribe()
    }

    /// Router counters.
    #[must_use]
    pub fn router_stats(&self) -> RouterStats {
        self.router.stats()
    }

    /// A cloneable read-only view for the status surface.
    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView {
            tracker: Arc::clone(&self.tracker),
            board: Arc::clone(&self.board),
            router: Arc::clone(&self.router),
        }
    }

    /// Close the connection, stop the timer and wait for both to finish.
    ///
    /// Frames still queued when this is called are never routed.
    pub async fn shutdown(mut self) {
        self.shutdown.send_replace(true);

        let tasks = [self.connection_task.take(), self.jitter_task.take()];
        for task in tasks.into_iter().flatten() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(error = %e, "Session task panicked");
                }
            }
        }

        info!(state = %self.tracker.current(), "Sync session stopped");
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);

        let mut aborted = false;
        for task in [self.connection_task.take(), self.jitter_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
            aborted = true;
        }

        if aborted {
            debug!("Sync session dropped without shutdown, tasks aborted");
            if !self.tracker.current().is_terminal() {
                apply(&self.tracker, Transition::CloseRequested);
                apply(&self.tracker, Transition::CloseCompleted);
            }
        }
    }
}

fn apply(tracker: &StateTracker, transition: Transition) {
    if let Some(state) = tracker.apply(transition) {
        metrics::set_connection_state(state);
    }
}

enum Inbound {
    Shutdown,
    Frame(Result<Option<bytes::Bytes>, TransportError>),
}

async fn run_connection(
    endpoint: String,
    connector: Arc<dyn Connector>,
    router: SharedRouter,
    tracker: Arc<StateTracker>,
    mut shutdown: watch::Receiver<bool>,
) {
    metrics::set_connection_state(tracker.current());

    let connected = tokio::select! {
        biased;
        _ = shutdown.changed() => None,
        result = connector.connect(&endpoint) => Some(result),
    };

    let mut conn: Box<dyn Connection> = match connected {
        None => {
            debug!(endpoint = %endpoint, "Shutdown during handshake");
            apply(&tracker, Transition::CloseRequested);
            return;
        }
        Some(Err(e)) => {
            warn!(endpoint = %endpoint, error = %e, "Connection failed");
            metrics::record_transport_error(&e);
            apply(&tracker, Transition::HandshakeFailed);
            return;
        }
        Some(Ok(conn)) => conn,
    };

    apply(&tracker, Transition::HandshakeSucceeded);
    let _metrics_guard = ConnectionMetricsGuard::new();
    info!(connection = %conn.id(), endpoint = %endpoint, "Stream open");

    loop {
        let inbound = tokio::select! {
            biased;
            _ = shutdown.changed() => Inbound::Shutdown,
            frame = conn.recv() => Inbound::Frame(frame),
        };

        match inbound {
            Inbound::Shutdown => {
                apply(&tracker, Transition::CloseRequested);
                if let Err(e) = conn.close().await {
                    debug!(connection = %conn.id(), error = %e, "Close failed");
                }
                apply(&tracker, Transition::CloseCompleted);
                info!(connection = %conn.id(), "Stream closed");
                break;
            }
            Inbound::Frame(Ok(Some(data))) => {
                // The signal may have landed while the frame was in flight
                if *shutdown.borrow() {
                    continue;
                }
                let outcome = router.handle_frame(&data);
                metrics::record_outcome(&outcome);
            }
            Inbound::Frame(Ok(None)) => {
                info!(connection = %conn.id(), "Stream closed by server");
                apply(&tracker, Transition::RemoteClosed);
                break;
            }
            Inbound::Frame(Err(e)) => {
                warn!(connection = %conn.id(), error = %e, "Stream failed");
                metrics::record_transport_error(&e);
                apply(&tracker, Transition::TransportFailed);
                break;
            }
        }
    }
}

async fn run_jitter(
    mut simulator: JitterSimulator,
    markers: Arc<dyn MarkerSource>,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = simulator.config().interval.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let visible = markers.visible_markers();
                let updated = simulator.tick(&visible);
                metrics::record_jitter_tick();
                trace!(tick = simulator.ticks(), markers = updated, "Jitter tick");
            }
        }
    }

    debug!(ticks = simulator.ticks(), "Jitter timer stopped");
}
