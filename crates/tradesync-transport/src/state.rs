//! Connection lifecycle state machine.
//!
//! ```text
//!  Connecting ──handshake ok──▶ Open ──remote close──▶ Closed
//!      │                         │ │
//!      │ handshake failed        │ └──close requested──▶ Closing ──▶ Closed
//!      ▼                         ▼
//!   Errored ◀──transport error───┘
//! ```
//!
//! `Closed` and `Errored` are terminal. Nothing returns to `Connecting`; a new
//! connection needs a new session.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting,
    /// Handshake completed; frames are being delivered.
    Open,
    /// Local close in progress.
    Closing,
    /// Closed locally or remotely.
    Closed,
    /// Failed with a transport error.
    Errored,
}

impl ConnectionState {
    /// Apply a transport callback.
    ///
    /// Returns `None` if the transition is not valid from this state.
    #[must_use]
    pub fn apply(self, transition: Transition) -> Option<ConnectionState> {
        use ConnectionState::*;
        use Transition::*;

        match (self, transition) {
            (Connecting, HandshakeSucceeded) => Some(Open),
            (Connecting, HandshakeFailed) => Some(Errored),
            (Connecting, CloseRequested) => Some(Closed),
            (Open, RemoteClosed) => Some(Closed),
            (Open, TransportFailed) => Some(Errored),
            (Open, CloseRequested) => Some(Closing),
            (Closing, CloseCompleted | RemoteClosed | TransportFailed) => Some(Closed),
            _ => None,
        }
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Errored)
    }

    /// Whether frames are being delivered.
    #[must_use]
    pub fn is_open(self) -> bool {
        self == ConnectionState::Open
    }

    /// Lowercase name of the state.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
            ConnectionState::Errored => "errored",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport callbacks that drive the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The handshake completed.
    HandshakeSucceeded,
    /// The connection was refused or the handshake failed.
    HandshakeFailed,
    /// The remote end closed the stream.
    RemoteClosed,
    /// The transport reported an error.
    TransportFailed,
    /// Local teardown started.
    CloseRequested,
    /// Local close finished.
    CloseCompleted,
}

/// Publishes the state of one connection to any number of observers.
#[derive(Debug)]
pub struct StateTracker {
    tx: watch::Sender<ConnectionState>,
}

impl StateTracker {
    /// Create a tracker in the `Connecting` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Connecting);
        Self { tx }
    }

    /// Current state.
    #[must_use]
    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Apply a transition, notifying observers if the state changed.
    ///
    /// Returns the new state, or `None` if the transition was rejected.
    pub fn apply(&self, transition: Transition) -> Option<ConnectionState> {
        let mut next = None;
        self.tx.send_if_modified(|state| match state.apply(transition) {
            Some(new_state) => {
                debug!(from = %state, to = %new_state, "Connection state changed");
                *state = new_state;
                next = Some(new_state);
                true
            }
            None => {
                if !state.is_terminal() {
                    warn!(state = %state, ?transition, "Ignoring invalid state transition");
                }
                false
            }
        });
        next
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
