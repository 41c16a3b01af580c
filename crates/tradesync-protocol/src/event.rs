//! Event types for the tradesync wire contract.
//!
//! The server pushes one JSON object per frame, tagged by a string `type`
//! and carrying an opaque `payload`. Known tags map onto [`EventKind`]
//! variants; anything else is kept verbatim in [`EventKind::Unknown`] so that
//! newer servers can emit new event types without breaking older clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of a server-pushed event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// A contractor's details or status changed.
    ContractorUpdate,
    /// A payment was recorded against an invoice.
    PaymentReceived,
    /// An expense finished processing.
    ExpenseProcessed,
    /// A job was created, updated or closed.
    JobUpdate,
    /// A fleet vehicle changed.
    VehicleUpdate,
    /// A client sent a message.
    ClientMessage,
    /// A tag this client does not know about.
    Unknown(String),
}

impl EventKind {
    /// Every event kind the server is known to emit.
    pub const KNOWN: [EventKind; 6] = [
        EventKind::ContractorUpdate,
        EventKind::PaymentReceived,
        EventKind::ExpenseProcessed,
        EventKind::JobUpdate,
        EventKind::VehicleUpdate,
        EventKind::ClientMessage,
    ];

    /// Resolve a wire tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "contractor_update" => EventKind::ContractorUpdate,
            "payment_received" => EventKind::PaymentReceived,
            "expense_processed" => EventKind::ExpenseProcessed,
            "job_update" => EventKind::JobUpdate,
            "vehicle_update" => EventKind::VehicleUpdate,
            "client_message" => EventKind::ClientMessage,
            other => EventKind::Unknown(other.to_string()),
        }
    }

    /// The wire tag for this kind.
    #[must_use]
    pub fn as_tag(&self) -> &str {
        match self {
            EventKind::ContractorUpdate => "contractor_update",
            EventKind::PaymentReceived => "payment_received",
            EventKind::ExpenseProcessed => "expense_processed",
            EventKind::JobUpdate => "job_update",
            EventKind::VehicleUpdate => "vehicle_update",
            EventKind::ClientMessage => "client_message",
            EventKind::Unknown(tag) => tag,
        }
    }

    /// Whether this kind is one the server is known to emit.
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, EventKind::Unknown(_))
    }
}

impl From<String> for EventKind {
    fn from(tag: String) -> Self {
        match EventKind::from_tag(&tag) {
            EventKind::Unknown(_) => EventKind::Unknown(tag),
            known => known,
        }
    }
}

impl From<&str> for EventKind {
    fn from(tag: &str) -> Self {
        EventKind::from_tag(tag)
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> String {
        match kind {
            EventKind::Unknown(tag) => tag,
            known => known.as_tag().to_string(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// A single decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Event kind, carried on the wire as `type`.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Opaque event data. Absent payloads decode as `null`.
    #[serde(default)]
    pub payload: Value,
}

impl InboundEvent {
    /// Create a new event.
    #[must_use]
    pub fn new(kind: impl Into<EventKind>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Get the wire tag of this event.
    #[must_use]
    pub fn event_type(&self) -> &str {
        self.kind.as_tag()
    }
}
