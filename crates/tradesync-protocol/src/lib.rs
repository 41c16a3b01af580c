//! # tradesync-protocol
//!
//! Wire contract for the tradesync realtime sync client.
//!
//! The server pushes text frames, each a JSON object with a string `type`
//! tag and an arbitrary `payload`:
//!
//! ```json
//! {"type":"payment_received","payload":{"invoiceId":"inv-42","amount":123.45}}
//! ```
//!
//! The client is receive-only; nothing is sent after the handshake.
//!
//! ## Example
//!
//! ```rust
//! use tradesync_protocol::{codec, EventKind};
//!
//! let event = codec::decode_str(r#"{"type":"job_update","payload":{}}"#).unwrap();
//! assert_eq!(event.kind, EventKind::JobUpdate);
//!
//! // Tags this client does not know decode fine and are ignored downstream.
//! let event = codec::decode_str(r#"{"type":"brand_new","payload":{}}"#).unwrap();
//! assert!(!event.kind.is_known());
//! ```

pub mod codec;
pub mod event;

pub use codec::{decode, decode_str, DecodeError, FrameDecoder};
pub use event::{EventKind, InboundEvent};
