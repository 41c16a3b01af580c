//! # tradesync-core
//!
//! Event routing and telemetry simulation for the tradesync sync client.
//!
//! - **Routing** - Static table from event kind to cache invalidation targets
//! - **Router** - Decodes frames and issues invalidations in table order
//! - **Cache** - The invalidation seam plus an in-memory query cache
//! - **Jitter** - Periodic position jitter for live-tracked markers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │    Frame    │────▶│ EventRouter │────▶│ QueryCache  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ MarkerSource│────▶│   Jitter    │────▶│ MarkerBoard │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! The two pipelines share no state.

pub mod cache;
pub mod jitter;
pub mod router;
pub mod routing;

pub use cache::{CacheInvalidator, CacheRead, QueryCache};
pub use jitter::{
    JitterConfig, JitterSimulator, MarkerBoard, MarkerId, MarkerSource, Position, StaticMarkers,
};
pub use router::{EventRouter, FrameOutcome, RouteOutcome, RouterStats};
pub use routing::{InvalidationTarget, RoutingTable};
