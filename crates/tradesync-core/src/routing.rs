//! Static routing from event kinds to cache invalidation targets.

use serde::{Deserialize, Serialize};
use std::fmt;
use tradesync_protocol::EventKind;

/// A cache resource the router can mark stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationTarget {
    /// Active contractors list.
    ActiveContractors,
    /// Recent payments list.
    RecentPayments,
    /// Dashboard metrics summary.
    MetricsSummary,
    /// Recent expenses list.
    RecentExpenses,
    /// Active jobs list.
    ActiveJobs,
    /// Vehicle roster.
    VehicleRoster,
    /// Client message thread list.
    ClientMessageThreads,
}

impl InvalidationTarget {
    /// Every target, in declaration order.
    pub const ALL: [InvalidationTarget; 7] = [
        InvalidationTarget::ActiveContractors,
        InvalidationTarget::RecentPayments,
        InvalidationTarget::MetricsSummary,
        InvalidationTarget::RecentExpenses,
        InvalidationTarget::ActiveJobs,
        InvalidationTarget::VehicleRoster,
        InvalidationTarget::ClientMessageThreads,
    ];

    /// The cache key this target is stored under.
    #[must_use]
    pub const fn resource_key(self) -> &'static str {
        match self {
            InvalidationTarget::ActiveContractors => "/api/contractors/active",
            InvalidationTarget::RecentPayments => "/api/payments/recent",
            InvalidationTarget::MetricsSummary => "/api/metrics/summary",
            InvalidationTarget::RecentExpenses => "/api/expenses/recent",
            InvalidationTarget::ActiveJobs => "/api/jobs/active",
            InvalidationTarget::VehicleRoster => "/api/vehicles",
            InvalidationTarget::ClientMessageThreads => "/api/messages/threads",
        }
    }
}

impl fmt::Display for InvalidationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_key())
    }
}

/// Mapping from event kind to the ordered targets it invalidates.
///
/// The table is total over [`EventKind`]: every known kind has an entry, and
/// [`EventKind::Unknown`] resolves to `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingTable;

impl RoutingTable {
    /// Create the routing table.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Look up the targets for an event kind, in invalidation order.
    #[must_use]
    pub fn lookup(&self, kind: &EventKind) -> Option<&'static [InvalidationTarget]> {
        use InvalidationTarget::*;

        let targets: &'static [InvalidationTarget] = match kind {
            EventKind::ContractorUpdate => &[ActiveContractors],
            EventKind::PaymentReceived => &[RecentPayments, MetricsSummary],
            EventKind::ExpenseProcessed => &[RecentExpenses],
            EventKind::JobUpdate => &[ActiveJobs],
            EventKind::VehicleUpdate => &[VehicleRoster],
            EventKind::ClientMessage => &[ClientMessageThreads],
            EventKind::Unknown(_) => return None,
        };

        Some(targets)
    }

    /// Iterate over all entries.
    pub fn entries(&self) -> impl Iterator<Item = (EventKind, &'static [InvalidationTarget])> + '_ {
        EventKind::KNOWN
            .into_iter()
            .filter_map(move |kind| self.lookup(&kind).map(|targets| (kind, targets)))
    }
}
