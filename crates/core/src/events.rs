//! Execution and monitor event definitions and the broadcast bus.
//!
//! Collaborators (alerting, dashboards, a future hedging component)
//! subscribe to the bus; the core publishes fire-and-forget and does not
//! know who listens. Events for the same execution attempt are published in
//! phase order prepare -> commit -> (completed | rollback); no ordering is
//! guaranteed between different attempts or event kinds.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::{Discrepancy, ExecutionPhase, PositionPnl};

/// Default capacity of the broadcast channel.
const DEFAULT_BUS_CAPACITY: usize = 256;

// =============================================================================
// Event Payloads
// =============================================================================

/// Lifecycle events for one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionEvent {
    /// An attempt began.
    Started {
        /// Execution identifier.
        execution_id: Uuid,
        /// Opportunity being executed.
        opportunity_id: Uuid,
        /// Size approved by the risk gate.
        requested_size: Decimal,
        /// When the attempt started.
        timestamp: DateTime<Utc>,
    },

    /// Prepare succeeded and a plan was built from fresh quotes.
    PrepareCompleted {
        /// Execution identifier.
        execution_id: Uuid,
        /// Planned cost of both legs.
        total_cost: Decimal,
        /// Expected profit recomputed from fresh quotes.
        expected_profit: Decimal,
        /// When prepare finished.
        timestamp: DateTime<Utc>,
    },

    /// Both legs filled and a position was opened.
    Completed {
        /// Execution identifier.
        execution_id: Uuid,
        /// The position opened by this attempt.
        position_id: Uuid,
        /// Matched fill size.
        actual_size: Decimal,
        /// Realized edge at entry.
        actual_profit: Decimal,
        /// When the attempt completed.
        timestamp: DateTime<Utc>,
    },

    /// The attempt failed.
    Failed {
        /// Execution identifier.
        execution_id: Uuid,
        /// Phase the failure occurred in.
        phase: ExecutionPhase,
        /// Failure description.
        reason: String,
        /// When the attempt failed.
        timestamp: DateTime<Utc>,
    },

    /// Rollback finished, regardless of whether every cancel succeeded.
    RollbackCompleted {
        /// Execution identifier.
        execution_id: Uuid,
        /// Order ids for which cancellation was attempted.
        cancelled_orders: Vec<String>,
        /// Why rollback ran.
        reason: String,
        /// When rollback finished.
        timestamp: DateTime<Utc>,
    },
}

/// Events from the position monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MonitorEvent {
    /// The monitor loop started.
    Started {
        /// Sweep interval in seconds.
        interval_secs: u64,
    },

    /// The monitor loop stopped cleanly.
    Stopped,

    /// One position's check failed; the sweep continued.
    Error {
        /// Affected position, when known.
        position_id: Option<Uuid>,
        /// What went wrong.
        message: String,
    },

    /// A discrepancy was detected.
    DiscrepancyDetected(Discrepancy),

    /// A critical discrepancy was detected; also emitted as
    /// [`MonitorEvent::DiscrepancyDetected`].
    CriticalDiscrepancy(Discrepancy),

    /// Fresh mark-to-market P&L for an open position.
    PnlUpdated(PositionPnl),
}

/// Any event published by the execution core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CoreEvent {
    /// Execution lifecycle event.
    Execution(ExecutionEvent),
    /// Monitor event.
    Monitor(MonitorEvent),
}

// =============================================================================
// Event Bus
// =============================================================================

/// Broadcast bus for core events.
///
/// Cloning is cheap; all clones publish into the same channel. Publishing
/// never blocks and silently drops events when no subscriber exists.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a bus with the given channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Creates a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Subscribes to all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.tx.subscribe()
    }

    /// Publishes an execution event.
    pub fn publish_execution(&self, event: ExecutionEvent) {
        let _ = self.tx.send(CoreEvent::Execution(event));
    }

    /// Publishes a monitor event.
    pub fn publish_monitor(&self, event: MonitorEvent) {
        let _ = self.tx.send(CoreEvent::Monitor(event));
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
