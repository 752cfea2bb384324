//! Capability traits at the system's seams.
//!
//! [`VenueClient`] is the contract every trading venue adapter must expose;
//! the execution core never speaks a venue wire format directly.
//! [`PositionStore`] is the position tracker's surface, consumed by the
//! execution engine and the position monitor so neither ever touches the
//! capital record or position rows directly.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::capital::CapitalStatus;
use crate::types::{
    AccountBalance, ExecutionPhase, ExecutionStatus, Market, Opportunity, OpportunityStatus,
    OrderAck, OrderRequest, Position, Quote,
};

// =============================================================================
// Venue Client
// =============================================================================

/// Errors from venue calls.
///
/// The core treats any venue-side error as a failure of that call, not as a
/// distinct state of the order or market.
#[derive(Debug, Clone, Error)]
pub enum VenueError {
    /// The call did not complete within its bound.
    #[error("venue call timed out")]
    Timeout,

    /// The referenced market or order does not exist on the venue.
    #[error("not found: {0}")]
    NotFound(String),

    /// The venue refused the request.
    #[error("rejected: {reason}")]
    Rejected {
        /// Venue-supplied reason.
        reason: String,
    },

    /// Transport or protocol failure.
    #[error("venue api error: {message}")]
    Api {
        /// Description of the failure.
        message: String,
    },
}

/// Capability surface a trading venue must expose to the execution core.
#[async_trait]
pub trait VenueClient: Send + Sync {
    /// Stable venue name, matched against [`crate::types::OpportunityLeg::venue`].
    fn name(&self) -> &str;

    /// Fetches the current top-of-book quote for a market.
    async fn quote(&self, market_id: &str) -> Result<Quote, VenueError>;

    /// Fetches a market's existence and resolution state.
    ///
    /// Returns `Ok(None)` when the venue no longer lists the market.
    async fn market(&self, market_id: &str) -> Result<Option<Market>, VenueError>;

    /// Places an order.
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, VenueError>;

    /// Cancels an order by id. Venues are expected to no-op on an
    /// already-filled or already-cancelled order.
    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError>;

    /// Queries the current status of an order.
    async fn order_status(&self, order_id: &str) -> Result<OrderAck, VenueError>;

    /// Fetches the account balance on this venue.
    async fn balance(&self) -> Result<AccountBalance, VenueError>;
}

// =============================================================================
// Position Store
// =============================================================================

/// Durable record of one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Execution identifier.
    pub id: Uuid,
    /// The opportunity this attempt executed.
    pub opportunity_id: Uuid,
    /// Lifecycle status.
    pub status: ExecutionStatus,
    /// Phase the attempt has reached.
    pub phase: ExecutionPhase,
    /// Order id for leg 1, once placed.
    pub leg1_order_id: Option<String>,
    /// Order id for leg 2, once placed.
    pub leg2_order_id: Option<String>,
    /// Size the risk gate approved for this attempt.
    pub requested_size: Decimal,
    /// Matched fill size, once known.
    pub actual_size: Decimal,
    /// Dollars actually spent, once known.
    pub actual_cost: Decimal,
    /// Realized edge, once known.
    pub actual_profit: Decimal,
    /// Failure description, when the attempt failed.
    pub error: Option<String>,
    /// Why rollback ran, when it did.
    pub rollback_reason: Option<String>,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// When the attempt concluded.
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    /// Creates a pending record for a fresh attempt.
    #[must_use]
    pub fn pending(id: Uuid, opportunity_id: Uuid, requested_size: Decimal) -> Self {
        Self {
            id,
            opportunity_id,
            status: ExecutionStatus::Pending,
            phase: ExecutionPhase::Prepare,
            leg1_order_id: None,
            leg2_order_id: None,
            requested_size,
            actual_size: Decimal::ZERO,
            actual_cost: Decimal::ZERO,
            actual_profit: Decimal::ZERO,
            error: None,
            rollback_reason: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// The position tracker's contract.
///
/// Every multi-row mutation is a single atomic transaction that also updates
/// the capital record and appends one audit entry; a failure partway through
/// leaves the store exactly as it was. The tracker is the only component
/// permitted to mutate [`CapitalStatus`].
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Records a newly detected opportunity.
    async fn track_opportunity(&self, opportunity: &Opportunity) -> Result<()>;

    /// Advances an opportunity's lifecycle status.
    async fn update_opportunity_status(&self, id: Uuid, status: OpportunityStatus) -> Result<()>;

    /// Records a fresh execution attempt.
    async fn record_execution(&self, record: &ExecutionRecord) -> Result<()>;

    /// Updates an execution attempt with its outcome.
    async fn update_execution(&self, record: &ExecutionRecord) -> Result<()>;

    /// Opens a position: inserts the row, moves its cost from available to
    /// allocated capital, and increments the open count, atomically.
    ///
    /// Returns the capital status after the transaction.
    async fn open_position(&self, position: &Position) -> Result<CapitalStatus>;

    /// Closes a position against confirmed resolution data: releases its
    /// allocation, credits the realized payout, and appends to the daily
    /// trade aggregate, atomically.
    ///
    /// Returns the capital status after the transaction.
    async fn close_position(&self, position_id: Uuid, payout: Decimal) -> Result<CapitalStatus>;

    /// Reads the current capital status.
    async fn capital_status(&self) -> Result<CapitalStatus>;

    /// Reads all open positions.
    async fn open_positions(&self) -> Result<Vec<Position>>;

    /// Returns the total cost of positions opened on the given UTC date.
    async fn daily_deployment(&self, date: NaiveDate) -> Result<Decimal>;
}
