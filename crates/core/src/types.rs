//! Shared types for cross-exchange arbitrage execution.
//!
//! This module defines the data structures exchanged between the risk gate,
//! the execution engine, the position tracker, and the position monitor:
//! venue-facing order and quote types, the opportunity record produced by
//! the upstream scanner, and the execution/position lifecycle records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

// =============================================================================
// Side and Outcome
// =============================================================================

/// Side of a binary-outcome market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The YES (or Up) contract.
    Yes,
    /// The NO (or Down) contract.
    No,
}

impl Side {
    /// Returns the opposite side.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }

    /// Returns the display string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::No => "NO",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final outcome of a resolved binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// Market resolved YES.
    Yes,
    /// Market resolved NO.
    No,
    /// Market was voided or invalidated.
    Void,
}

impl Outcome {
    /// Returns the side that pays out under this outcome.
    #[must_use]
    pub fn winning_side(self) -> Option<Side> {
        match self {
            Self::Yes => Some(Side::Yes),
            Self::No => Some(Side::No),
            Self::Void => None,
        }
    }

    /// Returns true if holding `side` pays out under this outcome.
    #[must_use]
    pub fn side_wins(self, side: Side) -> bool {
        self.winning_side() == Some(side)
    }

    /// Returns the display string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::No => "NO",
            Self::Void => "VOID",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Venue-Facing Market Data
// =============================================================================

/// Top-of-book quote for both sides of a binary market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    /// Best bid for the YES contract.
    pub yes_bid: Decimal,
    /// Best ask for the YES contract.
    pub yes_ask: Decimal,
    /// Size available at the YES ask.
    pub yes_liquidity: Decimal,
    /// Best bid for the NO contract.
    pub no_bid: Decimal,
    /// Best ask for the NO contract.
    pub no_ask: Decimal,
    /// Size available at the NO ask.
    pub no_liquidity: Decimal,
    /// When the venue produced this quote.
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Returns the best bid for `side`.
    #[must_use]
    pub fn bid(&self, side: Side) -> Decimal {
        match side {
            Side::Yes => self.yes_bid,
            Side::No => self.no_bid,
        }
    }

    /// Returns the best ask for `side`.
    #[must_use]
    pub fn ask(&self, side: Side) -> Decimal {
        match side {
            Side::Yes => self.yes_ask,
            Side::No => self.no_ask,
        }
    }

    /// Returns the size available at the ask for `side`.
    #[must_use]
    pub fn liquidity(&self, side: Side) -> Decimal {
        match side {
            Side::Yes => self.yes_liquidity,
            Side::No => self.no_liquidity,
        }
    }

    /// Returns the bid/ask spread for `side`.
    #[must_use]
    pub fn spread(&self, side: Side) -> Decimal {
        self.ask(side) - self.bid(side)
    }
}

/// Existence and resolution state of a market as reported by a venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    /// Venue-local market identifier.
    pub id: String,
    /// Whether the market is still accepting orders.
    pub active: bool,
    /// Final outcome, once the venue has resolved the market.
    pub resolved_outcome: Option<Outcome>,
}

impl Market {
    /// Returns true if the venue has resolved this market.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved_outcome.is_some()
    }
}

// =============================================================================
// Orders
// =============================================================================

/// Order type understood by venue clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Limit order at a fixed price.
    Limit,
    /// Market order.
    Market,
}

/// A request to place an order on a venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Venue-local market identifier.
    pub market_id: String,
    /// Side to buy.
    pub side: Side,
    /// Number of contracts.
    pub size: Decimal,
    /// Limit price per contract in dollars.
    pub limit_price: Decimal,
    /// Order type.
    pub order_type: OrderType,
}

impl OrderRequest {
    /// Creates a limit buy for `size` contracts of `side` at `price`.
    #[must_use]
    pub fn limit_buy(market_id: impl Into<String>, side: Side, size: Decimal, price: Decimal) -> Self {
        Self {
            market_id: market_id.into(),
            side,
            size,
            limit_price: price,
            order_type: OrderType::Limit,
        }
    }

    /// Returns the maximum notional value of this order.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.size * self.limit_price
    }
}

/// Status of a placed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Resting, no fills yet.
    Pending,
    /// Fully filled.
    Filled,
    /// Partially filled.
    Partial,
    /// Cancelled before completion.
    Cancelled,
    /// Rejected by the venue.
    Rejected,
}

impl OrderStatus {
    /// Returns true if the order filled completely.
    #[must_use]
    pub fn is_filled(self) -> bool {
        matches!(self, Self::Filled)
    }

    /// Returns true if the order has at least some fills.
    #[must_use]
    pub fn has_fills(self) -> bool {
        matches!(self, Self::Filled | Self::Partial)
    }
}

/// Venue acknowledgement of an order placement or status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    /// Venue-assigned order identifier.
    pub order_id: String,
    /// Current order status.
    pub status: OrderStatus,
    /// Contracts filled so far.
    pub filled_size: Decimal,
    /// Average fill price per contract in dollars.
    pub filled_price: Decimal,
}

impl OrderAck {
    /// Returns the dollar cost of the filled portion.
    #[must_use]
    pub fn fill_cost(&self) -> Decimal {
        self.filled_size * self.filled_price
    }
}

/// Account balance as reported by a venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Free balance in dollars.
    pub available: Decimal,
    /// Balance committed to resting orders and open positions.
    pub allocated: Decimal,
    /// Total balance.
    pub total: Decimal,
}

// =============================================================================
// Opportunity (produced upstream, consumed here)
// =============================================================================

/// One leg of a candidate arbitrage, as identified by the upstream scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityLeg {
    /// Venue name, matching [`crate::traits::VenueClient::name`].
    pub venue: String,
    /// Venue-local market identifier.
    pub market_id: String,
    /// Side to buy on this venue.
    pub side: Side,
    /// Scanner's estimate of size available on this leg.
    pub liquidity: Decimal,
}

/// Fee estimate attached to an opportunity by the upstream scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeBreakdown {
    /// Fees on the first leg in dollars per contract.
    pub leg1_fee: Decimal,
    /// Fees on the second leg in dollars per contract.
    pub leg2_fee: Decimal,
}

impl FeeBreakdown {
    /// Returns total fees per contract across both legs.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.leg1_fee + self.leg2_fee
    }
}

/// Upstream assessment of whether the two legs resolve on identical criteria.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionAlignment {
    /// False when the legs may settle to different outcomes; such an
    /// opportunity must never be traded.
    pub tradeable: bool,
    /// True when tradeable but with known settlement-criteria differences.
    pub risky: bool,
    /// Human-readable description of the assessment.
    pub detail: String,
}

/// A candidate arbitrage across two venues, produced by the upstream
/// matching/scoring engine. Immutable once received; expires after its TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    /// Unique opportunity identifier.
    pub id: Uuid,
    /// First leg.
    pub leg1: OpportunityLeg,
    /// Second leg.
    pub leg2: OpportunityLeg,
    /// Gross profit as a percent of cost, before fees.
    pub gross_profit_pct: Decimal,
    /// Net profit as a percent of cost, after fees.
    pub net_profit_pct: Decimal,
    /// Combined entry cost per contract as a fraction of the $1 payout.
    pub total_cost: Decimal,
    /// Maximum executable size estimated by the scanner.
    pub max_size: Decimal,
    /// Scanner confidence in the market pairing (0.0 to 1.0).
    pub confidence: f64,
    /// When the opportunity was detected.
    pub detected_at: DateTime<Utc>,
    /// How long the opportunity remains actionable after detection.
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
    /// Fee estimate per leg.
    pub fees: FeeBreakdown,
    /// Optional resolution-alignment assessment.
    pub alignment: Option<ResolutionAlignment>,
}

impl Opportunity {
    /// Returns true if the TTL has elapsed since detection.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now()
            .signed_duration_since(self.detected_at)
            .to_std()
            .map_or(false, |age| age > self.ttl)
    }

    /// Returns the expected profit per contract in dollars.
    #[must_use]
    pub fn unit_profit(&self) -> Decimal {
        Decimal::ONE - self.total_cost
    }
}

// =============================================================================
// Execution Plan and Result
// =============================================================================

/// One leg of an execution plan: which venue, and what order to place there.
#[derive(Debug, Clone)]
pub struct PlannedLeg {
    /// Venue name.
    pub venue: String,
    /// The order to submit.
    pub order: OrderRequest,
}

/// An immutable plan for one execution attempt.
///
/// Built fresh from live quotes for every attempt; never persisted and never
/// reused across attempts.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// First leg.
    pub leg1: PlannedLeg,
    /// Second leg.
    pub leg2: PlannedLeg,
    /// Total cost of both legs at planned prices.
    pub total_cost: Decimal,
    /// Expected profit at settlement.
    pub expected_profit: Decimal,
    /// Hard timeout for the commit phase.
    pub timeout: Duration,
}

/// Phase of the execution state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionPhase {
    /// Quote re-validation and plan construction.
    Prepare,
    /// Concurrent order submission.
    Commit,
    /// Both legs filled; position opened.
    Completed,
    /// Compensating cancellation after a commit failure.
    Rollback,
}

impl ExecutionPhase {
    /// Returns the display string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Commit => "commit",
            Self::Completed => "completed",
            Self::Rollback => "rollback",
        }
    }
}

impl std::fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Execution identifier.
    pub execution_id: Uuid,
    /// True iff both legs filled and the position was opened.
    pub success: bool,
    /// Order id returned for leg 1, if the order was placed at all.
    pub leg1_order_id: Option<String>,
    /// Order id returned for leg 2, if the order was placed at all.
    pub leg2_order_id: Option<String>,
    /// Matched size: the minimum of the two legs' fills.
    pub actual_size: Decimal,
    /// Dollars actually spent across both legs.
    pub actual_cost: Decimal,
    /// `actual_size - actual_cost`.
    pub actual_profit: Decimal,
    /// Phase at which the attempt concluded.
    pub phase: ExecutionPhase,
    /// Failure description, when `success` is false.
    pub error: Option<String>,
    /// Why rollback ran, when it did.
    pub rollback_reason: Option<String>,
}

impl ExecutionResult {
    /// Creates a failure result for an attempt that died in `phase`.
    #[must_use]
    pub fn failure(execution_id: Uuid, phase: ExecutionPhase, error: impl Into<String>) -> Self {
        Self {
            execution_id,
            success: false,
            leg1_order_id: None,
            leg2_order_id: None,
            actual_size: Decimal::ZERO,
            actual_cost: Decimal::ZERO,
            actual_profit: Decimal::ZERO,
            phase,
            error: Some(error.into()),
            rollback_reason: None,
        }
    }
}

/// Lifecycle status of a recorded execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Attempt in flight.
    Pending,
    /// Both legs filled.
    Completed,
    /// Attempt failed before any leg committed.
    Failed,
    /// Attempt failed after placement and was unwound by cancellation.
    RolledBack,
}

impl ExecutionStatus {
    /// Returns the storage string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }
}

// =============================================================================
// Opportunity Lifecycle (tracker-owned)
// =============================================================================

/// Lifecycle status of a tracked opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpportunityStatus {
    /// Received from the scanner.
    Detected,
    /// An execution attempt is in flight.
    Executing,
    /// Successfully executed.
    Executed,
    /// Attempted and failed.
    Failed,
    /// TTL elapsed without execution.
    Expired,
}

impl OpportunityStatus {
    /// Returns the storage string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }
}

// =============================================================================
// Positions
// =============================================================================

/// Lifecycle status of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    /// Both legs held, awaiting resolution.
    Open,
    /// At least one leg's market is resolving.
    Resolving,
    /// Closed against confirmed resolution data.
    Resolved,
    /// Legs resolved to conflicting outcomes; needs operator attention.
    Disputed,
}

impl PositionStatus {
    /// Returns the storage string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
            Self::Disputed => "disputed",
        }
    }
}

/// One leg of an open position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLeg {
    /// Venue name.
    pub venue: String,
    /// Venue-local market identifier.
    pub market_id: String,
    /// Side held.
    pub side: Side,
    /// Average entry price per contract in dollars.
    pub entry_price: Decimal,
    /// Venue order id that created this leg.
    pub order_id: String,
}

/// A durable cross-venue arbitrage position.
///
/// Owned exclusively by the position tracker; all other components read and
/// write it through the tracker's API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Unique position identifier.
    pub id: Uuid,
    /// The execution that created this position.
    pub execution_id: Uuid,
    /// First leg.
    pub leg1: PositionLeg,
    /// Second leg.
    pub leg2: PositionLeg,
    /// Matched size held on both legs.
    pub size: Decimal,
    /// Dollars spent to open both legs.
    pub total_cost: Decimal,
    /// Guaranteed payout at resolution (`size * $1`).
    pub expected_payout: Decimal,
    /// Expected profit at resolution.
    pub expected_profit: Decimal,
    /// Lifecycle status.
    pub status: PositionStatus,
    /// When the position was opened.
    pub opened_at: DateTime<Utc>,
    /// When the position was closed, if it has been.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Position {
    /// Returns true while the position awaits resolution.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self.status, PositionStatus::Open | PositionStatus::Resolving)
    }

    /// Returns how long the position has been open.
    #[must_use]
    pub fn age(&self) -> chrono::Duration {
        self.resolved_at.unwrap_or_else(Utc::now) - self.opened_at
    }
}

// =============================================================================
// Monitor Observations
// =============================================================================

/// Kind of mismatch between assumed and observed position state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscrepancyKind {
    /// A venue no longer returns a market the position depends on.
    MissingLeg,
    /// Venue-reported fill size diverges from the recorded position size.
    SizeMismatch,
    /// Both legs resolved, to different outcomes.
    ResolutionDivergence,
    /// One leg resolved while its sibling has not.
    PrematureResolution,
}

impl DiscrepancyKind {
    /// Returns the event string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingLeg => "missing_leg",
            Self::SizeMismatch => "size_mismatch",
            Self::ResolutionDivergence => "resolution_divergence",
            Self::PrematureResolution => "premature_resolution",
        }
    }
}

/// Severity of a detected discrepancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Informational but risk-profile-changing.
    Medium,
    /// Requires prompt operator attention.
    High,
    /// The arbitrage guarantee is broken.
    Critical,
}

/// A detected mismatch between assumed and observed position state.
///
/// Emitted by the position monitor; never stored by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrepancy {
    /// Affected position.
    pub position_id: Uuid,
    /// What kind of mismatch.
    pub kind: DiscrepancyKind,
    /// How bad it is.
    pub severity: Severity,
    /// Human-readable detail.
    pub detail: String,
    /// When the monitor observed it.
    pub detected_at: DateTime<Utc>,
}

/// Mark-to-market snapshot of an open position, recomputed every monitor
/// cycle from live bids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionPnl {
    /// The position.
    pub position_id: Uuid,
    /// Current value minus cost.
    pub unrealized: Decimal,
    /// Realized profit (zero while open).
    pub realized: Decimal,
    /// Entry cost.
    pub total_cost: Decimal,
    /// Current liquidation value at live bids.
    pub market_value: Decimal,
    /// Guaranteed payout at resolution.
    pub expected_payout: Decimal,
    /// When this snapshot was computed.
    pub computed_at: DateTime<Utc>,
}

// =============================================================================
// Duration Serde Helper
// =============================================================================

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
