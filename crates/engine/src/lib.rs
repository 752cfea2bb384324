//! Risk gating, two-phase execution, and position monitoring for
//! cross-exchange arbitrage in binary-outcome prediction markets.
//!
//! # Overview
//!
//! When complementary outcomes of the same event cost less than the $1
//! payout across two venues, buying both legs locks in the difference:
//!
//! ```text
//! kalshi:     NO  @ $0.45
//! polymarket: YES @ $0.51
//! Total cost:       $0.96
//! Payout:           $1.00
//! Edge:             $0.04 (4.2%)
//! ```
//!
//! The hard part is not finding the spread, it is committing capital to two
//! independently operated venues that share no commit protocol, no escrow,
//! and no rollback primitive. This crate treats each attempt as a
//! two-phase-commit in spirit: re-validate against fresh quotes, submit
//! both legs concurrently under one timeout, and unwind by cancellation
//! when only half the position comes back.
//!
//! # Modules
//!
//! - [`risk`]: gate battery that validates a proposed trade against
//!   capital, exposure, and liquidity limits before any remote call
//! - [`executor`]: the prepare/commit/rollback coordinator over two
//!   [`arb_exec_core::VenueClient`]s
//! - [`monitor`]: background reconciliation of open positions against
//!   observed venue state, plus live P&L
//! - [`breaker`]: per-venue circuit breaker consulted by the risk gate and
//!   fed by the executor
//!
//! # Example
//!
//! ```ignore
//! use arb_exec_engine::{ExecutionEngine, RiskManager, VenueCircuitBreaker};
//!
//! let decision = risk.validate(&opportunity, requested).await?;
//! if decision.approved {
//!     let size = decision.effective_size(requested);
//!     let result = engine.execute(&opportunity, size).await?;
//!     println!("{}: {:?}", result.phase, result.success);
//! }
//! ```
//!
//! # Safety
//!
//! Execution never retries on its own: a retry at a stale price is how an
//! arbitrage becomes a directional bet. Callers restart from a freshly
//! validated opportunity instead. Likewise nothing here hedges a lone
//! filled leg; rollback is cancel-only and the residual exposure surfaces
//! through execution-failure events.

pub mod breaker;
pub mod executor;
pub mod monitor;
pub mod risk;

#[cfg(test)]
pub(crate) mod testutil;

pub use breaker::{BreakerError, BreakerState, VenueCircuitBreaker};
pub use executor::{EngineError, ExecutionEngine};
pub use monitor::PositionMonitor;
pub use risk::{RiskDecision, RiskManager, RiskViolation};
