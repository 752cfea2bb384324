//! PostgreSQL-backed position tracker for the arbitrage execution core.
//!
//! [`PgPositionTracker`] implements [`arb_exec_core::PositionStore`] over a
//! relational schema of opportunities, executions, positions, a single-row
//! capital status, a daily trade aggregate, and an append-only audit log.
//! Money lives in `NUMERIC` columns end to end; no floating point touches a
//! dollar amount.

pub mod models;
pub mod schema;
pub mod tracker;

pub use models::{CapitalRow, DailyTradeRow, PerformanceSummary, PositionRow};
pub use tracker::PgPositionTracker;
