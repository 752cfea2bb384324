//! Row types and string codecs for the tracker's tables.

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use arb_exec_core::{
    CapitalStatus, Position, PositionLeg, PositionStatus, Side,
};

/// Parses a stored side string.
pub(crate) fn parse_side(value: &str) -> Result<Side> {
    match value {
        "YES" => Ok(Side::Yes),
        "NO" => Ok(Side::No),
        other => bail!("unknown side '{other}'"),
    }
}

/// Parses a stored position status string.
pub(crate) fn parse_position_status(value: &str) -> Result<PositionStatus> {
    match value {
        "open" => Ok(PositionStatus::Open),
        "resolving" => Ok(PositionStatus::Resolving),
        "resolved" => Ok(PositionStatus::Resolved),
        "disputed" => Ok(PositionStatus::Disputed),
        other => bail!("unknown position status '{other}'"),
    }
}

/// One row of `positions`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PositionRow {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub leg1_venue: String,
    pub leg1_market_id: String,
    pub leg1_side: String,
    pub leg1_entry_price: Decimal,
    pub leg1_order_id: String,
    pub leg2_venue: String,
    pub leg2_market_id: String,
    pub leg2_side: String,
    pub leg2_entry_price: Decimal,
    pub leg2_order_id: String,
    pub size: Decimal,
    pub total_cost: Decimal,
    pub expected_payout: Decimal,
    pub expected_profit: Decimal,
    pub status: String,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl PositionRow {
    /// Converts the row back into the domain type.
    ///
    /// # Errors
    /// Returns an error when a stored enum string is unrecognized.
    pub fn into_position(self) -> Result<Position> {
        Ok(Position {
            id: self.id,
            execution_id: self.execution_id,
            leg1: PositionLeg {
                venue: self.leg1_venue,
                market_id: self.leg1_market_id,
                side: parse_side(&self.leg1_side)?,
                entry_price: self.leg1_entry_price,
                order_id: self.leg1_order_id,
            },
            leg2: PositionLeg {
                venue: self.leg2_venue,
                market_id: self.leg2_market_id,
                side: parse_side(&self.leg2_side)?,
                entry_price: self.leg2_entry_price,
                order_id: self.leg2_order_id,
            },
            size: self.size,
            total_cost: self.total_cost,
            expected_payout: self.expected_payout,
            expected_profit: self.expected_profit,
            status: parse_position_status(&self.status)?,
            opened_at: self.opened_at,
            resolved_at: self.resolved_at,
        })
    }
}

/// The single row of `capital_status`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CapitalRow {
    pub total: Decimal,
    pub available: Decimal,
    pub allocated: Decimal,
    pub reserved: Decimal,
    pub open_positions: i32,
    pub realized_profit: Decimal,
    pub trade_count: i64,
}

impl CapitalRow {
    /// Converts the row into the domain type.
    #[must_use]
    pub fn into_capital(self) -> CapitalStatus {
        CapitalStatus {
            total: self.total,
            available: self.available,
            allocated: self.allocated,
            reserved: self.reserved,
            open_positions: u32::try_from(self.open_positions).unwrap_or(0),
            realized_profit: self.realized_profit,
            trade_count: u64::try_from(self.trade_count).unwrap_or(0),
        }
    }
}

/// One row of the `daily_trades` aggregate.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailyTradeRow {
    pub trade_date: NaiveDate,
    pub trades: i32,
    pub wins: i32,
    pub volume: Decimal,
    pub realized_profit: Decimal,
}

/// Aggregate performance over all closed positions.
#[derive(Debug, Clone)]
pub struct PerformanceSummary {
    /// Closed trade count.
    pub trades: u64,
    /// Trades closed with positive realized profit.
    pub wins: u64,
    /// Total cost closed out.
    pub volume: Decimal,
    /// Cumulative realized profit.
    pub realized_profit: Decimal,
}

impl PerformanceSummary {
    /// Win rate between 0.0 and 1.0.
    #[must_use]
    pub fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            return 0.0;
        }
        self.wins as f64 / self.trades as f64
    }
}
