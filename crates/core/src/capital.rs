//! Capital accounting for the position tracker.
//!
//! [`CapitalStatus`] is the single globally shared record of how the trading
//! bankroll is split between available and allocated capital. The tracker is
//! its sole writer; every open/close goes through the pure transitions here
//! so the invariant `allocated + available <= total` is enforced in exactly
//! one place, inside the tracker's database transaction.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from capital transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapitalError {
    /// Not enough free capital to cover a position open.
    #[error("insufficient available capital: requested ${requested}, available ${available}")]
    InsufficientAvailable {
        /// Cost of the position being opened.
        requested: Decimal,
        /// Free capital at the time of the attempt.
        available: Decimal,
    },

    /// A close referenced more allocated capital than exists.
    #[error("cannot release ${requested} from ${allocated} allocated")]
    OverRelease {
        /// Cost being released.
        requested: Decimal,
        /// Allocated capital at the time of the attempt.
        allocated: Decimal,
    },

    /// A close was attempted with no open positions on record.
    #[error("no open positions to close")]
    NoOpenPositions,

    /// A transition was given a non-positive cost or negative payout.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

/// The capital allocation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalStatus {
    /// Total bankroll.
    pub total: Decimal,
    /// Capital free for new positions.
    pub available: Decimal,
    /// Capital committed to open positions.
    pub allocated: Decimal,
    /// Capital set aside by operators, outside automatic allocation.
    pub reserved: Decimal,
    /// Number of open positions.
    pub open_positions: u32,
    /// Cumulative realized profit across all closed positions.
    pub realized_profit: Decimal,
    /// Cumulative count of closed trades.
    pub trade_count: u64,
}

impl CapitalStatus {
    /// Creates a fresh record with the full bankroll available.
    #[must_use]
    pub fn new(total: Decimal) -> Self {
        Self {
            total,
            available: total,
            allocated: Decimal::ZERO,
            reserved: Decimal::ZERO,
            open_positions: 0,
            realized_profit: Decimal::ZERO,
            trade_count: 0,
        }
    }

    /// Returns true while `allocated + available <= total` holds.
    #[must_use]
    pub fn invariant_holds(&self) -> bool {
        self.allocated + self.available <= self.total
    }

    /// Transition for opening a position of `cost` dollars.
    ///
    /// Moves `cost` from available to allocated and increments the open
    /// count. Fails without side effects when free capital is insufficient.
    ///
    /// # Errors
    /// Returns `CapitalError` when `cost` is not positive or exceeds
    /// available capital.
    pub fn apply_open(&self, cost: Decimal) -> Result<Self, CapitalError> {
        if cost <= Decimal::ZERO {
            return Err(CapitalError::InvalidAmount(format!(
                "position cost must be positive, got {cost}"
            )));
        }
        if cost > self.available {
            return Err(CapitalError::InsufficientAvailable {
                requested: cost,
                available: self.available,
            });
        }

        Ok(Self {
            available: self.available - cost,
            allocated: self.allocated + cost,
            open_positions: self.open_positions + 1,
            ..self.clone()
        })
    }

    /// Transition for closing a position opened at `cost` with a realized
    /// `payout`.
    ///
    /// Releases `cost` back from allocated, credits the payout to available,
    /// grows total and cumulative profit by `payout - cost`, decrements the
    /// open count, and bumps the trade count. The profit may be negative for
    /// a position that resolved badly.
    ///
    /// # Errors
    /// Returns `CapitalError` when amounts are invalid or no position is
    /// open.
    pub fn apply_close(&self, cost: Decimal, payout: Decimal) -> Result<Self, CapitalError> {
        if cost <= Decimal::ZERO {
            return Err(CapitalError::InvalidAmount(format!(
                "position cost must be positive, got {cost}"
            )));
        }
        if payout < Decimal::ZERO {
            return Err(CapitalError::InvalidAmount(format!(
                "payout cannot be negative, got {payout}"
            )));
        }
        if cost > self.allocated {
            return Err(CapitalError::OverRelease {
                requested: cost,
                allocated: self.allocated,
            });
        }
        if self.open_positions == 0 {
            return Err(CapitalError::NoOpenPositions);
        }

        let profit = payout - cost;

        Ok(Self {
            total: self.total + profit,
            available: self.available + payout,
            allocated: self.allocated - cost,
            open_positions: self.open_positions - 1,
            realized_profit: self.realized_profit + profit,
            trade_count: self.trade_count + 1,
            ..self.clone()
        })
    }
}
