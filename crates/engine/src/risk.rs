//! Risk gating for execution attempts.
//!
//! [`RiskManager::validate`] runs an ordered battery of checks against a
//! proposed trade before any remote call is made. Checks may shrink the
//! requested size to fit a limit instead of rejecting outright; they never
//! raise it. The decision is a value, not an error: business-rule failures
//! come back as blockers, and only infrastructure failures (an unreachable
//! store) propagate as errors.
//!
//! [`RiskManager::enforce_risk_limits`] is a separate periodic sweep that
//! re-derives global-state violations the per-trade gate cannot see.

use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use arb_exec_core::{Opportunity, PositionStore, RiskConfig};

use crate::breaker::VenueCircuitBreaker;

// =============================================================================
// Decision
// =============================================================================

/// Outcome of validating one proposed trade.
#[derive(Debug, Clone)]
pub struct RiskDecision {
    /// True iff no blocker fired.
    pub approved: bool,
    /// Present when any check shrank the size; callers must use it instead
    /// of the originally requested size.
    pub adjusted_size: Option<Decimal>,
    /// Explanatory notes for every adjustment made.
    pub reasons: Vec<String>,
    /// Conditions worth operator attention that did not block the trade.
    pub warnings: Vec<String>,
    /// Conditions that blocked the trade. All blockers are reported, not
    /// just the first.
    pub blockers: Vec<String>,
}

impl RiskDecision {
    /// Returns the size to actually execute for a given request.
    #[must_use]
    pub fn effective_size(&self, requested: Decimal) -> Decimal {
        self.adjusted_size.unwrap_or(requested)
    }
}

/// A violation found by the global risk sweep.
#[derive(Debug, Clone, Error)]
pub enum RiskViolation {
    /// Allocated capital exceeds the total bankroll.
    #[error("capital over-allocated: ${allocated} allocated against ${total} total")]
    CapitalOverAllocated {
        /// Allocated capital.
        allocated: Decimal,
        /// Total bankroll.
        total: Decimal,
    },

    /// More positions open than the configured ceiling.
    #[error("open positions over limit: {count} open, ceiling {max}")]
    OpenPositionsOverLimit {
        /// Open position count.
        count: usize,
        /// Configured ceiling.
        max: u32,
    },

    /// Capital deployed today exceeds the daily ceiling.
    #[error("daily deployment exceeded: ${deployed} deployed, ceiling ${max}")]
    DailyDeploymentExceeded {
        /// Deployed today.
        deployed: Decimal,
        /// Configured ceiling.
        max: Decimal,
    },

    /// A position has been open long enough to suggest a stuck leg.
    #[error("position {position_id} open for {age_days} days")]
    StalePosition {
        /// The stale position.
        position_id: Uuid,
        /// Days since it was opened.
        age_days: i64,
    },
}

// =============================================================================
// Risk Manager
// =============================================================================

/// Validates proposed trades against capital, exposure, and liquidity
/// limits.
pub struct RiskManager {
    config: RiskConfig,
    store: Arc<dyn PositionStore>,
    breaker: Arc<VenueCircuitBreaker>,
}

impl RiskManager {
    /// Creates a risk manager.
    pub fn new(
        config: RiskConfig,
        store: Arc<dyn PositionStore>,
        breaker: Arc<VenueCircuitBreaker>,
    ) -> Self {
        Self {
            config,
            store,
            breaker,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Estimates slippage in percent for `size` against `liquidity` using
    /// the quadratic impact model.
    #[must_use]
    pub fn estimate_slippage_pct(&self, size: Decimal, liquidity: Decimal) -> Decimal {
        let ratio = size / liquidity;
        self.config.base_slippage_pct
            + self.config.spread_cost_pct
            + self.config.impact_coefficient * ratio * ratio
    }

    /// Validates a proposed trade, possibly shrinking its size.
    ///
    /// Performs no side effects and is safe to call speculatively; the
    /// store is only read.
    ///
    /// # Errors
    /// Returns an error only for infrastructure failures (store
    /// unavailable), never for business-rule rejections.
    pub async fn validate(
        &self,
        opportunity: &Opportunity,
        requested_size: Decimal,
    ) -> Result<RiskDecision> {
        let mut size = requested_size;
        let mut reasons = Vec::new();
        let mut warnings = Vec::new();
        let mut blockers = Vec::new();

        // 1. Minimum net profit.
        if opportunity.net_profit_pct < self.config.min_net_profit_pct {
            blockers.push(format!(
                "net profit {}% below minimum {}%",
                opportunity.net_profit_pct, self.config.min_net_profit_pct
            ));
        }

        // 2. Absolute position-size bounds.
        if size > self.config.max_position_size {
            size = self.config.max_position_size;
            let note = format!(
                "size reduced from {requested_size} to maximum position size {size}"
            );
            reasons.push(note.clone());
            warnings.push(note);
        }
        if size < self.config.min_position_size {
            blockers.push(format!(
                "size {size} below minimum position size {}",
                self.config.min_position_size
            ));
        }

        // 3. Venue circuit breaker.
        for venue in [&opportunity.leg1.venue, &opportunity.leg2.venue] {
            if let Err(e) = self.breaker.can_trade(venue) {
                blockers.push(e.to_string());
            }
        }

        // 4. Available capital.
        let capital = self.store.capital_status().await?;
        if capital.available <= Decimal::ZERO {
            blockers.push("no available capital".to_string());
        } else if size > capital.available {
            size = capital.available;
            let note = format!(
                "size reduced to available capital ${}",
                capital.available
            );
            reasons.push(note.clone());
            warnings.push(note);
            if size < self.config.min_position_size {
                blockers.push(format!(
                    "available capital ${size} below minimum position size {}",
                    self.config.min_position_size
                ));
            }
        }

        // 5. Open-position-count ceiling.
        let open_count = capital.open_positions;
        if open_count >= self.config.max_open_positions {
            blockers.push(format!(
                "open position ceiling reached: {open_count} of {}",
                self.config.max_open_positions
            ));
        } else if open_count * 5 >= self.config.max_open_positions * 4 {
            warnings.push(format!(
                "open positions at {open_count} of {}",
                self.config.max_open_positions
            ));
        }

        // 6. Rolling daily-deployment ceiling.
        let deployed = self
            .store
            .daily_deployment(Utc::now().date_naive())
            .await?;
        let remaining = self.config.max_daily_deployment - deployed;
        if remaining <= Decimal::ZERO {
            blockers.push(format!(
                "daily deployment ceiling ${} reached",
                self.config.max_daily_deployment
            ));
        } else if size > remaining {
            size = remaining;
            let note = format!("size reduced to remaining daily budget ${remaining}");
            reasons.push(note.clone());
            warnings.push(note);
            if size < self.config.min_position_size {
                blockers.push(format!(
                    "remaining daily budget ${remaining} below minimum position size {}",
                    self.config.min_position_size
                ));
            }
        }

        // 7. Liquidity-derived slippage estimate.
        let liquidity = opportunity
            .leg1
            .liquidity
            .min(opportunity.leg2.liquidity);
        if liquidity <= Decimal::ZERO {
            blockers.push("no liquidity on at least one leg".to_string());
        } else {
            let slippage = self.estimate_slippage_pct(size, liquidity);
            if slippage > self.config.slippage_tolerance_pct {
                blockers.push(format!(
                    "estimated slippage {slippage:.2}% exceeds tolerance {}%",
                    self.config.slippage_tolerance_pct
                ));
            } else if slippage * Decimal::from(10)
                > self.config.slippage_tolerance_pct * Decimal::from(7)
            {
                warnings.push(format!(
                    "estimated slippage {slippage:.2}% approaching tolerance {}%",
                    self.config.slippage_tolerance_pct
                ));
            }
        }

        // 8. Resolution alignment.
        if let Some(alignment) = &opportunity.alignment {
            if !alignment.tradeable {
                blockers.push(format!(
                    "resolution alignment not tradeable: {}",
                    alignment.detail
                ));
            } else if alignment.risky {
                warnings.push(format!("resolution alignment risky: {}", alignment.detail));
            }
        }

        let approved = blockers.is_empty();
        let adjusted_size = (size != requested_size).then_some(size);

        debug!(
            opportunity_id = %opportunity.id,
            approved = approved,
            requested = %requested_size,
            adjusted = ?adjusted_size,
            blockers = blockers.len(),
            warnings = warnings.len(),
            "risk validation"
        );

        Ok(RiskDecision {
            approved,
            adjusted_size,
            reasons,
            warnings,
            blockers,
        })
    }

    /// Re-derives global-state violations that per-trade checks cannot see.
    ///
    /// Reports only; remediation is an operational action.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    pub async fn enforce_risk_limits(&self) -> Result<Vec<RiskViolation>> {
        let mut violations = Vec::new();

        let capital = self.store.capital_status().await?;
        if capital.allocated > capital.total {
            violations.push(RiskViolation::CapitalOverAllocated {
                allocated: capital.allocated,
                total: capital.total,
            });
        }

        let open = self.store.open_positions().await?;
        if open.len() > self.config.max_open_positions as usize {
            violations.push(RiskViolation::OpenPositionsOverLimit {
                count: open.len(),
                max: self.config.max_open_positions,
            });
        }

        let deployed = self
            .store
            .daily_deployment(Utc::now().date_naive())
            .await?;
        if deployed > self.config.max_daily_deployment {
            violations.push(RiskViolation::DailyDeploymentExceeded {
                deployed,
                max: self.config.max_daily_deployment,
            });
        }

        for position in &open {
            let age_days = position.age().num_days();
            if age_days > self.config.stale_position_days {
                violations.push(RiskViolation::StalePosition {
                    position_id: position.id,
                    age_days,
                });
            }
        }

        Ok(violations)
    }
}
