//! Background reconciliation of open positions against venue state.
//!
//! The monitor periodically re-derives each open position's health directly
//! from the venues instead of trusting what was recorded at open time:
//! a missing market, a fill size the venue no longer agrees with, or legs
//! resolving to different outcomes all surface as [`Discrepancy`] events.
//! Unrealized P&L is recomputed every cycle from live bids on both legs.
//!
//! The monitor is observation-only. It never closes a position, cancels an
//! order, or mutates any state; remediation is routed to operators through
//! the event bus.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use arb_exec_core::{
    Discrepancy, DiscrepancyKind, EventBus, Market, MonitorConfig, MonitorEvent, Position,
    PositionPnl, PositionStore, Severity, VenueClient,
};

/// Everything the monitor derived about one position in one sweep.
#[derive(Debug)]
struct PositionReport {
    discrepancies: Vec<Discrepancy>,
    pnl: Option<PositionPnl>,
}

/// Periodic sweep over open positions, reconciling assumed state against
/// observed venue state.
pub struct PositionMonitor {
    venues: HashMap<String, Arc<dyn VenueClient>>,
    store: Arc<dyn PositionStore>,
    events: EventBus,
    config: MonitorConfig,
    interval: Mutex<Duration>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PositionMonitor {
    /// Creates a monitor with no venues registered.
    pub fn new(store: Arc<dyn PositionStore>, events: EventBus, config: MonitorConfig) -> Self {
        let interval = config.interval;
        Self {
            venues: HashMap::new(),
            store,
            events,
            config,
            interval: Mutex::new(interval),
            shutdown: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Registers a venue client under its own name.
    pub fn register_venue(&mut self, venue: Arc<dyn VenueClient>) {
        self.venues.insert(venue.name().to_string(), venue);
    }

    /// Starts the periodic sweep, replacing any previous timer.
    pub async fn start(self: &Arc<Self>) {
        self.stop().await;

        let (tx, mut rx) = watch::channel(false);
        *self.shutdown.lock() = Some(tx);

        let interval = *self.interval.lock();
        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        monitor.sweep().await;
                    }
                    _ = rx.changed() => {
                        break;
                    }
                }
            }
            monitor.events.publish_monitor(MonitorEvent::Stopped);
        });
        *self.handle.lock() = Some(handle);

        self.events.publish_monitor(MonitorEvent::Started {
            interval_secs: interval.as_secs(),
        });
    }

    /// Stops the periodic sweep and waits for the timer task to exit.
    pub async fn stop(&self) {
        let shutdown = self.shutdown.lock().take();
        if let Some(tx) = shutdown {
            let _ = tx.send(true);
        }
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Changes the sweep interval, restarting the timer if it was running.
    /// The previous timer is always torn down first; two timers never run.
    pub async fn set_interval(self: &Arc<Self>, interval: Duration) {
        let was_running = self.handle.lock().is_some();
        *self.interval.lock() = interval;
        if was_running {
            self.start().await;
        }
    }

    /// Runs one sweep over a snapshot of open positions.
    ///
    /// Each position is checked in isolation: one position's failure is
    /// reported and skipped, never aborting the rest of the sweep.
    pub async fn sweep(&self) {
        let positions = match self.store.open_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                warn!(error = %e, "monitor could not snapshot open positions");
                self.events.publish_monitor(MonitorEvent::Error {
                    position_id: None,
                    message: e.to_string(),
                });
                return;
            }
        };

        debug!(positions = positions.len(), "monitor sweep started");

        for position in &positions {
            match self.check_position(position).await {
                Ok(report) => {
                    for discrepancy in report.discrepancies {
                        warn!(
                            position_id = %discrepancy.position_id,
                            kind = discrepancy.kind.as_str(),
                            severity = ?discrepancy.severity,
                            detail = %discrepancy.detail,
                            "discrepancy detected"
                        );
                        let critical = discrepancy.severity == Severity::Critical;
                        self.events
                            .publish_monitor(MonitorEvent::DiscrepancyDetected(discrepancy.clone()));
                        if critical {
                            self.events
                                .publish_monitor(MonitorEvent::CriticalDiscrepancy(discrepancy));
                        }
                    }
                    if let Some(pnl) = report.pnl {
                        self.events.publish_monitor(MonitorEvent::PnlUpdated(pnl));
                    }
                }
                Err(e) => {
                    warn!(position_id = %position.id, error = %e, "position check failed");
                    self.events.publish_monitor(MonitorEvent::Error {
                        position_id: Some(position.id),
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    fn venue(&self, name: &str) -> Result<&Arc<dyn VenueClient>> {
        self.venues
            .get(name)
            .ok_or_else(|| anyhow!("unknown venue '{name}'"))
    }

    /// Re-derives one position's health from the venues.
    async fn check_position(&self, position: &Position) -> Result<PositionReport> {
        let venue1 = self.venue(&position.leg1.venue)?;
        let venue2 = self.venue(&position.leg2.venue)?;

        let (market1, market2) = tokio::join!(
            venue1.market(&position.leg1.market_id),
            venue2.market(&position.leg2.market_id),
        );
        let market1 = market1.context("leg 1 market fetch failed")?;
        let market2 = market2.context("leg 2 market fetch failed")?;

        let mut discrepancies = Vec::new();

        for (leg, market) in [(&position.leg1, &market1), (&position.leg2, &market2)] {
            if market.is_none() {
                discrepancies.push(Discrepancy {
                    position_id: position.id,
                    kind: DiscrepancyKind::MissingLeg,
                    severity: Severity::Critical,
                    detail: format!(
                        "{} no longer returns market {}",
                        leg.venue, leg.market_id
                    ),
                    detected_at: Utc::now(),
                });
            }
        }
        let (Some(market1), Some(market2)) = (market1, market2) else {
            // Without both markets there is nothing further to verify.
            return Ok(PositionReport {
                discrepancies,
                pnl: None,
            });
        };

        // Venue-reported fill sizes, not cached assumptions.
        let (status1, status2) = tokio::join!(
            venue1.order_status(&position.leg1.order_id),
            venue2.order_status(&position.leg2.order_id),
        );
        let status1 = status1.context("leg 1 order status failed")?;
        let status2 = status2.context("leg 2 order status failed")?;

        for (leg, status) in [(&position.leg1, &status1), (&position.leg2, &status2)] {
            let divergence_pct =
                (status.filled_size - position.size).abs() / position.size * Decimal::ONE_HUNDRED;
            if divergence_pct > self.config.size_tolerance_pct {
                discrepancies.push(Discrepancy {
                    position_id: position.id,
                    kind: DiscrepancyKind::SizeMismatch,
                    severity: Severity::High,
                    detail: format!(
                        "{} reports {} filled for order {}, position holds {}",
                        leg.venue, status.filled_size, leg.order_id, position.size
                    ),
                    detected_at: Utc::now(),
                });
            }
        }

        if let Some(discrepancy) = self.check_resolution(position, &market1, &market2) {
            discrepancies.push(discrepancy);
        }

        let pnl = self.compute_pnl(position, venue1, venue2).await?;

        Ok(PositionReport {
            discrepancies,
            pnl: Some(pnl),
        })
    }

    /// Compares the resolution state of the two legs.
    fn check_resolution(
        &self,
        position: &Position,
        market1: &Market,
        market2: &Market,
    ) -> Option<Discrepancy> {
        match (market1.resolved_outcome, market2.resolved_outcome) {
            (Some(outcome1), Some(outcome2)) if outcome1 != outcome2 => Some(Discrepancy {
                position_id: position.id,
                kind: DiscrepancyKind::ResolutionDivergence,
                severity: Severity::Critical,
                detail: format!(
                    "legs resolved to different outcomes: {} reports {outcome1}, {} reports {outcome2}",
                    position.leg1.venue, position.leg2.venue
                ),
                detected_at: Utc::now(),
            }),
            (Some(outcome), None) => Some(self.premature(position, &position.leg1.venue, outcome)),
            (None, Some(outcome)) => Some(self.premature(position, &position.leg2.venue, outcome)),
            _ => None,
        }
    }

    fn premature(
        &self,
        position: &Position,
        resolved_venue: &str,
        outcome: arb_exec_core::Outcome,
    ) -> Discrepancy {
        Discrepancy {
            position_id: position.id,
            kind: DiscrepancyKind::PrematureResolution,
            severity: Severity::Medium,
            detail: format!(
                "{resolved_venue} resolved {outcome} while the sibling leg is still open"
            ),
            detected_at: Utc::now(),
        }
    }

    /// Marks the position to market from live bids on both legs.
    async fn compute_pnl(
        &self,
        position: &Position,
        venue1: &Arc<dyn VenueClient>,
        venue2: &Arc<dyn VenueClient>,
    ) -> Result<PositionPnl> {
        let (quote1, quote2) = tokio::join!(
            venue1.quote(&position.leg1.market_id),
            venue2.quote(&position.leg2.market_id),
        );
        let quote1 = quote1.context("leg 1 quote failed")?;
        let quote2 = quote2.context("leg 2 quote failed")?;

        let market_value =
            position.size * (quote1.bid(position.leg1.side) + quote2.bid(position.leg2.side));

        Ok(PositionPnl {
            position_id: position.id,
            unrealized: market_value - position.total_cost,
            realized: Decimal::ZERO,
            total_cost: position.total_cost,
            market_value,
            expected_payout: position.expected_payout,
            computed_at: Utc::now(),
        })
    }
}
