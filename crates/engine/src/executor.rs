//! Two-phase execution of arbitrage opportunities across two venues.
//!
//! Each attempt walks the state machine `prepare -> commit ->
//! {completed | rollback}`:
//!
//! - **Prepare** refetches both quotes concurrently, rejects them when the
//!   round trip blows the freshness budget, recomputes the edge from the
//!   fresh asks (never from the opportunity's numbers), and builds an
//!   immutable plan with one limit order per leg.
//! - **Commit** submits both leg orders concurrently and races the pair
//!   against the plan's timeout. Success requires both legs filled.
//! - **Rollback** best-effort cancels every order id that came back,
//!   including a filled leg (venues no-op on a filled cancel). There is no
//!   compensating hedge for a lone filled leg; a hedging component can
//!   subscribe to the failure events instead.
//!
//! Nothing here retries: retrying at a stale price is unsafe, so a retry
//! must be a brand-new `execute` call with a freshly validated opportunity.

use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use arb_exec_core::{
    EngineConfig, EventBus, ExecutionEvent, ExecutionPhase, ExecutionPlan, ExecutionRecord,
    ExecutionResult, ExecutionStatus, Opportunity, OpportunityStatus, OrderAck, OrderRequest,
    Position, PositionLeg, PositionStore, VenueClient, VenueError,
};

use crate::breaker::VenueCircuitBreaker;

/// Hard engine errors that are not normal attempt failures.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An opportunity referenced a venue no client was registered for.
    #[error("unknown venue '{0}'")]
    UnknownVenue(String),
}

/// Outcome of one leg's order placement during commit.
#[derive(Debug)]
struct LegOutcome {
    ack: Option<OrderAck>,
    failure: Option<String>,
}

impl LegOutcome {
    fn from_placement(
        venue: &str,
        result: Result<Result<OrderAck, VenueError>, tokio::time::error::Elapsed>,
        breaker: &VenueCircuitBreaker,
    ) -> Self {
        match result {
            Ok(Ok(ack)) => {
                breaker.record_success(venue);
                let failure = (!ack.status.is_filled())
                    .then(|| format!("{venue} order not filled: {:?}", ack.status));
                Self {
                    ack: Some(ack),
                    failure,
                }
            }
            Ok(Err(e)) => {
                breaker.record_failure(venue);
                Self {
                    ack: None,
                    failure: Some(format!("{venue} order failed: {e}")),
                }
            }
            Err(_) => {
                breaker.record_failure(venue);
                Self {
                    ack: None,
                    failure: Some(format!("{venue} order timed out")),
                }
            }
        }
    }

    fn filled(&self) -> bool {
        self.ack
            .as_ref()
            .map_or(false, |ack| ack.status.is_filled())
    }

    fn order_id(&self) -> Option<String> {
        self.ack.as_ref().map(|ack| ack.order_id.clone())
    }
}

/// Coordinates two-phase execution against two venue clients and hands
/// successful attempts to the position tracker.
pub struct ExecutionEngine {
    venues: HashMap<String, Arc<dyn VenueClient>>,
    store: Arc<dyn PositionStore>,
    breaker: Arc<VenueCircuitBreaker>,
    events: EventBus,
    config: EngineConfig,
}

impl ExecutionEngine {
    /// Creates an engine with no venues registered.
    pub fn new(
        store: Arc<dyn PositionStore>,
        breaker: Arc<VenueCircuitBreaker>,
        events: EventBus,
        config: EngineConfig,
    ) -> Self {
        Self {
            venues: HashMap::new(),
            store,
            breaker,
            events,
            config,
        }
    }

    /// Registers a venue client under its own name.
    pub fn register_venue(&mut self, venue: Arc<dyn VenueClient>) {
        self.venues.insert(venue.name().to_string(), venue);
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn venue(&self, name: &str) -> Result<Arc<dyn VenueClient>, EngineError> {
        self.venues
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownVenue(name.to_string()))
    }

    /// Executes an approved opportunity at `approved_size`.
    ///
    /// Returns the structured attempt result for every normal failure path;
    /// only infrastructure problems (unknown venue, store unavailable)
    /// propagate as errors. Never retries.
    ///
    /// # Errors
    /// Returns an error if a referenced venue is not registered or the
    /// position store fails.
    pub async fn execute(
        &self,
        opportunity: &Opportunity,
        approved_size: Decimal,
    ) -> Result<ExecutionResult> {
        let venue1 = self.venue(&opportunity.leg1.venue)?;
        let venue2 = self.venue(&opportunity.leg2.venue)?;

        let execution_id = Uuid::new_v4();
        let mut record = ExecutionRecord::pending(execution_id, opportunity.id, approved_size);
        self.store.record_execution(&record).await?;
        self.store
            .update_opportunity_status(opportunity.id, OpportunityStatus::Executing)
            .await?;
        self.events.publish_execution(ExecutionEvent::Started {
            execution_id,
            opportunity_id: opportunity.id,
            requested_size: approved_size,
            timestamp: Utc::now(),
        });

        info!(
            execution_id = %execution_id,
            opportunity_id = %opportunity.id,
            leg1 = %opportunity.leg1.venue,
            leg2 = %opportunity.leg2.venue,
            size = %approved_size,
            "execution started"
        );

        // ---- Prepare ----

        if opportunity.is_expired() {
            return self
                .fail_before_commit(
                    &mut record,
                    opportunity,
                    OpportunityStatus::Expired,
                    "opportunity expired".to_string(),
                )
                .await;
        }

        let plan = match self
            .prepare(opportunity, approved_size, &venue1, &venue2)
            .await
        {
            Ok(plan) => plan,
            Err(reason) => {
                return self
                    .fail_before_commit(&mut record, opportunity, OpportunityStatus::Failed, reason)
                    .await;
            }
        };

        self.events
            .publish_execution(ExecutionEvent::PrepareCompleted {
                execution_id,
                total_cost: plan.total_cost,
                expected_profit: plan.expected_profit,
                timestamp: Utc::now(),
            });

        info!(
            execution_id = %execution_id,
            total_cost = %plan.total_cost,
            expected_profit = %plan.expected_profit,
            "prepare completed, committing both legs"
        );

        // ---- Commit ----
        //
        // Both placements start together and share one timeout budget;
        // sequential submission would widen the window for the second leg's
        // price to move.

        record.phase = ExecutionPhase::Commit;
        let (placed1, placed2) = tokio::join!(
            timeout(plan.timeout, venue1.place_order(&plan.leg1.order)),
            timeout(plan.timeout, venue2.place_order(&plan.leg2.order)),
        );
        let leg1 = LegOutcome::from_placement(&plan.leg1.venue, placed1, &self.breaker);
        let leg2 = LegOutcome::from_placement(&plan.leg2.venue, placed2, &self.breaker);

        record.leg1_order_id = leg1.order_id();
        record.leg2_order_id = leg2.order_id();

        match (&leg1.ack, &leg2.ack) {
            (Some(ack1), Some(ack2)) if leg1.filled() && leg2.filled() => {
                let ack1 = ack1.clone();
                let ack2 = ack2.clone();
                self.complete(&mut record, opportunity, &plan, &ack1, &ack2)
                    .await
            }
            _ => {
                let reason = [leg1.failure.as_deref(), leg2.failure.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join("; ");
                self.rollback(&mut record, opportunity, &plan, &leg1, &leg2, reason)
                    .await
            }
        }
    }

    /// Fetches fresh quotes and builds the plan, or explains why not.
    async fn prepare(
        &self,
        opportunity: &Opportunity,
        size: Decimal,
        venue1: &Arc<dyn VenueClient>,
        venue2: &Arc<dyn VenueClient>,
    ) -> Result<ExecutionPlan, String> {
        let leg1 = &opportunity.leg1;
        let leg2 = &opportunity.leg2;

        let started = tokio::time::Instant::now();
        let (quote1, quote2) = tokio::join!(
            timeout(self.config.venue_call_timeout, venue1.quote(&leg1.market_id)),
            timeout(self.config.venue_call_timeout, venue2.quote(&leg2.market_id)),
        );

        let quote1 = match quote1 {
            Ok(Ok(quote)) => {
                self.breaker.record_success(&leg1.venue);
                quote
            }
            Ok(Err(e)) => {
                self.breaker.record_failure(&leg1.venue);
                return Err(format!("{} quote failed: {e}", leg1.venue));
            }
            Err(_) => {
                self.breaker.record_failure(&leg1.venue);
                return Err(format!("{} quote timed out", leg1.venue));
            }
        };
        let quote2 = match quote2 {
            Ok(Ok(quote)) => {
                self.breaker.record_success(&leg2.venue);
                quote
            }
            Ok(Err(e)) => {
                self.breaker.record_failure(&leg2.venue);
                return Err(format!("{} quote failed: {e}", leg2.venue));
            }
            Err(_) => {
                self.breaker.record_failure(&leg2.venue);
                return Err(format!("{} quote timed out", leg2.venue));
            }
        };

        // A slow quote is no quote: prices may have moved during the fetch.
        let elapsed = started.elapsed();
        if elapsed > self.config.quote_freshness_budget {
            return Err(format!(
                "quotes stale: {}ms round trip exceeds {}ms budget",
                elapsed.as_millis(),
                self.config.quote_freshness_budget.as_millis()
            ));
        }

        let ask1 = quote1.ask(leg1.side);
        let ask2 = quote2.ask(leg2.side);
        let unit_cost = ask1 + ask2;
        let unit_profit = Decimal::ONE - unit_cost;
        if unit_profit <= Decimal::ZERO {
            return Err(format!(
                "no edge at fresh quotes: combined ask {unit_cost}"
            ));
        }

        let live_liquidity = quote1.liquidity(leg1.side).min(quote2.liquidity(leg2.side));
        if size > live_liquidity {
            return Err(format!(
                "size {size} exceeds live liquidity {live_liquidity}"
            ));
        }

        Ok(ExecutionPlan {
            leg1: arb_exec_core::PlannedLeg {
                venue: leg1.venue.clone(),
                order: OrderRequest::limit_buy(&leg1.market_id, leg1.side, size, ask1),
            },
            leg2: arb_exec_core::PlannedLeg {
                venue: leg2.venue.clone(),
                order: OrderRequest::limit_buy(&leg2.market_id, leg2.side, size, ask2),
            },
            total_cost: size * unit_cost,
            expected_profit: size * unit_profit,
            timeout: self.config.execution_timeout,
        })
    }

    /// Finalizes a prepare-phase failure.
    async fn fail_before_commit(
        &self,
        record: &mut ExecutionRecord,
        opportunity: &Opportunity,
        opportunity_status: OpportunityStatus,
        reason: String,
    ) -> Result<ExecutionResult> {
        warn!(
            execution_id = %record.id,
            reason = %reason,
            "prepare failed, execution never reached commit"
        );

        record.status = ExecutionStatus::Failed;
        record.phase = ExecutionPhase::Prepare;
        record.error = Some(reason.clone());
        record.finished_at = Some(Utc::now());
        self.store.update_execution(record).await?;
        self.store
            .update_opportunity_status(opportunity.id, opportunity_status)
            .await?;

        self.events.publish_execution(ExecutionEvent::Failed {
            execution_id: record.id,
            phase: ExecutionPhase::Prepare,
            reason: reason.clone(),
            timestamp: Utc::now(),
        });

        Ok(ExecutionResult::failure(
            record.id,
            ExecutionPhase::Prepare,
            reason,
        ))
    }

    /// Finalizes a fully filled attempt: records it and opens the position.
    async fn complete(
        &self,
        record: &mut ExecutionRecord,
        opportunity: &Opportunity,
        plan: &ExecutionPlan,
        ack1: &OrderAck,
        ack2: &OrderAck,
    ) -> Result<ExecutionResult> {
        // A partially hedged arbitrage has no value beyond the smaller leg.
        let actual_size = ack1.filled_size.min(ack2.filled_size);
        let actual_cost = ack1.fill_cost() + ack2.fill_cost();
        let actual_profit = actual_size - actual_cost;

        record.status = ExecutionStatus::Completed;
        record.phase = ExecutionPhase::Completed;
        record.actual_size = actual_size;
        record.actual_cost = actual_cost;
        record.actual_profit = actual_profit;
        record.finished_at = Some(Utc::now());
        self.store.update_execution(record).await?;

        let position = Position {
            id: Uuid::new_v4(),
            execution_id: record.id,
            leg1: PositionLeg {
                venue: plan.leg1.venue.clone(),
                market_id: plan.leg1.order.market_id.clone(),
                side: plan.leg1.order.side,
                entry_price: ack1.filled_price,
                order_id: ack1.order_id.clone(),
            },
            leg2: PositionLeg {
                venue: plan.leg2.venue.clone(),
                market_id: plan.leg2.order.market_id.clone(),
                side: plan.leg2.order.side,
                entry_price: ack2.filled_price,
                order_id: ack2.order_id.clone(),
            },
            size: actual_size,
            total_cost: actual_cost,
            expected_payout: actual_size,
            expected_profit: actual_profit,
            status: arb_exec_core::PositionStatus::Open,
            opened_at: Utc::now(),
            resolved_at: None,
        };
        let position_id = position.id;
        let capital = self.store.open_position(&position).await?;
        self.store
            .update_opportunity_status(opportunity.id, OpportunityStatus::Executed)
            .await?;

        self.events.publish_execution(ExecutionEvent::Completed {
            execution_id: record.id,
            position_id,
            actual_size,
            actual_profit,
            timestamp: Utc::now(),
        });

        info!(
            execution_id = %record.id,
            position_id = %position_id,
            actual_size = %actual_size,
            actual_cost = %actual_cost,
            actual_profit = %actual_profit,
            capital_available = %capital.available,
            "execution completed, position opened"
        );

        Ok(ExecutionResult {
            execution_id: record.id,
            success: true,
            leg1_order_id: Some(ack1.order_id.clone()),
            leg2_order_id: Some(ack2.order_id.clone()),
            actual_size,
            actual_cost,
            actual_profit,
            phase: ExecutionPhase::Completed,
            error: None,
            rollback_reason: None,
        })
    }

    /// Unwinds a failed commit by cancelling whatever orders came back.
    ///
    /// Cancellation failures are logged and reported in the rollback event
    /// but never change the attempt's failure status, and nothing here
    /// places a compensating hedge order.
    async fn rollback(
        &self,
        record: &mut ExecutionRecord,
        opportunity: &Opportunity,
        plan: &ExecutionPlan,
        leg1: &LegOutcome,
        leg2: &LegOutcome,
        reason: String,
    ) -> Result<ExecutionResult> {
        warn!(
            execution_id = %record.id,
            reason = %reason,
            "commit failed, rolling back"
        );

        let mut cancelled = Vec::new();
        for (venue_name, outcome) in [(&plan.leg1.venue, leg1), (&plan.leg2.venue, leg2)] {
            let Some(order_id) = outcome.order_id() else {
                continue;
            };
            // A filled leg is cancelled too; venues no-op on a filled cancel.
            match self.venue(venue_name) {
                Ok(venue) => {
                    match timeout(
                        self.config.venue_call_timeout,
                        venue.cancel_order(&order_id),
                    )
                    .await
                    {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            warn!(
                                execution_id = %record.id,
                                venue = %venue_name,
                                order_id = %order_id,
                                error = %e,
                                "rollback cancel failed"
                            );
                        }
                        Err(_) => {
                            warn!(
                                execution_id = %record.id,
                                venue = %venue_name,
                                order_id = %order_id,
                                "rollback cancel timed out"
                            );
                        }
                    }
                    cancelled.push(order_id);
                }
                Err(e) => {
                    warn!(execution_id = %record.id, error = %e, "rollback venue lookup failed");
                }
            }
        }

        self.events
            .publish_execution(ExecutionEvent::RollbackCompleted {
                execution_id: record.id,
                cancelled_orders: cancelled,
                reason: reason.clone(),
                timestamp: Utc::now(),
            });

        record.status = ExecutionStatus::RolledBack;
        record.phase = ExecutionPhase::Rollback;
        record.error = Some(reason.clone());
        record.rollback_reason = Some(reason.clone());
        record.finished_at = Some(Utc::now());
        self.store.update_execution(record).await?;
        self.store
            .update_opportunity_status(opportunity.id, OpportunityStatus::Failed)
            .await?;

        self.events.publish_execution(ExecutionEvent::Failed {
            execution_id: record.id,
            phase: ExecutionPhase::Commit,
            reason: reason.clone(),
            timestamp: Utc::now(),
        });

        Ok(ExecutionResult {
            execution_id: record.id,
            success: false,
            leg1_order_id: record.leg1_order_id.clone(),
            leg2_order_id: record.leg2_order_id.clone(),
            actual_size: Decimal::ZERO,
            actual_cost: Decimal::ZERO,
            actual_profit: Decimal::ZERO,
            phase: ExecutionPhase::Commit,
            error: Some(reason.clone()),
            rollback_reason: Some(reason),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        kalshi_quote, polymarket_quote, sample_opportunity, MemoryStore, MockVenue, PlaceBehavior,
    };
    use arb_exec_core::{BreakerConfig, CoreEvent};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct Fixture {
        engine: ExecutionEngine,
        store: Arc<MemoryStore>,
        kalshi: Arc<MockVenue>,
        polymarket: Arc<MockVenue>,
        events: EventBus,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new(dec!(10000)));
        let breaker = Arc::new(VenueCircuitBreaker::new(BreakerConfig::default()));
        let events = EventBus::new();
        let kalshi = Arc::new(MockVenue::new("kalshi", kalshi_quote()));
        let polymarket = Arc::new(MockVenue::new("polymarket", polymarket_quote()));

        let mut engine = ExecutionEngine::new(
            store.clone(),
            breaker,
            events.clone(),
            EngineConfig::default(),
        );
        engine.register_venue(kalshi.clone());
        engine.register_venue(polymarket.clone());

        Fixture {
            engine,
            store,
            kalshi,
            polymarket,
            events,
        }
    }

    fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<CoreEvent>) -> Vec<CoreEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    // ==================== Success Path ====================

    #[tokio::test]
    async fn test_successful_execution_opens_position() {
        let f = fixture();
        let mut rx = f.events.subscribe();
        let opp = sample_opportunity();

        let result = f.engine.execute(&opp, dec!(100)).await.unwrap();

        // Asks: kalshi NO 0.45 + polymarket YES 0.51 = 0.96 per contract.
        assert!(result.success);
        assert_eq!(result.phase, ExecutionPhase::Completed);
        assert_eq!(result.actual_size, dec!(100));
        assert_eq!(result.actual_cost, dec!(96));
        assert_eq!(result.actual_profit, dec!(4));
        assert_eq!(result.leg1_order_id.as_deref(), Some("kalshi-1"));
        assert_eq!(result.leg2_order_id.as_deref(), Some("polymarket-1"));

        let positions = f.store.open_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].total_cost, dec!(96));
        assert_eq!(positions[0].expected_payout, dec!(100));

        let capital = f.store.capital_status().await.unwrap();
        assert_eq!(capital.allocated, dec!(96));
        assert_eq!(capital.available, dec!(9904));

        let record = f.store.execution(result.execution_id).unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(
            f.store.opportunity_status(opp.id),
            Some(arb_exec_core::OpportunityStatus::Executed)
        );

        let events = drain_events(&mut rx);
        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                CoreEvent::Execution(ExecutionEvent::Started { .. }) => "started",
                CoreEvent::Execution(ExecutionEvent::PrepareCompleted { .. }) => "prepare",
                CoreEvent::Execution(ExecutionEvent::Completed { .. }) => "completed",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["started", "prepare", "completed"]);
    }

    #[tokio::test]
    async fn test_expected_profit_recomputed_from_fresh_quotes() {
        let f = fixture();
        let mut rx = f.events.subscribe();
        // The opportunity claims a 0.95 cost; the fresh quotes say 0.96.
        let opp = sample_opportunity();

        f.engine.execute(&opp, dec!(100)).await.unwrap();

        let events = drain_events(&mut rx);
        let prepared = events.iter().find_map(|e| match e {
            CoreEvent::Execution(ExecutionEvent::PrepareCompleted {
                expected_profit, ..
            }) => Some(*expected_profit),
            _ => None,
        });
        assert_eq!(prepared, Some(dec!(4)));
    }

    #[tokio::test]
    async fn test_partial_size_fills_use_minimum() {
        let f = fixture();
        *f.kalshi.place_behavior.lock() = PlaceBehavior::FillPartial(dec!(80));
        let opp = sample_opportunity();

        let result = f.engine.execute(&opp, dec!(100)).await.unwrap();

        assert!(result.success);
        assert_eq!(result.actual_size, dec!(80));
        // Cost still reflects everything actually bought on both legs.
        assert_eq!(result.actual_cost, dec!(80) * dec!(0.45) + dec!(100) * dec!(0.51));
    }

    // ==================== Prepare Failures ====================

    #[tokio::test(start_paused = true)]
    async fn test_slow_quote_fetch_never_reaches_commit() {
        let f = fixture();
        *f.kalshi.quote_delay.lock() = Duration::from_millis(600);
        let opp = sample_opportunity();

        let result = f.engine.execute(&opp, dec!(100)).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.phase, ExecutionPhase::Prepare);
        assert!(result.error.as_deref().unwrap().contains("stale"));
        assert_eq!(f.kalshi.place_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(
            f.polymarket
                .place_calls
                .load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[tokio::test]
    async fn test_vanished_edge_rejected_in_prepare() {
        let f = fixture();
        // Push the polymarket YES ask up so the combined ask crosses $1.
        f.polymarket.quote.lock().yes_ask = dec!(0.56);
        let opp = sample_opportunity();

        let result = f.engine.execute(&opp, dec!(100)).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.phase, ExecutionPhase::Prepare);
        assert!(result.error.as_deref().unwrap().contains("no edge"));
    }

    #[tokio::test]
    async fn test_size_beyond_live_liquidity_rejected() {
        let f = fixture();
        f.kalshi.quote.lock().no_liquidity = dec!(50);
        let opp = sample_opportunity();

        let result = f.engine.execute(&opp, dec!(100)).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.phase, ExecutionPhase::Prepare);
        assert!(result.error.as_deref().unwrap().contains("liquidity"));
    }

    #[tokio::test]
    async fn test_expired_opportunity_rejected() {
        let f = fixture();
        let mut opp = sample_opportunity();
        opp.detected_at = Utc::now() - chrono::Duration::seconds(120);

        let result = f.engine.execute(&opp, dec!(100)).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.phase, ExecutionPhase::Prepare);
        assert_eq!(
            f.store.opportunity_status(opp.id),
            Some(arb_exec_core::OpportunityStatus::Expired)
        );
    }

    #[tokio::test]
    async fn test_quote_error_fails_prepare() {
        let f = fixture();
        *f.polymarket.quote_error.lock() = Some(VenueError::Api {
            message: "connection reset".to_string(),
        });
        let opp = sample_opportunity();

        let result = f.engine.execute(&opp, dec!(100)).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.phase, ExecutionPhase::Prepare);
        assert!(result.error.as_deref().unwrap().contains("quote failed"));
    }

    // ==================== Commit Failures and Rollback ====================

    #[tokio::test(start_paused = true)]
    async fn test_leg_timeout_rolls_back_filled_sibling() {
        let f = fixture();
        // Polymarket hangs past the 5s commit timeout; kalshi fills fast.
        *f.polymarket.place_behavior.lock() = PlaceBehavior::Hang(Duration::from_secs(60));
        let opp = sample_opportunity();
        let mut rx = f.events.subscribe();

        let result = f.engine.execute(&opp, dec!(100)).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.phase, ExecutionPhase::Commit);
        assert!(result.rollback_reason.as_deref().unwrap().contains("timed out"));
        assert_eq!(result.leg1_order_id.as_deref(), Some("kalshi-1"));
        assert!(result.leg2_order_id.is_none());

        // The filled leg's order was cancelled defensively.
        assert_eq!(f.kalshi.cancelled.lock().as_slice(), ["kalshi-1"]);
        assert!(f.polymarket.cancelled.lock().is_empty());

        let record = f.store.execution(result.execution_id).unwrap();
        assert_eq!(record.status, ExecutionStatus::RolledBack);
        assert_eq!(record.phase, ExecutionPhase::Rollback);

        let events = drain_events(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            CoreEvent::Execution(ExecutionEvent::RollbackCompleted { .. })
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            CoreEvent::Execution(ExecutionEvent::Failed {
                phase: ExecutionPhase::Commit,
                ..
            })
        )));

        // No position and no capital movement.
        assert!(f.store.open_positions().await.unwrap().is_empty());
        let capital = f.store.capital_status().await.unwrap();
        assert_eq!(capital.allocated, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_rejected_leg_cancels_other() {
        let f = fixture();
        *f.polymarket.place_behavior.lock() =
            PlaceBehavior::Reject("insufficient balance".to_string());
        let opp = sample_opportunity();

        let result = f.engine.execute(&opp, dec!(100)).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.phase, ExecutionPhase::Commit);
        assert!(result
            .rollback_reason
            .as_deref()
            .unwrap()
            .contains("insufficient balance"));
        assert_eq!(f.kalshi.cancelled.lock().as_slice(), ["kalshi-1"]);
    }

    #[tokio::test]
    async fn test_both_legs_rejected_rolls_back_with_both_reasons() {
        let f = fixture();
        *f.kalshi.place_behavior.lock() = PlaceBehavior::Reject("halted".to_string());
        *f.polymarket.place_behavior.lock() = PlaceBehavior::Reject("halted".to_string());
        let opp = sample_opportunity();

        let result = f.engine.execute(&opp, dec!(100)).await.unwrap();

        assert!(!result.success);
        let reason = result.rollback_reason.unwrap();
        assert!(reason.contains("kalshi"));
        assert!(reason.contains("polymarket"));
        // Neither order came back, so there is nothing to cancel.
        assert!(f.kalshi.cancelled.lock().is_empty());
        assert!(f.polymarket.cancelled.lock().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_tolerates_cancel_failure() {
        let f = fixture();
        *f.polymarket.place_behavior.lock() = PlaceBehavior::Reject("rejected".to_string());
        *f.kalshi.cancel_error.lock() = Some(VenueError::Api {
            message: "already settled".to_string(),
        });
        let opp = sample_opportunity();
        let mut rx = f.events.subscribe();

        let result = f.engine.execute(&opp, dec!(100)).await.unwrap();

        // Cancel failure is logged, reported, and does not change the outcome.
        assert!(!result.success);
        let events = drain_events(&mut rx);
        let rollback_orders = events.iter().find_map(|e| match e {
            CoreEvent::Execution(ExecutionEvent::RollbackCompleted {
                cancelled_orders, ..
            }) => Some(cancelled_orders.clone()),
            _ => None,
        });
        assert_eq!(rollback_orders.unwrap(), vec!["kalshi-1".to_string()]);
    }

    // ==================== Hard Errors ====================

    #[tokio::test]
    async fn test_unknown_venue_is_hard_error() {
        let f = fixture();
        let mut opp = sample_opportunity();
        opp.leg2.venue = "unregistered".to_string();

        let err = f.engine.execute(&opp, dec!(100)).await.unwrap_err();

        assert!(err.to_string().contains("unknown venue"));
        // Nothing was recorded: the attempt never started.
        assert!(f.store.executions.lock().is_empty());
    }
}
