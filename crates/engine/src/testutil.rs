//! In-process test doubles shared by the engine test modules.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

use arb_exec_core::{
    AccountBalance, CapitalStatus, ExecutionRecord, FeeBreakdown, Market, Opportunity,
    OpportunityLeg, OpportunityStatus, OrderAck, OrderRequest, OrderStatus, Position, PositionLeg,
    PositionStatus, PositionStore, Quote, Side, VenueClient, VenueError,
};

// =============================================================================
// Sample Data
// =============================================================================

/// A tradeable opportunity: buy NO on kalshi, YES on polymarket.
pub fn sample_opportunity() -> Opportunity {
    Opportunity {
        id: Uuid::new_v4(),
        leg1: OpportunityLeg {
            venue: "kalshi".to_string(),
            market_id: "KXBTC-TEST".to_string(),
            side: Side::No,
            liquidity: dec!(8000),
        },
        leg2: OpportunityLeg {
            venue: "polymarket".to_string(),
            market_id: "0xabc".to_string(),
            side: Side::Yes,
            liquidity: dec!(8000),
        },
        gross_profit_pct: dec!(5.2),
        net_profit_pct: dec!(4.1),
        total_cost: dec!(0.95),
        max_size: dec!(1000),
        confidence: 0.97,
        detected_at: Utc::now(),
        ttl: Duration::from_secs(30),
        fees: FeeBreakdown {
            leg1_fee: dec!(0.007),
            leg2_fee: dec!(0.002),
        },
        alignment: None,
    }
}

/// An open position matching [`sample_opportunity`]'s legs.
pub fn sample_position() -> Position {
    Position {
        id: Uuid::new_v4(),
        execution_id: Uuid::new_v4(),
        leg1: PositionLeg {
            venue: "kalshi".to_string(),
            market_id: "KXBTC-TEST".to_string(),
            side: Side::No,
            entry_price: dec!(0.45),
            order_id: "kalshi-1".to_string(),
        },
        leg2: PositionLeg {
            venue: "polymarket".to_string(),
            market_id: "0xabc".to_string(),
            side: Side::Yes,
            entry_price: dec!(0.50),
            order_id: "polymarket-1".to_string(),
        },
        size: dec!(100),
        total_cost: dec!(95),
        expected_payout: dec!(100),
        expected_profit: dec!(5),
        status: PositionStatus::Open,
        opened_at: Utc::now(),
        resolved_at: None,
    }
}

/// Quote where NO is cheap (for the kalshi leg).
pub fn kalshi_quote() -> Quote {
    Quote {
        yes_bid: dec!(0.53),
        yes_ask: dec!(0.55),
        yes_liquidity: dec!(500),
        no_bid: dec!(0.44),
        no_ask: dec!(0.45),
        no_liquidity: dec!(500),
        timestamp: Utc::now(),
    }
}

/// Quote where YES is cheap (for the polymarket leg).
pub fn polymarket_quote() -> Quote {
    Quote {
        yes_bid: dec!(0.49),
        yes_ask: dec!(0.51),
        yes_liquidity: dec!(500),
        no_bid: dec!(0.47),
        no_ask: dec!(0.49),
        no_liquidity: dec!(500),
        timestamp: Utc::now(),
    }
}

// =============================================================================
// Mock Venue
// =============================================================================

/// Scripted order-placement behavior for a mock venue.
#[derive(Debug, Clone)]
pub enum PlaceBehavior {
    /// Fill the full requested size at the limit price.
    Fill,
    /// Report `Filled` but for a smaller size.
    FillPartial(Decimal),
    /// Reject the order.
    Reject(String),
    /// Sleep, then fill. Used to outlast the commit timeout.
    Hang(Duration),
}

/// Programmable in-process venue.
pub struct MockVenue {
    name: String,
    pub quote: Mutex<Quote>,
    pub quote_delay: Mutex<Duration>,
    pub quote_error: Mutex<Option<VenueError>>,
    pub place_behavior: Mutex<PlaceBehavior>,
    pub place_calls: AtomicUsize,
    pub cancelled: Mutex<Vec<String>>,
    pub cancel_error: Mutex<Option<VenueError>>,
    pub markets: Mutex<HashMap<String, Option<Market>>>,
    pub order_statuses: Mutex<HashMap<String, OrderAck>>,
}

impl MockVenue {
    pub fn new(name: &str, quote: Quote) -> Self {
        Self {
            name: name.to_string(),
            quote: Mutex::new(quote),
            quote_delay: Mutex::new(Duration::ZERO),
            quote_error: Mutex::new(None),
            place_behavior: Mutex::new(PlaceBehavior::Fill),
            place_calls: AtomicUsize::new(0),
            cancelled: Mutex::new(Vec::new()),
            cancel_error: Mutex::new(None),
            markets: Mutex::new(HashMap::new()),
            order_statuses: Mutex::new(HashMap::new()),
        }
    }

    /// Scripts the market returned for `market_id`; `None` means the venue
    /// no longer lists it.
    pub fn set_market(&self, market_id: &str, market: Option<Market>) {
        self.markets.lock().insert(market_id.to_string(), market);
    }

    /// Scripts the status returned for `order_id`.
    pub fn set_order_status(&self, order_id: &str, ack: OrderAck) {
        self.order_statuses.lock().insert(order_id.to_string(), ack);
    }

    fn order_id(&self) -> String {
        format!("{}-1", self.name)
    }

    fn fill_ack(&self, order: &OrderRequest, size: Decimal) -> OrderAck {
        OrderAck {
            order_id: self.order_id(),
            status: OrderStatus::Filled,
            filled_size: size,
            filled_price: order.limit_price,
        }
    }
}

#[async_trait]
impl VenueClient for MockVenue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn quote(&self, _market_id: &str) -> Result<Quote, VenueError> {
        let delay = *self.quote_delay.lock();
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
        let error = self.quote_error.lock().clone();
        if let Some(e) = error {
            return Err(e);
        }
        Ok(self.quote.lock().clone())
    }

    async fn market(&self, market_id: &str) -> Result<Option<Market>, VenueError> {
        let scripted = self.markets.lock().get(market_id).cloned();
        match scripted {
            Some(market) => Ok(market),
            // Unscripted markets exist and are unresolved.
            None => Ok(Some(Market {
                id: market_id.to_string(),
                active: true,
                resolved_outcome: None,
            })),
        }
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, VenueError> {
        self.place_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.place_behavior.lock().clone();
        match behavior {
            PlaceBehavior::Fill => Ok(self.fill_ack(order, order.size)),
            PlaceBehavior::FillPartial(size) => Ok(self.fill_ack(order, size)),
            PlaceBehavior::Reject(reason) => Err(VenueError::Rejected { reason }),
            PlaceBehavior::Hang(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.fill_ack(order, order.size))
            }
        }
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError> {
        self.cancelled.lock().push(order_id.to_string());
        let error = self.cancel_error.lock().clone();
        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderAck, VenueError> {
        self.order_statuses
            .lock()
            .get(order_id)
            .cloned()
            .ok_or_else(|| VenueError::NotFound(order_id.to_string()))
    }

    async fn balance(&self) -> Result<AccountBalance, VenueError> {
        Ok(AccountBalance {
            available: dec!(10000),
            allocated: Decimal::ZERO,
            total: dec!(10000),
        })
    }
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// In-memory [`PositionStore`] with the capital transitions of the real
/// tracker.
pub struct MemoryStore {
    pub capital: Mutex<CapitalStatus>,
    pub positions: Mutex<Vec<Position>>,
    pub opportunities: Mutex<HashMap<Uuid, OpportunityStatus>>,
    pub executions: Mutex<Vec<ExecutionRecord>>,
    pub daily_deployed: Mutex<Decimal>,
}

impl MemoryStore {
    pub fn new(total: Decimal) -> Self {
        Self {
            capital: Mutex::new(CapitalStatus::new(total)),
            positions: Mutex::new(Vec::new()),
            opportunities: Mutex::new(HashMap::new()),
            executions: Mutex::new(Vec::new()),
            daily_deployed: Mutex::new(Decimal::ZERO),
        }
    }

    pub fn set_capital_split(&self, available: Decimal, allocated: Decimal) {
        let mut capital = self.capital.lock();
        capital.available = available;
        capital.allocated = allocated;
    }

    pub fn set_open_position_count(&self, count: u32) {
        self.capital.lock().open_positions = count;
    }

    pub fn set_daily_deployed(&self, deployed: Decimal) {
        *self.daily_deployed.lock() = deployed;
    }

    pub fn add_open_position_aged_days(&self, days: i64) {
        let mut position = sample_position();
        position.opened_at = Utc::now() - chrono::Duration::days(days);
        self.positions.lock().push(position);
    }

    pub fn execution(&self, id: Uuid) -> Option<ExecutionRecord> {
        self.executions.lock().iter().find(|r| r.id == id).cloned()
    }

    pub fn opportunity_status(&self, id: Uuid) -> Option<OpportunityStatus> {
        self.opportunities.lock().get(&id).copied()
    }
}

#[async_trait]
impl PositionStore for MemoryStore {
    async fn track_opportunity(&self, opportunity: &Opportunity) -> Result<()> {
        self.opportunities
            .lock()
            .insert(opportunity.id, OpportunityStatus::Detected);
        Ok(())
    }

    async fn update_opportunity_status(&self, id: Uuid, status: OpportunityStatus) -> Result<()> {
        self.opportunities.lock().insert(id, status);
        Ok(())
    }

    async fn record_execution(&self, record: &ExecutionRecord) -> Result<()> {
        self.executions.lock().push(record.clone());
        Ok(())
    }

    async fn update_execution(&self, record: &ExecutionRecord) -> Result<()> {
        let mut executions = self.executions.lock();
        match executions.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(anyhow!("unknown execution {}", record.id)),
        }
    }

    async fn open_position(&self, position: &Position) -> Result<CapitalStatus> {
        let mut capital = self.capital.lock();
        *capital = capital.apply_open(position.total_cost)?;
        self.positions.lock().push(position.clone());
        Ok(capital.clone())
    }

    async fn close_position(&self, position_id: Uuid, payout: Decimal) -> Result<CapitalStatus> {
        let mut positions = self.positions.lock();
        let position = positions
            .iter_mut()
            .find(|p| p.id == position_id && p.is_open())
            .ok_or_else(|| anyhow!("no open position {position_id}"))?;
        position.status = PositionStatus::Resolved;
        position.resolved_at = Some(Utc::now());
        let cost = position.total_cost;
        drop(positions);

        let mut capital = self.capital.lock();
        *capital = capital.apply_close(cost, payout)?;
        Ok(capital.clone())
    }

    async fn capital_status(&self) -> Result<CapitalStatus> {
        Ok(self.capital.lock().clone())
    }

    async fn open_positions(&self) -> Result<Vec<Position>> {
        Ok(self
            .positions
            .lock()
            .iter()
            .filter(|p| p.is_open())
            .cloned()
            .collect())
    }

    async fn daily_deployment(&self, _date: chrono::NaiveDate) -> Result<Decimal> {
        Ok(*self.daily_deployed.lock())
    }
}
