pub mod capital;
pub mod config;
pub mod events;
pub mod traits;
pub mod types;

pub use capital::{CapitalError, CapitalStatus};
pub use config::{
    AppConfig, BreakerConfig, ConfigLoader, EngineConfig, MonitorConfig, RiskConfig, StoreConfig,
};
pub use events::{CoreEvent, EventBus, ExecutionEvent, MonitorEvent};
pub use traits::{ExecutionRecord, PositionStore, VenueClient, VenueError};
pub use types::{
    AccountBalance, Discrepancy, DiscrepancyKind, ExecutionPhase, ExecutionPlan, ExecutionResult,
    ExecutionStatus, FeeBreakdown, Market, Opportunity, OpportunityLeg, OpportunityStatus,
    OrderAck, OrderRequest, OrderStatus, OrderType, Outcome, PlannedLeg, Position, PositionLeg,
    PositionPnl, PositionStatus, Quote, ResolutionAlignment, Severity, Side,
};
