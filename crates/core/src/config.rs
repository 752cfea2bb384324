//! Configuration for the execution core.
//!
//! Each component gets its own config struct with sane defaults and a
//! `conservative()` preset for cautious initial deployments. [`ConfigLoader`]
//! merges a TOML file with `ARB_`-prefixed environment variables.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// Risk Manager
// =============================================================================

/// Limits applied by the risk gate before any capital is committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Minimum acceptable net profit percent.
    pub min_net_profit_pct: Decimal,

    /// Minimum position size in dollars; smaller trades are blocked.
    pub min_position_size: Decimal,

    /// Maximum position size in dollars; larger requests are shrunk.
    pub max_position_size: Decimal,

    /// Ceiling on concurrently open positions.
    pub max_open_positions: u32,

    /// Ceiling on capital deployed per UTC day, in dollars.
    pub max_daily_deployment: Decimal,

    /// Base slippage assumption in percent.
    pub base_slippage_pct: Decimal,

    /// Spread-crossing cost assumption in percent.
    pub spread_cost_pct: Decimal,

    /// Coefficient for the quadratic market-impact term.
    pub impact_coefficient: Decimal,

    /// Maximum tolerated estimated slippage in percent.
    pub slippage_tolerance_pct: Decimal,

    /// Days after which an open position is considered stuck.
    pub stale_position_days: i64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_net_profit_pct: Decimal::ONE,
            min_position_size: Decimal::from(10),
            max_position_size: Decimal::from(1000),
            max_open_positions: 10,
            max_daily_deployment: Decimal::from(5000),
            base_slippage_pct: Decimal::new(2, 1),       // 0.2%
            spread_cost_pct: Decimal::new(1, 1),         // 0.1%
            impact_coefficient: Decimal::from(50),
            slippage_tolerance_pct: Decimal::from(2),
            stale_position_days: 30,
        }
    }
}

impl RiskConfig {
    /// Creates tight limits for initial deployments.
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            min_net_profit_pct: Decimal::from(2),
            min_position_size: Decimal::from(10),
            max_position_size: Decimal::from(100),
            max_open_positions: 3,
            max_daily_deployment: Decimal::from(500),
            slippage_tolerance_pct: Decimal::ONE,
            ..Self::default()
        }
    }
}

// =============================================================================
// Execution Engine
// =============================================================================

/// Timing bounds for the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum round-trip age of quotes used to build a plan. Quotes older
    /// than this are treated as no quote at all.
    #[serde(with = "duration_millis")]
    pub quote_freshness_budget: Duration,

    /// Timeout applied to each individual prepare/rollback venue call.
    #[serde(with = "duration_millis")]
    pub venue_call_timeout: Duration,

    /// Hard timeout for the commit phase; both leg placements race it.
    #[serde(with = "duration_millis")]
    pub execution_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quote_freshness_budget: Duration::from_millis(500),
            venue_call_timeout: Duration::from_secs(3),
            execution_timeout: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// Position Monitor
// =============================================================================

/// Position monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval between sweeps.
    #[serde(with = "duration_millis")]
    pub interval: Duration,

    /// Relative tolerance before a fill-size divergence counts as a
    /// discrepancy, in percent.
    pub size_tolerance_pct: Decimal,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            size_tolerance_pct: Decimal::ONE,
        }
    }
}

// =============================================================================
// Venue Circuit Breaker
// =============================================================================

/// Per-venue circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures on a venue before it trips.
    pub max_consecutive_failures: u32,

    /// How long a tripped venue stays blocked before auto-reset.
    #[serde(with = "duration_millis")]
    pub pause: Duration,

    /// Venues blocked by operator decree, regardless of failure history.
    pub blocked_venues: Vec<String>,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            pause: Duration::from_secs(300),
            blocked_venues: Vec::new(),
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// Position tracker database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// PostgreSQL connection string.
    pub database_url: String,

    /// Connection pool size.
    pub max_connections: u32,

    /// Bankroll seeded into the capital record on first start.
    pub initial_capital: Decimal,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost/arb_exec".to_string(),
            max_connections: 10,
            initial_capital: Decimal::from(10000),
        }
    }
}

// =============================================================================
// Application Config
// =============================================================================

/// Top-level configuration for the execution core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Risk gate limits.
    pub risk: RiskConfig,
    /// Execution engine timing.
    pub engine: EngineConfig,
    /// Position monitor settings.
    pub monitor: MonitorConfig,
    /// Venue circuit breaker settings.
    pub breaker: BreakerConfig,
    /// Tracker database settings.
    pub store: StoreConfig,
}

/// Loads [`AppConfig`] by merging file and environment sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration from `config/Config.toml` merged with
    /// `ARB_`-prefixed environment variables.
    ///
    /// # Errors
    /// Returns an error if configuration sources cannot be read or parsed.
    pub fn load() -> anyhow::Result<AppConfig> {
        let config: AppConfig = Figment::new()
            .merge(figment::providers::Serialized::defaults(AppConfig::default()))
            .merge(Toml::file("config/Config.toml"))
            .merge(Env::prefixed("ARB_").split("__"))
            .extract()?;

        Ok(config)
    }

    /// Loads configuration with an additional profile-specific TOML overlay.
    ///
    /// # Errors
    /// Returns an error if configuration sources cannot be read or parsed.
    pub fn load_with_profile(profile: &str) -> anyhow::Result<AppConfig> {
        let config: AppConfig = Figment::new()
            .merge(figment::providers::Serialized::defaults(AppConfig::default()))
            .merge(Toml::file("config/Config.toml"))
            .merge(Toml::file(format!("config/Config.{profile}.toml")))
            .merge(Env::prefixed("ARB_").split("__"))
            .extract()?;

        Ok(config)
    }
}

// =============================================================================
// Duration Serde Helper
// =============================================================================

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_risk_config_default() {
        let config = RiskConfig::default();

        assert_eq!(config.min_net_profit_pct, Decimal::ONE);
        assert_eq!(config.max_position_size, dec!(1000));
        assert_eq!(config.max_open_positions, 10);
        assert_eq!(config.stale_position_days, 30);
    }

    #[test]
    fn test_risk_config_conservative_is_tighter() {
        let default = RiskConfig::default();
        let conservative = RiskConfig::conservative();

        assert!(conservative.max_position_size < default.max_position_size);
        assert!(conservative.max_open_positions < default.max_open_positions);
        assert!(conservative.min_net_profit_pct > default.min_net_profit_pct);
    }

    #[test]
    fn test_engine_config_default_budgets() {
        let config = EngineConfig::default();

        assert_eq!(config.quote_freshness_budget, Duration::from_millis(500));
        assert!(config.execution_timeout > config.quote_freshness_budget);
    }

    #[test]
    fn test_monitor_config_default() {
        let config = MonitorConfig::default();

        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.size_tolerance_pct, Decimal::ONE);
    }

    #[test]
    fn test_duration_serde_round_trip() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(back.quote_freshness_budget, config.quote_freshness_budget);
        assert_eq!(back.execution_timeout, config.execution_timeout);
    }

    #[test]
    fn test_app_config_default_is_complete() {
        let config = AppConfig::default();

        assert!(config.store.initial_capital > Decimal::ZERO);
        assert!(config.breaker.blocked_venues.is_empty());
    }
}
