//! Per-venue circuit breaker.
//!
//! Tracks consecutive call failures per venue and trips a venue out of
//! trading when its failure streak crosses the configured threshold. A
//! tripped venue auto-closes after the pause elapses; an operator can also
//! trip or reset a venue manually, and config can block a venue outright.
//! The risk gate consults [`VenueCircuitBreaker::can_trade`] before
//! approving a trade; the execution engine records call outcomes.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

use arb_exec_core::BreakerConfig;

/// Circuit state of a single venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation.
    Closed,
    /// Auto-tripped after consecutive failures; closes after the pause.
    Open,
    /// Manually tripped; stays blocked until reset.
    Tripped,
}

/// Reasons a venue is not tradeable.
#[derive(Debug, Clone, Error)]
pub enum BreakerError {
    /// Venue is on the config block list.
    #[error("venue '{venue}' is blocked by configuration")]
    VenueBlocked {
        /// The blocked venue.
        venue: String,
    },

    /// Venue is paused after tripping; will auto-close.
    #[error("venue '{venue}' paused, {remaining_secs}s remaining")]
    Paused {
        /// The paused venue.
        venue: String,
        /// Seconds until auto-close.
        remaining_secs: u64,
    },

    /// Venue exceeded its consecutive-failure budget.
    #[error("venue '{venue}' tripped: {failures} consecutive failures (max {max_failures})")]
    ConsecutiveFailures {
        /// The tripped venue.
        venue: String,
        /// Current failure streak.
        failures: u32,
        /// Configured maximum.
        max_failures: u32,
    },

    /// Venue was manually tripped by an operator.
    #[error("venue '{venue}' manually tripped")]
    ManuallyTripped {
        /// The tripped venue.
        venue: String,
    },
}

#[derive(Debug)]
struct VenueState {
    state: BreakerState,
    consecutive_failures: u32,
    tripped_at: Option<Instant>,
}

impl Default for VenueState {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            tripped_at: None,
        }
    }
}

/// Circuit breaker over all known venues.
#[derive(Debug)]
pub struct VenueCircuitBreaker {
    config: BreakerConfig,
    venues: RwLock<HashMap<String, VenueState>>,
}

impl VenueCircuitBreaker {
    /// Creates a breaker with the given configuration.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            venues: RwLock::new(HashMap::new()),
        }
    }

    /// Checks whether trading on `venue` is currently allowed.
    ///
    /// An `Open` venue whose pause has elapsed is reset to `Closed` as a
    /// side effect.
    pub fn can_trade(&self, venue: &str) -> Result<(), BreakerError> {
        if self.config.blocked_venues.iter().any(|v| v == venue) {
            return Err(BreakerError::VenueBlocked {
                venue: venue.to_string(),
            });
        }

        let mut venues = self.venues.write();
        let state = venues.entry(venue.to_string()).or_default();

        match state.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                if let Some(tripped_at) = state.tripped_at {
                    let elapsed = tripped_at.elapsed();
                    if elapsed >= self.config.pause {
                        state.state = BreakerState::Closed;
                        state.consecutive_failures = 0;
                        state.tripped_at = None;
                        info!(venue = venue, "circuit breaker auto-closed after pause");
                        return Ok(());
                    }
                    return Err(BreakerError::Paused {
                        venue: venue.to_string(),
                        remaining_secs: (self.config.pause - elapsed).as_secs(),
                    });
                }
                Err(BreakerError::ConsecutiveFailures {
                    venue: venue.to_string(),
                    failures: state.consecutive_failures,
                    max_failures: self.config.max_consecutive_failures,
                })
            }
            BreakerState::Tripped => Err(BreakerError::ManuallyTripped {
                venue: venue.to_string(),
            }),
        }
    }

    /// Records a successful venue call, resetting the failure streak.
    pub fn record_success(&self, venue: &str) {
        let mut venues = self.venues.write();
        let state = venues.entry(venue.to_string()).or_default();
        state.consecutive_failures = 0;
    }

    /// Records a failed venue call, tripping the venue when the streak
    /// crosses the configured maximum.
    pub fn record_failure(&self, venue: &str) {
        let mut venues = self.venues.write();
        let state = venues.entry(venue.to_string()).or_default();
        state.consecutive_failures += 1;

        if state.state == BreakerState::Closed
            && state.consecutive_failures >= self.config.max_consecutive_failures
        {
            state.state = BreakerState::Open;
            state.tripped_at = Some(Instant::now());
            warn!(
                venue = venue,
                failures = state.consecutive_failures,
                "circuit breaker tripped: too many consecutive failures"
            );
        }
    }

    /// Manually trips a venue.
    pub fn trip(&self, venue: &str) {
        let mut venues = self.venues.write();
        let state = venues.entry(venue.to_string()).or_default();
        state.state = BreakerState::Tripped;
        state.tripped_at = Some(Instant::now());
        warn!(venue = venue, "circuit breaker manually tripped");
    }

    /// Resets a venue to normal operation.
    pub fn reset(&self, venue: &str) {
        let mut venues = self.venues.write();
        let state = venues.entry(venue.to_string()).or_default();
        state.state = BreakerState::Closed;
        state.consecutive_failures = 0;
        state.tripped_at = None;
        info!(venue = venue, "circuit breaker reset");
    }

    /// Returns the current state of a venue.
    #[must_use]
    pub fn state(&self, venue: &str) -> BreakerState {
        self.venues
            .read()
            .get(venue)
            .map_or(BreakerState::Closed, |s| s.state)
    }

    /// Returns the current failure streak of a venue.
    #[must_use]
    pub fn consecutive_failures(&self, venue: &str) -> u32 {
        self.venues
            .read()
            .get(venue)
            .map_or(0, |s| s.consecutive_failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> BreakerConfig {
        BreakerConfig {
            max_consecutive_failures: 3,
            pause: Duration::from_secs(300),
            blocked_venues: Vec::new(),
        }
    }

    #[test]
    fn test_unknown_venue_starts_closed() {
        let breaker = VenueCircuitBreaker::new(test_config());

        assert_eq!(breaker.state("kalshi"), BreakerState::Closed);
        assert!(breaker.can_trade("kalshi").is_ok());
    }

    #[test]
    fn test_trips_after_consecutive_failures() {
        let breaker = VenueCircuitBreaker::new(test_config());

        breaker.record_failure("kalshi");
        breaker.record_failure("kalshi");
        assert!(breaker.can_trade("kalshi").is_ok());

        breaker.record_failure("kalshi");
        assert_eq!(breaker.state("kalshi"), BreakerState::Open);
        assert!(matches!(
            breaker.can_trade("kalshi"),
            Err(BreakerError::Paused { .. })
        ));
    }

    #[test]
    fn test_failures_are_per_venue() {
        let breaker = VenueCircuitBreaker::new(test_config());

        for _ in 0..3 {
            breaker.record_failure("kalshi");
        }

        assert!(breaker.can_trade("kalshi").is_err());
        assert!(breaker.can_trade("polymarket").is_ok());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let breaker = VenueCircuitBreaker::new(test_config());

        breaker.record_failure("kalshi");
        breaker.record_failure("kalshi");
        breaker.record_success("kalshi");
        breaker.record_failure("kalshi");

        assert_eq!(breaker.consecutive_failures("kalshi"), 1);
        assert!(breaker.can_trade("kalshi").is_ok());
    }

    #[test]
    fn test_auto_close_after_pause() {
        let config = BreakerConfig {
            pause: Duration::from_millis(0),
            ..test_config()
        };
        let breaker = VenueCircuitBreaker::new(config);

        for _ in 0..3 {
            breaker.record_failure("kalshi");
        }
        assert_eq!(breaker.state("kalshi"), BreakerState::Open);

        // Zero pause: the next check auto-closes the venue.
        assert!(breaker.can_trade("kalshi").is_ok());
        assert_eq!(breaker.state("kalshi"), BreakerState::Closed);
        assert_eq!(breaker.consecutive_failures("kalshi"), 0);
    }

    #[test]
    fn test_manual_trip_and_reset() {
        let breaker = VenueCircuitBreaker::new(test_config());

        breaker.trip("polymarket");
        assert_eq!(breaker.state("polymarket"), BreakerState::Tripped);
        assert!(matches!(
            breaker.can_trade("polymarket"),
            Err(BreakerError::ManuallyTripped { .. })
        ));

        breaker.reset("polymarket");
        assert!(breaker.can_trade("polymarket").is_ok());
    }

    #[test]
    fn test_blocked_venue_always_blocked() {
        let config = BreakerConfig {
            blocked_venues: vec!["kalshi".to_string()],
            ..test_config()
        };
        let breaker = VenueCircuitBreaker::new(config);

        assert!(matches!(
            breaker.can_trade("kalshi"),
            Err(BreakerError::VenueBlocked { .. })
        ));
        assert!(breaker.can_trade("polymarket").is_ok());
    }
}
