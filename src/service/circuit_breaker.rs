//! Health-driven circuit breaker.
//!
//! ```text
//! closed ──(threshold failures)──► open ──(now >= nextRetry)──► half_open
//!   ▲                               ▲                              │
//!   └──────────(healthy trial)──────┼──────────────────────────────┤
//!                                   └──────(unhealthy trial)───────┘
//! ```
//!
//! The check that moves `open` to `half_open` is not itself the trial; the
//! next check is.

use super::types::{BreakerState, CircuitBreakerState};
use crate::config::CircuitBreakerSettings;
use chrono::{DateTime, Utc};

/// What a single recorded check did to the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerTransition {
    None,
    Opened,
    HalfOpened,
    Closed,
    Reopened,
}

impl CircuitBreakerState {
    /// Feed one post-warmup health result into the breaker.
    pub fn record(
        &mut self,
        healthy: bool,
        settings: &CircuitBreakerSettings,
        now: DateTime<Utc>,
    ) -> BreakerTransition {
        match self.state {
            BreakerState::Closed => {
                if healthy {
                    self.failures = 0;
                    return BreakerTransition::None;
                }
                self.failures += 1;
                if self.failures >= settings.threshold {
                    self.state = BreakerState::Open;
                    self.last_failure = Some(now);
                    self.next_retry = Some(now + backoff(self.backoff_seconds));
                    return BreakerTransition::Opened;
                }
                BreakerTransition::None
            }
            BreakerState::Open => {
                let due = self.next_retry.map_or(true, |at| now >= at);
                if due {
                    self.state = BreakerState::HalfOpen;
                    return BreakerTransition::HalfOpened;
                }
                BreakerTransition::None
            }
            BreakerState::HalfOpen => {
                if healthy {
                    self.state = BreakerState::Closed;
                    self.failures = 0;
                    self.backoff_seconds = 1.0;
                    self.next_retry = None;
                    return BreakerTransition::Closed;
                }
                let max = settings.max_backoff.as_secs_f64();
                self.state = BreakerState::Open;
                self.failures += 1;
                self.last_failure = Some(now);
                self.backoff_seconds = (self.backoff_seconds * settings.backoff_multiplier).min(max);
                self.next_retry = Some(now + backoff(self.backoff_seconds));
                BreakerTransition::Reopened
            }
        }
    }

    /// Force the breaker closed with a fresh 1s backoff.
    pub fn reset(&mut self) {
        *self = CircuitBreakerState::default();
    }
}

fn backoff(seconds: f64) -> chrono::Duration {
    chrono::Duration::milliseconds((seconds * 1000.0).round() as i64)
}
