//! Evaluation of one health-check result against a service's runtime state.
//!
//! Kept free of I/O and timers so the warmup and breaker rules can be driven
//! with explicit timestamps.

use super::circuit_breaker::BreakerTransition;
use super::types::{LifecycleState, RuntimeState};
use crate::config::{CircuitBreakerSettings, WarmupFailurePolicy};
use crate::healthcheck::HealthOutcome;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Rules applied to every check.
#[derive(Debug, Clone)]
pub struct HealthPolicy {
    pub circuit_breaker: CircuitBreakerSettings,
    pub warmup_failure: WarmupFailurePolicy,
}

/// What one check changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthTransition {
    pub applied: bool,
    pub state_changed: bool,
    pub warmup_completed: bool,
    pub breaker: BreakerTransition,
}

impl HealthTransition {
    fn ignored() -> Self {
        Self {
            applied: false,
            state_changed: false,
            warmup_completed: false,
            breaker: BreakerTransition::None,
        }
    }
}

/// Healthy checks needed to leave warmup: `ceil(warmupTime / intervalSeconds)`.
pub fn required_checks(warmup_time_secs: u64, interval: Duration) -> u32 {
    let interval_secs = interval.as_secs_f64();
    if warmup_time_secs == 0 || interval_secs <= 0.0 {
        return 0;
    }
    (warmup_time_secs as f64 / interval_secs).ceil() as u32
}

/// Apply one check result.
///
/// During warmup a healthy check advances progress and an unhealthy one
/// pauses or resets it per `policy.warmup_failure`; warmup checks never reach
/// the breaker. After warmup the result toggles Running/Unhealthy and then
/// feeds the breaker, which may force CircuitOpen or restore Running.
///
/// Results arriving outside Starting/Running/Unhealthy/CircuitOpen (a stop
/// raced the check) are ignored.
pub fn apply_health_check(
    state: &mut RuntimeState,
    outcome: &HealthOutcome,
    policy: &HealthPolicy,
    now: DateTime<Utc>,
) -> HealthTransition {
    if !matches!(
        state.state,
        LifecycleState::Starting
            | LifecycleState::Running
            | LifecycleState::Unhealthy
            | LifecycleState::CircuitOpen
    ) {
        return HealthTransition::ignored();
    }

    let healthy = outcome.healthy;
    let health = &mut state.health;
    health.is_healthy = healthy;
    health.last_check = Some(now);
    health.response_time = outcome.latency.map(|d| d.as_millis() as u64);
    health.error = if healthy { None } else { outcome.error.clone() };
    if healthy {
        health.consecutive_failures = 0;
        health.consecutive_successes += 1;
    } else {
        health.consecutive_successes = 0;
        health.consecutive_failures += 1;
    }

    let mut transition = HealthTransition {
        applied: true,
        state_changed: false,
        warmup_completed: false,
        breaker: BreakerTransition::None,
    };

    if state.warmup.is_in_warmup {
        if healthy {
            state.warmup.successful_checks += 1;
            if state.warmup.successful_checks >= state.warmup.required_checks {
                state.warmup.is_in_warmup = false;
                // A restarted process that survives warmup has recovered.
                state.auto_restore_attempts = 0;
                transition.warmup_completed = true;
                transition.state_changed = state.set_state(LifecycleState::Running, now);
            }
        } else if policy.warmup_failure == WarmupFailurePolicy::Reset {
            state.warmup.successful_checks = 0;
        }
        return transition;
    }

    match (state.state, healthy) {
        (LifecycleState::Unhealthy, true) => {
            transition.state_changed |= state.set_state(LifecycleState::Running, now);
        }
        (LifecycleState::Running, false) => {
            transition.state_changed |= state.set_state(LifecycleState::Unhealthy, now);
        }
        _ => {}
    }

    transition.breaker = state
        .circuit_breaker
        .record(healthy, &policy.circuit_breaker, now);
    match transition.breaker {
        BreakerTransition::Opened | BreakerTransition::Reopened => {
            transition.state_changed |= state.set_state(LifecycleState::CircuitOpen, now);
        }
        BreakerTransition::Closed => {
            transition.state_changed |= state.set_state(LifecycleState::Running, now);
        }
        BreakerTransition::None | BreakerTransition::HalfOpened => {}
    }

    transition
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ServiceConfig;
    use crate::service::BreakerState;

    fn policy(warmup_failure: WarmupFailurePolicy) -> HealthPolicy {
        HealthPolicy {
            circuit_breaker: CircuitBreakerSettings {
                threshold: 5,
                backoff_multiplier: 2.0,
                max_backoff: Duration::from_secs(300),
            },
            warmup_failure,
        }
    }

    fn ok() -> HealthOutcome {
        HealthOutcome::healthy(Duration::from_millis(12))
    }

    fn fail() -> HealthOutcome {
        HealthOutcome::unhealthy("connection refused")
    }

    fn running() -> RuntimeState {
        let mut state = RuntimeState::new(&ServiceConfig::new("api", 6020), ".".into(), 10);
        state.state = LifecycleState::Running;
        state
    }

    fn warming(required: u32) -> RuntimeState {
        let mut state = running();
        state.state = LifecycleState::Starting;
        state.warmup.is_in_warmup = true;
        state.warmup.required_checks = required;
        state
    }

    #[test]
    fn test_required_checks() {
        assert_eq!(required_checks(10, Duration::from_secs(5)), 2);
        assert_eq!(required_checks(11, Duration::from_secs(5)), 3);
        assert_eq!(required_checks(0, Duration::from_secs(5)), 0);
        assert_eq!(required_checks(30, Duration::from_secs(30)), 1);
    }

    #[test]
    fn test_warmup_completes_after_required_checks() {
        let p = policy(WarmupFailurePolicy::Pause);
        let now = Utc::now();
        let mut state = warming(required_checks(10, Duration::from_secs(5)));

        let t = apply_health_check(&mut state, &ok(), &p, now);
        assert!(!t.warmup_completed);
        assert_eq!(state.state, LifecycleState::Starting);
        assert_eq!(state.warmup.progress(), 50);

        let t = apply_health_check(&mut state, &ok(), &p, now);
        assert!(t.warmup_completed);
        assert!(t.state_changed);
        assert_eq!(state.state, LifecycleState::Running);
        assert!(!state.warmup.is_in_warmup);
    }

    #[test]
    fn test_warmup_failure_pause_keeps_progress() {
        let p = policy(WarmupFailurePolicy::Pause);
        let now = Utc::now();
        let mut state = warming(3);

        apply_health_check(&mut state, &ok(), &p, now);
        apply_health_check(&mut state, &fail(), &p, now);
        assert_eq!(state.warmup.successful_checks, 1);
        apply_health_check(&mut state, &ok(), &p, now);
        apply_health_check(&mut state, &ok(), &p, now);
        assert_eq!(state.state, LifecycleState::Running);
    }

    #[test]
    fn test_warmup_failure_reset_zeroes_progress() {
        let p = policy(WarmupFailurePolicy::Reset);
        let now = Utc::now();
        let mut state = warming(3);

        apply_health_check(&mut state, &ok(), &p, now);
        apply_health_check(&mut state, &ok(), &p, now);
        apply_health_check(&mut state, &fail(), &p, now);
        assert_eq!(state.warmup.successful_checks, 0);
        assert_eq!(state.state, LifecycleState::Starting);
        assert!(state.warmup.is_in_warmup);
    }

    #[test]
    fn test_warmup_failures_never_open_breaker() {
        let p = policy(WarmupFailurePolicy::Pause);
        let now = Utc::now();
        let mut state = warming(2);
        for _ in 0..20 {
            apply_health_check(&mut state, &fail(), &p, now);
        }
        assert_eq!(state.circuit_breaker.state, BreakerState::Closed);
        assert_eq!(state.circuit_breaker.failures, 0);
        assert_eq!(state.health.consecutive_failures, 20);
        assert_eq!(state.state, LifecycleState::Starting);
    }

    #[test]
    fn test_running_unhealthy_toggle() {
        let p = policy(WarmupFailurePolicy::Pause);
        let now = Utc::now();
        let mut state = running();

        apply_health_check(&mut state, &fail(), &p, now);
        assert_eq!(state.state, LifecycleState::Unhealthy);
        assert_eq!(state.health.error.as_deref(), Some("connection refused"));

        apply_health_check(&mut state, &ok(), &p, now);
        assert_eq!(state.state, LifecycleState::Running);
        assert_eq!(state.health.response_time, Some(12));
        assert!(state.health.error.is_none());
    }

    #[test]
    fn test_breaker_cycle_through_lifecycle() {
        let p = policy(WarmupFailurePolicy::Pause);
        let now = Utc::now();
        let mut state = running();

        for _ in 0..5 {
            apply_health_check(&mut state, &fail(), &p, now);
        }
        assert_eq!(state.state, LifecycleState::CircuitOpen);
        assert_eq!(state.circuit_breaker.state, BreakerState::Open);

        // Healthy while open and before nextRetry: still parked.
        apply_health_check(&mut state, &ok(), &p, now);
        assert_eq!(state.state, LifecycleState::CircuitOpen);

        let later = now + chrono::Duration::seconds(1);
        let t = apply_health_check(&mut state, &fail(), &p, later);
        assert_eq!(t.breaker, BreakerTransition::HalfOpened);

        let t = apply_health_check(&mut state, &ok(), &p, later);
        assert_eq!(t.breaker, BreakerTransition::Closed);
        assert_eq!(state.state, LifecycleState::Running);
        assert_eq!(state.circuit_breaker.failures, 0);
        assert_eq!(state.circuit_breaker.backoff_seconds, 1.0);
    }

    #[test]
    fn test_checks_ignored_after_stop() {
        let p = policy(WarmupFailurePolicy::Pause);
        let mut state = running();
        state.state = LifecycleState::Stopping;
        let t = apply_health_check(&mut state, &fail(), &p, Utc::now());
        assert!(!t.applied);
        assert_eq!(state.health.consecutive_failures, 0);
    }

    #[test]
    fn test_completed_warmup_clears_restart_attempts() {
        let p = policy(WarmupFailurePolicy::Pause);
        let now = Utc::now();
        let mut state = warming(2);
        state.auto_restore_attempts = 3;

        apply_health_check(&mut state, &ok(), &p, now);
        assert_eq!(state.auto_restore_attempts, 3);
        let t = apply_health_check(&mut state, &ok(), &p, now);
        assert!(t.warmup_completed);
        assert_eq!(state.auto_restore_attempts, 0);

        // Post-warmup checks leave the counter alone.
        let mut steady = running();
        steady.auto_restore_attempts = 2;
        apply_health_check(&mut steady, &ok(), &p, now);
        assert_eq!(steady.auto_restore_attempts, 2);
    }
}
