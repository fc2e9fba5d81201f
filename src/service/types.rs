use super::log_capture::LogBuffer;
use crate::registry::{Managed, ServiceConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a managed service.
///
/// ```text
/// Stopped ──► Starting ──► Running ◄──► Unhealthy
///    ▲           │            │  ▲          │
///    │           ▼            ▼  │          ▼
///    ├────── Stopping ◄── CircuitOpen ◄─────┘
///    │
///  Error (spawn failure or unexpected exit)
/// ```
///
/// Externally managed services sit in `External` permanently. Warmup is a
/// sub-flag of `Starting`, not a state; the legacy `"warmup"` value is read as
/// `Starting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Stopped,
    #[serde(alias = "warmup")]
    Starting,
    Running,
    Stopping,
    Unhealthy,
    CircuitOpen,
    Error,
    External,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Unhealthy => "unhealthy",
            LifecycleState::CircuitOpen => "circuit_open",
            LifecycleState::Error => "error",
            LifecycleState::External => "external",
        }
    }

    /// States that imply a live OS process owned by this orchestrator.
    pub fn has_process(&self) -> bool {
        matches!(
            self,
            LifecycleState::Starting
                | LifecycleState::Running
                | LifecycleState::Stopping
                | LifecycleState::Unhealthy
        )
    }

    /// States in which a new start must be refused.
    pub fn blocks_start(&self) -> bool {
        matches!(
            self,
            LifecycleState::Starting | LifecycleState::Running | LifecycleState::Stopping
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit-breaker sub-state. Transitions live in `circuit_breaker.rs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerState {
    pub state: BreakerState,
    pub failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry: Option<DateTime<Utc>>,
    pub backoff_seconds: f64,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            failures: 0,
            last_failure: None,
            next_retry: None,
            backoff_seconds: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessInfo {
    pub pid: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
}

impl ProcessInfo {
    /// Seconds since start, if the process is live.
    pub fn uptime_secs(&self, now: DateTime<Utc>) -> Option<f64> {
        match (self.pid, self.start_time) {
            (Some(_), Some(start)) => {
                Some(((now - start).num_milliseconds().max(0) as f64) / 1000.0)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthInfo {
    pub is_healthy: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Latency of the last check in milliseconds.
    pub response_time: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WarmupState {
    pub is_in_warmup: bool,
    pub successful_checks: u32,
    pub required_checks: u32,
    pub start_time: Option<DateTime<Utc>>,
}

impl WarmupState {
    /// Percentage 0..=100.
    pub fn progress(&self) -> u8 {
        if self.required_checks == 0 {
            return if self.is_in_warmup { 0 } else { 100 };
        }
        let pct = (100.0 * self.successful_checks as f64 / self.required_checks as f64).round();
        pct.clamp(0.0, 100.0) as u8
    }
}

/// Mutable per-service record held by the orchestrator.
///
/// One exists for every registry entry for the life of the orchestrator.
#[derive(Debug, Clone)]
pub struct RuntimeState {
    pub service_id: String,
    pub state: LifecycleState,
    pub process: ProcessInfo,
    pub health: HealthInfo,
    pub circuit_breaker: CircuitBreakerState,
    pub warmup: WarmupState,
    pub auto_restore_attempts: u32,
    pub last_state_change: DateTime<Utc>,
    pub dependencies: Vec<String>,
    pub managed: Managed,
    /// Resolved working directory, for display and persistence.
    pub cwd: String,
    pub logs: LogBuffer,
}

impl RuntimeState {
    pub fn new(service: &ServiceConfig, cwd: String, log_lines: usize) -> Self {
        let now = Utc::now();
        let mut state = Self {
            service_id: service.id.clone(),
            state: LifecycleState::Stopped,
            process: ProcessInfo::default(),
            health: HealthInfo::default(),
            circuit_breaker: CircuitBreakerState::default(),
            warmup: WarmupState::default(),
            auto_restore_attempts: 0,
            last_state_change: now,
            dependencies: service.dependencies.clone(),
            managed: service.run.managed,
            cwd,
            logs: LogBuffer::new(log_lines),
        };

        if service.is_external() {
            state.state = LifecycleState::External;
            state.health = HealthInfo {
                is_healthy: true,
                last_check: Some(now),
                consecutive_failures: 0,
                consecutive_successes: 1,
                response_time: None,
                error: None,
            };
            state.circuit_breaker.backoff_seconds = 0.0;
            state.warmup = WarmupState {
                is_in_warmup: false,
                successful_checks: 1,
                required_checks: 1,
                start_time: None,
            };
        }
        state
    }

    /// Set the lifecycle state, stamping `last_state_change` only on a real change.
    /// Returns whether the state changed.
    pub fn set_state(&mut self, next: LifecycleState, now: DateTime<Utc>) -> bool {
        if self.state == next {
            return false;
        }
        self.state = next;
        self.last_state_change = now;
        true
    }

    pub fn is_external(&self) -> bool {
        self.managed == Managed::External
    }
}
