use crate::registry::Managed;
use crate::service::{CircuitBreakerState, LifecycleState, RuntimeState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema version written into every state document.
pub const STATE_SCHEMA_VERSION: &str = "1.0.0";

/// Durable subset of [`RuntimeState`].
///
/// `pid` and `startTime` are informational only: no process survives an
/// orchestrator restart, so restore never trusts them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedServiceState {
    pub service_id: String,
    pub state: LifecycleState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed: Option<Managed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    pub circuit_breaker: CircuitBreakerState,
    pub auto_restore_attempts: u32,
    pub last_state_change: DateTime<Utc>,
}

impl PersistedServiceState {
    pub fn from_runtime(runtime: &RuntimeState, cwd: Option<String>) -> Self {
        Self {
            service_id: runtime.service_id.clone(),
            state: runtime.state,
            pid: runtime.process.pid,
            start_time: runtime.process.start_time,
            managed: Some(runtime.managed),
            cwd,
            circuit_breaker: runtime.circuit_breaker.clone(),
            auto_restore_attempts: runtime.auto_restore_attempts,
            last_state_change: runtime.last_state_change,
        }
    }
}

/// The whole on-disk document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub services: BTreeMap<String, PersistedServiceState>,
}

impl StateDocument {
    pub fn new(services: BTreeMap<String, PersistedServiceState>) -> Self {
        Self {
            version: STATE_SCHEMA_VERSION.to_string(),
            timestamp: Utc::now(),
            services,
        }
    }
}
