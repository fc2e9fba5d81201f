use super::types::LifecycleState;

/// Notifications from the process manager to the orchestrator's event loop.
///
/// Sent over an unbounded mpsc channel, so events for one service arrive in
/// the order they were produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    /// Lifecycle, health, warmup or breaker data changed.
    StateChanged {
        service_id: String,
        state: LifecycleState,
    },
    /// The child exited. `unexpected` is false when the exit followed a stop.
    Exited {
        service_id: String,
        exit_code: Option<i32>,
        unexpected: bool,
    },
    SpawnFailed { service_id: String, error: String },
}

impl ProcessEvent {
    pub fn service_id(&self) -> &str {
        match self {
            ProcessEvent::StateChanged { service_id, .. }
            | ProcessEvent::Exited { service_id, .. }
            | ProcessEvent::SpawnFailed { service_id, .. } => service_id,
        }
    }
}
