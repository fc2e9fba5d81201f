mod core;
mod lifecycle;
mod monitoring;
mod status;

pub use core::Orchestrator;
pub use lifecycle::ServiceAction;
pub use status::{
    CircuitBreakerStatus, HealthStatus, OrchestratorStatusResponse, OrchestratorSummary,
    ServiceLogs, ServiceStatusResponse, WarmupStatus, ORCHESTRATOR_VERSION,
};
