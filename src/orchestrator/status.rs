use super::Orchestrator;
use crate::registry::{Managed, ServiceConfig};
use crate::service::{BreakerState, LifecycleState, RuntimeState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ORCHESTRATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupStatus {
    pub is_in_warmup: bool,
    /// 0-100
    pub progress: u8,
    pub successful_checks: u32,
    pub required_checks: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerStatus {
    pub state: BreakerState,
    pub failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry: Option<DateTime<Utc>>,
    pub backoff_seconds: f64,
}

/// Per-service view returned by the status operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatusResponse {
    pub service_id: String,
    pub name: String,
    pub state: LifecycleState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<f64>,
    pub managed: Managed,
    pub cwd: String,
    pub health: HealthStatus,
    pub warmup: WarmupStatus,
    pub circuit_breaker: CircuitBreakerStatus,
    pub dependencies: Vec<String>,
    pub auto_restore_attempts: u32,
    pub last_state_change: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorSummary {
    pub version: String,
    /// Seconds since the orchestrator was created.
    pub uptime: f64,
    pub services_total: usize,
    pub services_running: usize,
    pub services_healthy: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorStatusResponse {
    pub orchestrator: OrchestratorSummary,
    pub services: Vec<ServiceStatusResponse>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceLogs {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

/// Externally managed services always report fixed healthy values; their
/// runtime record is never consulted beyond the dependency list.
fn build_service_status(
    service: &ServiceConfig,
    runtime: &RuntimeState,
    process: Option<(u32, f64)>,
) -> ServiceStatusResponse {
    let base = |state, health, warmup, circuit_breaker, auto_restore_attempts| {
        ServiceStatusResponse {
            service_id: service.id.clone(),
            name: service.name.clone(),
            state,
            pid: None,
            uptime: None,
            managed: service.run.managed,
            cwd: service.relative_cwd().to_string(),
            health,
            warmup,
            circuit_breaker,
            dependencies: runtime.dependencies.clone(),
            auto_restore_attempts,
            last_state_change: runtime.last_state_change,
        }
    };

    if service.is_external() {
        return base(
            LifecycleState::External,
            HealthStatus {
                is_healthy: true,
                last_check: runtime.health.last_check,
                consecutive_failures: 0,
                response_time: None,
                error: None,
            },
            WarmupStatus {
                is_in_warmup: false,
                progress: 100,
                successful_checks: 0,
                required_checks: 0,
            },
            CircuitBreakerStatus {
                state: BreakerState::Closed,
                failures: 0,
                next_retry: None,
                backoff_seconds: 0.0,
            },
            0,
        );
    }

    let mut status = base(
        runtime.state,
        HealthStatus {
            is_healthy: runtime.health.is_healthy,
            last_check: runtime.health.last_check,
            consecutive_failures: runtime.health.consecutive_failures,
            response_time: runtime.health.response_time,
            error: runtime.health.error.clone(),
        },
        WarmupStatus {
            is_in_warmup: runtime.warmup.is_in_warmup,
            progress: runtime.warmup.progress(),
            successful_checks: runtime.warmup.successful_checks,
            required_checks: runtime.warmup.required_checks,
        },
        CircuitBreakerStatus {
            state: runtime.circuit_breaker.state,
            failures: runtime.circuit_breaker.failures,
            next_retry: runtime.circuit_breaker.next_retry,
            backoff_seconds: runtime.circuit_breaker.backoff_seconds,
        },
        runtime.auto_restore_attempts,
    );
    if let Some((pid, uptime)) = process {
        status.pid = Some(pid);
        status.uptime = Some(uptime);
    }
    status
}

impl Orchestrator {
    fn status_for(&self, service: &ServiceConfig) -> Option<ServiceStatusResponse> {
        let process = self
            .process_manager
            .get_process_info(&service.id)
            .map(|info| (info.pid, info.uptime_secs));
        let states = self.states.lock();
        let runtime = states.get(&service.id)?;
        Some(build_service_status(service, runtime, process))
    }

    pub fn get_service_status(&self, service_id: &str) -> Option<ServiceStatusResponse> {
        let service = self.registry.find_service_by_id(service_id)?;
        self.status_for(service)
    }

    /// All services sorted by id, plus orchestrator totals.
    pub fn get_status_all(&self) -> OrchestratorStatusResponse {
        let mut services: Vec<ServiceStatusResponse> = self
            .registry
            .get_all_services()
            .iter()
            .filter_map(|service| self.status_for(service))
            .collect();
        services.sort_by(|a, b| a.service_id.cmp(&b.service_id));

        let running: Vec<&ServiceStatusResponse> = services
            .iter()
            .filter(|s| s.state == LifecycleState::Running)
            .collect();
        let services_healthy = running.iter().filter(|s| s.health.is_healthy).count();
        let uptime = (Utc::now() - self.started_at()).num_milliseconds().max(0) as f64 / 1000.0;

        OrchestratorStatusResponse {
            orchestrator: OrchestratorSummary {
                version: ORCHESTRATOR_VERSION.to_string(),
                uptime,
                services_total: services.len(),
                services_running: running.len(),
                services_healthy,
            },
            services,
        }
    }

    /// Last `lines` lines of each stream; empty for unknown services.
    pub fn get_service_logs(&self, service_id: &str, lines: usize) -> ServiceLogs {
        let logs = self.states.lock().get(service_id).map(|s| s.logs.clone());
        match logs {
            Some(logs) => {
                let (stdout, stderr) = logs.tail(lines);
                ServiceLogs { stdout, stderr }
            }
            None => ServiceLogs::default(),
        }
    }

    pub fn get_registry(&self) -> &[ServiceConfig] {
        self.registry.get_all_services()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::CircuitBreakerState;

    #[test]
    fn test_external_status_is_blanked() {
        let mut db = ServiceConfig::new("postgresql", 5432);
        db.run.managed = Managed::External;
        let mut runtime = RuntimeState::new(&db, ".".to_string(), 10);
        // Even a corrupted runtime record must not leak through.
        runtime.health.consecutive_failures = 9;
        runtime.circuit_breaker = CircuitBreakerState {
            state: BreakerState::Open,
            failures: 5,
            ..CircuitBreakerState::default()
        };

        let status = build_service_status(&db, &runtime, Some((42, 1.0)));
        assert_eq!(status.state, LifecycleState::External);
        assert!(status.health.is_healthy);
        assert_eq!(status.health.consecutive_failures, 0);
        assert_eq!(status.circuit_breaker.state, BreakerState::Closed);
        assert_eq!(status.warmup.progress, 100);
        assert_eq!(status.pid, None);
        assert_eq!(status.managed, Managed::External);
    }

    #[test]
    fn test_internal_status_passes_values_through() {
        let mut api = ServiceConfig::new("api", 3000);
        api.run.command = "node".to_string();
        let mut runtime = RuntimeState::new(&api, "services/api".to_string(), 10);
        runtime.state = LifecycleState::Starting;
        runtime.warmup.is_in_warmup = true;
        runtime.warmup.required_checks = 4;
        runtime.warmup.successful_checks = 1;
        runtime.health.consecutive_failures = 2;

        let status = build_service_status(&api, &runtime, Some((1234, 2.5)));
        assert_eq!(status.state, LifecycleState::Starting);
        assert_eq!(status.warmup.progress, 25);
        assert_eq!(status.health.consecutive_failures, 2);
        assert_eq!(status.pid, Some(1234));
        assert_eq!(status.uptime, Some(2.5));

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["serviceId"], "api");
        assert_eq!(json["circuitBreaker"]["state"], "closed");
        assert_eq!(json["warmup"]["isInWarmup"], true);
    }
}
