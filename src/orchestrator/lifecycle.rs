use super::Orchestrator;
use crate::error::{Error, Result};
use crate::registry::ServiceConfig;
use crate::service::{LifecycleState, RuntimeState};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// How often auto-start re-checks a dependency that is still starting.
const DEPENDENCY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// The four actions exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceAction {
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "stop")]
    Stop,
    #[serde(rename = "restart")]
    Restart,
    #[serde(rename = "resetCircuit")]
    ResetCircuit,
}

impl ServiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
            ServiceAction::ResetCircuit => "resetCircuit",
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "start" => Ok(ServiceAction::Start),
            "stop" => Ok(ServiceAction::Stop),
            "restart" => Ok(ServiceAction::Restart),
            "resetCircuit" => Ok(ServiceAction::ResetCircuit),
            other => Err(Error::UnknownAction(other.to_string())),
        }
    }
}

/// Every dependency must be ready: EXTERNAL for externally managed ones,
/// RUNNING for internal ones.
fn check_dependencies(
    service: &ServiceConfig,
    states: &HashMap<String, RuntimeState>,
) -> Result<()> {
    for dep_id in &service.dependencies {
        let dep = states.get(dep_id);
        let external = dep.is_some_and(RuntimeState::is_external);
        let ready = match dep {
            Some(dep) if external => dep.state == LifecycleState::External,
            Some(dep) => dep.state == LifecycleState::Running,
            None => false,
        };
        if !ready {
            return Err(Error::DependencyNotSatisfied {
                service: service.id.clone(),
                dependency: dep_id.clone(),
                expected: if external {
                    "external and healthy".to_string()
                } else {
                    "running".to_string()
                },
            });
        }
    }
    Ok(())
}

impl Orchestrator {
    /// Start one service after checking it is idle and its dependencies are ready.
    #[tracing::instrument(skip(self), fields(service.id = %service_id))]
    pub async fn start_service(&self, service_id: &str) -> Result<()> {
        let service = self.service(service_id)?;
        if service.is_external() {
            return Err(Error::ExternallyManaged {
                service: service.id.clone(),
                action: "started".to_string(),
            });
        }

        let has_process = self.process_manager.is_service_running(service_id);

        // Claim the service so a concurrent start fails fast instead of queuing.
        let previous = {
            let mut states = self.states.lock();
            let runtime = states
                .get(service_id)
                .ok_or_else(|| Error::ServiceNotFound(service_id.to_string()))?;
            if runtime.state.blocks_start() || has_process {
                return Err(Error::AlreadyInState {
                    service: service_id.to_string(),
                    state: runtime.state.to_string(),
                });
            }
            check_dependencies(service, &states)?;

            let previous = runtime.state;
            if let Some(runtime) = states.get_mut(service_id) {
                runtime.set_state(LifecycleState::Starting, Utc::now());
            }
            previous
        };

        if let Err(e) = self.process_manager.start_service(service_id).await {
            self.release_claim(service_id, previous);
            if let Err(persist_err) = self.persist(service_id).await {
                tracing::warn!(
                    "Failed to persist state for service '{}': {}",
                    service_id,
                    persist_err
                );
            }
            return Err(e);
        }

        self.persist(service_id).await
    }

    /// Undo a start claim that never reached the spawn.
    fn release_claim(&self, service_id: &str, previous: LifecycleState) {
        let mut states = self.states.lock();
        if let Some(runtime) = states.get_mut(service_id) {
            if runtime.state == LifecycleState::Starting && runtime.process.pid.is_none() {
                runtime.set_state(previous, Utc::now());
            }
        }
    }

    #[tracing::instrument(skip(self), fields(service.id = %service_id))]
    pub async fn stop_service(&self, service_id: &str) -> Result<()> {
        self.service(service_id)?;
        self.process_manager.stop_service(service_id).await?;
        self.persist(service_id).await
    }

    /// Stop, pause, start. Clears the auto-restart counter and the breaker.
    #[tracing::instrument(skip(self), fields(service.id = %service_id))]
    pub async fn restart_service(&self, service_id: &str) -> Result<()> {
        let service = self.service(service_id)?;
        if service.is_external() {
            return Err(Error::ExternallyManaged {
                service: service.id.clone(),
                action: "restarted".to_string(),
            });
        }

        {
            let mut states = self.states.lock();
            if let Some(runtime) = states.get_mut(service_id) {
                runtime.auto_restore_attempts = 0;
                runtime.circuit_breaker.reset();
            }
        }

        let restarted = self.process_manager.restart_service(service_id).await;
        let persisted = self.persist(service_id).await;
        restarted.and(persisted)
    }

    /// Close the breaker. A CIRCUIT_OPEN service is terminated, settles to
    /// STOPPED and must be started explicitly.
    pub async fn reset_circuit_breaker(&self, service_id: &str) -> Result<()> {
        self.process_manager.reset_circuit_breaker(service_id).await?;
        {
            let mut states = self.states.lock();
            if let Some(runtime) = states.get_mut(service_id) {
                runtime.auto_restore_attempts = 0;
            }
        }
        self.persist(service_id).await
    }

    pub async fn execute_service_action(
        &self,
        service_id: &str,
        action: ServiceAction,
    ) -> Result<()> {
        tracing::info!("Executing '{}' on service '{}'", action, service_id);
        match action {
            ServiceAction::Start => self.start_service(service_id).await,
            ServiceAction::Stop => self.stop_service(service_id).await,
            ServiceAction::Restart => self.restart_service(service_id).await,
            ServiceAction::ResetCircuit => self.reset_circuit_breaker(service_id).await,
        }
    }

    /// Run one action over several services in order; one failure does not
    /// stop the rest.
    pub async fn execute_batch_action(
        &self,
        service_ids: &[String],
        action: ServiceAction,
    ) -> Vec<(String, Result<()>)> {
        let mut results = Vec::with_capacity(service_ids.len());
        for service_id in service_ids {
            let result = self.execute_service_action(service_id, action).await;
            if let Err(e) = &result {
                tracing::warn!("Batch '{}' failed for service '{}': {}", action, service_id, e);
            }
            results.push((service_id.clone(), result));
        }
        results
    }

    /// Walk the startup order and start every service flagged for auto-start.
    /// Failures are logged and the walk continues.
    pub(super) async fn auto_start_configured_services(self: &Arc<Self>) {
        let order = match self.registry.calculate_startup_order() {
            Ok(order) => order,
            Err(e) => {
                tracing::error!("Cannot compute startup order, skipping auto-start: {}", e);
                return;
            }
        };

        for entry in order {
            if self.shutdown_token.is_cancelled() {
                return;
            }
            let Some(service) = self.registry.find_service_by_id(&entry.service_id) else {
                continue;
            };
            if !service.should_auto_start() {
                continue;
            }
            if self
                .current_state(&service.id)
                .is_some_and(|state| state.blocks_start())
            {
                continue;
            }

            self.wait_for_starting_dependencies(service).await;
            match self.start_service(&service.id).await {
                Ok(()) => tracing::info!("Auto-started service '{}'", service.id),
                Err(e) => tracing::error!("Failed to auto-start service '{}': {}", service.id, e),
            }
        }
    }

    /// Block while any dependency is still in warmup, up to the configured limit.
    async fn wait_for_starting_dependencies(&self, service: &ServiceConfig) {
        let still_starting = || {
            let states = self.states.lock();
            service.dependencies.iter().any(|dep| {
                states
                    .get(dep)
                    .is_some_and(|s| s.state == LifecycleState::Starting)
            })
        };
        if !still_starting() {
            return;
        }

        tracing::info!("Waiting for dependencies of '{}' to finish starting", service.id);
        let limit = self.config.auto_start.dependency_timeout;
        let waited = tokio::time::timeout(limit, async {
            while still_starting() {
                tokio::select! {
                    _ = self.shutdown_token.cancelled() => return,
                    _ = tokio::time::sleep(DEPENDENCY_POLL_INTERVAL) => {}
                }
            }
        })
        .await;
        if waited.is_err() {
            tracing::warn!(
                "Dependencies of '{}' still starting after {:?}",
                service.id,
                limit
            );
        }
    }
}
