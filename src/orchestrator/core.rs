use crate::config::OrchestratorConfig;
use crate::error::{Error, Result};
use crate::healthcheck::{HealthProbe, HttpProbe};
use crate::registry::{Registry, ServiceConfig};
use crate::service::{
    required_checks, LifecycleState, ProcessEvent, ProcessManager, ProcessInfo, RuntimeState,
    SharedStates,
};
use crate::state::{PersistedServiceState, StateManager};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Coordinates the registry, the process manager and state persistence.
///
/// Owns the authoritative `service id -> RuntimeState` map, built once from the
/// registry. Every lifecycle action validates its preconditions here, delegates
/// to the [`ProcessManager`] and then persists the result.
///
/// # Lock Ordering
///
/// The states map is a sync mutex and is never held across an await. It is
/// never taken while the process manager's handle table is locked.
///
/// # Example
///
/// ```no_run
/// use service_orchestrator::{config::OrchestratorConfig, orchestrator::Orchestrator, registry::Registry};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), service_orchestrator::Error> {
/// let registry = Registry::from_file(std::path::Path::new("registry.yaml"))?;
/// let orchestrator = Arc::new(Orchestrator::new(registry, OrchestratorConfig::default())?);
/// orchestrator.initialize().await?;
/// // ...
/// orchestrator.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator {
    pub(super) registry: Arc<Registry>,
    pub(super) config: Arc<OrchestratorConfig>,
    pub(super) states: SharedStates,
    pub(super) process_manager: ProcessManager,
    pub(super) state_manager: StateManager,
    events: Mutex<Option<UnboundedReceiver<ProcessEvent>>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    /// Cancels the event loop and any pending auto-restarts.
    pub(super) shutdown_token: CancellationToken,
    started_at: DateTime<Utc>,
    shutdown_started: AtomicBool,
}

impl Orchestrator {
    /// Create an orchestrator that probes health over HTTP.
    pub fn new(registry: Registry, config: OrchestratorConfig) -> Result<Self> {
        let probe = HttpProbe::new(config.health_check.host.clone(), config.health_check.timeout)?;
        Ok(Self::with_probe(registry, config, Arc::new(probe)))
    }

    pub fn with_probe(
        registry: Registry,
        config: OrchestratorConfig,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        let registry = Arc::new(registry);
        let config = Arc::new(config);
        let states: SharedStates = Arc::new(Mutex::new(build_runtime_states(&registry, &config)));
        let (tx, rx) = mpsc::unbounded_channel();

        let process_manager =
            ProcessManager::new(registry.clone(), config.clone(), states.clone(), probe, tx);
        let state_manager = StateManager::new(&config.state_dir);

        tracing::debug!("Loaded {} services from registry", registry.len());

        Self {
            registry,
            config,
            states,
            process_manager,
            state_manager,
            events: Mutex::new(Some(rx)),
            event_loop: Mutex::new(None),
            shutdown_token: CancellationToken::new(),
            started_at: Utc::now(),
            shutdown_started: AtomicBool::new(false),
        }
    }

    /// Restore persisted state, start the event loop and auto-start services.
    ///
    /// Must be called once, before any action.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        tracing::info!("Initializing orchestrator");
        self.state_manager.initialize().await?;
        self.restore_state().await;

        let rx = self.events.lock().take();
        match rx {
            Some(rx) => {
                let handle = self.spawn_event_loop(rx);
                *self.event_loop.lock() = Some(handle);
            }
            None => {
                return Err(Error::Config(
                    "Orchestrator has already been initialized".to_string(),
                ))
            }
        }

        if self.config.auto_start.enabled {
            self.auto_start_configured_services().await;
        }

        tracing::info!("Orchestrator initialized ({} services)", self.registry.len());
        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn process_manager(&self) -> &ProcessManager {
        &self.process_manager
    }

    pub fn state_manager(&self) -> &StateManager {
        &self.state_manager
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Copy of one service's runtime record.
    pub fn runtime_state(&self, service_id: &str) -> Option<RuntimeState> {
        self.states.lock().get(service_id).cloned()
    }

    pub(super) fn service(&self, service_id: &str) -> Result<&ServiceConfig> {
        self.registry
            .find_service_by_id(service_id)
            .ok_or_else(|| Error::ServiceNotFound(service_id.to_string()))
    }

    pub(super) fn current_state(&self, service_id: &str) -> Option<LifecycleState> {
        self.states.lock().get(service_id).map(|s| s.state)
    }

    /// Apply persisted records. External services keep their initial record
    /// and nothing that implies a live process survives the restart.
    async fn restore_state(&self) {
        let persisted = self.state_manager.load_state().await;
        let now = Utc::now();
        let mut restored = 0usize;

        {
            let mut states = self.states.lock();
            for (service_id, entry) in &persisted {
                let Some(runtime) = states.get_mut(service_id) else {
                    tracing::debug!("Ignoring persisted state for unknown service '{}'", service_id);
                    continue;
                };
                if runtime.is_external() {
                    tracing::debug!(
                        "Skipping state restoration for external service '{}'",
                        service_id
                    );
                    continue;
                }

                runtime.circuit_breaker = entry.circuit_breaker.clone();
                runtime.auto_restore_attempts = entry.auto_restore_attempts;
                runtime.process = ProcessInfo::default();

                if entry.state.has_process() || entry.state == LifecycleState::External {
                    runtime.state = LifecycleState::Stopped;
                    runtime.last_state_change = now;
                } else {
                    runtime.state = entry.state;
                    runtime.last_state_change = entry.last_state_change;
                }
                restored += 1;
            }
        }

        tracing::info!("Restored state for {} services", restored);
    }

    pub(super) fn persisted_entry(&self, service_id: &str) -> Option<PersistedServiceState> {
        let states = self.states.lock();
        let runtime = states.get(service_id)?;
        Some(PersistedServiceState::from_runtime(
            runtime,
            Some(runtime.cwd.clone()),
        ))
    }

    /// Write one service's current record to disk.
    pub(super) async fn persist(&self, service_id: &str) -> Result<()> {
        let Some(entry) = self.persisted_entry(service_id) else {
            return Ok(());
        };
        self.state_manager.update_service_state(entry).await
    }

    fn persisted_snapshot(&self) -> BTreeMap<String, PersistedServiceState> {
        self.states
            .lock()
            .values()
            .map(|runtime| {
                (
                    runtime.service_id.clone(),
                    PersistedServiceState::from_runtime(runtime, Some(runtime.cwd.clone())),
                )
            })
            .collect()
    }

    /// Save the full state map, stop the event loop, then terminate every
    /// live process. Runs once; later calls are no-ops.
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("Shutting down orchestrator");

        let saved = self.state_manager.save_state(self.persisted_snapshot()).await;
        if let Err(e) = &saved {
            tracing::error!("Failed to save state during shutdown: {}", e);
        }

        self.shutdown_token.cancel();
        let handle = self.event_loop.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        self.process_manager.cleanup().await;
        tracing::info!("Orchestrator shutdown complete");
        saved
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_started.load(Ordering::SeqCst)
    }
}

fn build_runtime_states(
    registry: &Registry,
    config: &OrchestratorConfig,
) -> HashMap<String, RuntimeState> {
    registry
        .get_all_services()
        .iter()
        .map(|service| {
            let mut state = RuntimeState::new(
                service,
                service.relative_cwd().to_string(),
                config.process.log_lines,
            );
            if !service.is_external() && service.has_health_endpoint() {
                state.warmup.required_checks =
                    required_checks(service.warmup_time, config.health_check.interval);
            }
            (service.id.clone(), state)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Managed;

    fn registry() -> Registry {
        let mut db = ServiceConfig::new("postgresql", 5432);
        db.run.managed = Managed::External;
        let mut api = ServiceConfig::new("api", 8080);
        api.run.command = "sleep".to_string();
        api.warmup_time = 10;
        api.dependencies = vec!["postgresql".to_string()];
        Registry::new(vec![db, api])
    }

    fn config() -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default();
        config.health_check.interval = std::time::Duration::from_secs(5);
        config
    }

    #[tokio::test]
    async fn test_initial_runtime_states() {
        let orch = Orchestrator::new(registry(), config()).unwrap();

        let db = orch.runtime_state("postgresql").unwrap();
        assert_eq!(db.state, LifecycleState::External);
        assert!(db.health.is_healthy);

        let api = orch.runtime_state("api").unwrap();
        assert_eq!(api.state, LifecycleState::Stopped);
        assert_eq!(api.warmup.required_checks, 2);
        assert_eq!(api.dependencies, vec!["postgresql".to_string()]);
        assert!(orch.runtime_state("missing").is_none());
    }

    #[tokio::test]
    async fn test_persisted_entry_carries_cwd_and_managed() {
        let orch = Orchestrator::new(registry(), config()).unwrap();
        let entry = orch.persisted_entry("api").unwrap();
        assert_eq!(entry.cwd.as_deref(), Some("."));
        assert_eq!(entry.managed, Some(Managed::Internal));
        assert_eq!(entry.state, LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.state_dir = dir.path().join("state");
        config.auto_start.enabled = false;
        let orch = Arc::new(Orchestrator::new(registry(), config).unwrap());
        orch.initialize().await.unwrap();
        assert!(!orch.is_shutting_down());

        orch.shutdown().await.unwrap();
        assert!(orch.is_shutting_down());
        assert!(dir.path().join("state").join(crate::state::STATE_FILE_NAME).exists());

        // Second call is a no-op.
        orch.shutdown().await.unwrap();
        assert!(orch.is_shutting_down());
    }
}
