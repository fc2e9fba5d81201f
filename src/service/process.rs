use super::events::ProcessEvent;
use super::health::{required_checks, HealthPolicy};
use super::monitor::HealthMonitor;
use super::path::{augment_path, PackageManagerLocator};
use super::types::{HealthInfo, LifecycleState, ProcessInfo, WarmupState};
use super::{SharedStates, Stream};
use crate::config::OrchestratorConfig;
use crate::error::{validate_pid, Error, Result};
use crate::healthcheck::HealthProbe;
use crate::registry::{
    build_service_environment, missing_required_env, service_working_directory, Registry,
    ServiceConfig,
};
use chrono::{DateTime, Utc};
use nix::sys::signal::{self, killpg, Signal};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::{mpsc::UnboundedSender, watch};
use tokio_util::sync::CancellationToken;

/// How long to wait for the kernel to reap a child after SIGKILL.
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
}

/// Live process bookkeeping. Removed by the supervisor task when the child exits.
struct ProcessHandle {
    pid: u32,
    exit: watch::Receiver<Option<ExitInfo>>,
    monitor: CancellationToken,
}

/// Point-in-time view of a live process.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub uptime_secs: f64,
}

/// Owns OS processes for internally managed services.
///
/// Lifecycle, health and breaker data are written into the shared runtime
/// state map; every change is announced on the event channel. The states lock
/// is never held across an await and never taken while the handles lock is held.
pub struct ProcessManager {
    registry: Arc<Registry>,
    config: Arc<OrchestratorConfig>,
    states: SharedStates,
    handles: Arc<Mutex<HashMap<String, ProcessHandle>>>,
    probe: Arc<dyn HealthProbe>,
    events: UnboundedSender<ProcessEvent>,
    base_env: HashMap<String, String>,
    locator: PackageManagerLocator,
}

impl ProcessManager {
    pub fn new(
        registry: Arc<Registry>,
        config: Arc<OrchestratorConfig>,
        states: SharedStates,
        probe: Arc<dyn HealthProbe>,
        events: UnboundedSender<ProcessEvent>,
    ) -> Self {
        let base_env: HashMap<String, String> = std::env::vars().collect();
        let locator =
            PackageManagerLocator::from_settings(&config.process.package_manager, &base_env);
        Self {
            registry,
            config,
            states,
            handles: Arc::new(Mutex::new(HashMap::new())),
            probe,
            events,
            base_env,
            locator,
        }
    }

    /// Replace the package-manager resolution chain.
    pub fn with_locator(mut self, locator: PackageManagerLocator) -> Self {
        self.locator = locator;
        self
    }

    fn service(&self, service_id: &str) -> Result<&ServiceConfig> {
        self.registry
            .find_service_by_id(service_id)
            .ok_or_else(|| Error::ServiceNotFound(service_id.to_string()))
    }

    fn emit(&self, event: ProcessEvent) {
        // The receiver only goes away during shutdown.
        let _ = self.events.send(event);
    }

    fn emit_state(&self, service_id: &str) {
        let state = self.states.lock().get(service_id).map(|s| s.state);
        if let Some(state) = state {
            self.emit(ProcessEvent::StateChanged {
                service_id: service_id.to_string(),
                state,
            });
        }
    }

    pub fn is_service_running(&self, service_id: &str) -> bool {
        self.handles.lock().contains_key(service_id)
    }

    pub fn running_services(&self) -> Vec<String> {
        self.handles.lock().keys().cloned().collect()
    }

    pub fn get_process_info(&self, service_id: &str) -> Option<ProcessSnapshot> {
        let pid = self.handles.lock().get(service_id).map(|h| h.pid)?;
        let start_time = self
            .states
            .lock()
            .get(service_id)
            .and_then(|s| s.process.start_time);
        let uptime_secs = start_time
            .map(|start| (Utc::now() - start).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or(0.0);
        Some(ProcessSnapshot {
            pid,
            start_time,
            uptime_secs,
        })
    }

    fn health_policy(&self) -> HealthPolicy {
        HealthPolicy {
            circuit_breaker: self.config.circuit_breaker.clone(),
            warmup_failure: self.config.health_check.warmup_failure,
        }
    }

    /// Program to exec plus the directory to prepend to `PATH`.
    fn resolve_program(&self, service: &ServiceConfig) -> Result<(PathBuf, Option<PathBuf>)> {
        if service.run.command == self.locator.name() {
            let resolved = self.locator.locate()?;
            tracing::debug!(
                "Resolved '{}' to '{}' for service '{}'",
                self.locator.name(),
                resolved.display(),
                service.id
            );
            let dir = resolved.parent().map(|p| p.to_path_buf());
            return Ok((resolved, dir));
        }
        Ok((PathBuf::from(&service.run.command), None))
    }

    fn child_environment(
        &self,
        service: &ServiceConfig,
        extra_path: Option<&std::path::Path>,
    ) -> HashMap<String, String> {
        let mut env = build_service_environment(service, &self.base_env);
        let path = augment_path(self.base_env.get("PATH").map(String::as_str), extra_path);
        env.insert("PATH".to_string(), path);
        env.insert(
            "NODE_ENV".to_string(),
            self.config.environment.as_str().to_string(),
        );

        let missing = missing_required_env(service, &env);
        if !missing.is_empty() {
            tracing::warn!(
                "Service '{}' is missing required environment variables: {}",
                service.id,
                missing.join(", ")
            );
        }
        env
    }

    fn mark_spawn_failed(&self, service_id: &str, error: &Error) {
        {
            let mut states = self.states.lock();
            if let Some(state) = states.get_mut(service_id) {
                state.process = ProcessInfo::default();
                state.warmup.is_in_warmup = false;
                state.set_state(LifecycleState::Error, Utc::now());
            }
        }
        self.emit(ProcessEvent::SpawnFailed {
            service_id: service_id.to_string(),
            error: error.to_string(),
        });
    }

    /// Spawn the service's process and begin health monitoring.
    #[tracing::instrument(skip(self), fields(service.id = %service_id))]
    pub async fn start_service(&self, service_id: &str) -> Result<()> {
        let service = self.service(service_id)?.clone();
        if service.is_external() {
            return Err(Error::ExternallyManaged {
                service: service.id.clone(),
                action: "started".to_string(),
            });
        }
        if self.is_service_running(service_id) {
            return Err(Error::AlreadyInState {
                service: service.id.clone(),
                state: LifecycleState::Running.to_string(),
            });
        }

        let spawned = self.spawn(&service);
        if let Err(e) = &spawned {
            tracing::error!("Failed to start service '{}': {}", service.id, e);
            self.mark_spawn_failed(&service.id, e);
        }
        spawned
    }

    fn spawn(&self, service: &ServiceConfig) -> Result<()> {
        let (program, extra_path) = self.resolve_program(service)?;
        let cwd = service_working_directory(service, &self.config.project_root);
        let env = self.child_environment(service, extra_path.as_deref());

        let mut cmd = Command::new(&program);
        cmd.args(&service.run.args)
            .current_dir(&cwd)
            .env_clear()
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .process_group(0); // own group so stop can signal the whole tree

        let mut child = cmd.spawn().map_err(|e| {
            Error::ServiceStartFailed(
                service.id.clone(),
                format!("{} (command: {}, cwd: {})", e, program.display(), cwd.display()),
            )
        })?;
        let pid = child.id().ok_or_else(|| {
            Error::ServiceStartFailed(
                service.id.clone(),
                "process exited before its pid could be read".to_string(),
            )
        })?;

        let now = Utc::now();
        let required = if service.has_health_endpoint() {
            required_checks(service.warmup_time, self.config.health_check.interval)
        } else {
            0
        };

        let logs = {
            let mut states = self.states.lock();
            let state = states
                .get_mut(&service.id)
                .ok_or_else(|| Error::ServiceNotFound(service.id.clone()))?;
            state.process = ProcessInfo {
                pid: Some(pid),
                start_time: Some(now),
                exit_code: None,
            };
            state.health = HealthInfo::default();
            state.warmup = WarmupState {
                is_in_warmup: required > 0,
                successful_checks: 0,
                required_checks: required,
                start_time: Some(now),
            };
            // The state may already be Starting (claimed by the caller); stamp the spawn time regardless.
            state.state = if required > 0 {
                LifecycleState::Starting
            } else {
                LifecycleState::Running
            };
            state.last_state_change = now;
            state.logs.clone()
        };

        logs.clear();
        if let Some(stdout) = child.stdout.take() {
            logs.capture(stdout, Stream::Stdout, &service.id);
        }
        if let Some(stderr) = child.stderr.take() {
            logs.capture(stderr, Stream::Stderr, &service.id);
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let monitor = CancellationToken::new();
        self.handles.lock().insert(
            service.id.clone(),
            ProcessHandle {
                pid,
                exit: exit_rx,
                monitor: monitor.clone(),
            },
        );

        // Supervisor: owns the child until it exits.
        let service_id = service.id.clone();
        let states = self.states.clone();
        let handles = self.handles.clone();
        let events = self.events.clone();
        let supervisor_monitor = monitor.clone();
        tokio::spawn(async move {
            let status = child.wait().await;
            let code = match &status {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::warn!("Failed to wait for service '{}': {}", service_id, e);
                    None
                }
            };
            supervisor_monitor.cancel();

            {
                let mut handles = handles.lock();
                if handles.get(&service_id).map(|h| h.pid) == Some(pid) {
                    handles.remove(&service_id);
                }
            }
            let _ = exit_tx.send(Some(ExitInfo { code }));

            let unexpected = {
                let mut states = states.lock();
                match states.get_mut(&service_id) {
                    Some(state) if state.process.pid == Some(pid) => {
                        state.process.exit_code = code;
                        if matches!(
                            state.state,
                            LifecycleState::Stopping | LifecycleState::Stopped
                        ) {
                            false
                        } else {
                            state.process.pid = None;
                            state.process.start_time = None;
                            state.warmup.is_in_warmup = false;
                            state.health.is_healthy = false;
                            state.set_state(LifecycleState::Error, Utc::now());
                            true
                        }
                    }
                    _ => false,
                }
            };

            if unexpected {
                tracing::error!(
                    "Service '{}' (pid {}) exited unexpectedly with code {:?}",
                    service_id,
                    pid,
                    code
                );
            } else {
                tracing::debug!(
                    "Service '{}' (pid {}) exited with code {:?}",
                    service_id,
                    pid,
                    code
                );
            }
            let _ = events.send(ProcessEvent::Exited {
                service_id,
                exit_code: code,
                unexpected,
            });
        });

        if service.has_health_endpoint() {
            HealthMonitor {
                service: service.clone(),
                states: self.states.clone(),
                probe: self.probe.clone(),
                policy: self.health_policy(),
                interval: self.config.health_check.interval,
                events: self.events.clone(),
            }
            .spawn(Duration::from_secs(service.warmup_time), monitor);
        }

        tracing::info!(
            "Started service '{}' with PID {} ({} {})",
            service.id,
            pid,
            program.display(),
            service.run.args.join(" ")
        );
        self.emit_state(&service.id);
        Ok(())
    }

    /// Stop the service: SIGTERM to its process group, SIGKILL after `kill_timeout`.
    ///
    /// Without a live process the service simply settles to Stopped.
    #[tracing::instrument(skip(self), fields(service.id = %service_id))]
    pub async fn stop_service(&self, service_id: &str) -> Result<()> {
        let service = self.service(service_id)?;
        if service.is_external() {
            return Err(Error::ExternallyManaged {
                service: service.id.clone(),
                action: "stopped".to_string(),
            });
        }

        let handle = self
            .handles
            .lock()
            .get(service_id)
            .map(|h| (h.pid, h.exit.clone(), h.monitor.clone()));

        let Some((pid, mut exit, monitor)) = handle else {
            self.settle_stopped(service_id);
            return Ok(());
        };

        {
            let mut states = self.states.lock();
            if let Some(state) = states.get_mut(service_id) {
                state.set_state(LifecycleState::Stopping, Utc::now());
            }
        }
        self.emit_state(service_id);
        monitor.cancel();

        let nix_pid = validate_pid(pid, service_id)?;
        if let Err(e) =
            killpg(nix_pid, Signal::SIGTERM).or_else(|_| signal::kill(nix_pid, Signal::SIGTERM))
        {
            tracing::debug!("SIGTERM to '{}' (pid {}) failed: {}", service_id, pid, e);
        }

        let kill_timeout = self.config.process.kill_timeout;
        let graceful = tokio::time::timeout(kill_timeout, exit.wait_for(Option::is_some))
            .await
            .is_ok();
        if !graceful {
            tracing::warn!(
                "Service '{}' did not exit after SIGTERM (kill timeout: {:?}), sending SIGKILL",
                service_id,
                kill_timeout
            );
            let _ = killpg(nix_pid, Signal::SIGKILL)
                .or_else(|_| signal::kill(nix_pid, Signal::SIGKILL));
            if tokio::time::timeout(KILL_REAP_TIMEOUT, exit.wait_for(Option::is_some))
                .await
                .is_err()
            {
                tracing::error!("Service '{}' (pid {}) survived SIGKILL", service_id, pid);
            }
        }

        self.settle_stopped(service_id);
        tracing::info!("Stopped service '{}'", service_id);
        Ok(())
    }

    fn settle_stopped(&self, service_id: &str) {
        {
            let mut states = self.states.lock();
            let Some(state) = states.get_mut(service_id) else {
                return;
            };
            state.process.pid = None;
            state.process.start_time = None;
            state.warmup.is_in_warmup = false;
            state.health.is_healthy = false;
            state.set_state(LifecycleState::Stopped, Utc::now());
        }
        self.emit_state(service_id);
    }

    /// Stop (if running), pause `restart_delay`, start. Never overlaps the two.
    #[tracing::instrument(skip(self), fields(service.id = %service_id))]
    pub async fn restart_service(&self, service_id: &str) -> Result<()> {
        let service = self.service(service_id)?;
        if service.is_external() {
            return Err(Error::ExternallyManaged {
                service: service.id.clone(),
                action: "restarted".to_string(),
            });
        }

        if self.is_service_running(service_id) {
            self.stop_service(service_id).await?;
            tokio::time::sleep(self.config.process.restart_delay).await;
        }
        self.start_service(service_id).await
    }

    /// Close the breaker. A CircuitOpen service is stopped for real: its
    /// process group is terminated before it reports Stopped.
    pub async fn reset_circuit_breaker(&self, service_id: &str) -> Result<()> {
        self.service(service_id)?;
        let was_open = {
            let mut states = self.states.lock();
            match states.get_mut(service_id) {
                Some(state) => {
                    state.circuit_breaker.reset();
                    state.state == LifecycleState::CircuitOpen
                }
                None => false,
            }
        };
        tracing::info!("Circuit breaker reset for service '{}'", service_id);

        if was_open {
            // stop_service settles to Stopped with or without a live process.
            return self.stop_service(service_id).await;
        }
        self.emit_state(service_id);
        Ok(())
    }

    /// Stop health monitors and terminate every live process concurrently.
    pub async fn cleanup(&self) {
        let ids: Vec<String> = {
            let handles = self.handles.lock();
            for handle in handles.values() {
                handle.monitor.cancel();
            }
            handles.keys().cloned().collect()
        };
        if ids.is_empty() {
            return;
        }

        tracing::info!("Stopping {} running service(s)", ids.len());
        let results = futures::future::join_all(ids.iter().map(|id| self.stop_service(id))).await;
        for (id, result) in ids.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!("Failed to stop service '{}' during cleanup: {}", id, e);
            }
        }
    }
}
