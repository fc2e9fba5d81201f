/// Package-manager resolution at spawn time
///
/// Drives a ProcessManager directly with an explicit locator chain so the
/// tests never depend on what the host has installed.
use async_trait::async_trait;
use parking_lot::Mutex;
use service_orchestrator::config::OrchestratorConfig;
use service_orchestrator::healthcheck::{HealthOutcome, HealthProbe};
use service_orchestrator::registry::{Registry, ServiceConfig};
use service_orchestrator::service::{
    LifecycleState, PackageManagerLocator, ProcessEvent, ProcessManager, RuntimeState,
    SharedStates,
};
use service_orchestrator::Error;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::{self, UnboundedReceiver};

const PM_NAME: &str = "fakepm";

struct NeverCalled;

#[async_trait]
impl HealthProbe for NeverCalled {
    async fn probe(&self, _service: &ServiceConfig) -> HealthOutcome {
        HealthOutcome::unhealthy("no health endpoint configured")
    }
}

fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn pm_service() -> ServiceConfig {
    let mut service = ServiceConfig::new("web", 7301);
    service.run.command = PM_NAME.to_string();
    service.health_endpoint = String::new();
    service
}

fn manager(
    dir: &TempDir,
    locator: PackageManagerLocator,
) -> (ProcessManager, SharedStates, UnboundedReceiver<ProcessEvent>) {
    let service = pm_service();
    let mut config = OrchestratorConfig::default();
    config.project_root = dir.path().to_path_buf();
    config.process.kill_timeout = Duration::from_secs(2);
    config.process.package_manager.name = PM_NAME.to_string();

    let mut map = HashMap::new();
    map.insert(
        service.id.clone(),
        RuntimeState::new(&service, ".".to_string(), 10),
    );
    let states: SharedStates = Arc::new(Mutex::new(map));
    let (tx, rx) = mpsc::unbounded_channel();

    let pm = ProcessManager::new(
        Arc::new(Registry::new(vec![service])),
        Arc::new(config),
        states.clone(),
        Arc::new(NeverCalled),
        tx,
    )
    .with_locator(locator);
    (pm, states, rx)
}

fn write_executable(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[tokio::test]
async fn test_package_manager_resolved_from_configured_dir() {
    let dir = create_test_dir();
    let bin = dir.path().join("pm-bin");
    std::fs::create_dir_all(&bin).unwrap();
    write_executable(&bin, PM_NAME, "#!/bin/sh\nexec sleep 30\n");

    let locator = PackageManagerLocator::new(PM_NAME, Some(bin), Vec::new(), Vec::new());
    let (pm, states, _rx) = manager(&dir, locator);

    pm.start_service("web").await.unwrap();
    assert!(pm.is_service_running("web"));
    assert_eq!(states.lock()["web"].state, LifecycleState::Running);
    assert!(pm.get_process_info("web").is_some());

    pm.stop_service("web").await.unwrap();
    assert!(!pm.is_service_running("web"));
    assert_eq!(states.lock()["web"].state, LifecycleState::Stopped);
}

#[tokio::test]
async fn test_unresolvable_package_manager_fails_spawn() {
    let dir = create_test_dir();
    let empty = dir.path().join("empty");
    std::fs::create_dir_all(&empty).unwrap();

    let locator = PackageManagerLocator::new(PM_NAME, None, vec![empty.clone()], vec![empty]);
    let (pm, states, mut rx) = manager(&dir, locator);

    let err = pm.start_service("web").await.unwrap_err();
    assert!(matches!(err, Error::PackageManagerNotFound(ref name) if name == PM_NAME));
    assert!(!pm.is_service_running("web"));
    assert_eq!(states.lock()["web"].state, LifecycleState::Error);

    let event = rx.recv().await.expect("spawn failure is reported");
    assert!(matches!(event, ProcessEvent::SpawnFailed { ref service_id, .. } if service_id == "web"));
}
