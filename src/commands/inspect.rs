use crate::output::UserOutput;
use service_orchestrator::{OrchestratorConfig, Registry, StateManager};
use std::path::Path;

pub fn run_validate(registry_path: &Path, out: &dyn UserOutput) -> anyhow::Result<()> {
    out.status(&format!("Validating {}...", registry_path.display()));
    let registry = Registry::from_file(registry_path)?;

    let errors = registry.validation_errors();
    if !errors.is_empty() {
        out.error(&format!("Registry has {} problem(s):", errors.len()));
        for error in &errors {
            out.error(&format!("  - {}", error));
        }
    }
    registry.validate()?;

    let stats = registry.stats();
    out.success("Registry is valid");
    out.data(&format!(
        "Services: {} ({} active)",
        stats.total_services, stats.active_services
    ));
    for (criticality, count) in &stats.services_by_criticality {
        out.data(&format!("  {}: {}", criticality, count));
    }
    let external = registry.get_externally_managed_services();
    if !external.is_empty() {
        let ids: Vec<&str> = external.iter().map(|s| s.id.as_str()).collect();
        out.data(&format!("Externally managed: {}", ids.join(", ")));
    }
    Ok(())
}

pub fn run_order(registry_path: &Path, out: &dyn UserOutput) -> anyhow::Result<()> {
    let registry = Registry::from_file(registry_path)?;
    let order = registry.calculate_startup_order()?;

    for entry in &order {
        let marker = match registry.find_service_by_id(&entry.service_id) {
            Some(service) if service.is_external() => " (external)",
            Some(service) if service.should_auto_start() => " (auto-start)",
            _ => "",
        };
        if entry.dependencies.is_empty() {
            out.data(&format!("{:>3}. {}{}", entry.order + 1, entry.service_id, marker));
        } else {
            out.data(&format!(
                "{:>3}. {}{} <- {}",
                entry.order + 1,
                entry.service_id,
                marker,
                entry.dependencies.join(", ")
            ));
        }
    }
    Ok(())
}

pub async fn run_state(config: &OrchestratorConfig, out: &dyn UserOutput) -> anyhow::Result<()> {
    let manager = StateManager::new(&config.state_dir);
    out.status(&format!("Reading {}", manager.state_file_path().display()));

    let states = manager.load_state().await;
    if states.is_empty() {
        out.warning("No persisted service state");
        return Ok(());
    }
    out.data(&serde_json::to_string_pretty(&states)?);
    Ok(())
}
