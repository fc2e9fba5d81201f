use super::graph::Graph;
use super::types::{
    Criticality, Managed, RegistryMetadata, RegistryStats, ServiceConfig, ServiceFilter,
    ServiceStatus, ServiceType, StartupOrder,
};
use super::validation::validate_catalogue;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// On-disk registry document.
#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    metadata: RegistryMetadata,
    #[serde(default)]
    services: Vec<ServiceConfig>,
}

/// Immutable catalogue of service definitions.
///
/// Constructed once and shared (usually behind an `Arc`) by the orchestrator
/// and the Control API. All queries are pure and preserve catalogue order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    services: Vec<ServiceConfig>,
    index: HashMap<String, usize>,
    metadata: RegistryMetadata,
}

impl Registry {
    /// Build a catalogue without validating it. Later duplicates shadow
    /// earlier ones in id lookups.
    pub fn new(services: Vec<ServiceConfig>) -> Self {
        let index = services
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        Self {
            services,
            index,
            metadata: RegistryMetadata::default(),
        }
    }

    /// Build and validate in one step.
    pub fn validated(services: Vec<ServiceConfig>) -> Result<Self> {
        let registry = Self::new(services);
        registry.validate()?;
        Ok(registry)
    }

    pub fn with_metadata(mut self, metadata: RegistryMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: RegistryFile = serde_yaml::from_str(content)?;
        Ok(Self::new(file.services).with_metadata(file.metadata))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read registry file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Every problem in the catalogue, one line each.
    pub fn validation_errors(&self) -> Vec<String> {
        validate_catalogue(&self.services)
    }

    pub fn validate(&self) -> Result<()> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            return Ok(());
        }
        Err(Error::Validation(format!(
            "{} registry problem(s):\n  - {}",
            errors.len(),
            errors.join("\n  - ")
        )))
    }

    pub fn metadata(&self) -> &RegistryMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn find_service_by_id(&self, service_id: &str) -> Option<&ServiceConfig> {
        self.index.get(service_id).map(|&i| &self.services[i])
    }

    pub fn contains(&self, service_id: &str) -> bool {
        self.index.contains_key(service_id)
    }

    pub fn get_all_services(&self) -> &[ServiceConfig] {
        &self.services
    }

    pub fn filter_services(&self, filter: &ServiceFilter) -> Vec<&ServiceConfig> {
        self.services.iter().filter(|s| filter.matches(s)).collect()
    }

    pub fn get_services_by_type(&self, service_type: ServiceType) -> Vec<&ServiceConfig> {
        self.filter_services(&ServiceFilter {
            service_type: Some(service_type),
            ..Default::default()
        })
    }

    pub fn get_services_by_criticality(&self, criticality: Criticality) -> Vec<&ServiceConfig> {
        self.filter_services(&ServiceFilter {
            criticality: Some(criticality),
            ..Default::default()
        })
    }

    pub fn get_services_by_status(&self, status: ServiceStatus) -> Vec<&ServiceConfig> {
        self.filter_services(&ServiceFilter {
            status: Some(status),
            ..Default::default()
        })
    }

    pub fn get_services_by_tags(&self, tags: &[String]) -> Vec<&ServiceConfig> {
        self.filter_services(&ServiceFilter {
            tags: tags.to_vec(),
            ..Default::default()
        })
    }

    pub fn get_active_services(&self) -> Vec<&ServiceConfig> {
        self.get_services_by_status(ServiceStatus::Active)
    }

    pub fn get_critical_services(&self) -> Vec<&ServiceConfig> {
        self.get_services_by_criticality(Criticality::Critical)
    }

    pub fn get_internally_managed_services(&self) -> Vec<&ServiceConfig> {
        self.services
            .iter()
            .filter(|s| s.run.managed == Managed::Internal)
            .collect()
    }

    pub fn get_externally_managed_services(&self) -> Vec<&ServiceConfig> {
        self.services
            .iter()
            .filter(|s| s.run.managed == Managed::External)
            .collect()
    }

    pub fn is_externally_managed(&self, service_id: &str) -> bool {
        self.find_service_by_id(service_id)
            .is_some_and(ServiceConfig::is_external)
    }

    /// Services that list `service_id` as a direct dependency.
    pub fn get_service_dependents(&self, service_id: &str) -> Vec<&ServiceConfig> {
        self.services
            .iter()
            .filter(|s| s.dependencies.iter().any(|d| d == service_id))
            .collect()
    }

    /// Transitive dependency ids of `service_id`, dependencies first, the service itself last.
    pub fn get_service_dependency_chain(&self, service_id: &str) -> Vec<String> {
        Graph::new(&self.services).dependency_chain(service_id)
    }

    /// Active services routed through the gateway.
    pub fn get_gateway_services(&self) -> Vec<&ServiceConfig> {
        self.filter_services(&ServiceFilter {
            status: Some(ServiceStatus::Active),
            has_gateway_integration: Some(true),
            ..Default::default()
        })
    }

    pub fn calculate_startup_order(&self) -> Result<Vec<StartupOrder>> {
        Graph::new(&self.services).startup_order()
    }

    pub fn has_circular_dependency(&self, service_id: &str) -> bool {
        Graph::new(&self.services).has_cycle_from(service_id)
    }

    pub fn stats(&self) -> RegistryStats {
        let services_by_type: BTreeMap<String, usize> = ServiceType::ALL
            .iter()
            .map(|t| (t.to_string(), self.get_services_by_type(*t).len()))
            .collect();
        let services_by_criticality: BTreeMap<String, usize> = Criticality::ALL
            .iter()
            .map(|c| (c.to_string(), self.get_services_by_criticality(*c).len()))
            .collect();

        RegistryStats {
            metadata: self.metadata.clone(),
            total_services: self.services.len(),
            active_services: self.get_active_services().len(),
            services_by_type,
            services_by_criticality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
metadata:
  version: "1.0.0"
  schemaVersion: "1.0.0"
services:
  - id: postgresql
    name: PostgreSQL
    description: Primary database
    port: 5432
    healthEndpoint: ""
    type: infrastructure
    criticality: critical
    run: { command: "", cwd: ".", managed: external }
  - id: auth-service
    name: Auth
    description: Authentication
    port: 6021
    healthEndpoint: /health
    criticality: critical
    dependencies: [postgresql]
    gatewayPath: /auth
    tags: [security]
    run: { command: pnpm, args: [dev], cwd: services/auth-service }
  - id: admin-panel
    name: Admin
    description: Admin UI
    port: 6002
    type: frontend
    status: development
    dependencies: [auth-service]
    tags: [ui, security]
    run: { command: pnpm, args: [dev], cwd: apps/admin-panel }
"#;

    fn sample() -> Registry {
        Registry::from_yaml_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_load_and_lookup() {
        let registry = sample();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.metadata().version, "1.0.0");
        assert!(registry.validate().is_ok());
        assert_eq!(
            registry.find_service_by_id("auth-service").unwrap().port,
            6021
        );
        assert!(registry.find_service_by_id("ghost").is_none());
        assert!(registry.is_externally_managed("postgresql"));
        assert!(!registry.is_externally_managed("auth-service"));
    }

    #[test]
    fn test_queries() {
        let registry = sample();
        assert_eq!(registry.get_critical_services().len(), 2);
        assert_eq!(registry.get_active_services().len(), 2);
        assert_eq!(registry.get_externally_managed_services().len(), 1);
        assert_eq!(registry.get_internally_managed_services().len(), 2);
        assert_eq!(
            registry.get_services_by_tags(&["security".to_string()]).len(),
            2
        );

        let gateway: Vec<&str> = registry
            .get_gateway_services()
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(gateway, vec!["auth-service"]);

        let dependents: Vec<&str> = registry
            .get_service_dependents("postgresql")
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(dependents, vec!["auth-service"]);

        assert_eq!(
            registry.get_service_dependency_chain("admin-panel"),
            vec!["postgresql", "auth-service", "admin-panel"]
        );
    }

    #[test]
    fn test_stats() {
        let stats = sample().stats();
        assert_eq!(stats.total_services, 3);
        assert_eq!(stats.active_services, 2);
        assert_eq!(stats.services_by_type["frontend"], 1);
        assert_eq!(stats.services_by_type["media"], 0);
        assert_eq!(stats.services_by_criticality["critical"], 2);
    }

    #[test]
    fn test_validated_rejects_bad_catalogue() {
        let mut a = ServiceConfig::new("a", 4000);
        a.run.command = "node".into();
        a.dependencies = vec!["missing".into()];
        let err = Registry::validated(vec![a]).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
