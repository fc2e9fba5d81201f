use super::graph::Graph;
use super::types::{Managed, ServiceConfig};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

static KEBAB_CASE_REGEX: OnceLock<Regex> = OnceLock::new();

fn kebab_case() -> &'static Regex {
    KEBAB_CASE_REGEX
        .get_or_init(|| Regex::new(r"^[a-z0-9-]+$").expect("static regex pattern is valid"))
}

/// Validate a single service definition.
///
/// Returns every problem found; an empty vector means the definition is valid.
/// Numeric tunables are unsigned, so the non-negative checks hold by type.
pub fn validate_service_config(service: &ServiceConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if service.id.trim().is_empty() {
        errors.push("Service ID is required".to_string());
    }
    if service.name.trim().is_empty() {
        errors.push("Service name is required".to_string());
    }
    if service.description.trim().is_empty() {
        errors.push("Service description is required".to_string());
    }

    if service.relative_cwd().trim().is_empty() {
        errors.push("Run.cwd is required".to_string());
    }
    if service.run.managed == Managed::Internal && service.run.command.trim().is_empty() {
        errors.push("Run.command is required for internally managed services".to_string());
    }

    if service.port == 0 {
        errors.push("Port must be between 1 and 65535".to_string());
    }
    if service.timeout == 0 {
        errors.push("Timeout must be positive".to_string());
    }

    if !service.health_endpoint.is_empty() && !service.health_endpoint.starts_with('/') {
        errors.push("Health endpoint must start with /".to_string());
    }
    if let Some(path) = &service.gateway_path {
        if !path.starts_with('/') {
            errors.push("Gateway path must start with /".to_string());
        }
    }

    if !kebab_case().is_match(&service.id) {
        errors.push(
            "Service ID must be kebab-case (lowercase letters, numbers, hyphens only)".to_string(),
        );
    }

    errors
}

/// Validate a whole catalogue: per-service rules plus cross-service rules
/// (duplicate ids, unresolved dependencies, cycles).
///
/// Messages are prefixed with the offending service id.
pub fn validate_catalogue(services: &[ServiceConfig]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let known: HashSet<&str> = services.iter().map(|s| s.id.as_str()).collect();

    for service in services {
        for problem in validate_service_config(service) {
            errors.push(format!("{}: {}", service.id, problem));
        }

        if !seen.insert(service.id.as_str()) {
            errors.push(format!("{}: Duplicate service ID", service.id));
        }

        for dep in &service.dependencies {
            if dep == &service.id {
                errors.push(format!("{}: Service cannot depend on itself", service.id));
            } else if !known.contains(dep.as_str()) {
                errors.push(format!(
                    "{}: Dependency '{}' does not exist in the registry",
                    service.id, dep
                ));
            }
        }
    }

    if let Some(cycle) = Graph::new(services).find_cycle() {
        // A self-loop is already reported above.
        if cycle.len() > 2 {
            errors.push(format!("Circular dependency: {}", cycle.join(" -> ")));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn internal(id: &str) -> ServiceConfig {
        let mut service = ServiceConfig::new(id, 4000);
        service.run.command = "node".into();
        service
    }

    #[test]
    fn test_valid_service_passes() {
        assert!(validate_service_config(&internal("auth-service")).is_empty());
    }

    #[test]
    fn test_required_fields_and_paths() {
        let mut service = internal("api");
        service.name = " ".into();
        service.description.clear();
        service.run.cwd.clear();
        service.health_endpoint = "health".into();
        service.gateway_path = Some("api".into());
        service.port = 0;
        service.timeout = 0;

        let errors = validate_service_config(&service);
        assert!(errors.contains(&"Service name is required".to_string()));
        assert!(errors.contains(&"Service description is required".to_string()));
        assert!(errors.contains(&"Run.cwd is required".to_string()));
        assert!(errors.contains(&"Health endpoint must start with /".to_string()));
        assert!(errors.contains(&"Gateway path must start with /".to_string()));
        assert!(errors.contains(&"Port must be between 1 and 65535".to_string()));
        assert!(errors.contains(&"Timeout must be positive".to_string()));
    }

    #[test]
    fn test_command_required_only_for_internal() {
        let mut service = ServiceConfig::new("postgresql", 5432);
        let errors = validate_service_config(&service);
        assert!(errors.iter().any(|e| e.contains("Run.command")));

        service.run.managed = Managed::External;
        assert!(validate_service_config(&service).is_empty());
    }

    #[test]
    fn test_kebab_case_id() {
        let errors = validate_service_config(&internal("Auth_Service"));
        assert!(errors.iter().any(|e| e.contains("kebab-case")));
    }

    #[test]
    fn test_catalogue_cross_checks() {
        let mut a = internal("a");
        a.dependencies = vec!["b".into()];
        let mut b = internal("b");
        b.dependencies = vec!["a".into(), "ghost".into()];
        let dup = internal("a");

        let errors = validate_catalogue(&[a, b, dup]);
        assert!(errors.iter().any(|e| e == "a: Duplicate service ID"));
        assert!(errors.iter().any(|e| e.contains("'ghost' does not exist")));
        assert!(errors.iter().any(|e| e.starts_with("Circular dependency")));
    }
}
