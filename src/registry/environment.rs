//! Environment and working-directory helpers for spawning a service.

use super::types::ServiceConfig;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Merge the service's declared environment over `base_env`.
///
/// Precedence, lowest first: declared optional-variable defaults (only when
/// the variable is unset), `base_env`, `run.env`, then `PORT` which always
/// reflects the registry port.
pub fn build_service_environment(
    service: &ServiceConfig,
    base_env: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut env = base_env.clone();

    for var in &service.optional_env_vars {
        if let Some(default) = &var.default_value {
            env.entry(var.name.clone()).or_insert_with(|| default.clone());
        }
    }

    for (key, value) in &service.run.env {
        env.insert(key.clone(), value.clone());
    }

    env.insert("PORT".to_string(), service.port.to_string());
    env
}

/// Required variables absent (or empty) in `env`.
pub fn missing_required_env(service: &ServiceConfig, env: &HashMap<String, String>) -> Vec<String> {
    service
        .required_env_vars
        .iter()
        .filter(|name| env.get(name.as_str()).map_or(true, |v| v.is_empty()))
        .cloned()
        .collect()
}

/// Resolve the service's working directory against `project_root`.
///
/// Absolute `run.cwd` values are used as-is. `.` and `..` components are
/// folded lexically; the path is not required to exist.
pub fn service_working_directory(service: &ServiceConfig, project_root: &Path) -> PathBuf {
    let cwd = Path::new(service.relative_cwd());
    let joined = if cwd.is_absolute() {
        cwd.to_path_buf()
    } else {
        project_root.join(cwd)
    };
    normalize(&joined)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EnvironmentVariable;

    fn base(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_service_env_wins_and_port_is_set() {
        let mut service = ServiceConfig::new("api", 6020);
        service.run.env.insert("LOG_LEVEL".into(), "debug".into());
        service.run.env.insert("PORT".into(), "1".into());

        let env = build_service_environment(
            &service,
            &base(&[("LOG_LEVEL", "info"), ("HOME", "/root")]),
        );
        assert_eq!(env["LOG_LEVEL"], "debug");
        assert_eq!(env["HOME"], "/root");
        assert_eq!(env["PORT"], "6020");
    }

    #[test]
    fn test_optional_defaults_do_not_override_base() {
        let mut service = ServiceConfig::new("api", 6020);
        service.optional_env_vars = vec![
            EnvironmentVariable {
                name: "CACHE_TTL".into(),
                default_value: Some("60".into()),
                description: None,
            },
            EnvironmentVariable {
                name: "REGION".into(),
                default_value: Some("eu".into()),
                description: None,
            },
        ];

        let env = build_service_environment(&service, &base(&[("REGION", "us")]));
        assert_eq!(env["CACHE_TTL"], "60");
        assert_eq!(env["REGION"], "us");
    }

    #[test]
    fn test_missing_required_env() {
        let mut service = ServiceConfig::new("auth", 6021);
        service.required_env_vars = vec!["JWT_SECRET".into(), "DATABASE_URL".into()];
        let env = base(&[("DATABASE_URL", "postgres://x"), ("JWT_SECRET", "")]);
        assert_eq!(missing_required_env(&service, &env), vec!["JWT_SECRET"]);
    }

    #[test]
    fn test_working_directory_resolution() {
        let mut service = ServiceConfig::new("auth", 6021);
        service.run.cwd = "./services/../services/auth".into();
        assert_eq!(
            service_working_directory(&service, Path::new("/srv/platform")),
            PathBuf::from("/srv/platform/services/auth")
        );

        service.run.cwd = "/opt/auth".into();
        assert_eq!(
            service_working_directory(&service, Path::new("/srv/platform")),
            PathBuf::from("/opt/auth")
        );
    }
}
