// Allow unused_assignments at module level because thiserror's generated code
// for struct variants triggers false positive warnings - the fields ARE used
// in the Display impl but rustc's lint pass doesn't see this.
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(code(orch::config::error))]
    Config(String),

    #[error("Invalid configuration: {0}")]
    #[diagnostic(
        code(orch::config::validation),
        help("Run `orch validate` for detailed validation errors")
    )]
    Validation(String),

    #[error("Circular dependency detected involving service: {0}")]
    #[diagnostic(
        code(orch::registry::circular),
        help("Services cannot depend on each other in a cycle. Review the dependencies fields")
    )]
    CircularDependency(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Service {0} not found in registry")]
    #[diagnostic(
        code(orch::service::not_found),
        help("List registered services with `orch order` or check the registry file")
    )]
    ServiceNotFound(String),

    #[error("Service {service} is already {state}")]
    #[diagnostic(code(orch::service::already_in_state))]
    AlreadyInState { service: String, state: String },

    #[error("Dependency {dependency} is not {expected} for service {service}")]
    #[diagnostic(
        code(orch::service::dependency_not_satisfied),
        help("Start the dependency first; dependencies must be running before their dependents")
    )]
    DependencyNotSatisfied {
        service: String,
        dependency: String,
        expected: String,
    },

    #[error("Service {service} is externally managed and cannot be {action} by orchestrator")]
    #[diagnostic(
        code(orch::service::externally_managed),
        help("Control this service with the tool that owns it (systemd, docker, ...)")
    )]
    ExternallyManaged { service: String, action: String },

    #[error("Failed to start service {0}: {1}")]
    #[diagnostic(
        code(orch::service::start_failed),
        help("Check the service logs and verify the command exists and is executable")
    )]
    ServiceStartFailed(String, String),

    #[error("Package manager '{0}' could not be located")]
    #[diagnostic(
        code(orch::process::package_manager),
        help("Set process.package_manager.bin_dir in the orchestrator config or export PNPM_HOME")
    )]
    PackageManagerNotFound(String),

    #[error("Invalid PID {pid}: {reason}")]
    InvalidPid { pid: u32, reason: String },

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Persistence error: {0}")]
    #[diagnostic(
        code(orch::state::persistence),
        help("Check that the state directory exists and is writable")
    )]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used by the Control API to pick status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    ExternallyManaged,
    BadRequest,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ServiceNotFound(_) => ErrorKind::NotFound,
            Error::AlreadyInState { .. } | Error::DependencyNotSatisfied { .. } => {
                ErrorKind::Conflict
            }
            Error::ExternallyManaged { .. } => ErrorKind::ExternallyManaged,
            Error::UnknownAction(_) => ErrorKind::BadRequest,
            _ => ErrorKind::Internal,
        }
    }

    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::ServiceNotFound(id) => Some(format!(
                "'{}' is not in the registry. Run `orch order` to list known services.",
                id
            )),
            Error::DependencyNotSatisfied { dependency, .. } => Some(format!(
                "Start '{}' first, or wait for it to finish warming up.",
                dependency
            )),
            Error::CircularDependency(_) => Some(
                "Run `orch validate` to see the full list of registry problems.".to_string(),
            ),
            Error::PackageManagerNotFound(name) => Some(format!(
                "Install {} or point process.package_manager.bin_dir at its directory.",
                name
            )),
            Error::Persistence(_) | Error::Io(_) => Some(
                "The orchestrator keeps running on in-memory state; fix the state directory permissions and retry."
                    .to_string(),
            ),
            _ => None,
        }
    }
}

/// Validates and converts a u32 PID to nix::unistd::Pid safely.
/// Returns Err for PID 0 (process group), PID 1 (init), or values > i32::MAX.
pub fn validate_pid(pid: u32, service_id: &str) -> Result<nix::unistd::Pid> {
    if pid == 0 || pid == 1 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!("refusing to signal PID {} for service '{}'", pid, service_id),
        });
    }
    if pid > i32::MAX as u32 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "PID {} exceeds i32::MAX for service '{}', cannot convert safely",
                pid, service_id
            ),
        });
    }
    Ok(nix::unistd::Pid::from_raw(pid as i32))
}
