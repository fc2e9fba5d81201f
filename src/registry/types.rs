//! Service definition types.
//!
//! A [`ServiceConfig`] is the static, immutable description of one service in
//! the catalogue. Keys are camelCase on the wire so a registry file and the
//! `GET /orchestrator/registry` response share one shape.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Broad service category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Frontend,
    Gateway,
    #[default]
    Core,
    Business,
    Media,
    Ai,
    Utility,
    Infrastructure,
}

impl ServiceType {
    pub const ALL: [ServiceType; 8] = [
        ServiceType::Frontend,
        ServiceType::Gateway,
        ServiceType::Core,
        ServiceType::Business,
        ServiceType::Media,
        ServiceType::Ai,
        ServiceType::Utility,
        ServiceType::Infrastructure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Frontend => "frontend",
            ServiceType::Gateway => "gateway",
            ServiceType::Core => "core",
            ServiceType::Business => "business",
            ServiceType::Media => "media",
            ServiceType::Ai => "ai",
            ServiceType::Utility => "utility",
            ServiceType::Infrastructure => "infrastructure",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How badly the platform degrades without the service.
///
/// Critical services are auto-started by default and auto-restarted after a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    Critical,
    Important,
    #[default]
    Optional,
}

impl Criticality {
    pub const ALL: [Criticality; 3] = [
        Criticality::Critical,
        Criticality::Important,
        Criticality::Optional,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Criticality::Critical => "critical",
            Criticality::Important => "important",
            Criticality::Optional => "optional",
        }
    }
}

impl fmt::Display for Criticality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalogue status of a service definition (not its runtime state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    #[default]
    Active,
    Disabled,
    Development,
    Deprecated,
}

/// Whether the orchestrator owns the process or merely observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Managed {
    #[default]
    Internal,
    External,
}

impl fmt::Display for Managed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Managed::Internal => write!(f, "internal"),
            Managed::External => write!(f, "external"),
        }
    }
}

/// How to launch the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// Executable, e.g. `pnpm`, `node`. Empty for external services.
    #[serde(default)]
    pub command: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Working directory relative to the project root.
    #[serde(default)]
    pub cwd: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub managed: Managed,

    /// Explicit auto-start flag; when absent, critical services auto-start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_start: Option<bool>,
}

/// Optional environment variable with a default applied when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentVariable {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Static definition of one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    // Identity
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,

    // Runtime
    pub port: u16,
    /// Health path, e.g. `/health`. Empty means the service has no health endpoint.
    #[serde(default)]
    pub health_endpoint: String,
    pub run: RunConfig,
    /// Legacy working directory, used when `run.cwd` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,

    // Classification
    #[serde(default, rename = "type")]
    pub service_type: ServiceType,
    #[serde(default)]
    pub criticality: Criticality,
    #[serde(default)]
    pub status: ServiceStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    // Ordering
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Manual tie-break within startup order; never overrides dependency order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_order: Option<u32>,

    // Health tunables
    /// Per-service health request timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub retries: u32,
    /// Seconds after spawn before health checks begin.
    #[serde(default)]
    pub warmup_time: u64,

    // Gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub public_endpoints: Vec<String>,

    // Environment
    #[serde(default)]
    pub required_env_vars: Vec<String>,
    #[serde(default)]
    pub optional_env_vars: Vec<EnvironmentVariable>,

    // Metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintainer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

fn default_timeout() -> u64 {
    5000
}

impl ServiceConfig {
    /// Minimal internal service definition, used by tests and `Default`-style construction.
    pub fn new(id: impl Into<String>, port: u16) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            description: format!("{} service", id),
            run: RunConfig {
                cwd: ".".to_string(),
                ..RunConfig::default()
            },
            id,
            port,
            health_endpoint: "/health".to_string(),
            directory: None,
            service_type: ServiceType::default(),
            criticality: Criticality::default(),
            status: ServiceStatus::default(),
            tags: Vec::new(),
            dependencies: Vec::new(),
            start_order: None,
            timeout: default_timeout(),
            retries: 0,
            warmup_time: 0,
            gateway_path: None,
            public_endpoints: Vec::new(),
            required_env_vars: Vec::new(),
            optional_env_vars: Vec::new(),
            version: None,
            maintainer: None,
            documentation: None,
        }
    }

    pub fn is_external(&self) -> bool {
        self.run.managed == Managed::External
    }

    /// Explicit `run.autoStart` wins; otherwise only critical internal services auto-start.
    pub fn should_auto_start(&self) -> bool {
        if self.is_external() {
            return false;
        }
        self.run
            .auto_start
            .unwrap_or(self.criticality == Criticality::Critical)
    }

    pub fn has_health_endpoint(&self) -> bool {
        !self.health_endpoint.is_empty()
    }

    /// Directory, relative to the project root, the process runs in.
    pub fn relative_cwd(&self) -> &str {
        if self.run.cwd.trim().is_empty() {
            self.directory.as_deref().unwrap_or("")
        } else {
            &self.run.cwd
        }
    }
}

/// Catalogue-level metadata carried by registry files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryMetadata {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub schema_version: String,
}

/// Query criteria; every present field must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceFilter {
    #[serde(default, rename = "type")]
    pub service_type: Option<ServiceType>,
    #[serde(default)]
    pub criticality: Option<Criticality>,
    #[serde(default)]
    pub status: Option<ServiceStatus>,
    /// Service must carry all of these tags.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub has_health_endpoint: Option<bool>,
    #[serde(default)]
    pub has_gateway_integration: Option<bool>,
}

impl ServiceFilter {
    pub fn matches(&self, service: &ServiceConfig) -> bool {
        if self.service_type.is_some_and(|t| t != service.service_type) {
            return false;
        }
        if self.criticality.is_some_and(|c| c != service.criticality) {
            return false;
        }
        if self.status.is_some_and(|s| s != service.status) {
            return false;
        }
        if !self.tags.iter().all(|tag| service.tags.contains(tag)) {
            return false;
        }
        if self
            .has_health_endpoint
            .is_some_and(|want| want != service.has_health_endpoint())
        {
            return false;
        }
        if self
            .has_gateway_integration
            .is_some_and(|want| want != service.gateway_path.is_some())
        {
            return false;
        }
        true
    }
}

/// One entry of the computed startup sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupOrder {
    pub service_id: String,
    /// 0-based position in the sequence.
    pub order: usize,
    pub dependencies: Vec<String>,
}

/// Counts by category, as returned by [`crate::registry::Registry::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    #[serde(flatten)]
    pub metadata: RegistryMetadata,
    pub total_services: usize,
    pub active_services: usize,
    pub services_by_type: BTreeMap<String, usize>,
    pub services_by_criticality: BTreeMap<String, usize>,
}
