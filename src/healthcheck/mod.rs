mod http;

pub use http::HttpProbe;

use crate::registry::ServiceConfig;
use async_trait::async_trait;
use std::time::Duration;

/// Result of a single health check.
///
/// Network and timeout failures are data here, never errors: they count
/// against the circuit breaker and are not surfaced to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthOutcome {
    pub healthy: bool,
    pub latency: Option<Duration>,
    pub error: Option<String>,
}

impl HealthOutcome {
    pub fn healthy(latency: Duration) -> Self {
        Self {
            healthy: true,
            latency: Some(latency),
            error: None,
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency: None,
            error: Some(error.into()),
        }
    }
}

/// Probes one service's health endpoint
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, service: &ServiceConfig) -> HealthOutcome;
}
