use super::{HealthOutcome, HealthProbe};
use crate::error::{Error, Result};
use crate::registry::ServiceConfig;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Global shared HTTP client for health checks.
///
/// One connection pool for every monitored service. Requests carry their
/// own timeout, so the client-level timeout is only a fallback.
static SHARED_HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

fn get_shared_client() -> &'static Client {
    SHARED_HTTP_CLIENT.get_or_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .expect("Failed to create shared HTTP client")
    })
}

/// `GET http://{host}:{port}{healthEndpoint}`, healthy on any 2xx.
pub struct HttpProbe {
    host: String,
    timeout: Duration,
    client: Client,
}

impl HttpProbe {
    /// Probe using the shared client.
    ///
    /// # Errors
    ///
    /// Returns error if `host` does not form a valid http URL.
    pub fn new(host: impl Into<String>, timeout: Duration) -> Result<Self> {
        let host = host.into();
        Self::validate_url(&format!("http://{}:1/", host))?;
        Ok(Self {
            host,
            timeout,
            client: get_shared_client().clone(),
        })
    }

    pub fn url_for(&self, service: &ServiceConfig) -> String {
        let path = if service.health_endpoint.is_empty() {
            "/"
        } else {
            service.health_endpoint.as_str()
        };
        format!("http://{}:{}{}", self.host, service.port, path)
    }

    /// The tighter of the global timeout and the service's own `timeout`.
    fn timeout_for(&self, service: &ServiceConfig) -> Duration {
        if service.timeout == 0 {
            return self.timeout;
        }
        self.timeout.min(Duration::from_millis(service.timeout))
    }

    fn validate_url(url: &str) -> Result<()> {
        match url::Url::parse(url) {
            Ok(parsed) if parsed.host_str().is_some_and(|h| !h.is_empty()) => Ok(()),
            Ok(_) => Err(Error::Config(format!(
                "Invalid health check URL '{}': missing host",
                url
            ))),
            Err(e) => Err(Error::Config(format!(
                "Invalid health check URL '{}': {}",
                url, e
            ))),
        }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, service: &ServiceConfig) -> HealthOutcome {
        let url = self.url_for(service);
        let started = Instant::now();

        match self
            .client
            .get(&url)
            .timeout(self.timeout_for(service))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                HealthOutcome::healthy(started.elapsed())
            }
            Ok(response) => HealthOutcome {
                healthy: false,
                latency: Some(started.elapsed()),
                error: Some(format!("HTTP {}", response.status().as_u16())),
            },
            Err(e) if e.is_timeout() => HealthOutcome::unhealthy(format!(
                "Health check timed out after {:?}",
                self.timeout_for(service)
            )),
            Err(e) => HealthOutcome::unhealthy(e.to_string()),
        }
    }
}
