//! Per-service health monitoring task.
//!
//! One task per live process: sleep through the warmup window, then probe on
//! a fixed interval until cancelled. Each result is applied under the shared
//! state lock and, if anything persisted changed, reported as an event.

use super::circuit_breaker::BreakerTransition;
use super::events::ProcessEvent;
use super::health::{apply_health_check, HealthPolicy};
use super::SharedStates;
use crate::healthcheck::HealthProbe;
use crate::registry::ServiceConfig;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub(crate) struct HealthMonitor {
    pub service: ServiceConfig,
    pub states: SharedStates,
    pub probe: Arc<dyn HealthProbe>,
    pub policy: HealthPolicy,
    pub interval: Duration,
    pub events: UnboundedSender<ProcessEvent>,
}

impl HealthMonitor {
    pub fn spawn(self, warmup: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(warmup) => {}
            }

            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Health monitor for '{}' cancelled", self.service.id);
                        return;
                    }
                    _ = ticker.tick() => {}
                }

                let outcome = tokio::select! {
                    _ = cancel.cancelled() => return,
                    outcome = self.probe.probe(&self.service) => outcome,
                };

                if !self.apply(&outcome) {
                    return;
                }
            }
        })
    }

    /// Returns false once the service has no runtime entry.
    fn apply(&self, outcome: &crate::healthcheck::HealthOutcome) -> bool {
        let id = &self.service.id;
        let event = {
            let mut states = self.states.lock();
            let Some(state) = states.get_mut(id) else {
                return false;
            };
            let before = (state.state, state.circuit_breaker.clone());
            let transition = apply_health_check(state, outcome, &self.policy, Utc::now());
            if !transition.applied {
                return true;
            }

            if transition.warmup_completed {
                tracing::info!("Service '{}' completed warmup", id);
            }
            match transition.breaker {
                BreakerTransition::Opened | BreakerTransition::Reopened => tracing::warn!(
                    "Circuit breaker opened for service '{}' (failures: {}, retry in {}s)",
                    id,
                    state.circuit_breaker.failures,
                    state.circuit_breaker.backoff_seconds
                ),
                BreakerTransition::HalfOpened => {
                    tracing::info!("Circuit breaker half-open for service '{}'", id)
                }
                BreakerTransition::Closed => {
                    tracing::info!("Circuit breaker closed for service '{}'", id)
                }
                BreakerTransition::None => {}
            }
            if !outcome.healthy {
                tracing::debug!(
                    "Health check failed for '{}': {}",
                    id,
                    outcome.error.as_deref().unwrap_or("unhealthy")
                );
            }

            let changed = before.0 != state.state || before.1 != state.circuit_breaker;
            (changed || transition.warmup_completed).then(|| ProcessEvent::StateChanged {
                service_id: id.clone(),
                state: state.state,
            })
        };

        if let Some(event) = event {
            let _ = self.events.send(event);
        }
        true
    }
}
