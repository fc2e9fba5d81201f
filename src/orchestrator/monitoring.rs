//! Process event handling and crash recovery.
//!
//! The event loop drains [`ProcessEvent`]s from the process manager, persists
//! every change and schedules auto-restarts for Critical services that exit
//! unexpectedly. Restarts use capped exponential backoff with jitter and give
//! up after `auto_restart.max_attempts`.

use super::Orchestrator;
use crate::config::AutoRestartSettings;
use crate::registry::Criticality;
use crate::service::{LifecycleState, ProcessEvent};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Delay before restart attempt `attempt` (1-based).
///
/// `delay × multiplier^(attempt-1)`, capped at `max_delay`, then ±50% jitter.
pub(super) fn calculate_restart_delay(settings: &AutoRestartSettings, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(32) as i32;
    let base = settings.delay.as_secs_f64() * settings.backoff_multiplier.powi(exponent);
    let capped = base.min(settings.max_delay.as_secs_f64());

    use rand::Rng;
    let mut rng = rand::thread_rng();
    let jitter = capped * 0.5;
    let with_jitter = if jitter > 0.0 {
        rng.gen_range((capped - jitter)..=(capped + jitter))
    } else {
        capped
    };
    Duration::from_secs_f64(with_jitter.max(0.0))
}

impl Orchestrator {
    pub(super) fn spawn_event_loop(
        self: &Arc<Self>,
        mut events: UnboundedReceiver<ProcessEvent>,
    ) -> JoinHandle<()> {
        let orchestrator = Arc::downgrade(self);
        let cancel = self.shutdown_token.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                let Some(orchestrator) = orchestrator.upgrade() else {
                    break;
                };
                orchestrator.handle_event(event).await;
            }
            tracing::debug!("Orchestrator event loop stopped");
        })
    }

    async fn handle_event(self: &Arc<Self>, event: ProcessEvent) {
        let service_id = event.service_id().to_string();
        match &event {
            ProcessEvent::StateChanged { state, .. } => {
                tracing::debug!("Service '{}' is now {}", service_id, state);
            }
            ProcessEvent::Exited {
                exit_code,
                unexpected,
                ..
            } => {
                if *unexpected {
                    self.schedule_auto_restart(&service_id, *exit_code);
                }
            }
            ProcessEvent::SpawnFailed { error, .. } => {
                tracing::error!("Service '{}' failed to spawn: {}", service_id, error);
            }
        }

        if let Err(e) = self.persist(&service_id).await {
            tracing::warn!("Failed to persist state for service '{}': {}", service_id, e);
        }
    }

    /// Queue one delayed restart of a crashed Critical service.
    fn schedule_auto_restart(self: &Arc<Self>, service_id: &str, exit_code: Option<i32>) {
        let settings = &self.config.auto_restart;
        let Some(service) = self.registry.find_service_by_id(service_id) else {
            return;
        };
        if !settings.enabled || service.criticality != Criticality::Critical {
            return;
        }

        let attempt = {
            let mut states = self.states.lock();
            let Some(runtime) = states.get_mut(service_id) else {
                return;
            };
            if runtime.auto_restore_attempts >= settings.max_attempts {
                tracing::error!(
                    "Critical service '{}' exited with code {:?}; giving up after {} restart attempts",
                    service_id,
                    exit_code,
                    runtime.auto_restore_attempts
                );
                return;
            }
            runtime.auto_restore_attempts += 1;
            runtime.auto_restore_attempts
        };

        let delay = calculate_restart_delay(settings, attempt);
        tracing::warn!(
            "Critical service '{}' exited unexpectedly (code {:?}), restart attempt {}/{} in {:?}",
            service_id,
            exit_code,
            attempt,
            settings.max_attempts,
            delay
        );

        let orchestrator: Weak<Self> = Arc::downgrade(self);
        let cancel = self.shutdown_token.clone();
        let service_id = service_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let Some(orchestrator) = orchestrator.upgrade() else {
                return;
            };
            // Someone acted on the service in the meantime.
            if orchestrator.current_state(&service_id) != Some(LifecycleState::Error) {
                tracing::debug!("Skipping auto-restart of '{}': state changed", service_id);
                return;
            }
            if let Err(e) = orchestrator.start_service(&service_id).await {
                tracing::error!("Failed to auto-restart service '{}': {}", service_id, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> AutoRestartSettings {
        AutoRestartSettings {
            enabled: true,
            delay: Duration::from_secs(5),
            max_attempts: 5,
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_restart_delay_first_attempt() {
        let delay = calculate_restart_delay(&settings(), 1);
        assert!(delay >= Duration::from_millis(2500));
        assert!(delay <= Duration::from_millis(7500));
    }

    #[test]
    fn test_restart_delay_grows_exponentially() {
        for _ in 0..20 {
            let third = calculate_restart_delay(&settings(), 3);
            assert!(third >= Duration::from_secs(10));
            assert!(third <= Duration::from_secs(30));
        }
    }

    #[test]
    fn test_restart_delay_is_capped() {
        for _ in 0..20 {
            let delay = calculate_restart_delay(&settings(), 30);
            assert!(delay <= Duration::from_secs(90));
            assert!(delay >= Duration::from_secs(30));
        }
    }

    #[test]
    fn test_restart_delay_zero_base() {
        let mut settings = settings();
        settings.delay = Duration::ZERO;
        assert_eq!(calculate_restart_delay(&settings, 4), Duration::ZERO);
    }
}
