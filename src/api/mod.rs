//! Control API: a thin HTTP binding over [`Orchestrator`].
//!
//! Every route lives under `/orchestrator` and answers with the
//! `{success, data | error, timestamp}` envelope.

mod response;
mod routes;

pub use response::{status_code, success, ApiError};

use crate::config::RuntimeEnvironment;
use crate::orchestrator::Orchestrator;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub environment: RuntimeEnvironment,
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    let environment = orchestrator.config().environment;
    let state = AppState {
        orchestrator,
        environment,
    };

    let routes = Router::new()
        .route("/status-all", get(routes::status_all))
        .route("/services/batch/start", post(routes::batch_start))
        .route("/services/batch/stop", post(routes::batch_stop))
        .route("/services/:id/status", get(routes::service_status))
        .route("/services/:id/actions", post(routes::service_action))
        .route("/services/:id/logs", get(routes::service_logs))
        .route("/registry", get(routes::registry))
        .route("/health", get(routes::health))
        .with_state(state);

    Router::new().nest("/orchestrator", routes)
}
