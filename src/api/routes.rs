use super::response::{status_code, success, ApiError};
use super::AppState;
use crate::error::Error;
use crate::orchestrator::{ServiceAction, ORCHESTRATOR_VERSION};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_LOG_LINES: usize = 50;
const MAX_LOG_LINES: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    #[serde(default)]
    pub service_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub lines: Option<String>,
}

pub async fn status_all(State(state): State<AppState>) -> Response {
    success(state.orchestrator.get_status_all())
}

pub async fn service_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    state
        .orchestrator
        .get_service_status(&id)
        .map(success)
        .ok_or_else(|| ApiError::not_found(format!("Service {} not found", id)))
}

pub async fn service_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ActionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) =
        body.map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))?;
    let action: ServiceAction = request
        .action
        .parse()
        .map_err(|e: Error| ApiError::bad_request(e.to_string()))?;

    state
        .orchestrator
        .execute_service_action(&id, action)
        .await
        .map_err(|e| {
            tracing::error!("Action '{}' on service '{}' failed: {}", action, id, e);
            ApiError::from_error(&e, Some(&id), state.environment, "Failed to execute action")
        })?;

    Ok(success(json!({
        "message": format!("Action {} executed successfully on service {}", action, id),
    })))
}

/// `lines` defaults to 50 when absent or not a number.
pub async fn service_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Response, ApiError> {
    let lines = match query.lines.as_deref().map(str::parse::<i64>) {
        Some(Ok(n)) if (1..=MAX_LOG_LINES as i64).contains(&n) => n as usize,
        Some(Ok(_)) => {
            return Err(ApiError::bad_request(format!(
                "Lines parameter must be between 1 and {}",
                MAX_LOG_LINES
            )))
        }
        Some(Err(_)) | None => DEFAULT_LOG_LINES,
    };

    if !state.orchestrator.registry().contains(&id) {
        return Err(ApiError::not_found(format!("Service {} not found", id)));
    }

    let logs = state.orchestrator.get_service_logs(&id, lines);
    Ok(success(json!({
        "serviceId": id,
        "logs": logs,
        "timestamp": Utc::now(),
    })))
}

pub async fn registry(State(state): State<AppState>) -> Response {
    let services = state.orchestrator.get_registry();
    success(json!({
        "services": services,
        "count": services.len(),
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let uptime = (Utc::now() - state.orchestrator.started_at())
        .num_milliseconds()
        .max(0) as f64
        / 1000.0;
    Json(json!({
        "status": "ok",
        "service": "orchestrator",
        "version": ORCHESTRATOR_VERSION,
        "timestamp": Utc::now(),
        "uptime": uptime,
    }))
}

pub async fn batch_start(
    State(state): State<AppState>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    run_batch(state, body, ServiceAction::Start).await
}

pub async fn batch_stop(
    State(state): State<AppState>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    run_batch(state, body, ServiceAction::Stop).await
}

async fn run_batch(
    state: AppState,
    body: Result<Json<BatchRequest>, JsonRejection>,
    action: ServiceAction,
) -> Result<Response, ApiError> {
    let service_ids = match body {
        Ok(Json(request)) if !request.service_ids.is_empty() => request.service_ids,
        _ => return Err(ApiError::bad_request("serviceIds must be a non-empty array")),
    };

    let results: Vec<Value> = state
        .orchestrator
        .execute_batch_action(&service_ids, action)
        .await
        .into_iter()
        .map(|(service_id, result)| match result {
            Ok(()) => json!({"serviceId": service_id, "success": true}),
            Err(e) => {
                let failure = ApiError::from_error(
                    &e,
                    Some(&service_id),
                    state.environment,
                    "Failed to execute action",
                )
                .body();
                let mut entry = json!({
                    "serviceId": service_id,
                    "success": false,
                    "error": failure["error"].clone(),
                    "statusCode": status_code(e.kind()).as_u16(),
                });
                if let Some(managed) = failure.get("managed") {
                    entry["managed"] = managed.clone();
                }
                entry
            }
        })
        .collect();

    Ok(success(json!({ "results": results })))
}
