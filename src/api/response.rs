use crate::config::RuntimeEnvironment;
use crate::error::{Error, ErrorKind};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

/// `{success: true, data, timestamp}`
pub fn success<T: Serialize>(data: T) -> Response {
    Json(json!({
        "success": true,
        "data": data,
        "timestamp": Utc::now(),
    }))
    .into_response()
}

pub fn status_code(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::ExternallyManaged => StatusCode::NOT_IMPLEMENTED,
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Failure envelope: `{success: false, error, timestamp}`.
///
/// Externally managed rejections also carry `serviceId` and `managed`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    external_service: Option<String>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            external_service: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            external_service: None,
        }
    }

    /// Map an orchestrator error. In production, internal errors are replaced
    /// by `fallback` so no details leak.
    pub fn from_error(
        error: &Error,
        service_id: Option<&str>,
        environment: RuntimeEnvironment,
        fallback: &str,
    ) -> Self {
        let kind = error.kind();
        let status = status_code(kind);
        let message = if kind == ErrorKind::Internal
            && environment == RuntimeEnvironment::Production
        {
            fallback.to_string()
        } else {
            error.to_string()
        };
        let external_service = match kind {
            ErrorKind::ExternallyManaged => service_id.map(str::to_string),
            _ => None,
        };
        Self {
            status,
            message,
            external_service,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> Value {
        let mut body = json!({
            "success": false,
            "error": self.message,
            "timestamp": Utc::now(),
        });
        if let Some(service_id) = &self.external_service {
            body["serviceId"] = json!(service_id);
            body["managed"] = json!("external");
        }
        body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_error_body() {
        let err = Error::ExternallyManaged {
            service: "postgresql".to_string(),
            action: "stopped".to_string(),
        };
        let api = ApiError::from_error(
            &err,
            Some("postgresql"),
            RuntimeEnvironment::Development,
            "Failed to execute action",
        );
        assert_eq!(api.status(), StatusCode::NOT_IMPLEMENTED);
        let body = api.body();
        assert_eq!(body["success"], false);
        assert_eq!(body["serviceId"], "postgresql");
        assert_eq!(body["managed"], "external");
        assert!(body["error"].as_str().unwrap().contains("externally managed"));
    }

    #[test]
    fn test_production_hides_internal_errors() {
        let err = Error::Persistence("disk full at /var/lib/orch".to_string());
        let prod = ApiError::from_error(
            &err,
            Some("api"),
            RuntimeEnvironment::Production,
            "Failed to execute action",
        );
        assert_eq!(prod.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(prod.body()["error"], "Failed to execute action");
        assert!(prod.body().get("serviceId").is_none());

        let dev = ApiError::from_error(&err, None, RuntimeEnvironment::Development, "x");
        assert!(dev.body()["error"].as_str().unwrap().contains("disk full"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(status_code(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_code(ErrorKind::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_code(ErrorKind::BadRequest), StatusCode::BAD_REQUEST);
    }
}
