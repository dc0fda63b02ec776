use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::{ErrorKind, SchedulingError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    extra: Option<serde_json::Value>,
}

/// HTTP status for a scheduling error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NoAdvisorProfile | ErrorKind::ForbiddenRole => StatusCode::FORBIDDEN,
        ErrorKind::ServiceNotAssigned => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::StateForbidden
        | ErrorKind::SlotNotAvailable
        | ErrorKind::ResourceBusy
        | ErrorKind::AdvisorTimeClash => StatusCode::CONFLICT,
        ErrorKind::OauthRevoked => StatusCode::FAILED_DEPENDENCY,
        ErrorKind::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::UpstreamTransient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::UpstreamPermanent => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, extra) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg, None),
            ApiError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorKind::Validation.as_str(),
                msg,
                None,
            ),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorKind::Internal.as_str(),
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            ApiError::Scheduling(err) => {
                let kind = err.kind();
                let message = match kind {
                    ErrorKind::Internal => {
                        tracing::error!(error = %err, "Scheduling operation failed");
                        "An internal error occurred".to_string()
                    }
                    _ => err.to_string(),
                };
                let extra = match kind {
                    ErrorKind::OauthRevoked => {
                        Some(serde_json::json!({ "reconnect_calendar": true }))
                    }
                    _ => err.extra(),
                };
                (status_for(kind), kind.as_str(), message, extra)
            }
        };

        let body = ErrorBody {
            error: error_code.into(),
            message,
            extra,
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Internal(format!("Database error: {}", err))
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| match &e.message {
                    Some(m) => m.to_string(),
                    None => format!("{} is invalid", field),
                })
            })
            .collect();

        let message = match messages.as_slice() {
            [] => "Request is invalid".to_string(),
            [single] => single.clone(),
            many => format!("{} validation errors", many.len()),
        };

        ApiError::Validation(message)
    }
}
