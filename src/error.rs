use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// The gateway's error taxonomy. Every pipeline phase maps its failures onto
/// one of these kinds; the HTTP status and detail payload are fixed by the
/// table below and never include credential material.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid gateway access token")]
    AuthInvalid,

    #[error("missing project identifier")]
    ProjectMissing,

    #[error("invalid request schema: {0}")]
    SchemaInvalid(String),

    #[error("unsupported model architecture")]
    ModelUnknown,

    #[error("budget exceeded for project {0}")]
    BudgetExceeded(String),

    #[error("security subsystem unavailable")]
    SecretsUnavailable,

    #[error("upstream provider rate limit exceeded")]
    UpstreamRateLimit,

    #[error("upstream provider error: {0}")]
    UpstreamError(String),

    #[error("upstream provider unreachable")]
    UpstreamUnavailable,

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            GatewayError::AuthInvalid => {
                (StatusCode::UNAUTHORIZED, "Invalid Gateway Access Token".to_string())
            }
            GatewayError::ProjectMissing => {
                (StatusCode::BAD_REQUEST, "Missing project identifier".to_string())
            }
            GatewayError::SchemaInvalid(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            GatewayError::ModelUnknown => {
                (StatusCode::BAD_REQUEST, "Unsupported model architecture".to_string())
            }
            GatewayError::BudgetExceeded(project_id) => (
                StatusCode::PAYMENT_REQUIRED,
                format!("Budget exceeded for Project ID {project_id}"),
            ),
            GatewayError::SecretsUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Security subsystem unavailable".to_string(),
            ),
            GatewayError::UpstreamRateLimit => (
                StatusCode::TOO_MANY_REQUESTS,
                "Upstream provider rate limit exceeded".to_string(),
            ),
            GatewayError::UpstreamError(msg) => {
                (StatusCode::BAD_GATEWAY, format!("Upstream provider error: {msg}"))
            }
            GatewayError::UpstreamUnavailable => (
                StatusCode::GATEWAY_TIMEOUT,
                "Upstream provider unreachable".to_string(),
            ),
            GatewayError::Internal(e) => {
                tracing::error!("internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({ "detail": detail }));
        (status, body).into_response()
    }
}
