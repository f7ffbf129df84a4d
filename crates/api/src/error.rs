use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crowdwatch_cloud::chat::ChatError;
use crowdwatch_cloud::vision::DetectionError;
use crowdwatch_core::error::CoreError;
use crowdwatch_monitor::assistant::ChatSessionError;
use crowdwatch_monitor::capture::CaptureError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors plus the errors of the hosted
/// services and adds HTTP-specific variants. Implements [`IntoResponse`]
/// to produce consistent `{ "error", "code" }` JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `crowdwatch_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Session(#[from] ChatSessionError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Unavailable(msg) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    msg.clone(),
                ),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    internal()
                }
            },

            // --- Vision API ---
            AppError::Detection(err) => match err {
                DetectionError::Unconfigured => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "NOT_CONFIGURED",
                    err.to_string(),
                ),
                DetectionError::BadRequest(msg) => {
                    (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone())
                }
                DetectionError::UpstreamError { message, .. } => {
                    tracing::warn!(error = %err, "Vision API returned an error");
                    (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", message.clone())
                }
                DetectionError::Transport(_) => {
                    tracing::warn!(error = %err, "Vision API unreachable");
                    (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", err.to_string())
                }
            },

            // --- Chat completion API ---
            AppError::Chat(err) => match err {
                ChatError::Unconfigured => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "NOT_CONFIGURED",
                    err.to_string(),
                ),
                ChatError::Upstream { .. } | ChatError::Transport(_) => {
                    tracing::warn!(error = %err, "Chat completion failed");
                    (
                        StatusCode::BAD_GATEWAY,
                        "UPSTREAM_ERROR",
                        "AI service error".to_string(),
                    )
                }
            },

            // --- Remote frame capture ---
            AppError::Capture(err) => match err {
                CaptureError::EmptyUrl | CaptureError::NotYoutube(_) => {
                    (StatusCode::BAD_REQUEST, "BAD_REQUEST", err.to_string())
                }
                _ => {
                    tracing::warn!(error = %err, "Frame capture failed");
                    (StatusCode::BAD_GATEWAY, "CAPTURE_FAILED", err.to_string())
                }
            },

            // --- Chat sessions ---
            AppError::Session(err) => match err {
                ChatSessionError::EmptyMessage => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
                }
                ChatSessionError::Busy => (StatusCode::CONFLICT, "BUSY", err.to_string()),
                ChatSessionError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
                }
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
