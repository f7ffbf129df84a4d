use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub vision_configured: bool,
    pub chat_configured: bool,
    pub analysis_enabled: bool,
}

/// GET /health -- returns service health and which hosted services are
/// configured.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let vision_configured = state.detector.is_configured();
    let chat_configured = state.chat.is_configured();
    let status = if vision_configured { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        vision_configured,
        chat_configured,
        analysis_enabled: state.scheduler.status().await.enabled,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
