//! Handlers for starting, stopping and inspecting background analysis.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crowdwatch_core::aggregation::{AggregateStats, FeedSnapshot};
use crowdwatch_monitor::scheduler::{AnalysisMode, SchedulerStatus};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub mode: AnalysisMode,
}

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    #[serde(flatten)]
    pub scheduler: SchedulerStatus,
    pub stats: AggregateStats,
    pub feeds: Vec<FeedSnapshot>,
}

async fn respond(state: &AppState, scheduler: SchedulerStatus) -> Json<AnalysisResponse> {
    Json(AnalysisResponse {
        scheduler,
        stats: state.store.stats().await,
        feeds: state.store.feeds().await,
    })
}

/// GET /api/analysis
pub async fn get_status(State(state): State<AppState>) -> Json<AnalysisResponse> {
    let scheduler = state.scheduler.status().await;
    respond(&state, scheduler).await
}

/// POST /api/analysis/start
///
/// The body is optional; without one analysis runs in background mode.
pub async fn start(State(state): State<AppState>, body: Bytes) -> AppResult<Json<AnalysisResponse>> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        StartRequest::default()
    } else {
        serde_json::from_slice::<StartRequest>(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid start request: {e}")))?
    };
    let scheduler = state.scheduler.start(request.mode).await;
    Ok(respond(&state, scheduler).await)
}

/// POST /api/analysis/stop
pub async fn stop(State(state): State<AppState>) -> Json<AnalysisResponse> {
    let scheduler = state.scheduler.stop().await;
    respond(&state, scheduler).await
}
