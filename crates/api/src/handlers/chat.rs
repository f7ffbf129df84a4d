//! Handlers for the analytics assistant.
//!
//! `/api/ai-chat` is stateless: the caller sends the whole history.
//! The `/api/chat/sessions` resource keeps history server-side and
//! answers one message at a time per session.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crowdwatch_cloud::chat::{ChatError, ChatUsage};
use crowdwatch_core::chat::{AnalyticsContext, ChatMessage, ChatRole};
use crowdwatch_monitor::assistant::SessionSnapshot;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Option<Vec<ChatMessage>>,
    /// Snapshot from the dashboard; the live store is used when absent.
    pub analytics_context: Option<AnalyticsContext>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub message: String,
    pub usage: ChatUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessage {
    #[serde(default)]
    pub text: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/ai-chat
pub async fn ai_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> AppResult<Json<ChatResponse>> {
    if !state.chat.is_configured() {
        return Err(ChatError::Unconfigured.into());
    }
    let messages: Vec<ChatMessage> = body
        .messages
        .unwrap_or_default()
        .into_iter()
        .filter(|m| m.role != ChatRole::System)
        .collect();
    if messages.is_empty() {
        return Err(AppError::BadRequest("No messages provided".into()));
    }

    let context = match body.analytics_context {
        Some(context) => context,
        None => state.store.analytics_context().await,
    };
    let reply = state.chat.complete(&messages, Some(&context)).await?;

    Ok(Json(ChatResponse {
        success: true,
        message: reply.message,
        usage: reply.usage,
        model: reply.model,
    }))
}

/// POST /api/chat/sessions
pub async fn create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<SessionSnapshot>) {
    let stats = state.store.stats().await;
    let session = state.sessions.create(&stats).await;
    (StatusCode::CREATED, Json(session.snapshot().await))
}

/// GET /api/chat/sessions/{id}
///
/// An untouched session's welcome turn is re-rendered with current stats.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SessionSnapshot>> {
    let session = state.sessions.get(id).await?;
    session.refresh_welcome(&state.store.stats().await).await;
    Ok(Json(session.snapshot().await))
}

/// DELETE /api/chat/sessions/{id}
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.sessions.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/chat/sessions/{id}/messages
pub async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SendMessage>,
) -> AppResult<Json<SessionSnapshot>> {
    let session = state.sessions.get(id).await?;
    session
        .send(&body.text, state.chat.as_ref(), &state.store)
        .await?;
    Ok(Json(session.snapshot().await))
}

/// POST /api/chat/sessions/{id}/reset
pub async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SessionSnapshot>> {
    let session = state.sessions.get(id).await?;
    session.reset().await?;
    Ok(Json(session.snapshot().await))
}
