pub mod analysis;
pub mod chat;
pub mod feeds;
pub mod health;
pub mod media;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /analyze                              detect people in one image (POST)
/// /youtube-frame                        capture one remote frame (POST)
/// /video/{*filename}                    local video bytes, range aware
///
/// /video-feeds                          feeds with live counts + meta
/// /feeds/{id}/status                    change feed status (PUT)
/// /feeds/{id}/overlay.svg               overlay for the last detection
///
/// /analysis                             scheduler status
/// /analysis/start                       start polling (POST)
/// /analysis/stop                        stop polling (POST)
///
/// /ai-chat                              stateless chat completion (POST)
/// /chat/sessions                        create session (POST)
/// /chat/sessions/{id}                   get session
/// /chat/sessions/{id}/messages          send message (POST)
/// /chat/sessions/{id}/reset             reset session (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(media::router())
        .merge(feeds::router())
        .nest("/analysis", analysis::router())
        .merge(chat::router())
}
