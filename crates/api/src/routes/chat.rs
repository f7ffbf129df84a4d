//! Route definitions for the analytics assistant.
//!
//! ```text
//! POST /ai-chat                         ai_chat
//! POST /chat/sessions                   create_session
//! GET  /chat/sessions/{id}              get_session
//! DELETE /chat/sessions/{id}            delete_session
//! POST /chat/sessions/{id}/messages     send_message
//! POST /chat/sessions/{id}/reset        reset_session
//! ```

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::chat;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ai-chat", post(chat::ai_chat))
        .route("/chat/sessions", post(chat::create_session))
        .route(
            "/chat/sessions/{id}",
            get(chat::get_session).delete(chat::delete_session),
        )
        .route("/chat/sessions/{id}/messages", post(chat::send_message))
        .route("/chat/sessions/{id}/reset", post(chat::reset_session))
}
