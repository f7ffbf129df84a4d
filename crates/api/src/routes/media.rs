//! Route definitions for image analysis, remote frame capture and local
//! video streaming.
//!
//! ```text
//! POST /analyze              analyze
//! POST /youtube-frame        capture_frame
//! GET  /video/{*filename}    stream_video
//! ```

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{media, video};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/analyze", post(media::analyze))
        .route("/youtube-frame", post(media::capture_frame))
        .route("/video/{*filename}", get(video::stream_video))
}
