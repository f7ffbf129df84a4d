//! Route definitions for the camera feeds.
//!
//! ```text
//! GET /video-feeds               list_feeds
//! PUT /feeds/{id}/status         set_status
//! GET /feeds/{id}/overlay.svg    overlay_svg
//! ```

use axum::routing::{get, put};
use axum::Router;

use crate::handlers::feeds;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/video-feeds", get(feeds::list_feeds))
        .route("/feeds/{id}/status", put(feeds::set_status))
        .route("/feeds/{id}/overlay.svg", get(feeds::overlay_svg))
}
