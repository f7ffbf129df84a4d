//! Route definitions for the polling scheduler.
//!
//! Mounted at `/analysis`.
//!
//! ```text
//! GET  /         get_status
//! POST /start    start
//! POST /stop     stop
//! ```

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::analysis;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(analysis::get_status))
        .route("/start", post(analysis::start))
        .route("/stop", post(analysis::stop))
}
