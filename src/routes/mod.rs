pub mod events;
pub mod health;
pub mod summary;

use axum::Router;
use axum::routing::{get, post};

use crate::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/events/range", post(events::fetch_range))
        .route("/api/events/range/stream", post(events::stream_range))
        .route("/api/events/range/cancel", post(events::cancel_range))
        .route("/api/events/summary", post(summary::create_summary))
        .route("/api/events/chat", post(summary::follow_up))
        .with_state(state)
}
