pub mod health;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::generation::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/generate", post(handlers::handle_generate))
        .route(
            "/api/v1/generate/stream",
            post(handlers::handle_generate_stream),
        )
        .route("/api/v1/generate/cache", delete(handlers::handle_invalidate))
        .route("/api/v1/generate/stats", get(handlers::handle_stats))
        .with_state(state)
}
