use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Notification relay (POST only)
        .route("/api/notify", post(handlers::notify))
        // Review feed
        .route("/admin/submissions", get(handlers::list_submissions))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
