//! HTTP surface
//!
//! - POST /api/notify - Send a user notification or forward media to a reviewer
//! - GET /admin/submissions - Normalized submissions grouped by subject
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::ErrorResponse;
pub use routes::create_router;
pub use state::AppState;
