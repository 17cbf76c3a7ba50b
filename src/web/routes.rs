use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// REST API for chat turns, confirmed execution and session management
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            // Conversation
            .route("/chat", post(handlers::chat))
            .route("/execute", post(handlers::execute))
            .route("/reset", post(handlers::reset_session))
            // Dataset upload
            .route("/dataset", post(handlers::upload_dataset))
            // Introspection
            .route("/tables", get(handlers::list_tables))
            .route("/status", get(handlers::system_status)),
    )
}
