//! Route definitions

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/search", post(handlers::search))
        .route("/api/v1/providers", get(handlers::providers))
        .route(
            "/api/v1/providers/:name/validate",
            post(handlers::validate_provider),
        )
        .route("/stats", get(handlers::stats))
        .route("/health", get(handlers::health))
        .layer(cors)
        .with_state(state)
}
