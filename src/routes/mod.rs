//! HTTP API routes

pub mod health;
pub mod songs;
pub mod upload;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_upload_bytes = state.config().upload.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/health", get(health::health_check))
        .nest("/api/v1/upload", upload::router(max_upload_bytes))
        .nest("/api/v1/songs", songs::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
