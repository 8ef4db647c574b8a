//! Route table and middleware stack.

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::handlers::{
    health_handler, models_handler, status_handler, transcribe_blob_handler, transcribe_handler,
};
use crate::state::AppState;

/// Maximum accepted upload size.
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/status", get(status_handler))
        .route("/api/models", get(models_handler))
        .route("/api/transcribe", post(transcribe_handler))
        .route("/api/transcribe-blob", post(transcribe_blob_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}
