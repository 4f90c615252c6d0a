//! Router assembly: HTTP endpoints, artifact serving, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - REST-ish API under `/api/v1/...`
/// - Generated artifacts (audio, video, quiz JSON) served from `/uploads`
/// - CORS (allow any origin/method/headers) – adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let uploads_service = ServeDir::new(&state.settings.upload_root);

    Router::new()
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route(
            "/api/v1/assignments",
            get(http::http_list_assignments).post(http::http_create_assignment),
        )
        .route(
            "/api/v1/assignments/:id",
            get(http::http_get_assignment).delete(http::http_delete_assignment),
        )
        .route(
            "/api/v1/assignments/:id/regenerate",
            post(http::http_regenerate_variant),
        )
        // Generated artifacts
        .nest_service("/uploads", uploads_service)
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
