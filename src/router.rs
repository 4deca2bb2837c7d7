//! Router construction
//!
//! Binds the five endpoints and the middleware stack to an [`AppState`].

use crate::api;
use crate::middleware::{handle_panic, request_id_middleware};
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let max_upload_size = state.config.storage.max_upload_size;

    Router::new()
        .route("/", get(api::info::descriptor))
        .route("/upload", post(api::files::upload_file))
        .route("/upload-multiple", post(api::files::upload_multiple))
        .route("/files", get(api::files::list_files))
        .route("/download/:filename", get(api::files::download_file))
        .fallback(api::info::not_found)
        // Middleware (order matters - panics are caught closest to the handlers)
        .layer(DefaultBodyLimit::max(max_upload_size))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
