//! Router configuration for the web server.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use axum::{Extension, Router};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;
use crate::models::QuoteKind;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    let files = ServeDir::new(&state.images_dir);

    Router::new()
        // Documents and chunked ingestion
        .route(
            "/documents",
            get(handlers::list_documents).post(handlers::ingest_document),
        )
        .route(
            "/documents/:id",
            get(handlers::get_document)
                .patch(handlers::update_document)
                .delete(handlers::delete_document),
        )
        .route("/documents/:id/abort", post(handlers::abort_document))
        // Viewer
        .route("/detection", post(handlers::record_detection))
        .route("/layer-visibility", post(handlers::layer_visibility))
        // Dashboard ledgers
        .nest("/takeoffs", quote_routes(QuoteKind::Takeoff))
        .nest("/invoices", quote_routes(QuoteKind::Invoice))
        // Locally stored detection images
        .nest_service("/files", files)
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn quote_routes(kind: QuoteKind) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_quotes).post(handlers::create_quote),
        )
        .route(
            "/:id",
            patch(handlers::update_quote).delete(handlers::delete_quote),
        )
        .layer(Extension(kind))
}
