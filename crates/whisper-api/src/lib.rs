//! # whisper-api
//!
//! REST surface alongside the WebSocket gateway: bearer-token authenticated
//! endpoints for public-key lookup, contact-backup storage, and attachment
//! presigning. Everything session- and message-shaped lives in the gateway;
//! this crate only covers what spec.md's HTTP surface table lists.

pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::Router;

use whisper_auth::AuthEngine;
use whisper_common::ports::AttachmentStore;
use whisper_db::Database;
use whisper_router::RateLimiter;

/// Shared application state available to all route handlers.
pub struct AppState {
    pub db: Arc<Database>,
    pub auth: Arc<AuthEngine>,
    pub attachments: Arc<dyn AttachmentStore>,
    pub rate: Arc<RateLimiter>,
}

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::keys::router(state.clone()))
        .merge(routes::backup::router(state.clone()))
        .merge(routes::attachments::router(state.clone()))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::compression::CompressionLayer::new())
        .layer(tower_http::limit::RequestBodyLimitLayer::new(routes::backup::max_request_bytes()))
        .with_state(state)
}
