//! # whisper-gateway
//!
//! WebSocket connection multiplexer: accept loop, heartbeat, schema gate,
//! and per-connection frame dispatch into the auth engine and router.
//! Built directly on `axum::extract::ws`, split sender/receiver plus a
//! dedicated writer task per connection — the single-writer discipline the
//! router depends on for per-socket frame ordering.

pub mod connection;
pub mod gate;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;

use whisper_auth::AuthEngine;
use whisper_common::ports::TurnCredentialIssuer;
use whisper_db::Database;
use whisper_router::{CallRouter, ConnectionRegistry, MessageRouter, PresenceTracker, RateLimiter};

/// Shared state for every accepted gateway connection.
#[derive(Clone)]
pub struct GatewayState {
    pub db: Arc<Database>,
    pub auth: Arc<AuthEngine>,
    pub messages: Arc<MessageRouter>,
    pub calls: Arc<CallRouter>,
    pub presence: Arc<PresenceTracker>,
    pub rate: Arc<RateLimiter>,
    pub registry: ConnectionRegistry,
    pub turn: Arc<dyn TurnCredentialIssuer>,
    /// Ordinary-frame size cap (§4.4); the contact-backup exception is a
    /// REST-only concern enforced by `whisper-api`'s body-limit layer, since
    /// no websocket frame type carries a contact backup.
    pub max_frame_bytes: usize,
    pub shutdown: CancellationToken,
}

pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
) -> Response {
    let max_frame_bytes = state.max_frame_bytes;
    ws.max_message_size(max_frame_bytes)
        .on_upgrade(move |socket| connection::handle_connection(socket, state, Some(remote_addr)))
}
