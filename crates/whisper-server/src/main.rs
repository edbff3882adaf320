//! # whisper-server
//!
//! Process entry point: loads configuration, connects to both stores, wires
//! the auth engine, routers, and boundary adapters, then runs the WebSocket
//! gateway and the REST API concurrently until a shutdown signal drains
//! both.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use whisper_adapters::{CoturnCredentialAdapter, NoopPushAdapter, S3AttachmentAdapter, WebhookPushAdapter};
use whisper_api::AppState as ApiState;
use whisper_auth::AuthEngine;
use whisper_common::ports::{PushNotifier, TurnCredentialIssuer};
use whisper_db::Database;
use whisper_gateway::GatewayState;
use whisper_router::{CallRouter, ConnectionRegistry, MessageRouter, PresenceTracker, RateLimiter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = whisper_common::config::init()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whisper=info,tower_http=info".into()),
        )
        .with_target(true)
        .init();

    tracing::info!("starting whisper2 server core v{}", env!("CARGO_PKG_VERSION"));

    let db = Arc::new(Database::connect(config).await?);
    db.migrate().await?;

    let auth = Arc::new(AuthEngine::new(db.clone(), config.challenge.ttl_secs, config.session.ttl_secs));
    let registry = ConnectionRegistry::new();

    let push: Arc<dyn PushNotifier> = if config.push.webhook_url.is_empty() {
        Arc::new(NoopPushAdapter)
    } else {
        Arc::new(WebhookPushAdapter::new(config.push.webhook_url.clone(), config.push.request_timeout_secs)?)
    };

    let messages = Arc::new(MessageRouter::new(
        db.clone(),
        registry.clone(),
        push.clone(),
        config.limits.pending_ttl_secs,
        config.limits.max_pending_per_recipient,
    ));
    let calls = Arc::new(CallRouter::new(
        db.clone(),
        registry.clone(),
        push,
        config.limits.pending_ttl_secs,
        config.limits.max_pending_per_recipient,
    ));
    let presence = Arc::new(PresenceTracker::new(db.clone(), registry.clone()));
    let rate = Arc::new(RateLimiter::new(db.clone()));

    let turn: Arc<dyn TurnCredentialIssuer> = Arc::new(CoturnCredentialAdapter::new(
        config.turn.shared_secret.clone(),
        config.turn.realm.clone(),
        config.turn.urls.clone(),
        config.turn.credential_ttl_secs,
    ));

    let attachments: Arc<dyn whisper_common::ports::AttachmentStore> = Arc::new(S3AttachmentAdapter::new(
        &config.storage.endpoint,
        &config.storage.access_key,
        &config.storage.secret_key,
        &config.storage.region,
        config.storage.bucket.clone(),
        config.storage.presign_ttl_secs,
    ));

    let shutdown = CancellationToken::new();

    let gateway_state = Arc::new(GatewayState {
        db: db.clone(),
        auth: auth.clone(),
        messages,
        calls,
        presence,
        rate: rate.clone(),
        registry: registry.clone(),
        turn,
        max_frame_bytes: config.limits.max_frame_bytes,
        shutdown: shutdown.clone(),
    });
    let gateway_router = whisper_gateway::build_router(gateway_state);
    let gateway_addr = SocketAddr::new(config.server.host.parse()?, config.server.gateway_port);

    let api_state = Arc::new(ApiState { db: db.clone(), auth, attachments, rate: rate.clone() });
    let api_router = whisper_api::build_router(api_state);
    let api_addr = SocketAddr::new(config.server.host.parse()?, config.server.api_port);

    tracing::info!("gateway listening on ws://{gateway_addr}/ws");
    tracing::info!("REST API listening on http://{api_addr}");

    let gateway_listener = tokio::net::TcpListener::bind(gateway_addr).await?;
    let api_listener = tokio::net::TcpListener::bind(api_addr).await?;

    let gateway_shutdown = shutdown.clone();
    let gateway_task = tokio::spawn(async move {
        axum::serve(gateway_listener, gateway_router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move { gateway_shutdown.cancelled().await })
            .await
    });

    let api_shutdown = shutdown.clone();
    let api_task = tokio::spawn(async move {
        axum::serve(api_listener, api_router.into_make_service())
            .with_graceful_shutdown(async move { api_shutdown.cancelled().await })
            .await
    });

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining connections");
    // Cancels every accepted connection's own `state.shutdown.cancelled()`
    // branch, which sends `force_logout` and closes the socket itself —
    // no need to reach into the registry from here.
    shutdown.cancel();

    let grace = std::time::Duration::from_secs(config.server.shutdown_grace_secs);
    let _ = tokio::time::timeout(grace, async {
        let _ = gateway_task.await;
        let _ = api_task.await;
    })
    .await;

    tracing::info!("shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM — whichever arrives first.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
