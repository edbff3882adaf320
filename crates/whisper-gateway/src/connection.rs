//! Per-connection lifecycle: `Connecting -> Open -> Authenticated -> Closing`.
//!
//! Each accepted socket gets one task here plus one writer task (spawned
//! below) reading `ConnectionCommand`s off an unbounded channel — the single
//! writer that guarantees per-socket frame ordering the router relies on.
//! This task owns all per-connection mutable state (`ConnState`, missed-pong
//! counter); the router, auth engine, and presence tracker are stateless
//! with respect to any one socket.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use whisper_common::error::WhisperError;
use whisper_common::models::rate::RateAction;
use whisper_common::models::session::Session;
use whisper_common::wire::{
    self, ForceLogoutPayload, OutboundEnvelope, PingPayload, PongPayload, RegisterAckPayload,
    RegisterChallengePayload, TurnCredentialsPayload,
};
use whisper_router::registry::ConnectionCommand;

use crate::gate::{self, ParsedFrame};
use crate::GatewayState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const MAX_MISSED_PONGS: u32 = 2;

enum ConnState {
    Unauthenticated,
    Challenged { challenge_id: Uuid },
    Authenticated { session_token: String, whisper_id: String },
}

/// What the caller should do after handling one inbound frame.
enum Flow {
    Continue,
    Close,
}

struct Connection {
    id: Uuid,
    state: ConnState,
    cmd_tx: mpsc::UnboundedSender<ConnectionCommand>,
}

impl Connection {
    fn send(&self, envelope: OutboundEnvelope) {
        let _ = self.cmd_tx.send(ConnectionCommand::Frame(envelope));
    }

    fn send_error(&self, request_id: Option<String>, err: &WhisperError) {
        let _ = self.cmd_tx.send(ConnectionCommand::Frame(OutboundEnvelope::error(request_id, err)));
    }

    fn close(&self, code: u16, reason: &'static str) {
        let _ = self.cmd_tx.send(ConnectionCommand::Close { code, reason });
    }
}

pub async fn handle_connection(
    socket: WebSocket,
    state: std::sync::Arc<GatewayState>,
    remote_addr: Option<SocketAddr>,
) {
    let connection_id = Uuid::new_v4();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<ConnectionCommand>();

    let writer = tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                ConnectionCommand::Frame(envelope) => {
                    let text = match serde_json::to_string(&envelope) {
                        Ok(t) => t,
                        Err(e) => {
                            tracing::error!(error = %e, "failed to serialize outbound frame");
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                ConnectionCommand::Close { code, reason } => {
                    let _ = ws_sender.send(Message::Close(Some(CloseFrame { code, reason: reason.into() }))).await;
                    break;
                }
            }
        }
    });

    let mut conn = Connection { id: connection_id, state: ConnState::Unauthenticated, cmd_tx };
    let remote_addr_str = remote_addr.map(|a| a.to_string());
    let mut missed_pongs: u32 = 0;
    let mut last_ping_sent_at: Option<i64> = None;

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await; // first tick fires immediately; consume it so the real cadence starts at 30s

    loop {
        tokio::select! {
            biased;

            _ = state.shutdown.cancelled() => {
                conn.send(OutboundEnvelope::new("force_logout", ForceLogoutPayload { reason: "server_draining" }));
                conn.close(1001, "server_draining");
                break;
            }

            _ = heartbeat.tick() => {
                if missed_pongs >= MAX_MISSED_PONGS {
                    conn.close(1000, "pong timeout");
                    break;
                }
                let now = Utc::now().timestamp_millis();
                last_ping_sent_at = Some(now);
                missed_pongs += 1;
                conn.send(OutboundEnvelope::new("ping", PingPayload { timestamp: now }));
            }

            incoming = ws_receiver.next() => {
                let Some(incoming) = incoming else { break };
                let msg = match incoming {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::debug!(error = %e, "websocket receive error");
                        break;
                    }
                };

                match msg {
                    Message::Text(text) => {
                        match handle_text_frame(&state, &mut conn, &remote_addr_str, &text, &mut missed_pongs, &mut last_ping_sent_at).await {
                            Flow::Continue => {}
                            Flow::Close => break,
                        }
                    }
                    Message::Close(_) => break,
                    Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
                }
            }
        }
    }

    if let ConnState::Authenticated { whisper_id, .. } = &conn.state {
        state.registry.unregister(whisper_id, connection_id).await;
        if let Err(e) = state.presence.mark_offline(whisper_id).await {
            tracing::warn!(error = %e, "failed to clear presence on disconnect");
        }
    }

    drop(conn.cmd_tx);
    let _ = writer.await;
}

async fn handle_text_frame(
    gw: &GatewayState,
    conn: &mut Connection,
    remote_addr: &Option<String>,
    raw: &str,
    missed_pongs: &mut u32,
    last_ping_sent_at: &mut Option<i64>,
) -> Flow {
    let envelope = match wire::parse_envelope(raw) {
        Ok(e) => e,
        Err(e) => {
            conn.send_error(None, &e);
            return Flow::Continue;
        }
    };
    let request_id = envelope.request_id.clone();

    if !gate::is_known_frame_type(&envelope.frame_type) {
        conn.send_error(
            request_id,
            &WhisperError::BadRequest { message: format!("unknown frame type '{}'", envelope.frame_type) },
        );
        return Flow::Continue;
    }

    let requires_auth = !gate::is_public_frame_type(&envelope.frame_type);
    if requires_auth && !matches!(conn.state, ConnState::Authenticated { .. }) {
        conn.send_error(
            request_id,
            &WhisperError::NotRegistered { message: "connection is not authenticated".into() },
        );
        return Flow::Continue;
    }

    let parsed = match gate::parse_and_validate(&envelope.frame_type, &envelope.payload) {
        Ok(p) => p,
        Err(e) => {
            conn.send_error(request_id, &e);
            return Flow::Continue;
        }
    };

    if let ConnState::Authenticated { whisper_id, .. } = &conn.state {
        if let Err(e) = gw.presence.touch(whisper_id).await {
            tracing::warn!(error = %e, "failed to refresh presence TTL");
        }
    }

    match parsed {
        ParsedFrame::RegisterBegin(p) => {
            let subject = remote_addr.as_deref().unwrap_or("unknown");
            if let Err(e) = gw.rate.check(subject, RateAction::RegisterBegin).await {
                conn.send_error(request_id, &e);
                return Flow::Continue;
            }
            match gw.auth.begin_registration(p.device_id, p.platform, p.whisper_id).await {
                Ok(challenge) => {
                    conn.state = ConnState::Challenged { challenge_id: challenge.challenge_id };
                    conn.send(
                        OutboundEnvelope::new(
                            "register_challenge",
                            RegisterChallengePayload {
                                challenge_id: challenge.challenge_id,
                                challenge: whisper_common::crypto::encode_base64(&challenge.bytes),
                                expires_at: challenge.expires_at.timestamp_millis(),
                            },
                        )
                        .with_request_id(request_id),
                    );
                }
                Err(e) => conn.send_error(request_id, &e),
            }
            Flow::Continue
        }

        ParsedFrame::RegisterProof(p) => {
            match gw
                .auth
                .complete_registration(
                    p.challenge_id,
                    p.device_id,
                    p.platform,
                    p.whisper_id,
                    &p.enc_public_key,
                    &p.sign_public_key,
                    &p.signature,
                    p.push_token,
                    p.voip_token,
                    remote_addr.clone(),
                )
                .await
            {
                Ok(outcome) => {
                    let whisper_id = outcome.session.whisper_id.clone();
                    conn.state = ConnState::Authenticated {
                        session_token: outcome.session.token.clone(),
                        whisper_id: whisper_id.clone(),
                    };

                    if let Some(displaced) = gw.registry.register(&whisper_id, conn.id, conn.cmd_tx.clone()).await {
                        displaced.force_logout(OutboundEnvelope::new(
                            "force_logout",
                            ForceLogoutPayload { reason: "another_device_registered" },
                        ));
                    }

                    if let Some(previous_token) = &outcome.previous_session_token {
                        if *previous_token != outcome.session.token {
                            let mut redis_conn = gw.db.redis.clone();
                            if let Err(e) = whisper_db::volatile::revoke_session_token(&mut redis_conn, previous_token).await {
                                tracing::warn!(error = %e, "failed to revoke previous session token");
                            }
                        }
                    }

                    if let Err(e) = gw.presence.mark_online(&whisper_id, conn.id, outcome.session.platform, true).await {
                        tracing::warn!(error = %e, "failed to mark presence online");
                    }

                    conn.send(
                        OutboundEnvelope::new(
                            "register_ack",
                            RegisterAckPayload {
                                success: true,
                                whisper_id,
                                session_token: outcome.session.token,
                                session_expires_at: outcome.session.expires_at.timestamp_millis(),
                                server_time: Utc::now().timestamp_millis(),
                            },
                        )
                        .with_request_id(request_id),
                    );
                }
                Err(e) => conn.send_error(request_id, &e),
            }
            Flow::Continue
        }

        ParsedFrame::SessionRefresh => {
            let token = match &conn.state {
                ConnState::Authenticated { session_token, .. } => session_token.clone(),
                _ => unreachable!("gated on requires_auth above"),
            };
            match gw.auth.refresh_session(&token).await {
                Ok(session) => conn.send(
                    OutboundEnvelope::new(
                        "session_refresh",
                        serde_json::json!({ "sessionExpiresAt": session.expires_at.timestamp_millis() }),
                    )
                    .with_request_id(request_id),
                ),
                Err(e) => {
                    let flow = session_error_flow(&e);
                    conn.send_error(request_id, &e);
                    return flow;
                }
            }
            Flow::Continue
        }

        ParsedFrame::Logout => {
            let token = match &conn.state {
                ConnState::Authenticated { session_token, .. } => session_token.clone(),
                _ => unreachable!("gated on requires_auth above"),
            };
            match gw.auth.logout(&token).await {
                Ok(()) => {
                    conn.send(
                        OutboundEnvelope::new("logout", serde_json::json!({ "success": true }))
                            .with_request_id(request_id),
                    );
                    conn.close(1000, "logged out");
                    return Flow::Close;
                }
                Err(e) => conn.send_error(request_id, &e),
            }
            Flow::Continue
        }

        ParsedFrame::Ping(p) => {
            conn.send(OutboundEnvelope::new("pong", PongPayload { timestamp: p.timestamp }).with_request_id(request_id));
            Flow::Continue
        }

        ParsedFrame::Pong(p) => {
            if *last_ping_sent_at == Some(p.timestamp) {
                *missed_pongs = 0;
            }
            Flow::Continue
        }

        ParsedFrame::SendMessage(p) => {
            let session = match require_session(gw, conn).await {
                Ok(s) => s,
                Err(e) => {
                    let flow = session_error_flow(&e);
                    conn.send_error(request_id, &e);
                    return flow;
                }
            };
            if let Err(e) = gw.rate.check(&session.whisper_id, RateAction::SendMessage).await {
                conn.send_error(request_id, &e);
                return Flow::Continue;
            }
            if let Err(e) = gw.messages.route_send_message(&session, request_id, p).await {
                conn.send_error(None, &e);
            }
            Flow::Continue
        }

        ParsedFrame::FetchPending(p) => {
            let session = match require_session(gw, conn).await {
                Ok(s) => s,
                Err(e) => {
                    let flow = session_error_flow(&e);
                    conn.send_error(request_id, &e);
                    return flow;
                }
            };
            if let Err(e) = gw.rate.check(&session.whisper_id, RateAction::FetchPending).await {
                conn.send_error(request_id, &e);
                return Flow::Continue;
            }
            match gw.messages.fetch_pending(&session, p.limit).await {
                Ok(pending) => {
                    let count = pending.messages.len();
                    conn.send(OutboundEnvelope::new("pending", &pending).with_request_id(request_id));
                    if let Err(e) = gw.messages.confirm_pending_drained(&session, count).await {
                        tracing::warn!(error = %e, "failed to confirm pending-queue drain");
                    }
                }
                Err(e) => conn.send_error(request_id, &e),
            }
            Flow::Continue
        }

        ParsedFrame::DeliveryReceipt(p) => {
            let session = match require_session(gw, conn).await {
                Ok(s) => s,
                Err(e) => {
                    let flow = session_error_flow(&e);
                    conn.send_error(request_id, &e);
                    return flow;
                }
            };
            if let Err(e) = gw.messages.route_delivery_receipt(&session, request_id, p).await {
                conn.send_error(None, &e);
            }
            Flow::Continue
        }

        ParsedFrame::Typing(p) => {
            let session = match require_session(gw, conn).await {
                Ok(s) => s,
                Err(e) => {
                    let flow = session_error_flow(&e);
                    conn.send_error(request_id, &e);
                    return flow;
                }
            };
            gw.registry
                .send(
                    &p.to,
                    OutboundEnvelope::new(
                        "typing",
                        serde_json::json!({ "from": session.whisper_id, "isTyping": p.is_typing }),
                    ),
                )
                .await;
            Flow::Continue
        }

        ParsedFrame::CallInitiate(p) => {
            let session = match require_session(gw, conn).await {
                Ok(s) => s,
                Err(e) => {
                    let flow = session_error_flow(&e);
                    conn.send_error(request_id, &e);
                    return flow;
                }
            };
            if let Err(e) = gw.calls.initiate(&session, request_id, p).await {
                conn.send_error(None, &e);
            }
            Flow::Continue
        }

        ParsedFrame::CallAnswer(p) => relay_call(gw, conn, request_id, "call_answer", p).await,
        ParsedFrame::CallIceCandidate(p) => relay_call(gw, conn, request_id, "call_ice_candidate", p).await,
        ParsedFrame::CallEnd(p) => relay_call(gw, conn, request_id, "call_end", p).await,
        ParsedFrame::CallRinging(p) => relay_call(gw, conn, request_id, "call_ringing", p).await,

        ParsedFrame::GetTurnCredentials => {
            let session = match require_session(gw, conn).await {
                Ok(s) => s,
                Err(e) => {
                    let flow = session_error_flow(&e);
                    conn.send_error(request_id, &e);
                    return flow;
                }
            };
            match gw.turn.issue(&session.whisper_id).await {
                Ok(creds) => conn.send(
                    OutboundEnvelope::new(
                        "turn_credentials",
                        TurnCredentialsPayload {
                            urls: creds.urls,
                            username: creds.username,
                            credential: creds.credential,
                            ttl: creds.ttl_secs,
                        },
                    )
                    .with_request_id(request_id),
                ),
                Err(e) => conn.send_error(request_id, &WhisperError::Internal(e)),
            }
            Flow::Continue
        }
    }
}

async fn relay_call(
    gw: &GatewayState,
    conn: &mut Connection,
    request_id: Option<String>,
    frame_type: &'static str,
    payload: whisper_common::wire::CallSignalPayload,
) -> Flow {
    let session = match require_session(gw, conn).await {
        Ok(s) => s,
        Err(e) => {
            let flow = session_error_flow(&e);
            conn.send_error(request_id, &e);
            return flow;
        }
    };
    if let Err(e) = gw.calls.relay(&session, frame_type, payload).await {
        conn.send_error(None, &e);
    }
    Flow::Continue
}

/// Re-validate the bearer token against the volatile store on every
/// authenticated frame, rather than trusting a cached `Session` for the
/// life of the connection — the store is the single source of truth for
/// revocation (single-active-device kicks, expiry).
async fn require_session(gw: &GatewayState, conn: &Connection) -> Result<Session, WhisperError> {
    match &conn.state {
        ConnState::Authenticated { session_token, .. } => gw.auth.authenticate(session_token).await,
        _ => Err(WhisperError::NotRegistered { message: "connection is not authenticated".into() }),
    }
}

fn session_error_flow(err: &WhisperError) -> Flow {
    match err {
        WhisperError::NotRegistered { .. } => Flow::Close,
        _ => Flow::Continue,
    }
}
