//! Call signalling relay — `call_initiate`, `call_answer`, `call_ice_candidate`,
//! `call_end`, `call_ringing`. Routed identically to `send_message` (signature
//! verified over the same canonical form, replay-windowed, delivered online
//! or queued) with one addition: a short-lived [`CallState`] record makes
//! duplicate `call_initiate` for the same `callId` idempotent. The server
//! never inspects SDP/ICE content; it is a relay, not a signalling peer.

use std::sync::Arc;

use chrono::Utc;

use whisper_common::crypto;
use whisper_common::error::{WhisperError, WhisperResult};
use whisper_common::models::call::{CallPhase, CallState};
use whisper_common::models::message::PendingEnvelope;
use whisper_common::models::session::Session;
use whisper_common::ports::{CallWakeup, PushNotifier};
use whisper_common::wire::{CallIncomingPayload, CallSignalPayload, OutboundEnvelope};
use whisper_db::Database;

use crate::registry::ConnectionRegistry;

const TIMESTAMP_SKEW_MS: i64 = 600_000;
const CALL_TTL_SECS: i64 = whisper_common::models::call::CALL_TTL_SECS;

pub struct CallRouter {
    db: Arc<Database>,
    registry: ConnectionRegistry,
    push: Arc<dyn PushNotifier>,
    pending_ttl_secs: i64,
    pending_max_len: usize,
}

impl CallRouter {
    pub fn new(
        db: Arc<Database>,
        registry: ConnectionRegistry,
        push: Arc<dyn PushNotifier>,
        pending_ttl_secs: i64,
        pending_max_len: usize,
    ) -> Self {
        Self { db, registry, push, pending_ttl_secs, pending_max_len }
    }

    /// `call_initiate` — reserves the call id (idempotent on retry) and
    /// delivers `call_incoming` to the recipient, online or via push.
    pub async fn initiate(
        &self,
        session: &Session,
        request_id: Option<String>,
        payload: CallSignalPayload,
    ) -> WhisperResult<()> {
        self.verify_signal(session, &payload, "call_initiate").await?;

        let is_video = payload.is_video.unwrap_or(false);
        let state = CallState::new(payload.call_id, payload.from.clone(), payload.to.clone(), is_video);

        let mut conn = self.db.redis.clone();
        let freshly_reserved = whisper_db::volatile::reserve_call(&mut conn, &state, CALL_TTL_SECS)
            .await
            .map_err(WhisperError::Redis)?;

        self.registry
            .send(
                &payload.from,
                OutboundEnvelope::new("message_accepted", serde_json::json!({
                    "messageId": payload.call_id,
                    "status": "accepted",
                }))
                .with_request_id(request_id),
            )
            .await;

        if !freshly_reserved {
            // Duplicate call_initiate for a callId already in flight: the
            // recipient must not see a second call_incoming.
            return Ok(());
        }

        self.deliver(&payload, is_video).await
    }

    /// `call_answer` / `call_ice_candidate` / `call_end` / `call_ringing` —
    /// relayed verbatim, with `call_end` additionally tearing down the
    /// tracked state.
    pub async fn relay(
        &self,
        session: &Session,
        frame_type: &'static str,
        payload: CallSignalPayload,
    ) -> WhisperResult<()> {
        self.verify_signal(session, &payload, frame_type).await?;

        if frame_type == "call_end" {
            let mut conn = self.db.redis.clone();
            whisper_db::volatile::delete_call(&mut conn, &payload.call_id.to_string())
                .await
                .map_err(WhisperError::Redis)?;
        } else if frame_type == "call_answer" {
            self.advance(payload.call_id, CallPhase::Answered).await?;
        }

        let delivered = self.registry.send(&payload.to, OutboundEnvelope::new(frame_type, &payload)).await;
        if !delivered {
            self.deliver(&payload, payload.is_video.unwrap_or(false)).await?;
        }
        Ok(())
    }

    async fn advance(&self, call_id: uuid::Uuid, phase: CallPhase) -> WhisperResult<()> {
        let mut conn = self.db.redis.clone();
        if let Some(mut state) = whisper_db::volatile::get_call(&mut conn, &call_id.to_string())
            .await
            .map_err(WhisperError::Redis)?
        {
            state.state = phase;
            whisper_db::volatile::update_call(&mut conn, &state, CALL_TTL_SECS)
                .await
                .map_err(WhisperError::Redis)?;
        }
        Ok(())
    }

    async fn verify_signal(
        &self,
        session: &Session,
        payload: &CallSignalPayload,
        frame_type: &str,
    ) -> WhisperResult<()> {
        if session.whisper_id != payload.from {
            return Err(WhisperError::Forbidden {
                message: "session is not bound to payload.from".into(),
            });
        }

        let now = Utc::now().timestamp_millis();
        if (now - payload.timestamp).abs() > TIMESTAMP_SKEW_MS {
            return Err(WhisperError::InvalidTimestamp);
        }

        let recipient = whisper_db::repository::identities::find_identity(&self.db.pool, &payload.to)
            .await
            .map_err(WhisperError::Database)?
            .ok_or_else(|| WhisperError::NotFound { resource: "recipient".into() })?;
        if whisper_db::repository::identities::is_banned(&recipient) {
            return Err(WhisperError::Forbidden { message: "recipient is banned".into() });
        }

        let sender_device = whisper_db::repository::identities::find_device(&self.db.pool, &payload.from)
            .await
            .map_err(WhisperError::Database)?
            .ok_or_else(|| WhisperError::NotRegistered { message: "no device record for sender".into() })?;

        let canonical = crypto::canonical_message_bytes(
            frame_type,
            &payload.call_id.to_string(),
            &payload.from,
            &payload.to,
            payload.timestamp,
            &payload.nonce,
            &payload.ciphertext,
        );
        crypto::verify_canonical_signature(&sender_device.sign_public_key, &payload.sig, &canonical)
            .map_err(|_| WhisperError::AuthFailed { message: "signature verification failed".into() })
    }

    /// Deliver as `call_incoming` to an online recipient, or fall back to
    /// pending-queue + call push for an offline one.
    async fn deliver(&self, payload: &CallSignalPayload, is_video: bool) -> WhisperResult<()> {
        let sender_device = whisper_db::repository::identities::find_device(&self.db.pool, &payload.from)
            .await
            .map_err(WhisperError::Database)?
            .ok_or_else(|| WhisperError::NotRegistered { message: "no device record for sender".into() })?;

        let incoming = CallIncomingPayload {
            call_id: payload.call_id,
            from: payload.from.clone(),
            to: payload.to.clone(),
            timestamp: payload.timestamp,
            nonce: payload.nonce.clone(),
            ciphertext: payload.ciphertext.clone(),
            sig: payload.sig.clone(),
            is_video,
        };

        let delivered_online = self
            .registry
            .send(&payload.to, OutboundEnvelope::new("call_incoming", &incoming))
            .await;
        if delivered_online {
            return Ok(());
        }

        let envelope = PendingEnvelope {
            message_id: payload.call_id.to_string(),
            from: payload.from.clone(),
            to: payload.to.clone(),
            msg_type: "call_incoming".to_string(),
            timestamp: payload.timestamp,
            nonce: payload.nonce.clone(),
            ciphertext: payload.ciphertext.clone(),
            sig: payload.sig.clone(),
            attachment: None,
            sender_enc_public_key: sender_device.enc_public_key,
            sender_sign_public_key: sender_device.sign_public_key,
            queued_at: Utc::now(),
        };

        let mut conn = self.db.redis.clone();
        whisper_db::volatile::push_pending(
            &mut conn, &payload.to, &envelope, self.pending_max_len, self.pending_ttl_secs,
        )
        .await
        .map_err(WhisperError::Redis)?;

        if let Ok(Some(recipient_device)) =
            whisper_db::repository::identities::find_device(&self.db.pool, &payload.to).await
        {
            if let Some(push_token) = recipient_device.voip_token.or(recipient_device.push_token) {
                let wakeup = CallWakeup {
                    call_id: payload.call_id,
                    caller_whisper_id: payload.from.clone(),
                    is_video,
                    timestamp: payload.timestamp,
                };
                if let Err(e) = self.push.notify_call(&push_token, wakeup).await {
                    tracing::warn!(recipient = %payload.to, error = %e, "call push notification failed");
                }
            }
        }

        Ok(())
    }
}
