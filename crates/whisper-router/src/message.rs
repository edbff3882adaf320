//! Message router — online routing, offline queueing, dedup, and
//! delivery-receipt forwarding.

use std::sync::Arc;

use chrono::Utc;

use whisper_common::crypto;
use whisper_common::error::{WhisperError, WhisperResult};
use whisper_common::models::message::PendingEnvelope;
use whisper_common::models::session::Session;
use whisper_common::ports::{MessageWakeup, PushNotifier};
use whisper_common::wire::{
    DeliveryReceiptPayload, MessageAcceptedPayload, MessageDeliveredPayload,
    MessageReceivedPayload, OutboundEnvelope, PendingPayload, SendMessagePayload,
};
use whisper_db::Database;

use crate::registry::ConnectionRegistry;

/// Accepted skew window per §4.5/§6: ±10 minutes.
const TIMESTAMP_SKEW_MS: i64 = 600_000;
const DEDUP_TTL_SECS: i64 = 24 * 60 * 60;
/// `retryAfterSecs` handed back on the `RATE_LIMITED` pressure case in
/// spec.md §7 when an offline recipient's pending queue is already full.
const PENDING_QUEUE_FULL_RETRY_SECS: u64 = 60;

pub struct MessageRouter {
    db: Arc<Database>,
    registry: ConnectionRegistry,
    push: Arc<dyn PushNotifier>,
    pending_ttl_secs: i64,
    pending_max_len: usize,
}

impl MessageRouter {
    pub fn new(
        db: Arc<Database>,
        registry: ConnectionRegistry,
        push: Arc<dyn PushNotifier>,
        pending_ttl_secs: i64,
        pending_max_len: usize,
    ) -> Self {
        Self { db, registry, push, pending_ttl_secs, pending_max_len }
    }

    /// `send_message` — runs the full integrity pipeline, then accepts and
    /// routes. Errors here are replied to the sender as an `error` frame by
    /// the caller; on success, this function has already emitted
    /// `message_accepted` (and, if delivered online, `message_delivered`).
    pub async fn route_send_message(
        &self,
        session: &Session,
        request_id: Option<String>,
        payload: SendMessagePayload,
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
            &payload.msg_type,
            &payload.message_id,
            &payload.from,
            &payload.to,
            payload.timestamp,
            &payload.nonce,
            &payload.ciphertext,
        );
        crypto::verify_canonical_signature(&sender_device.sign_public_key, &payload.sig, &canonical)
            .map_err(|_| WhisperError::AuthFailed { message: "signature verification failed".into() })?;

        let mut conn = self.db.redis.clone();

        if !self.registry.is_online(&payload.to).await {
            let queue_len = whisper_db::volatile::pending_len(&mut conn, &payload.to)
                .await
                .map_err(WhisperError::Redis)?;
            if queue_len as usize >= self.pending_max_len {
                return Err(WhisperError::RateLimited { retry_after_secs: PENDING_QUEUE_FULL_RETRY_SECS });
            }
        }

        let newly_reserved = whisper_db::volatile::reserve_message_dedup(
            &mut conn, &payload.to, &payload.message_id, DEDUP_TTL_SECS,
        )
        .await
        .map_err(WhisperError::Redis)?;

        self.registry
            .send(
                &payload.from,
                OutboundEnvelope::new(
                    "message_accepted",
                    MessageAcceptedPayload { message_id: payload.message_id.clone(), status: "accepted" },
                )
                .with_request_id(request_id),
            )
            .await;

        if !newly_reserved {
            // Duplicate accept: sender already got message_accepted above;
            // the recipient must observe at most one message_received.
            return Ok(());
        }

        if let Some(object_key) = payload.attachment.as_ref().and_then(|a| a.get("objectKey")).and_then(|v| v.as_str()) {
            if let Err(e) = whisper_db::repository::attachments::grant_recipient(&self.db.pool, object_key, &payload.to).await {
                tracing::warn!(object_key, error = %e, "failed to grant attachment recipient access");
            }
        }

        let received = MessageReceivedPayload {
            message_id: payload.message_id.clone(),
            from: payload.from.clone(),
            to: payload.to.clone(),
            msg_type: payload.msg_type.clone(),
            timestamp: payload.timestamp,
            nonce: payload.nonce.clone(),
            ciphertext: payload.ciphertext.clone(),
            sig: payload.sig.clone(),
            attachment: payload.attachment.clone(),
            sender_enc_public_key: sender_device.enc_public_key.clone(),
            sender_sign_public_key: sender_device.sign_public_key.clone(),
        };

        let delivered_online = self
            .registry
            .send(&payload.to, OutboundEnvelope::new("message_received", &received))
            .await;

        if delivered_online {
            self.registry
                .send(
                    &payload.from,
                    OutboundEnvelope::new(
                        "message_delivered",
                        MessageDeliveredPayload {
                            message_id: payload.message_id.clone(),
                            status: "delivered",
                            timestamp: Utc::now().timestamp_millis(),
                        },
                    ),
                )
                .await;
            return Ok(());
        }

        let envelope = PendingEnvelope {
            message_id: payload.message_id.clone(),
            from: payload.from.clone(),
            to: payload.to.clone(),
            msg_type: payload.msg_type.clone(),
            timestamp: payload.timestamp,
            nonce: payload.nonce,
            ciphertext: payload.ciphertext,
            sig: payload.sig,
            attachment: payload.attachment,
            sender_enc_public_key: sender_device.enc_public_key,
            sender_sign_public_key: sender_device.sign_public_key,
            queued_at: Utc::now(),
        };

        whisper_db::volatile::push_pending(
            &mut conn, &payload.to, &envelope, self.pending_max_len, self.pending_ttl_secs,
        )
        .await
        .map_err(WhisperError::Redis)?;

        if let Ok(Some(recipient_device)) =
            whisper_db::repository::identities::find_device(&self.db.pool, &payload.to).await
        {
            if let Some(push_token) = recipient_device.push_token {
                let wakeup = MessageWakeup {
                    recipient_whisper_id: payload.to.clone(),
                    message_id: payload.message_id.clone(),
                };
                if let Err(e) = self.push.notify_message(&push_token, wakeup).await {
                    tracing::warn!(recipient = %payload.to, error = %e, "push notification failed");
                }
            }
        }

        Ok(())
    }

    /// `fetch_pending`, phase one — FIFO peek, no mutation. The caller
    /// (gateway) must write the returned frame to the requester's own
    /// connection and only call [`Self::confirm_pending_drained`] once that
    /// write succeeds; a write failure leaves the queue untouched for the
    /// next attempt, per the two-phase drain in spec.md §4.5.
    pub async fn fetch_pending(
        &self,
        session: &Session,
        limit: Option<u32>,
    ) -> WhisperResult<PendingPayload> {
        let limit = limit.unwrap_or(100).min(100) as isize;
        let mut conn = self.db.redis.clone();

        let envelopes = whisper_db::volatile::peek_pending(&mut conn, &session.whisper_id, limit)
            .await
            .map_err(WhisperError::Redis)?;

        let messages: Vec<MessageReceivedPayload> = envelopes
            .into_iter()
            .map(|e| MessageReceivedPayload {
                message_id: e.message_id,
                from: e.from,
                to: e.to,
                msg_type: e.msg_type,
                timestamp: e.timestamp,
                nonce: e.nonce,
                ciphertext: e.ciphertext,
                sig: e.sig,
                attachment: e.attachment,
                sender_enc_public_key: e.sender_enc_public_key,
                sender_sign_public_key: e.sender_sign_public_key,
            })
            .collect();

        let next_cursor = if messages.len() as isize == limit {
            Some(messages.len().to_string())
        } else {
            None
        };

        Ok(PendingPayload { messages, next_cursor })
    }

    /// `fetch_pending`, phase two — called by the gateway only after the
    /// `pending` frame has been successfully written to the requester's
    /// writer channel. Removes exactly the entries that were handed out.
    pub async fn confirm_pending_drained(&self, session: &Session, count: usize) -> WhisperResult<()> {
        if count == 0 {
            return Ok(());
        }
        let mut conn = self.db.redis.clone();
        whisper_db::volatile::pop_delivered_pending(&mut conn, &session.whisper_id, count as isize)
            .await
            .map_err(WhisperError::Redis)
    }

    /// `delivery_receipt` — forwarded verbatim to the original sender,
    /// subject to the same online/offline rules as `send_message`. The
    /// router never stores per-message status.
    pub async fn route_delivery_receipt(
        &self,
        session: &Session,
        request_id: Option<String>,
        payload: DeliveryReceiptPayload,
    ) -> WhisperResult<()> {
        if session.whisper_id != payload.to {
            return Err(WhisperError::Forbidden {
                message: "session is not bound to payload.to".into(),
            });
        }

        let delivered = self
            .registry
            .send(&payload.from, OutboundEnvelope::new("delivery_receipt", &payload).with_request_id(request_id))
            .await;

        if !delivered {
            tracing::debug!(from = %payload.from, "delivery_receipt dropped, sender offline");
        }
        Ok(())
    }
}
