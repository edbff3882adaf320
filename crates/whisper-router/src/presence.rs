//! Presence tracker — online/last-seen, with opt-in sharing, fanned out to
//! peers with whom the identity has recently exchanged messages (a pending
//! envelope between them in either direction is proof of "recent traffic").

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use whisper_common::models::presence::PresenceRecord;
use whisper_common::wire::{OutboundEnvelope, PresenceUpdatePayload};
use whisper_db::Database;

use crate::registry::ConnectionRegistry;

const PRESENCE_TTL_SECS: i64 = 5 * 60;

pub struct PresenceTracker {
    db: Arc<Database>,
    registry: ConnectionRegistry,
}

impl PresenceTracker {
    pub fn new(db: Arc<Database>, registry: ConnectionRegistry) -> Self {
        Self { db, registry }
    }

    /// Mark an identity online on authenticated connection open, and
    /// broadcast to its recently-active peers if sharing is enabled.
    pub async fn mark_online(
        &self,
        whisper_id: &str,
        connection_id: Uuid,
        platform: whisper_common::models::Platform,
        share_flag: bool,
    ) -> Result<(), redis::RedisError> {
        let record = PresenceRecord::new(whisper_id.to_string(), connection_id, platform, share_flag);
        let mut conn = self.db.redis.clone();
        whisper_db::volatile::set_presence(&mut conn, &record, PRESENCE_TTL_SECS).await?;

        if share_flag {
            self.broadcast(whisper_id, "online", None).await;
        }
        Ok(())
    }

    /// Refresh the TTL on any inbound frame from an authenticated connection.
    pub async fn touch(&self, whisper_id: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.db.redis.clone();
        if let Some(mut record) = whisper_db::volatile::get_presence(&mut conn, whisper_id).await? {
            record.last_seen = Utc::now();
            whisper_db::volatile::set_presence(&mut conn, &record, PRESENCE_TTL_SECS).await?;
        }
        Ok(())
    }

    pub async fn mark_offline(&self, whisper_id: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.db.redis.clone();
        let share_flag = whisper_db::volatile::get_presence(&mut conn, whisper_id)
            .await?
            .map(|r| r.share_flag)
            .unwrap_or(false);
        whisper_db::volatile::delete_presence(&mut conn, whisper_id).await?;

        if let Err(e) = whisper_db::repository::identities::touch_last_seen(&self.db.pool, whisper_id).await {
            tracing::warn!(%whisper_id, error = %e, "failed to record last_seen_at on disconnect");
        }

        if share_flag {
            let last_seen = Utc::now().timestamp_millis();
            self.broadcast(whisper_id, "offline", Some(last_seen)).await;
        }
        Ok(())
    }

    /// Broadcast to peers with at least one pending envelope to/from this
    /// identity, and who are themselves currently online. A conforming
    /// implementation may broaden this to "all contacts"; we take the
    /// narrower, storage-grounded reading since the server has no separate
    /// contact list — only the pending queue as a proxy for recent traffic.
    async fn broadcast(&self, whisper_id: &str, status: &'static str, last_seen: Option<i64>) {
        let mut conn = self.db.redis.clone();
        let peers = match whisper_db::volatile::peek_pending(&mut conn, whisper_id, 100).await {
            Ok(envelopes) => envelopes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read pending queue for presence fan-out");
                return;
            }
        };

        let mut notified = std::collections::HashSet::new();
        for envelope in peers {
            let peer = if envelope.from == whisper_id { envelope.to } else { envelope.from };
            if !notified.insert(peer.clone()) {
                continue;
            }
            self.registry
                .send(
                    &peer,
                    OutboundEnvelope::new(
                        "presence_update",
                        PresenceUpdatePayload {
                            whisper_id: whisper_id.to_string(),
                            status,
                            last_seen,
                        },
                    ),
                )
                .await;
        }
    }
}
