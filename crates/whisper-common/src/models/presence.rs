//! Presence record — tracks whether an identity currently has a live gateway
//! connection, for the fast-path push-skip decision in message delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Platform;

pub const PRESENCE_TTL_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub whisper_id: String,
    pub connection_id: Uuid,
    pub last_seen: DateTime<Utc>,
    pub platform: Platform,
    /// Whether this identity allows presence to be shared with its peers.
    pub share_flag: bool,
}

impl PresenceRecord {
    pub fn new(whisper_id: String, connection_id: Uuid, platform: Platform, share_flag: bool) -> Self {
        Self {
            whisper_id,
            connection_id,
            last_seen: Utc::now(),
            platform,
            share_flag,
        }
    }
}
