//! Registration challenge — 32 random bytes, single-use, 60s TTL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Platform;

pub const CHALLENGE_TTL_SECS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: Uuid,
    pub bytes: [u8; 32],
    pub device_id: Uuid,
    pub platform: Platform,
    /// Present only for recovery flows (re-registering an existing WhisperID).
    pub whisper_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Challenge {
    pub fn new(device_id: Uuid, platform: Platform, whisper_id: Option<String>) -> Self {
        Self {
            challenge_id: crate::ids::generate_challenge_id(),
            bytes: crate::ids::generate_challenge_bytes(),
            device_id,
            platform,
            whisper_id,
            expires_at: Utc::now() + chrono::Duration::seconds(CHALLENGE_TTL_SECS),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}
