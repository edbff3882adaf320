//! Session — an opaque bearer token binding an identity to its single live device.
//!
//! Lives in the volatile store, not the durable one: a session is safe to
//! lose on restart (the client re-registers), and the volatile store's atomic
//! compare-and-set is what makes single-active-device enforcement possible.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Platform;

pub const SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub whisper_id: String,
    pub device_id: Uuid,
    pub platform: Platform,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Best-effort, for rate limiting and abuse investigation only.
    pub remote_addr: Option<String>,
}

impl Session {
    pub fn new(
        token: String,
        whisper_id: String,
        device_id: Uuid,
        platform: Platform,
        remote_addr: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            token,
            whisper_id,
            device_id,
            platform,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(SESSION_TTL_SECS),
            remote_addr,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}
