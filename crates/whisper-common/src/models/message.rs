//! Pending envelope — a stored `message_received` payload for an offline recipient.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PENDING_TTL_SECS: i64 = 72 * 60 * 60;
pub const PENDING_MAX_PER_RECIPIENT: usize = 1000;
pub const DEDUP_TTL_SECS: i64 = 24 * 60 * 60;

/// An envelope held for a recipient that was offline at accept time.
///
/// Carries the sender's published key material so a first-contact peer can
/// still verify the signature without a separate key lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEnvelope {
    pub message_id: String,
    pub from: String,
    pub to: String,
    pub msg_type: String,
    pub timestamp: i64,
    pub nonce: String,
    pub ciphertext: String,
    pub sig: String,
    pub attachment: Option<serde_json::Value>,
    pub sender_enc_public_key: String,
    pub sender_sign_public_key: String,
    pub queued_at: DateTime<Utc>,
}
