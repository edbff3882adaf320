//! Device record — the key material an identity's single live device publishes.
//!
//! Invariant: an identity has at most one live device record. Re-registration
//! replaces it wholesale and invalidates any active session (see [`crate::models::session::Session`]).

use super::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub whisper_id: String,
    /// Client-chosen device id (stable across reinstalls on the same device).
    pub device_id: Uuid,
    pub platform: Platform,
    /// X25519 public key, base64-encoded (32 bytes decoded).
    pub enc_public_key: String,
    /// Ed25519 public key, base64-encoded (32 bytes decoded).
    pub sign_public_key: String,
    /// Opaque vendor push token, if the client provided one.
    pub push_token: Option<String>,
    /// Opaque VoIP push token (iOS PushKit), if provided.
    pub voip_token: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}
