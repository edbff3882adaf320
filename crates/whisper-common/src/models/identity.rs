//! Identity — the account layer.
//!
//! An identity is a bare WhisperID. No phone number, no email, no profile.
//! The server knows only the current device's public key material.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    Active,
    Banned,
}

/// A Whisper2 identity — durable, outlives processes.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Identity {
    /// Server-minted stable id, e.g. `WSP-ABCD-EFGH-IJKL`.
    pub whisper_id: String,
    pub status: IdentityStatus,
    /// Operator-only — never surfaced over the wire protocol.
    pub banned_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Public key lookup response for `GET /users/{whisperId}/keys`.
#[derive(Debug, Serialize)]
pub struct KeyLookupResponse {
    pub whisper_id: String,
    pub enc_public_key: String,
    pub sign_public_key: String,
    pub status: IdentityStatus,
}
