//! Encrypted contact backup blob — one opaque slot per identity, server-side
//! content-blind storage. The server never sees contact names or WhisperIDs
//! inside the blob, only its ciphertext and size.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const BACKUP_MAX_SIZE_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContactBackupBlob {
    pub whisper_id: String,
    /// 24-byte nonce, base64-encoded.
    pub nonce: String,
    /// Opaque ciphertext, base64-encoded.
    pub ciphertext: String,
    pub size_bytes: i64,
    pub updated_at: DateTime<Utc>,
}
