//! Narrow interfaces injected at process startup.
//!
//! The source this spec was distilled from wired object-oriented dependency
//! containers; the idiomatic Rust equivalent is a set of small traits passed
//! in as `Arc<dyn Trait>` — no global singletons except the configured
//! logger.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Outbound vendor push notifications. Carries no plaintext — only enough
/// for the OS to wake the app.
#[async_trait::async_trait]
pub trait PushNotifier: Send + Sync {
    async fn notify_message(&self, push_token: &str, wakeup: MessageWakeup) -> anyhow::Result<()>;
    async fn notify_call(&self, push_token: &str, wakeup: CallWakeup) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct MessageWakeup {
    pub recipient_whisper_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone)]
pub struct CallWakeup {
    pub call_id: Uuid,
    pub caller_whisper_id: String,
    pub is_video: bool,
    pub timestamp: i64,
}

/// Presigned-URL issuance against an S3-compatible attachment store.
#[async_trait::async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn presign_upload(
        &self,
        object_key: &str,
        content_type: &str,
        size_bytes: u64,
    ) -> anyhow::Result<PresignedUpload>;

    async fn presign_download(&self, object_key: &str) -> anyhow::Result<PresignedDownload>;
}

#[derive(Debug, Clone)]
pub struct PresignedUpload {
    pub object_key: String,
    pub upload_url: String,
    pub headers: HashMap<String, String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PresignedDownload {
    pub download_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Short-TTL TURN relay credential minting.
#[async_trait::async_trait]
pub trait TurnCredentialIssuer: Send + Sync {
    async fn issue(&self, whisper_id: &str) -> anyhow::Result<TurnCredentials>;
}

#[derive(Debug, Clone)]
pub struct TurnCredentials {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
    pub ttl_secs: u64,
}
