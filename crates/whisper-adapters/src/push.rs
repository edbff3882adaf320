//! Outbound vendor push notifications.
//!
//! Real FCM/APNs integration needs vendor SDKs and signing keys this
//! workspace has no access to; this adapter instead posts to a generic
//! webhook-shaped push gateway that an operator points at their actual
//! vendor integration — the same "thin HTTP client wrapper" shape as a
//! federation client, just fronting a push relay instead of a peer server.
//! No plaintext ever crosses this boundary, only wake-up metadata.

use std::time::Duration;

use serde::Serialize;

use whisper_common::ports::{CallWakeup, MessageWakeup, PushNotifier};

pub struct WebhookPushAdapter {
    client: reqwest::Client,
    webhook_url: String,
}

impl WebhookPushAdapter {
    pub fn new(webhook_url: String, request_timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()?;
        Ok(Self { client, webhook_url })
    }

    async fn post(&self, body: &impl Serialize) -> anyhow::Result<()> {
        let response = self.client.post(&self.webhook_url).json(body).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("push webhook responded with {}", response.status());
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct MessageWakeupBody<'a> {
    kind: &'static str,
    push_token: &'a str,
    recipient_whisper_id: &'a str,
    message_id: &'a str,
}

#[derive(Serialize)]
struct CallWakeupBody<'a> {
    kind: &'static str,
    push_token: &'a str,
    call_id: uuid::Uuid,
    caller_whisper_id: &'a str,
    is_video: bool,
    timestamp: i64,
}

#[async_trait::async_trait]
impl PushNotifier for WebhookPushAdapter {
    async fn notify_message(&self, push_token: &str, wakeup: MessageWakeup) -> anyhow::Result<()> {
        self.post(&MessageWakeupBody {
            kind: "message",
            push_token,
            recipient_whisper_id: &wakeup.recipient_whisper_id,
            message_id: &wakeup.message_id,
        })
        .await
    }

    async fn notify_call(&self, push_token: &str, wakeup: CallWakeup) -> anyhow::Result<()> {
        self.post(&CallWakeupBody {
            kind: "call",
            push_token,
            call_id: wakeup.call_id,
            caller_whisper_id: &wakeup.caller_whisper_id,
            is_video: wakeup.is_video,
            timestamp: wakeup.timestamp,
        })
        .await
    }
}

/// No-op adapter for environments without a configured push webhook (local
/// dev, tests). Logs at debug and always succeeds.
pub struct NoopPushAdapter;

#[async_trait::async_trait]
impl PushNotifier for NoopPushAdapter {
    async fn notify_message(&self, _push_token: &str, wakeup: MessageWakeup) -> anyhow::Result<()> {
        tracing::debug!(message_id = %wakeup.message_id, "push adapter not configured, dropping wakeup");
        Ok(())
    }

    async fn notify_call(&self, _push_token: &str, wakeup: CallWakeup) -> anyhow::Result<()> {
        tracing::debug!(call_id = %wakeup.call_id, "push adapter not configured, dropping call wakeup");
        Ok(())
    }
}
