//! Wire protocol — the JSON envelope and per-type payloads carried over the
//! gateway websocket.
//!
//! Every frame is `{type, requestId?, payload}`. We don't use serde's
//! internally-tagged enum representation (`#[serde(tag = "type", content =
//! "payload")]`) because it can't express the sibling `requestId` field; the
//! schema gate instead deserializes into [`InboundEnvelope`], matches on
//! `frame_type`, and deserializes `payload` into the matching closed-set
//! struct — one validator per known type, exactly as the schema gate
//! requires.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::error::WhisperError;
use crate::models::Platform;

pub const PROTOCOL_VERSION: u8 = 1;
pub const CRYPTO_VERSION: u8 = 1;

/// Frame types that do not require an authenticated connection.
pub const PUBLIC_FRAME_TYPES: &[&str] = &["register_begin", "register_proof", "ping", "pong"];

/// All frame types the gate recognises, inbound or outbound. Anything else
/// fails with `INVALID_PAYLOAD` / unknown type before a validator even runs.
pub const KNOWN_FRAME_TYPES: &[&str] = &[
    "register_begin",
    "register_challenge",
    "register_proof",
    "register_ack",
    "session_refresh",
    "logout",
    "ping",
    "pong",
    "send_message",
    "message_accepted",
    "message_received",
    "message_delivered",
    "fetch_pending",
    "pending",
    "delivery_receipt",
    "typing",
    "presence_update",
    "force_logout",
    "call_initiate",
    "call_incoming",
    "call_answer",
    "call_ice_candidate",
    "call_end",
    "call_ringing",
    "get_turn_credentials",
    "turn_credentials",
    "error",
];

#[derive(Debug, Deserialize)]
pub struct InboundEnvelope {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(rename = "requestId")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Serialize)]
pub struct OutboundEnvelope {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub payload: Value,
}

impl OutboundEnvelope {
    pub fn new(frame_type: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            frame_type: frame_type.into(),
            request_id: None,
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn error(request_id: Option<String>, err: &WhisperError) -> Self {
        Self::new("error", err.to_error_frame()).with_request_id(request_id)
    }
}

/// Parse an inbound JSON text frame into the envelope shape, or a generic
/// `INVALID_PAYLOAD` bad-request error (the envelope itself is malformed, so
/// no `requestId` can be recovered to echo back).
pub fn parse_envelope(raw: &str) -> Result<InboundEnvelope, WhisperError> {
    serde_json::from_str(raw).map_err(|e| WhisperError::BadRequest {
        message: format!("malformed frame envelope: {e}"),
    })
}

/// Deserialize `payload` into `T`, wrapping serde's error as `BadRequest` —
/// the gate's `INVALID_PAYLOAD` path.
pub fn parse_payload<T: for<'de> Deserialize<'de>>(payload: &Value) -> Result<T, WhisperError> {
    serde_json::from_value(payload.clone()).map_err(|e| WhisperError::BadRequest {
        message: format!("invalid payload: {e}"),
    })
}

// ===== register_begin / register_challenge =====

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterBeginPayload {
    pub protocol_version: u8,
    pub crypto_version: u8,
    pub device_id: uuid::Uuid,
    pub platform: Platform,
    /// Present for recovery flows (re-registering an existing WhisperID).
    pub whisper_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterChallengePayload {
    pub challenge_id: uuid::Uuid,
    /// Base64 of the 32 random bytes.
    pub challenge: String,
    pub expires_at: i64,
}

// ===== register_proof / register_ack =====

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterProofPayload {
    pub challenge_id: uuid::Uuid,
    pub device_id: uuid::Uuid,
    pub platform: Platform,
    pub whisper_id: Option<String>,
    pub enc_public_key: String,
    pub sign_public_key: String,
    pub signature: String,
    pub push_token: Option<String>,
    pub voip_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAckPayload {
    pub success: bool,
    pub whisper_id: String,
    pub session_token: String,
    pub session_expires_at: i64,
    pub server_time: i64,
}

// ===== session_refresh / logout =====

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SessionRefreshPayload {}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LogoutPayload {}

// ===== heartbeat =====

#[derive(Debug, Deserialize, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PingPayload {
    pub timestamp: i64,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PongPayload {
    pub timestamp: i64,
}

// ===== send_message / delivery =====

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendMessagePayload {
    #[validate(length(min = 1, max = 128))]
    pub message_id: String,
    pub from: String,
    pub to: String,
    #[validate(length(min = 1, max = 32))]
    pub msg_type: String,
    pub timestamp: i64,
    pub nonce: String,
    pub ciphertext: String,
    pub sig: String,
    pub attachment: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAcceptedPayload {
    pub message_id: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReceivedPayload {
    pub message_id: String,
    pub from: String,
    pub to: String,
    pub msg_type: String,
    pub timestamp: i64,
    pub nonce: String,
    pub ciphertext: String,
    pub sig: String,
    pub attachment: Option<Value>,
    pub sender_enc_public_key: String,
    pub sender_sign_public_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeliveredPayload {
    pub message_id: String,
    pub status: &'static str,
    pub timestamp: i64,
}

// ===== fetch_pending / pending =====

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct FetchPendingPayload {
    pub cursor: Option<String>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPayload {
    pub messages: Vec<MessageReceivedPayload>,
    pub next_cursor: Option<String>,
}

// ===== delivery_receipt =====

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeliveryReceiptPayload {
    pub message_id: String,
    pub from: String,
    pub to: String,
    #[validate(length(min = 1, max = 16))]
    pub status: String,
    pub timestamp: i64,
}

// ===== typing / presence =====

#[derive(Debug, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TypingPayload {
    pub to: String,
    pub is_typing: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdatePayload {
    pub whisper_id: String,
    pub status: &'static str,
    pub last_seen: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceLogoutPayload {
    pub reason: &'static str,
}

// ===== call signalling =====
//
// call_initiate / call_answer / call_ice_candidate / call_end / call_ringing
// share this shape and are routed identically to send_message: signature
// verified over the same canonical form, replay-windowed, delivered online
// or queued. call_initiate is delivered to the recipient as call_incoming.

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CallSignalPayload {
    pub call_id: uuid::Uuid,
    pub from: String,
    pub to: String,
    pub timestamp: i64,
    pub nonce: String,
    pub ciphertext: String,
    pub sig: String,
    /// Only meaningful on `call_initiate`; ignored elsewhere.
    pub is_video: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallIncomingPayload {
    pub call_id: uuid::Uuid,
    pub from: String,
    pub to: String,
    pub timestamp: i64,
    pub nonce: String,
    pub ciphertext: String,
    pub sig: String,
    pub is_video: bool,
}

// ===== TURN credentials =====

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GetTurnCredentialsPayload {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnCredentialsPayload {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
    pub ttl: u64,
}
