//! Rate limiting — a sliding 60s counter keyed by (subject, action).
//!
//! Subject is a WhisperID once authenticated, or a remote address for the
//! pre-auth `register_begin` path.

use serde::{Deserialize, Serialize};

pub const RATE_WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateAction {
    RegisterBegin,
    SendMessage,
    FetchPending,
    PresignUpload,
}

impl RateAction {
    /// Max operations allowed per [`RATE_WINDOW_SECS`] window.
    pub fn limit(self) -> u32 {
        match self {
            RateAction::RegisterBegin => 5,
            RateAction::SendMessage => 60,
            RateAction::FetchPending => 30,
            RateAction::PresignUpload => 10,
        }
    }

    pub fn redis_key_part(self) -> &'static str {
        match self {
            RateAction::RegisterBegin => "register_begin",
            RateAction::SendMessage => "send_message",
            RateAction::FetchPending => "fetch_pending",
            RateAction::PresignUpload => "presign_upload",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateCounter {
    pub count: u32,
    pub limit: u32,
}

impl RateCounter {
    pub fn is_exceeded(&self) -> bool {
        self.count > self.limit
    }
}
