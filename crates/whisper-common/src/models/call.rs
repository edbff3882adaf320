//! Call state — signalling relay bookkeeping only. The server never touches
//! media; it relays SDP/ICE frames between two identities and tracks enough
//! state to reject stale or duplicate signals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CALL_TTL_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallPhase {
    Ringing,
    Answered,
    Ended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallState {
    pub call_id: Uuid,
    pub initiator: String,
    pub recipient: String,
    pub state: CallPhase,
    pub is_video: bool,
    pub created_at: DateTime<Utc>,
}

impl CallState {
    pub fn new(call_id: Uuid, initiator: String, recipient: String, is_video: bool) -> Self {
        Self {
            call_id,
            initiator,
            recipient,
            state: CallPhase::Ringing,
            is_video,
            created_at: Utc::now(),
        }
    }
}
