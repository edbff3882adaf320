//! Rate limiter — sliding-window counters per identity (authenticated
//! actions) or per remote address (`register_begin`, pre-auth).

use std::sync::Arc;

use whisper_common::error::{WhisperError, WhisperResult};
use whisper_common::models::rate::RateAction;
use whisper_db::Database;

const WINDOW_SECS: i64 = 60;

pub struct RateLimiter {
    db: Arc<Database>,
}

impl RateLimiter {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Check and increment the counter for `(subject, action)`. Exceeding
    /// the limit yields `RATE_LIMITED` with a `retryAfter`; the connection
    /// is never closed for this.
    pub async fn check(&self, subject: &str, action: RateAction) -> WhisperResult<()> {
        let mut conn = self.db.redis.clone();
        let counter = whisper_db::volatile::check_rate_limit(&mut conn, subject, action, WINDOW_SECS)
            .await
            .map_err(WhisperError::Redis)?;

        if counter.is_exceeded() {
            return Err(WhisperError::RateLimited { retry_after_secs: WINDOW_SECS as u64 });
        }
        Ok(())
    }
}
