//! Volatile store — Redis-backed TTL state: sessions, challenges, presence,
//! pending queues, call state, rate counters.
//!
//! The shared-resource policy in the spec requires session-pointer swap,
//! challenge consume, and message-id dedup reservation to each be a single
//! atomic operation — no two-step check-then-act. We get that from Redis's
//! own atomicity: `SET ... NX` and `SET ... GET` are single commands, and
//! `GETDEL` is atomic get-and-delete since Redis 6.2.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use whisper_common::models::call::CallState;
use whisper_common::models::challenge::Challenge;
use whisper_common::models::message::PendingEnvelope;
use whisper_common::models::presence::PresenceRecord;
use whisper_common::models::rate::{RateAction, RateCounter};
use whisper_common::models::session::Session;

fn session_key(token: &str) -> String {
    format!("session:{token}")
}

fn session_ptr_key(whisper_id: &str) -> String {
    format!("session_ptr:{whisper_id}")
}

fn challenge_key(challenge_id: &str) -> String {
    format!("challenge:{challenge_id}")
}

fn dedup_key(recipient: &str, message_id: &str) -> String {
    format!("dedup:{recipient}:{message_id}")
}

fn pending_key(recipient: &str) -> String {
    format!("pending:{recipient}")
}

fn presence_key(whisper_id: &str) -> String {
    format!("presence:{whisper_id}")
}

fn call_key(call_id: &str) -> String {
    format!("call:{call_id}")
}

fn rate_key(subject: &str, action: RateAction) -> String {
    format!("rate:{}:{}", subject, action.redis_key_part())
}

// ===== sessions =====

/// Store the session blob and atomically point the identity's active-session
/// pointer at its token, returning the previously active token (if any) so
/// the caller can force-logout its owning connection.
pub async fn mint_session(
    conn: &mut ConnectionManager,
    session: &Session,
    ttl_secs: i64,
) -> Result<Option<String>, redis::RedisError> {
    let blob = serde_json::to_string(session).expect("Session always serializes");
    conn.set_ex::<_, _, ()>(session_key(&session.token), blob, ttl_secs as u64).await?;

    let previous: Option<String> = redis::cmd("SET")
        .arg(session_ptr_key(&session.whisper_id))
        .arg(&session.token)
        .arg("EX")
        .arg(ttl_secs)
        .arg("GET")
        .query_async(conn)
        .await?;

    Ok(previous)
}

pub async fn get_session(
    conn: &mut ConnectionManager,
    token: &str,
) -> Result<Option<Session>, redis::RedisError> {
    let raw: Option<String> = conn.get(session_key(token)).await?;
    Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
}

pub async fn refresh_session(
    conn: &mut ConnectionManager,
    session: &Session,
    ttl_secs: i64,
) -> Result<(), redis::RedisError> {
    let blob = serde_json::to_string(session).expect("Session always serializes");
    conn.set_ex::<_, _, ()>(session_key(&session.token), blob, ttl_secs as u64).await?;
    conn.expire::<_, ()>(session_ptr_key(&session.whisper_id), ttl_secs).await
}

pub async fn revoke_session(
    conn: &mut ConnectionManager,
    token: &str,
    whisper_id: &str,
) -> Result<(), redis::RedisError> {
    conn.del::<_, ()>(session_key(token)).await?;
    conn.del::<_, ()>(session_ptr_key(whisper_id)).await
}

/// Revoke a single session token without touching the identity's
/// active-session pointer. Used to invalidate the token a fresh
/// `register_proof` just displaced — the pointer already points at the new
/// token by the time this runs, so [`revoke_session`]'s pointer deletion
/// would wrongly clobber it.
pub async fn revoke_session_token(
    conn: &mut ConnectionManager,
    token: &str,
) -> Result<(), redis::RedisError> {
    conn.del(session_key(token)).await
}

// ===== challenges =====

pub async fn store_challenge(
    conn: &mut ConnectionManager,
    challenge: &Challenge,
    ttl_secs: i64,
) -> Result<(), redis::RedisError> {
    let blob = serde_json::to_string(challenge).expect("Challenge always serializes");
    conn.set_ex(challenge_key(&challenge.challenge_id.to_string()), blob, ttl_secs as u64).await
}

/// Atomically fetch and delete a challenge. Single-use: a second call for
/// the same id always returns `None`.
pub async fn consume_challenge(
    conn: &mut ConnectionManager,
    challenge_id: &str,
) -> Result<Option<Challenge>, redis::RedisError> {
    let raw: Option<String> = redis::cmd("GETDEL")
        .arg(challenge_key(challenge_id))
        .query_async(conn)
        .await?;
    Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
}

// ===== message dedup =====

/// Reserve `(recipient, messageId)` for `ttl_secs`. Returns `true` if this
/// call performed the reservation (first accept), `false` if it already
/// existed (duplicate accept).
pub async fn reserve_message_dedup(
    conn: &mut ConnectionManager,
    recipient: &str,
    message_id: &str,
    ttl_secs: i64,
) -> Result<bool, redis::RedisError> {
    let reserved: bool = redis::cmd("SET")
        .arg(dedup_key(recipient, message_id))
        .arg(1)
        .arg("NX")
        .arg("EX")
        .arg(ttl_secs)
        .query_async::<Option<String>>(conn)
        .await?
        .is_some();
    Ok(reserved)
}

// ===== pending queue (FIFO per recipient) =====

/// Append an envelope to the recipient's pending queue, trimming to
/// `max_len` from the head (oldest dropped first) and refreshing the TTL.
pub async fn push_pending(
    conn: &mut ConnectionManager,
    recipient: &str,
    envelope: &PendingEnvelope,
    max_len: usize,
    ttl_secs: i64,
) -> Result<(), redis::RedisError> {
    let blob = serde_json::to_string(envelope).expect("PendingEnvelope always serializes");
    let key = pending_key(recipient);
    conn.rpush::<_, _, ()>(&key, blob).await?;
    let len: isize = conn.llen(&key).await?;
    if len > max_len as isize {
        conn.ltrim::<_, ()>(&key, len - max_len as isize, -1).await?;
    }
    conn.expire::<_, ()>(&key, ttl_secs).await
}

/// Read up to `limit` pending envelopes in FIFO order without removing them.
pub async fn peek_pending(
    conn: &mut ConnectionManager,
    recipient: &str,
    limit: isize,
) -> Result<Vec<PendingEnvelope>, redis::RedisError> {
    let raw: Vec<String> = conn.lrange(pending_key(recipient), 0, limit - 1).await?;
    Ok(raw.iter().filter_map(|s| serde_json::from_str(s).ok()).collect())
}

/// Remove the first `count` entries — called only after they've been
/// written to the requester's connection (two-phase drain).
pub async fn pop_delivered_pending(
    conn: &mut ConnectionManager,
    recipient: &str,
    count: isize,
) -> Result<(), redis::RedisError> {
    conn.ltrim(pending_key(recipient), count, -1).await
}

pub async fn pending_len(
    conn: &mut ConnectionManager,
    recipient: &str,
) -> Result<isize, redis::RedisError> {
    conn.llen(pending_key(recipient)).await
}

// ===== presence =====

pub async fn set_presence(
    conn: &mut ConnectionManager,
    presence: &PresenceRecord,
    ttl_secs: i64,
) -> Result<(), redis::RedisError> {
    let blob = serde_json::to_string(presence).expect("PresenceRecord always serializes");
    conn.set_ex(presence_key(&presence.whisper_id), blob, ttl_secs as u64).await
}

pub async fn get_presence(
    conn: &mut ConnectionManager,
    whisper_id: &str,
) -> Result<Option<PresenceRecord>, redis::RedisError> {
    let raw: Option<String> = conn.get(presence_key(whisper_id)).await?;
    Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
}

pub async fn delete_presence(
    conn: &mut ConnectionManager,
    whisper_id: &str,
) -> Result<(), redis::RedisError> {
    conn.del(presence_key(whisper_id)).await
}

// ===== call state =====

/// Reserve a call id, failing (returning `false`) if already present — this
/// is what makes duplicate `call_initiate` for the same `callId` idempotent.
pub async fn reserve_call(
    conn: &mut ConnectionManager,
    state: &CallState,
    ttl_secs: i64,
) -> Result<bool, redis::RedisError> {
    let blob = serde_json::to_string(state).expect("CallState always serializes");
    let reserved: bool = redis::cmd("SET")
        .arg(call_key(&state.call_id.to_string()))
        .arg(blob)
        .arg("NX")
        .arg("EX")
        .arg(ttl_secs)
        .query_async::<Option<String>>(conn)
        .await?
        .is_some();
    Ok(reserved)
}

pub async fn get_call(
    conn: &mut ConnectionManager,
    call_id: &str,
) -> Result<Option<CallState>, redis::RedisError> {
    let raw: Option<String> = conn.get(call_key(call_id)).await?;
    Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
}

pub async fn update_call(
    conn: &mut ConnectionManager,
    state: &CallState,
    ttl_secs: i64,
) -> Result<(), redis::RedisError> {
    let blob = serde_json::to_string(state).expect("CallState always serializes");
    conn.set_ex(call_key(&state.call_id.to_string()), blob, ttl_secs as u64).await
}

pub async fn delete_call(
    conn: &mut ConnectionManager,
    call_id: &str,
) -> Result<(), redis::RedisError> {
    conn.del(call_key(call_id)).await
}

// ===== rate limiting =====

/// Increment the sliding-window counter for `(subject, action)`, setting its
/// TTL on first increment only, and report whether the limit is exceeded.
pub async fn check_rate_limit(
    conn: &mut ConnectionManager,
    subject: &str,
    action: RateAction,
    window_secs: i64,
) -> Result<RateCounter, redis::RedisError> {
    let key = rate_key(subject, action);
    let count: i64 = conn.incr(&key, 1).await?;
    if count == 1 {
        conn.expire::<_, ()>(&key, window_secs).await?;
    }
    Ok(RateCounter { count: count as u32, limit: action.limit() })
}
