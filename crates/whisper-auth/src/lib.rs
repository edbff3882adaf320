//! # whisper-auth
//!
//! The registration state machine: `Unauthenticated -> Challenged ->
//! Authenticated`. Owns challenge issuance/consumption and session
//! minting/refresh/teardown; knows nothing about sockets or frame parsing —
//! that's the gateway's job.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use whisper_common::crypto;
use whisper_common::error::{WhisperError, WhisperResult};
use whisper_common::ids;
use whisper_common::models::challenge::Challenge;
use whisper_common::models::device::Device;
use whisper_common::models::session::Session;
use whisper_common::models::Platform;
use whisper_db::Database;

/// Max attempts to mint a fresh WhisperID before giving up on a collision
/// streak improbable enough to indicate something else is wrong.
const WHISPER_ID_MINT_ATTEMPTS: u32 = 8;

#[derive(Clone)]
pub struct AuthEngine {
    db: Arc<Database>,
    challenge_ttl_secs: i64,
    session_ttl_secs: i64,
}

/// Result of a successful `register_proof`. `previous_session_token` is
/// `Some` when this registration kicked an existing session — the caller
/// (gateway) is responsible for sending that connection a `force_logout`.
pub struct RegistrationOutcome {
    pub session: Session,
    pub previous_session_token: Option<String>,
}

impl AuthEngine {
    pub fn new(db: Arc<Database>, challenge_ttl_secs: i64, session_ttl_secs: i64) -> Self {
        Self { db, challenge_ttl_secs, session_ttl_secs }
    }

    /// `register_begin` — issue a fresh challenge bound to the device.
    pub async fn begin_registration(
        &self,
        device_id: Uuid,
        platform: Platform,
        whisper_id: Option<String>,
    ) -> WhisperResult<Challenge> {
        if let Some(ref id) = whisper_id {
            whisper_common::validation::validate_whisper_id(id)?;
        }

        let challenge = Challenge::new(device_id, platform, whisper_id);
        let mut conn = self.db.redis.clone();
        whisper_db::volatile::store_challenge(&mut conn, &challenge, self.challenge_ttl_secs)
            .await
            .map_err(WhisperError::Redis)?;
        Ok(challenge)
    }

    /// `register_proof` — consume the challenge, verify the signature, mint
    /// or replace the device record, and swap the active-session pointer.
    #[allow(clippy::too_many_arguments)]
    pub async fn complete_registration(
        &self,
        challenge_id: Uuid,
        device_id: Uuid,
        platform: Platform,
        whisper_id_claim: Option<String>,
        enc_public_key: &str,
        sign_public_key: &str,
        signature: &str,
        push_token: Option<String>,
        voip_token: Option<String>,
        remote_addr: Option<String>,
    ) -> WhisperResult<RegistrationOutcome> {
        let mut conn = self.db.redis.clone();

        let challenge = whisper_db::volatile::consume_challenge(&mut conn, &challenge_id.to_string())
            .await
            .map_err(WhisperError::Redis)?
            .ok_or_else(|| WhisperError::AuthFailed { message: "challenge expired or unknown".into() })?;

        if challenge.is_expired() {
            return Err(WhisperError::AuthFailed { message: "challenge expired or unknown".into() });
        }
        if challenge.device_id != device_id || challenge.platform != platform {
            return Err(WhisperError::AuthFailed { message: "challenge does not match device".into() });
        }
        if challenge.whisper_id != whisper_id_claim {
            return Err(WhisperError::AuthFailed { message: "challenge does not match whisperId claim".into() });
        }

        whisper_common::validation::validate_b64_len(
            "encPublicKey", enc_public_key, crypto::X25519_KEY_LEN,
        )?;
        whisper_common::validation::validate_b64_len(
            "signPublicKey", sign_public_key, crypto::ED25519_KEY_LEN,
        )?;

        let canonical = crypto::canonical_register_proof_bytes(
            &challenge_id.to_string(),
            &device_id.to_string(),
            &platform.to_string(),
            enc_public_key,
            sign_public_key,
        );
        crypto::verify_canonical_signature(sign_public_key, signature, &canonical)
            .map_err(|_| WhisperError::AuthFailed { message: "signature verification failed".into() })?;

        let whisper_id = match whisper_id_claim {
            Some(id) => {
                let identity = whisper_db::repository::identities::find_identity(&self.db.pool, &id)
                    .await
                    .map_err(WhisperError::Database)?
                    .ok_or_else(|| WhisperError::NotFound { resource: "identity".into() })?;
                if whisper_db::repository::identities::is_banned(&identity) {
                    return Err(WhisperError::UserBanned);
                }

                let device = Device {
                    whisper_id: id.clone(),
                    device_id,
                    platform,
                    enc_public_key: enc_public_key.to_string(),
                    sign_public_key: sign_public_key.to_string(),
                    push_token,
                    voip_token,
                    registered_at: Utc::now(),
                    last_seen_at: None,
                };
                whisper_db::repository::identities::replace_device(&self.db.pool, &id, &device)
                    .await
                    .map_err(WhisperError::Database)?;
                id
            }
            None => self.mint_identity_with_device(device_id, platform, enc_public_key, sign_public_key, push_token, voip_token).await?,
        };

        let session = Session::new(
            ids::generate_session_token(),
            whisper_id,
            device_id,
            platform,
            remote_addr,
        );

        let previous_session_token = whisper_db::volatile::mint_session(
            &mut conn, &session, self.session_ttl_secs,
        )
        .await
        .map_err(WhisperError::Redis)?;

        Ok(RegistrationOutcome { session, previous_session_token })
    }

    async fn mint_identity_with_device(
        &self,
        device_id: Uuid,
        platform: Platform,
        enc_public_key: &str,
        sign_public_key: &str,
        push_token: Option<String>,
        voip_token: Option<String>,
    ) -> WhisperResult<String> {
        for _ in 0..WHISPER_ID_MINT_ATTEMPTS {
            let candidate = ids::generate_whisper_id_candidate();
            if whisper_db::repository::identities::find_identity(&self.db.pool, &candidate)
                .await
                .map_err(WhisperError::Database)?
                .is_some()
            {
                continue;
            }

            let device = Device {
                whisper_id: candidate.clone(),
                device_id,
                platform,
                enc_public_key: enc_public_key.to_string(),
                sign_public_key: sign_public_key.to_string(),
                push_token,
                voip_token,
                registered_at: Utc::now(),
                last_seen_at: None,
            };

            whisper_db::repository::identities::create_identity_with_device(
                &self.db.pool, &candidate, &device,
            )
            .await
            .map_err(WhisperError::Database)?;

            return Ok(candidate);
        }

        Err(WhisperError::Internal(anyhow::anyhow!(
            "failed to mint a unique WhisperID after {WHISPER_ID_MINT_ATTEMPTS} attempts"
        )))
    }

    /// Validate a bearer session token, returning the live session.
    pub async fn authenticate(&self, token: &str) -> WhisperResult<Session> {
        let mut conn = self.db.redis.clone();
        let session = whisper_db::volatile::get_session(&mut conn, token)
            .await
            .map_err(WhisperError::Redis)?
            .ok_or_else(|| WhisperError::NotRegistered { message: "no live session for this token".into() })?;

        if session.is_expired() {
            return Err(WhisperError::NotRegistered { message: "session expired".into() });
        }
        Ok(session)
    }

    /// `session_refresh` — extend expiry by the configured TTL without
    /// re-challenging, provided the token is still live.
    pub async fn refresh_session(&self, token: &str) -> WhisperResult<Session> {
        let mut session = self.authenticate(token).await?;
        session.expires_at = Utc::now() + chrono::Duration::seconds(self.session_ttl_secs);

        let mut conn = self.db.redis.clone();
        whisper_db::volatile::refresh_session(&mut conn, &session, self.session_ttl_secs)
            .await
            .map_err(WhisperError::Redis)?;
        Ok(session)
    }

    /// `logout` — revoke a session atomically.
    pub async fn logout(&self, token: &str) -> WhisperResult<()> {
        let session = self.authenticate(token).await?;
        let mut conn = self.db.redis.clone();
        whisper_db::volatile::revoke_session(&mut conn, token, &session.whisper_id)
            .await
            .map_err(WhisperError::Redis)
    }
}
