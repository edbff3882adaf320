//! Contact backup blob — `PUT`/`GET`/`DELETE /backup/contacts`.
//!
//! One opaque slot per identity, overwrite semantics. The server never
//! parses the ciphertext; it only range-checks `nonce`/total size.

use axum::extract::{Extension, State};
use axum::{middleware, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use whisper_common::config;
use whisper_common::crypto::{self, NONCE_LEN};
use whisper_common::error::{WhisperError, WhisperResult};
use whisper_common::models::backup::BACKUP_MAX_SIZE_BYTES;
use whisper_common::validation::validate_request;
use whisper_db::repository::backups;

use crate::middleware::AuthContext;
use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/backup/contacts", get(get_backup).put(put_backup).delete(delete_backup))
        .route_layer(middleware::from_fn_with_state(state, crate::middleware::auth_middleware))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PutBackupRequest {
    #[validate(length(min = 1, max = 64))]
    nonce: String,
    #[validate(length(min = 1))]
    ciphertext: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PutBackupResponse {
    success: bool,
    created: bool,
    size_bytes: i64,
    updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BackupResponse {
    whisper_id: String,
    nonce: String,
    ciphertext: String,
    size_bytes: i64,
    updated_at: chrono::DateTime<chrono::Utc>,
}

async fn put_backup(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<PutBackupRequest>,
) -> WhisperResult<Json<PutBackupResponse>> {
    validate_request(&body)?;
    crypto::decode_fixed_len(&body.nonce, NONCE_LEN)
        .map_err(|_| WhisperError::BadRequest { message: "nonce must be base64 of 24 bytes".into() })?;
    crypto::decode_strict_base64(&body.ciphertext)
        .map_err(|_| WhisperError::BadRequest { message: "ciphertext is not valid strict base64".into() })?;

    let size_bytes = (body.nonce.len() + body.ciphertext.len()) as i64;
    if size_bytes as usize > BACKUP_MAX_SIZE_BYTES {
        return Err(WhisperError::BadRequest {
            message: format!("backup exceeds the {BACKUP_MAX_SIZE_BYTES}-byte limit"),
        });
    }

    let created = backups::put_backup(&state.db.pool, &auth.session.whisper_id, &body.nonce, &body.ciphertext, size_bytes)
        .await?;

    let stored = backups::get_backup(&state.db.pool, &auth.session.whisper_id)
        .await?
        .ok_or_else(|| WhisperError::Internal(anyhow::anyhow!("backup vanished immediately after write")))?;

    Ok(Json(PutBackupResponse {
        success: true,
        created,
        size_bytes: stored.size_bytes,
        updated_at: stored.updated_at,
    }))
}

async fn get_backup(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
) -> WhisperResult<Json<BackupResponse>> {
    let blob = backups::get_backup(&state.db.pool, &auth.session.whisper_id)
        .await?
        .ok_or_else(|| WhisperError::NotFound { resource: "contact backup".into() })?;

    Ok(Json(BackupResponse {
        whisper_id: blob.whisper_id,
        nonce: blob.nonce,
        ciphertext: blob.ciphertext,
        size_bytes: blob.size_bytes,
        updated_at: blob.updated_at,
    }))
}

async fn delete_backup(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
) -> WhisperResult<()> {
    let deleted = backups::delete_backup(&state.db.pool, &auth.session.whisper_id).await?;
    if !deleted {
        return Err(WhisperError::NotFound { resource: "contact backup".into() });
    }
    Ok(())
}

/// Body-size cap for `PUT /backup/contacts`, taken from configuration
/// rather than [`BACKUP_MAX_SIZE_BYTES`] directly so an operator can budget
/// for JSON/base64 overhead around the raw blob.
pub fn max_request_bytes() -> usize {
    config::get().limits.max_backup_frame_bytes
}
