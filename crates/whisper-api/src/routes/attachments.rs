//! Attachment presigning — `POST /attachments/presign/upload` and
//! `POST /attachments/presign/download`.
//!
//! Size and content-type limits are enforced here, before the object store
//! is ever asked to mint a URL. Download authorization accepts either the
//! original uploader or the recipient named in a `send_message` payload that
//! referenced the object key — the router grants that recipient access in
//! `attachment_metadata` at send time, so the grant survives the pending
//! queue being drained.

use axum::extract::{Extension, Json, State};
use axum::{middleware, routing::post, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use whisper_common::error::{WhisperError, WhisperResult};
use whisper_common::models::rate::RateAction;
use whisper_common::validation::validate_request;
use whisper_db::repository::attachments;

use crate::middleware::AuthContext;
use crate::AppState;

/// Generous ceiling on a single attachment; the object store itself still
/// enforces its own bucket policy.
const ATTACHMENT_MAX_SIZE_BYTES: u64 = 100 * 1024 * 1024;

const ALLOWED_CONTENT_TYPE_PREFIXES: &[&str] = &["image/", "video/", "audio/", "application/octet-stream"];

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/attachments/presign/upload", post(presign_upload))
        .route("/attachments/presign/download", post(presign_download))
        .route_layer(middleware::from_fn_with_state(state, crate::middleware::auth_middleware))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PresignUploadRequest {
    #[validate(length(min = 1, max = 255))]
    content_type: String,
    #[validate(range(min = 1))]
    size: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PresignUploadResponse {
    object_key: String,
    upload_url: String,
    headers: std::collections::HashMap<String, String>,
    expires_at_ms: i64,
}

async fn presign_upload(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<PresignUploadRequest>,
) -> WhisperResult<Json<PresignUploadResponse>> {
    validate_request(&body)?;
    state.rate.check(&auth.session.whisper_id, RateAction::PresignUpload).await?;

    if body.size > ATTACHMENT_MAX_SIZE_BYTES {
        return Err(WhisperError::BadRequest {
            message: format!("attachment exceeds the {ATTACHMENT_MAX_SIZE_BYTES}-byte limit"),
        });
    }
    if !ALLOWED_CONTENT_TYPE_PREFIXES.iter().any(|p| body.content_type.starts_with(p)) {
        return Err(WhisperError::BadRequest { message: format!("'{}' is not an accepted content type", body.content_type) });
    }

    let object_key = whisper_adapters::S3AttachmentAdapter::object_key(&auth.session.whisper_id);

    let presigned = state
        .attachments
        .presign_upload(&object_key, &body.content_type, body.size)
        .await
        .map_err(WhisperError::Internal)?;

    attachments::record_upload(&state.db.pool, &object_key, &auth.session.whisper_id, &body.content_type, body.size as i64)
        .await?;

    Ok(Json(PresignUploadResponse {
        object_key: presigned.object_key,
        upload_url: presigned.upload_url,
        headers: presigned.headers,
        expires_at_ms: presigned.expires_at.timestamp_millis(),
    }))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PresignDownloadRequest {
    #[validate(length(min = 1, max = 512))]
    object_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PresignDownloadResponse {
    download_url: String,
    expires_at_ms: i64,
}

async fn presign_download(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<PresignDownloadRequest>,
) -> WhisperResult<Json<PresignDownloadResponse>> {
    validate_request(&body)?;

    let metadata = attachments::find_by_key(&state.db.pool, &body.object_key)
        .await?
        .ok_or_else(|| WhisperError::NotFound { resource: "attachment".into() })?;

    let is_owner = metadata.owner == auth.session.whisper_id;
    let is_granted_recipient = metadata.recipient.as_deref() == Some(auth.session.whisper_id.as_str());
    if !is_owner && !is_granted_recipient {
        return Err(WhisperError::Forbidden {
            message: "not authorized to download this attachment".into(),
        });
    }

    let presigned = state
        .attachments
        .presign_download(&body.object_key)
        .await
        .map_err(WhisperError::Internal)?;

    Ok(Json(PresignDownloadResponse {
        download_url: presigned.download_url,
        expires_at_ms: presigned.expires_at.timestamp_millis(),
    }))
}
