//! Public key lookup — `GET /users/{whisperId}/keys`.
//!
//! Key bundles are public by design (that's how a correspondent verifies
//! who they're encrypting to); this route needs an authenticated caller but
//! no ownership check, same as the teacher's key-bundle lookup.

use axum::extract::{Path, State};
use axum::{middleware, routing::get, Json, Router};
use std::sync::Arc;

use whisper_common::error::{WhisperError, WhisperResult};
use whisper_common::models::identity::KeyLookupResponse;
use whisper_common::validation::validate_whisper_id;
use whisper_db::repository::identities;

use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/{whisper_id}/keys", get(get_keys))
        .route_layer(middleware::from_fn_with_state(state, crate::middleware::auth_middleware))
}

async fn get_keys(
    State(state): State<Arc<AppState>>,
    Path(whisper_id): Path<String>,
) -> WhisperResult<Json<KeyLookupResponse>> {
    validate_whisper_id(&whisper_id)?;

    let identity = identities::find_identity(&state.db.pool, &whisper_id)
        .await?
        .ok_or_else(|| WhisperError::NotFound { resource: "identity".into() })?;

    let device = identities::find_device(&state.db.pool, &whisper_id)
        .await?
        .ok_or_else(|| WhisperError::NotFound { resource: "device".into() })?;

    Ok(Json(KeyLookupResponse {
        whisper_id: identity.whisper_id,
        enc_public_key: device.enc_public_key,
        sign_public_key: device.sign_public_key,
        status: identity.status,
    }))
}
