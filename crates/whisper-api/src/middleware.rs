//! Bearer-token authentication — re-validates the opaque session token
//! against the volatile store on every request, the same re-check-per-frame
//! discipline the gateway applies to authenticated websocket frames.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

use whisper_common::error::WhisperError;
use whisper_common::models::session::Session;

use crate::AppState;

/// Authenticated request context, inserted into request extensions by
/// [`auth_middleware`] and pulled out with `Extension<AuthContext>`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub session: Session,
}

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, WhisperError> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| WhisperError::NotRegistered { message: "missing Authorization header".into() })?;

    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| WhisperError::NotRegistered { message: "Authorization header is not a bearer token".into() })?;

    let session = state.auth.authenticate(token).await?;
    request.extensions_mut().insert(AuthContext { session });

    Ok(next.run(request).await)
}
