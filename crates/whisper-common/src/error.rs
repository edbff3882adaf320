//! Centralized error type, shared across the REST surface and the gateway.
//!
//! The two surfaces render the same [`WhisperError`] differently: the REST
//! API turns it into a JSON body via [`IntoResponse`], the gateway turns it
//! into an `error` frame via [`WhisperError::to_error_frame`]. Error codes
//! are the closed set `{NOT_REGISTERED, AUTH_FAILED, INVALID_PAYLOAD,
//! INVALID_TIMESTAMP, RATE_LIMITED, USER_BANNED, NOT_FOUND, FORBIDDEN,
//! INTERNAL_ERROR}` — taxonomy by kind, not by mechanism.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum WhisperError {
    /// Malformed frame, unknown type, wrong versions, bad base64 — never
    /// closes the connection.
    #[error("malformed request: {message}")]
    BadRequest { message: String },

    /// No session, expired session, or an unauthenticated connection
    /// presenting a non-public frame type.
    #[error("not registered: {message}")]
    NotRegistered { message: String },

    /// Bad signature, stale/unknown challenge, or a session bound to a
    /// different identity than the one claimed.
    #[error("authentication failed: {message}")]
    AuthFailed { message: String },

    /// Message or signalling timestamp outside the accepted skew window.
    #[error("timestamp outside accepted skew")]
    InvalidTimestamp,

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("identity is banned")]
    UserBanned,

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("forbidden: {message}")]
    Forbidden { message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_secs: Option<u64>,
}

/// The wire shape of a gateway `error` frame's payload. Kept here (rather
/// than in `wire`) so error-to-frame mapping has a single source of truth.
#[derive(Serialize)]
pub struct ErrorFramePayload {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl WhisperError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotRegistered { .. } | Self::AuthFailed { .. } => StatusCode::UNAUTHORIZED,
            Self::InvalidTimestamp => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::UserBanned => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Database(_) | Self::Redis(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_code(&self) -> &str {
        match self {
            Self::BadRequest { .. } => "INVALID_PAYLOAD",
            Self::NotRegistered { .. } => "NOT_REGISTERED",
            Self::AuthFailed { .. } => "AUTH_FAILED",
            Self::InvalidTimestamp => "INVALID_TIMESTAMP",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::UserBanned => "USER_BANNED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::Database(_) | Self::Redis(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Database(e) => {
                tracing::error!("database error: {e}");
                "an internal error occurred".to_string()
            }
            Self::Redis(e) => {
                tracing::error!("cache error: {e}");
                "an internal error occurred".to_string()
            }
            Self::Internal(e) => {
                tracing::error!("internal error: {e:#}");
                "an internal error occurred".to_string()
            }
            other => other.to_string(),
        }
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Render this error as a gateway `error` frame payload.
    pub fn to_error_frame(&self) -> ErrorFramePayload {
        ErrorFramePayload {
            code: self.error_code().to_string(),
            message: self.client_message(),
            retry_after_secs: self.retry_after_secs(),
        }
    }
}

impl IntoResponse for WhisperError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.error_code().to_string(),
            retry_after_secs: self.retry_after_secs(),
            message: self.client_message(),
        };
        (status, axum::Json(body)).into_response()
    }
}

pub type WhisperResult<T> = Result<T, WhisperError>;
