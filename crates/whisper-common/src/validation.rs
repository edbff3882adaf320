//! Input validation utilities, shared by the REST surface and the gateway's
//! per-frame schema gate.

use validator::Validate;

use crate::error::WhisperError;

/// Validate a request body, returning a [`WhisperError::BadRequest`] on failure.
pub fn validate_request<T: Validate>(body: &T) -> Result<(), WhisperError> {
    body.validate().map_err(|e| WhisperError::BadRequest {
        message: format_validation_errors(e),
    })
}

fn format_validation_errors(errors: validator::ValidationErrors) -> String {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("invalid value for '{field}'"))
            })
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validate a WhisperID's wire format (`WSP-XXXX-XXXX-XXXX`).
pub fn validate_whisper_id(id: &str) -> Result<(), WhisperError> {
    if crate::ids::is_valid_whisper_id(id) {
        Ok(())
    } else {
        Err(WhisperError::BadRequest {
            message: format!("'{id}' is not a valid WhisperID"),
        })
    }
}

/// Validate that a field decodes as base64 of an exact expected byte length,
/// without actually decoding — callers that need the bytes should decode via
/// [`crate::crypto::decode_fixed_len`] and surface its error directly.
pub fn validate_b64_len(field: &str, value: &str, expected_bytes: usize) -> Result<(), WhisperError> {
    crate::crypto::decode_fixed_len(value, expected_bytes)
        .map(|_| ())
        .map_err(|_| WhisperError::BadRequest {
            message: format!("'{field}' must be base64 of {expected_bytes} bytes"),
        })
}
