//! Schema gate — structural validation of every inbound frame before any
//! business logic runs. One branch per known `type`; anything else is
//! rejected with `INVALID_PAYLOAD` before reaching the auth engine, router,
//! or presence tracker.
//!
//! `validator`'s derive handles the checks it can express (lengths, ranges,
//! `deny_unknown_fields` on the underlying struct); the checks it can't
//! (`protocolVersion`/`cryptoVersion` constants, WhisperID format, strict
//! base64 of a declared byte length) run as a second hand-written pass here.

use serde_json::Value;

use whisper_common::crypto::{self, ED25519_KEY_LEN, ED25519_SIG_LEN, NONCE_LEN};
use whisper_common::error::WhisperError;
use whisper_common::ids::is_valid_whisper_id;
use whisper_common::validation::validate_request;
use whisper_common::wire::{
    self, CallSignalPayload, DeliveryReceiptPayload, FetchPendingPayload, GetTurnCredentialsPayload,
    LogoutPayload, PingPayload, PongPayload, RegisterBeginPayload, RegisterProofPayload,
    SendMessagePayload, SessionRefreshPayload, TypingPayload, KNOWN_FRAME_TYPES, PUBLIC_FRAME_TYPES,
};

pub enum ParsedFrame {
    RegisterBegin(RegisterBeginPayload),
    RegisterProof(RegisterProofPayload),
    SessionRefresh,
    Logout,
    Ping(PingPayload),
    Pong(PongPayload),
    SendMessage(SendMessagePayload),
    FetchPending(FetchPendingPayload),
    DeliveryReceipt(DeliveryReceiptPayload),
    Typing(TypingPayload),
    CallInitiate(CallSignalPayload),
    CallAnswer(CallSignalPayload),
    CallIceCandidate(CallSignalPayload),
    CallEnd(CallSignalPayload),
    CallRinging(CallSignalPayload),
    GetTurnCredentials,
}

pub fn is_public_frame_type(frame_type: &str) -> bool {
    PUBLIC_FRAME_TYPES.contains(&frame_type)
}

pub fn is_known_frame_type(frame_type: &str) -> bool {
    KNOWN_FRAME_TYPES.contains(&frame_type)
}

/// Decode + validate `payload` against `frame_type`'s declared shape.
/// Returns `BadRequest` (the gate's `INVALID_PAYLOAD`) on any failure; the
/// caller never reaches business logic on an `Err`.
pub fn parse_and_validate(frame_type: &str, payload: &Value) -> Result<ParsedFrame, WhisperError> {
    if !is_known_frame_type(frame_type) {
        return Err(WhisperError::BadRequest { message: format!("unknown frame type '{frame_type}'") });
    }

    match frame_type {
        "register_begin" => {
            let body: RegisterBeginPayload = wire::parse_payload(payload)?;
            validate_request(&body)?;
            check_protocol_versions(body.protocol_version, body.crypto_version)?;
            if let Some(ref id) = body.whisper_id {
                check_whisper_id(id)?;
            }
            Ok(ParsedFrame::RegisterBegin(body))
        }
        "register_proof" => {
            let body: RegisterProofPayload = wire::parse_payload(payload)?;
            validate_request(&body)?;
            if let Some(ref id) = body.whisper_id {
                check_whisper_id(id)?;
            }
            check_b64_len("encPublicKey", &body.enc_public_key, ED25519_KEY_LEN)?;
            check_b64_len("signPublicKey", &body.sign_public_key, ED25519_KEY_LEN)?;
            check_b64_len("signature", &body.signature, ED25519_SIG_LEN)?;
            Ok(ParsedFrame::RegisterProof(body))
        }
        "session_refresh" => {
            let body: SessionRefreshPayload = wire::parse_payload(payload)?;
            validate_request(&body)?;
            Ok(ParsedFrame::SessionRefresh)
        }
        "logout" => {
            let body: LogoutPayload = wire::parse_payload(payload)?;
            validate_request(&body)?;
            Ok(ParsedFrame::Logout)
        }
        "ping" => {
            let body: PingPayload = wire::parse_payload(payload)?;
            validate_request(&body)?;
            Ok(ParsedFrame::Ping(body))
        }
        "pong" => {
            let body: PongPayload = wire::parse_payload(payload)?;
            validate_request(&body)?;
            Ok(ParsedFrame::Pong(body))
        }
        "send_message" => {
            let body: SendMessagePayload = wire::parse_payload(payload)?;
            validate_request(&body)?;
            check_whisper_id(&body.from)?;
            check_whisper_id(&body.to)?;
            check_b64_len("nonce", &body.nonce, NONCE_LEN)?;
            check_strict_b64("ciphertext", &body.ciphertext)?;
            check_b64_len("sig", &body.sig, ED25519_SIG_LEN)?;
            Ok(ParsedFrame::SendMessage(body))
        }
        "fetch_pending" => {
            let body: FetchPendingPayload = wire::parse_payload(payload)?;
            validate_request(&body)?;
            Ok(ParsedFrame::FetchPending(body))
        }
        "delivery_receipt" => {
            let body: DeliveryReceiptPayload = wire::parse_payload(payload)?;
            validate_request(&body)?;
            check_whisper_id(&body.from)?;
            check_whisper_id(&body.to)?;
            Ok(ParsedFrame::DeliveryReceipt(body))
        }
        "typing" => {
            let body: TypingPayload = wire::parse_payload(payload)?;
            validate_request(&body)?;
            check_whisper_id(&body.to)?;
            Ok(ParsedFrame::Typing(body))
        }
        "call_initiate" | "call_answer" | "call_ice_candidate" | "call_end" | "call_ringing" => {
            let body: CallSignalPayload = wire::parse_payload(payload)?;
            validate_request(&body)?;
            check_whisper_id(&body.from)?;
            check_whisper_id(&body.to)?;
            check_b64_len("nonce", &body.nonce, NONCE_LEN)?;
            check_strict_b64("ciphertext", &body.ciphertext)?;
            check_b64_len("sig", &body.sig, ED25519_SIG_LEN)?;
            match frame_type {
                "call_initiate" => Ok(ParsedFrame::CallInitiate(body)),
                "call_answer" => Ok(ParsedFrame::CallAnswer(body)),
                "call_ice_candidate" => Ok(ParsedFrame::CallIceCandidate(body)),
                "call_end" => Ok(ParsedFrame::CallEnd(body)),
                _ => Ok(ParsedFrame::CallRinging(body)),
            }
        }
        "get_turn_credentials" => {
            let body: GetTurnCredentialsPayload = wire::parse_payload(payload)?;
            validate_request(&body)?;
            Ok(ParsedFrame::GetTurnCredentials)
        }
        other => Err(WhisperError::BadRequest { message: format!("'{other}' is not a client-sendable type") }),
    }
}

fn check_protocol_versions(protocol_version: u8, crypto_version: u8) -> Result<(), WhisperError> {
    if protocol_version != wire::PROTOCOL_VERSION {
        return Err(WhisperError::BadRequest {
            message: format!("unsupported protocolVersion {protocol_version}"),
        });
    }
    if crypto_version != wire::CRYPTO_VERSION {
        return Err(WhisperError::BadRequest {
            message: format!("unsupported cryptoVersion {crypto_version}"),
        });
    }
    Ok(())
}

fn check_whisper_id(id: &str) -> Result<(), WhisperError> {
    if is_valid_whisper_id(id) {
        Ok(())
    } else {
        Err(WhisperError::BadRequest { message: format!("'{id}' is not a valid WhisperID") })
    }
}

fn check_b64_len(field: &str, value: &str, expected_bytes: usize) -> Result<(), WhisperError> {
    crypto::decode_fixed_len(value, expected_bytes)
        .map(|_| ())
        .map_err(|_| WhisperError::BadRequest { message: format!("'{field}' must be base64 of {expected_bytes} bytes") })
}

fn check_strict_b64(field: &str, value: &str) -> Result<(), WhisperError> {
    crypto::decode_strict_base64(value)
        .map(|_| ())
        .map_err(|_| WhisperError::BadRequest { message: format!("'{field}' is not valid strict base64") })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_type_is_rejected() {
        let err = parse_and_validate("teleport", &json!({})).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PAYLOAD");
    }

    #[test]
    fn register_begin_rejects_wrong_protocol_version() {
        let payload = json!({
            "protocolVersion": 2,
            "cryptoVersion": 1,
            "deviceId": "11111111-1111-1111-1111-111111111111",
            "platform": "ios",
        });
        let err = parse_and_validate("register_begin", &payload).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PAYLOAD");
    }

    #[test]
    fn register_begin_rejects_additional_fields() {
        let payload = json!({
            "protocolVersion": 1,
            "cryptoVersion": 1,
            "deviceId": "11111111-1111-1111-1111-111111111111",
            "platform": "ios",
            "extra": "nope",
        });
        let err = parse_and_validate("register_begin", &payload).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PAYLOAD");
    }

    #[test]
    fn send_message_rejects_bad_nonce_length() {
        let payload = json!({
            "messageId": "m-1",
            "from": "WSP-AAAA-BBBB-CCCC",
            "to": "WSP-DDDD-EEEE-FFFF",
            "msgType": "text",
            "timestamp": 1_700_000_000_000i64,
            "nonce": "dGVzdA==",
            "ciphertext": "dGVzdA==",
            "sig": "dGVzdA==",
            "attachment": null,
        });
        let err = parse_and_validate("send_message", &payload).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PAYLOAD");
    }

    #[test]
    fn public_frame_types_cover_preauth_handshake() {
        assert!(is_public_frame_type("register_begin"));
        assert!(is_public_frame_type("register_proof"));
        assert!(is_public_frame_type("ping"));
        assert!(!is_public_frame_type("send_message"));
    }
}
