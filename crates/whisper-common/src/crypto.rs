//! Signature verification and strict encoding checks.
//!
//! The server never performs Signal-style E2EE cryptography — ciphertext and
//! key material are opaque blobs. The only crypto the server does is:
//!
//! - Build the canonical byte string a frame's signature covers.
//! - Verify an Ed25519 signature over `SHA-256(canonical_bytes)`.
//! - Reject malformed base64 / wrong-length key and nonce material.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

pub const ED25519_KEY_LEN: usize = 32;
pub const X25519_KEY_LEN: usize = 32;
pub const ED25519_SIG_LEN: usize = 64;
pub const NONCE_LEN: usize = 24;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("not valid strict base64")]
    BadBase64,
    #[error("decoded length {actual} does not match expected {expected}")]
    WrongLength { expected: usize, actual: usize },
    #[error("signature verification failed")]
    InvalidSignature,
}

/// Decode strict base64 (standard alphabet, padded, `len % 4 == 0`).
///
/// `base64`'s `STANDARD` engine already requires padding; we additionally
/// reject any input whose length isn't a multiple of 4, which the engine
/// alone wouldn't catch for certain malformed-but-decodable inputs.
pub fn decode_strict_base64(s: &str) -> Result<Vec<u8>, CryptoError> {
    if s.len() % 4 != 0 {
        return Err(CryptoError::BadBase64);
    }
    B64.decode(s).map_err(|_| CryptoError::BadBase64)
}

pub fn decode_fixed_len(s: &str, expected: usize) -> Result<Vec<u8>, CryptoError> {
    let bytes = decode_strict_base64(s)?;
    if bytes.len() != expected {
        return Err(CryptoError::WrongLength { expected, actual: bytes.len() });
    }
    Ok(bytes)
}

pub fn encode_base64(bytes: &[u8]) -> String {
    B64.encode(bytes)
}

/// Canonical bytes for a signable `send_message`-shaped frame (and the
/// identically-structured call-signalling frames), per the line-separated
/// form: `v1\n<messageType>\n<messageId>\n<from>\n<toOrGroupId>\n<timestamp>\n<base64(nonce)>\n<base64(ciphertext)>\n`
pub fn canonical_message_bytes(
    message_type: &str,
    message_id: &str,
    from: &str,
    to: &str,
    timestamp_ms: i64,
    nonce_b64: &str,
    ciphertext_b64: &str,
) -> Vec<u8> {
    let mut out = String::new();
    out.push_str("v1\n");
    out.push_str(message_type);
    out.push('\n');
    out.push_str(message_id);
    out.push('\n');
    out.push_str(from);
    out.push('\n');
    out.push_str(to);
    out.push('\n');
    out.push_str(&timestamp_ms.to_string());
    out.push('\n');
    out.push_str(nonce_b64);
    out.push('\n');
    out.push_str(ciphertext_b64);
    out.push('\n');
    out.into_bytes()
}

/// Canonical bytes for a `register_proof` frame:
/// `v1\nregister_proof\n<challengeId>\n<deviceId>\n<platform>\n<encPublicKey>\n<signPublicKey>\n`
pub fn canonical_register_proof_bytes(
    challenge_id: &str,
    device_id: &str,
    platform: &str,
    enc_public_key_b64: &str,
    sign_public_key_b64: &str,
) -> Vec<u8> {
    let mut out = String::new();
    out.push_str("v1\nregister_proof\n");
    out.push_str(challenge_id);
    out.push('\n');
    out.push_str(device_id);
    out.push('\n');
    out.push_str(platform);
    out.push('\n');
    out.push_str(enc_public_key_b64);
    out.push('\n');
    out.push_str(sign_public_key_b64);
    out.push('\n');
    out.into_bytes()
}

/// Verify an Ed25519 signature over `SHA-256(canonical_bytes)`.
///
/// `sign_public_key_b64` and `signature_b64` must be strict base64 of the
/// expected fixed lengths. Any failure collapses to one variant — the
/// caller never learns *which* check failed, to avoid giving a malicious
/// client a signature-forging oracle.
pub fn verify_canonical_signature(
    sign_public_key_b64: &str,
    signature_b64: &str,
    canonical_bytes: &[u8],
) -> Result<(), CryptoError> {
    let pubkey_bytes = decode_fixed_len(sign_public_key_b64, ED25519_KEY_LEN)
        .map_err(|_| CryptoError::InvalidSignature)?;
    let sig_bytes = decode_fixed_len(signature_b64, ED25519_SIG_LEN)
        .map_err(|_| CryptoError::InvalidSignature)?;

    let verifying_key = VerifyingKey::from_bytes(
        pubkey_bytes.as_slice().try_into().map_err(|_| CryptoError::InvalidSignature)?,
    )
    .map_err(|_| CryptoError::InvalidSignature)?;

    let signature = Signature::from_bytes(
        sig_bytes.as_slice().try_into().map_err(|_| CryptoError::InvalidSignature)?,
    );

    let digest = Sha256::digest(canonical_bytes);

    verifying_key
        .verify(&digest, &signature)
        .map_err(|_| CryptoError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand_core::OsRng;

    #[test]
    fn canonical_message_bytes_are_byte_identical_to_spec_form() {
        let bytes = canonical_message_bytes(
            "text",
            "m-1",
            "WSP-AAAA-BBBB-CCCC",
            "WSP-DDDD-EEEE-FFFF",
            1_700_000_000_000,
            "bm9uY2UtMjQtYnl0ZXMtZXhhY3RseSEh",
            "dGVzdA==",
        );
        let expected = "v1\ntext\nm-1\nWSP-AAAA-BBBB-CCCC\nWSP-DDDD-EEEE-FFFF\n1700000000000\nbm9uY2UtMjQtYnl0ZXMtZXhhY3RseSEh\ndGVzdA==\n";
        assert_eq!(String::from_utf8(bytes).unwrap(), expected);
    }

    #[test]
    fn round_trip_sign_verify() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let pubkey_b64 = encode_base64(signing_key.verifying_key().as_bytes());

        let canonical = canonical_message_bytes(
            "text", "m-1", "WSP-AAAA-BBBB-CCCC", "WSP-DDDD-EEEE-FFFF",
            1_700_000_000_000, "bm9uY2UtMjQtYnl0ZXMtZXhhY3RseSEh", "dGVzdA==",
        );
        let digest = Sha256::digest(&canonical);
        let sig = signing_key.sign(&digest);
        let sig_b64 = encode_base64(&sig.to_bytes());

        verify_canonical_signature(&pubkey_b64, &sig_b64, &canonical).expect("should verify");
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let pubkey_b64 = encode_base64(signing_key.verifying_key().as_bytes());
        let other_key = SigningKey::generate(&mut OsRng);

        let canonical = canonical_message_bytes(
            "text", "m-1", "WSP-AAAA-BBBB-CCCC", "WSP-DDDD-EEEE-FFFF",
            1_700_000_000_000, "bm9uY2UtMjQtYnl0ZXMtZXhhY3RseSEh", "dGVzdA==",
        );
        let digest = Sha256::digest(&canonical);
        let sig = other_key.sign(&digest);
        let sig_b64 = encode_base64(&sig.to_bytes());

        assert!(verify_canonical_signature(&pubkey_b64, &sig_b64, &canonical).is_err());
    }

    #[test]
    fn non_multiple_of_four_base64_is_rejected() {
        assert!(decode_strict_base64("abcde").is_err());
    }
}
