//! Identifier generation.
//!
//! WhisperIDs are minted once per identity at first successful registration;
//! message/challenge/call ids use UUID v4 (no need for v7's time-sortability —
//! they're looked up by exact id, never range-scanned).

use rand::RngCore;
use std::sync::LazyLock;
use uuid::Uuid;

const BASE32_ALPHABET: base32::Alphabet = base32::Alphabet::Rfc4648 { padding: false };

static WHISPER_ID_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^WSP-[A-Z2-7]{4}-[A-Z2-7]{4}-[A-Z2-7]{4}$").unwrap()
});

/// Generate a new random challenge id.
pub fn generate_challenge_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate 32 random bytes for a registration challenge.
pub fn generate_challenge_bytes() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

/// Generate a 32-byte opaque session token, base64url-encoded (43 chars, no padding).
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

/// Mint a candidate `WSP-XXXX-XXXX-XXXX` WhisperID from 12 random Base32 characters.
///
/// Callers are responsible for the durable-store uniqueness check-and-regenerate
/// loop — this function only produces a well-formed candidate.
pub fn generate_whisper_id_candidate() -> String {
    let mut bytes = [0u8; 8]; // 8 bytes -> 13 base32 chars w/o padding, we take 12
    rand::rng().fill_bytes(&mut bytes);
    let encoded = base32::encode(BASE32_ALPHABET, &bytes);
    let chars: Vec<char> = encoded.chars().take(12).collect();
    let group = |s: &[char]| s.iter().collect::<String>();
    format!(
        "WSP-{}-{}-{}",
        group(&chars[0..4]),
        group(&chars[4..8]),
        group(&chars[8..12])
    )
}

/// Validate that a string matches the WhisperID wire format.
pub fn is_valid_whisper_id(s: &str) -> bool {
    WHISPER_ID_REGEX.is_match(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_matches_format() {
        for _ in 0..50 {
            let id = generate_whisper_id_candidate();
            assert!(is_valid_whisper_id(&id), "{id} did not match WhisperID format");
        }
    }

    #[test]
    fn session_token_length_in_spec_range() {
        let token = generate_session_token();
        assert!(token.len() >= 32 && token.len() <= 64);
    }
}
