//! NEP-413 off-chain message signing
//!
//! Signs a tagged, length-prefixed payload bound to a nonce and a
//! recipient, so the signature cannot be replayed against a different
//! service or with a reused nonce. Used to mint short-lived bearer tokens
//! for third-party services — never for on-chain transactions.

use base64::Engine;
use chrono::Utc;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::wallet::keys::Credentials;
use crate::wallet::signer::sign_digest;

/// NEP-413 payload tag: 2^31 + 413
pub const NEP413_TAG: u32 = (1 << 31) + 413;

/// Default sign-in message for the NEAR AI marketplace
pub const NEARAI_MESSAGE: &str = "Welcome to NEAR AI";

/// Default recipient for the NEAR AI marketplace
pub const NEARAI_RECIPIENT: &str = "ai.near";

/// Borsh-serialize the NEP-413 payload.
///
/// Layout: u32 tag, message string, fixed 32-byte nonce, recipient string,
/// Option<String> callback URL. The nonce is UTF-8 zero-padded to 32
/// bytes; longer nonces are truncated — that truncation is protocol
/// behavior, not an error.
pub fn build_payload(
    message: &str,
    nonce: &str,
    recipient: &str,
    callback_url: Option<&str>,
) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&NEP413_TAG.to_le_bytes());

    buf.extend_from_slice(&(message.len() as u32).to_le_bytes());
    buf.extend_from_slice(message.as_bytes());

    let mut nonce_bytes = [0u8; 32];
    let raw = nonce.as_bytes();
    let len = raw.len().min(32);
    nonce_bytes[..len].copy_from_slice(&raw[..len]);
    buf.extend_from_slice(&nonce_bytes);

    buf.extend_from_slice(&(recipient.len() as u32).to_le_bytes());
    buf.extend_from_slice(recipient.as_bytes());

    match callback_url {
        Some(url) => {
            buf.push(1);
            buf.extend_from_slice(&(url.len() as u32).to_le_bytes());
            buf.extend_from_slice(url.as_bytes());
        }
        None => buf.push(0),
    }

    buf
}

/// Build the NEP-413 payload, hash it, and sign the digest.
pub fn sign_message(
    key: &SigningKey,
    message: &str,
    nonce: &str,
    recipient: &str,
    callback_url: Option<&str>,
) -> [u8; 64] {
    let payload = build_payload(message, nonce, recipient, callback_url);
    sign_digest(key, &payload)
}

/// A wallet-signed bearer authentication token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub account_id: String,
    pub public_key: String,
    pub signature: String,
    pub callback_url: Option<String>,
    pub message: String,
    pub recipient: String,
    pub nonce: String,
}

impl AuthToken {
    /// Encode the token as a base64 bearer string
    pub fn to_bearer(&self) -> Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(json))
    }
}

/// Mint an auth token for the given message and recipient.
///
/// The nonce is the current millisecond timestamp, zero-padded to the
/// 32-character width the payload expects.
pub fn generate_auth_token(
    credentials: &Credentials,
    message: &str,
    recipient: &str,
    callback_url: Option<&str>,
) -> Result<AuthToken> {
    let nonce = format!("{:0>32}", Utc::now().timestamp_millis());
    let signature = sign_message(
        &credentials.signing_key,
        message,
        &nonce,
        recipient,
        callback_url,
    );

    Ok(AuthToken {
        account_id: credentials.account_id.clone(),
        public_key: credentials.public_key_str(),
        signature: base64::engine::general_purpose::STANDARD.encode(signature),
        callback_url: callback_url.map(str::to_string),
        message: message.to_string(),
        recipient: recipient.to_string(),
        nonce,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::signer::verify_digest;

    #[test]
    fn test_payload_layout() {
        let payload = build_payload("hi", "abc", "ai.near", None);

        // Tag bytes: 2147484061 little-endian
        assert_eq!(&payload[..4], &2147484061u32.to_le_bytes());
        // Message: length 2 + "hi"
        assert_eq!(&payload[4..8], &[2, 0, 0, 0]);
        assert_eq!(&payload[8..10], b"hi");
        // Nonce: "abc" zero-padded to 32 bytes
        assert_eq!(&payload[10..13], b"abc");
        assert!(payload[13..42].iter().all(|&b| b == 0));
        // Recipient: length 7 + "ai.near"
        assert_eq!(&payload[42..46], &[7, 0, 0, 0]);
        assert_eq!(&payload[46..53], b"ai.near");
        // Callback absent
        assert_eq!(payload[53], 0);
        assert_eq!(payload.len(), 54);
    }

    #[test]
    fn test_long_nonce_truncated() {
        let long_nonce = "x".repeat(40);
        let payload = build_payload("m", &long_nonce, "r", None);
        // 4 tag + 4+1 message, then exactly 32 nonce bytes, all 'x'
        assert_eq!(&payload[9..41], "x".repeat(32).as_bytes());
    }

    #[test]
    fn test_callback_url_present() {
        let payload = build_payload("m", "n", "r", Some("https://cb"));
        let tail = &payload[payload.len() - 15..];
        assert_eq!(tail[0], 1);
        assert_eq!(&tail[1..5], &[10, 0, 0, 0]);
        assert_eq!(&tail[5..], b"https://cb");
    }

    #[test]
    fn test_signature_bound_to_recipient() {
        let key = SigningKey::from_bytes(&[9u8; 32]);
        let sig = sign_message(&key, "msg", "nonce", "service-a.near", None);

        let payload_a = build_payload("msg", "nonce", "service-a.near", None);
        let payload_b = build_payload("msg", "nonce", "service-b.near", None);

        assert!(verify_digest(&key.verifying_key(), &payload_a, &sig));
        // The same signature must not verify for another recipient
        assert!(!verify_digest(&key.verifying_key(), &payload_b, &sig));
    }

    #[test]
    fn test_auth_token_bearer() {
        let credentials = Credentials {
            account_id: "agent.near".into(),
            signing_key: SigningKey::from_bytes(&[1u8; 32]),
        };
        let token = generate_auth_token(&credentials, NEARAI_MESSAGE, NEARAI_RECIPIENT, None)
            .unwrap();

        assert_eq!(token.nonce.len(), 32);
        assert!(token.public_key.starts_with("ed25519:"));

        let bearer = token.to_bearer().unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(bearer)
            .unwrap();
        let parsed: AuthToken = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(parsed.account_id, "agent.near");
        assert_eq!(parsed.recipient, NEARAI_RECIPIENT);
    }
}
