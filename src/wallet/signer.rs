//! Transaction signing
//!
//! The chain verifies signatures over the SHA-256 digest of the canonical
//! transaction encoding, not the raw bytes. Signing the raw bytes produces
//! a signature the network rejects.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::chain::codec::{SignedTransaction, Transaction};

/// SHA-256 of an arbitrary payload
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Sign the SHA-256 digest of a payload
pub fn sign_digest(key: &SigningKey, payload: &[u8]) -> [u8; 64] {
    let digest = sha256(payload);
    key.sign(&digest).to_bytes()
}

/// Verify a digest signature produced by [`sign_digest`]
pub fn verify_digest(key: &VerifyingKey, payload: &[u8], signature: &[u8; 64]) -> bool {
    let digest = sha256(payload);
    key.verify(&digest, &Signature::from_bytes(signature)).is_ok()
}

/// Serialize, hash, and sign a transaction
pub fn sign_transaction(key: &SigningKey, tx: &Transaction) -> SignedTransaction {
    let tx_bytes = tx.to_bytes();
    let signature = sign_digest(key, &tx_bytes);
    SignedTransaction::new(tx_bytes, signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::codec::Action;

    fn test_key() -> SigningKey {
        SigningKey::from_bytes(&[42u8; 32])
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let key = test_key();
        let payload = b"message to sign";

        let sig = sign_digest(&key, payload);
        assert!(verify_digest(&key.verifying_key(), payload, &sig));
    }

    #[test]
    fn test_flipped_message_fails() {
        let key = test_key();
        let sig = sign_digest(&key, b"message to sign");

        // Flip one bit in the message
        assert!(!verify_digest(&key.verifying_key(), b"messagf to sign", &sig));
    }

    #[test]
    fn test_flipped_signature_fails() {
        let key = test_key();
        let payload = b"message to sign";
        let mut sig = sign_digest(&key, payload);
        sig[0] ^= 0x01;

        assert!(!verify_digest(&key.verifying_key(), payload, &sig));
    }

    #[test]
    fn test_signature_covers_digest_not_raw_bytes() {
        let key = test_key();
        let payload = b"payload";
        let sig = sign_digest(&key, payload);

        // A signature over the raw bytes would not verify against the digest
        let raw_sig = key.sign(payload).to_bytes();
        assert_ne!(sig, raw_sig);
        assert!(verify_digest(&key.verifying_key(), payload, &sig));
    }

    #[test]
    fn test_sign_transaction_layout() {
        let key = test_key();
        let tx = Transaction {
            signer_id: "agent.near".into(),
            public_key: key.verifying_key().to_bytes(),
            nonce: 7,
            receiver_id: "wrap.near".into(),
            block_hash: [1u8; 32],
            actions: vec![Action::Transfer { deposit: 10 }],
        };

        let signed = sign_transaction(&key, &tx);
        let bytes = signed.to_bytes();
        let tx_bytes = tx.to_bytes();

        // Signed bytes are the unsigned encoding + tag + 64-byte signature
        assert_eq!(&bytes[..tx_bytes.len()], &tx_bytes[..]);
        assert_eq!(bytes.len(), tx_bytes.len() + 1 + 64);

        let sig: [u8; 64] = bytes[tx_bytes.len() + 1..].try_into().unwrap();
        assert!(verify_digest(&key.verifying_key(), &tx_bytes, &sig));
    }
}
