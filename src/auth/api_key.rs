// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signatures made with a user's registered API keys.
//!
//! API keys are secp256k1 public keys stored as auth methods. A signature
//! is the hex encoding of `r || s`, optionally followed by a recovery byte.

use k256::ecdsa::signature::Verifier;
use k256::ecdsa::{Signature, VerifyingKey};

use crate::models::AuthMethodKind;
use crate::storage::{Database, StorageError};

/// Outcome of checking a signature against a user's API keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCheck {
    /// The user has no API keys registered.
    NoKeys,
    Valid,
    Invalid,
}

/// Check `signature` over `message` against every API key of `user_id`.
pub fn verify_api_key_signature(
    db: &Database,
    user_id: &str,
    message: &[u8],
    signature: Option<&str>,
) -> Result<KeyCheck, StorageError> {
    let keys: Vec<VerifyingKey> = db
        .list_auth_methods(user_id)?
        .into_iter()
        .filter_map(|m| match m.kind {
            AuthMethodKind::ApiKey { public_key } => decode_public_key(&public_key),
            AuthMethodKind::Oauth { .. } => None,
        })
        .collect();
    if keys.is_empty() {
        return Ok(KeyCheck::NoKeys);
    }

    let Some(signature) = signature.and_then(decode_signature) else {
        return Ok(KeyCheck::Invalid);
    };
    if keys.iter().any(|vk| vk.verify(message, &signature).is_ok()) {
        Ok(KeyCheck::Valid)
    } else {
        Ok(KeyCheck::Invalid)
    }
}

/// Parse a hex SEC1 public key (compressed or uncompressed).
pub fn decode_public_key(hex: &str) -> Option<VerifyingKey> {
    let bytes = alloy::hex::decode(hex.trim().trim_start_matches("0x")).ok()?;
    VerifyingKey::from_sec1_bytes(&bytes).ok()
}

fn decode_signature(hex: &str) -> Option<Signature> {
    let bytes = alloy::hex::decode(hex.trim().trim_start_matches("0x")).ok()?;
    if bytes.len() != 64 && bytes.len() != 65 {
        return None;
    }
    Signature::from_slice(&bytes[..64]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::testing::Harness;
    use k256::ecdsa::signature::Signer;
    use k256::ecdsa::SigningKey;
    use k256::elliptic_curve::rand_core::OsRng;

    fn sign(key: &SigningKey, message: &[u8]) -> String {
        let signature: Signature = key.sign(message);
        alloy::hex::encode(signature.to_bytes())
    }

    #[test]
    fn user_without_keys_needs_no_signature() {
        let h = Harness::new(0, 0);
        let check = verify_api_key_signature(&h.db, "admin", b"hello", None).unwrap();
        assert_eq!(check, KeyCheck::NoKeys);
    }

    #[test]
    fn signature_must_match_a_registered_key() {
        let h = Harness::new(0, 0);
        h.add_user("op", Role::Operator, &[]);
        let key = h.add_api_key("op");

        let good = sign(&key, b"hello");
        assert_eq!(
            verify_api_key_signature(&h.db, "op", b"hello", Some(&good)).unwrap(),
            KeyCheck::Valid
        );
        // With a trailing recovery byte and 0x prefix.
        let with_v = format!("0x{good}1b");
        assert_eq!(
            verify_api_key_signature(&h.db, "op", b"hello", Some(&with_v)).unwrap(),
            KeyCheck::Valid
        );

        let stranger = SigningKey::random(&mut OsRng);
        let bad = sign(&stranger, b"hello");
        assert_eq!(
            verify_api_key_signature(&h.db, "op", b"hello", Some(&bad)).unwrap(),
            KeyCheck::Invalid
        );
        assert_eq!(
            verify_api_key_signature(&h.db, "op", b"other", Some(&good)).unwrap(),
            KeyCheck::Invalid
        );
        assert_eq!(
            verify_api_key_signature(&h.db, "op", b"hello", None).unwrap(),
            KeyCheck::Invalid
        );
        assert_eq!(
            verify_api_key_signature(&h.db, "op", b"hello", Some("zz")).unwrap(),
            KeyCheck::Invalid
        );
    }

    #[test]
    fn decode_public_key_accepts_sec1_hex() {
        let key = SigningKey::random(&mut OsRng);
        let compressed = alloy::hex::encode(key.verifying_key().to_encoded_point(true).as_bytes());
        assert!(decode_public_key(&compressed).is_some());
        assert!(decode_public_key(&format!("0x{compressed}")).is_some());
        assert!(decode_public_key("02deadbeef").is_none());
    }
}
