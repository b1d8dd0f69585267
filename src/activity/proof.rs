// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Server attestations over proofs.
//!
//! Each [`Proof`] is sealed with an HMAC-SHA256 over its canonical body so
//! that later tampering with the append-only proof table is detectable.

use chrono::Utc;
use hmac::{Hmac, Mac};
use k256::elliptic_curve::rand_core::{OsRng, RngCore};
use sha2::Sha256;

use super::{Activity, Proof, ProofDecision, ProofSource};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct ProofSigner {
    mac: HmacSha256,
}

impl std::fmt::Debug for ProofSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProofSigner(..)")
    }
}

impl ProofSigner {
    pub fn new(key: &[u8]) -> Self {
        Self {
            mac: HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length"),
        }
    }

    /// Signer with a fresh random key. Attestations do not survive restarts.
    pub fn ephemeral() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self::new(&key)
    }

    /// Build and attest a new proof for `activity`.
    pub fn issue(
        &self,
        activity: &Activity,
        source: ProofSource,
        decision: ProofDecision,
        signature: Option<String>,
        reason: Option<String>,
    ) -> Proof {
        let mut proof = Proof {
            proof_id: uuid::Uuid::new_v4().to_string(),
            organization_id: activity.organization_id.clone(),
            activity_id: activity.activity_id.clone(),
            source,
            decision,
            signature,
            reason,
            attestation: String::new(),
            created_at: Utc::now(),
        };
        proof.attestation = self.attest(&proof);
        proof
    }

    pub fn attest(&self, proof: &Proof) -> String {
        let mut mac = self.mac.clone();
        mac.update(&canonical_body(proof));
        alloy::hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time check of a stored attestation.
    pub fn verify(&self, proof: &Proof) -> bool {
        let Ok(expected) = alloy::hex::decode(&proof.attestation) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(&canonical_body(proof));
        mac.verify_slice(&expected).is_ok()
    }
}

fn canonical_body(proof: &Proof) -> Vec<u8> {
    // Tuple serialization has a fixed field order.
    serde_json::to_vec(&(
        &proof.proof_id,
        &proof.organization_id,
        &proof.activity_id,
        &proof.source,
        proof.decision,
        &proof.signature,
        &proof.reason,
        proof.created_at.to_rfc3339(),
    ))
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityPayload, CreatePrivateKeyIntent};
    use crate::models::Curve;

    fn activity() -> Activity {
        Activity::new(
            "org-1",
            "user-1",
            ActivityPayload::CreatePrivateKey(CreatePrivateKeyIntent {
                private_key_name: "k".into(),
                curve: Curve::Secp256k1,
                wallet_id: None,
                tags: vec![],
            }),
            None,
        )
    }

    #[test]
    fn issued_proofs_verify() {
        let signer = ProofSigner::new(b"test-key");
        let proof = signer.issue(
            &activity(),
            ProofSource::User {
                user_id: "user-2".into(),
            },
            ProofDecision::Approve,
            Some("sig".into()),
            None,
        );
        assert!(signer.verify(&proof));
        assert_eq!(proof.organization_id, "org-1");
    }

    #[test]
    fn tampering_breaks_attestation() {
        let signer = ProofSigner::new(b"test-key");
        let mut proof = signer.issue(
            &activity(),
            ProofSource::Policy { policy_id: None },
            ProofDecision::Reject,
            None,
            Some("denied".into()),
        );
        proof.decision = ProofDecision::Approve;
        assert!(!signer.verify(&proof));
    }

    #[test]
    fn different_keys_disagree() {
        let a = ProofSigner::new(b"key-a");
        let b = ProofSigner::ephemeral();
        let proof = a.issue(
            &activity(),
            ProofSource::System {
                component: "sweeper".into(),
            },
            ProofDecision::Reject,
            None,
            None,
        );
        assert!(!b.verify(&proof));
    }
}
