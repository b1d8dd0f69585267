// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Enclave Client
//!
//! The remote secure-enclave signer is the only component that ever touches
//! private key material. This service talks to it through the narrow
//! [`EnclaveClient`] trait: create a wallet, create a private key, sign.
//!
//! Every request carries the originating `activity_id`. The enclave treats it
//! as an idempotency key, so re-dispatching an activity after a timeout never
//! produces a second key or signature.
//!
//! Failures are split into two kinds:
//! - [`EnclaveError::Unavailable`]: timeouts, connection failures, 5xx.
//!   The activity stays `approved` and may be dispatched again.
//! - [`EnclaveError::Rejected`]: the enclave refused the request. The
//!   activity moves to `failed`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::activity::{HashFunction, WalletAccountParams};
use crate::models::Curve;

pub mod http;
#[cfg(any(test, feature = "dev"))]
pub mod simulated;

pub use http::HttpEnclaveClient;
#[cfg(any(test, feature = "dev"))]
pub use simulated::SimulatedEnclave;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnclaveError {
    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Rejected(String),
}

impl EnclaveError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EnclaveError::Unavailable(_))
    }
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSpec {
    pub activity_id: String,
    pub organization_id: String,
    pub wallet_id: String,
    pub accounts: Vec<WalletAccountParams>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateKeySpec {
    pub activity_id: String,
    pub organization_id: String,
    pub private_key_id: String,
    pub curve: Curve,
}

/// Key the enclave should sign with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyRef {
    PrivateKey {
        private_key_id: String,
        curve: Curve,
    },
    WalletAccount {
        wallet_id: String,
        path: String,
        curve: Curve,
    },
}

impl KeyRef {
    pub fn curve(&self) -> Curve {
        match self {
            KeyRef::PrivateKey { curve, .. } | KeyRef::WalletAccount { curve, .. } => *curve,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignKind {
    Transaction,
    RawPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignPayload {
    pub activity_id: String,
    pub organization_id: String,
    pub kind: SignKind,
    /// Hex-encoded bytes to sign.
    pub payload: String,
    pub hash_function: HashFunction,
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMaterial {
    pub public_key: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletMaterial {
    pub root_public_key: String,
    /// One entry per requested account, in request order.
    pub accounts: Vec<AccountMaterial>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMaterial {
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureMaterial {
    /// Hex-encoded signature.
    pub signature: String,
}

#[async_trait]
pub trait EnclaveClient: Send + Sync {
    async fn create_wallet(&self, spec: &WalletSpec) -> Result<WalletMaterial, EnclaveError>;

    async fn create_private_key(&self, spec: &PrivateKeySpec)
        -> Result<KeyMaterial, EnclaveError>;

    async fn sign(
        &self,
        key: &KeyRef,
        payload: &SignPayload,
    ) -> Result<SignatureMaterial, EnclaveError>;
}

/// Deterministic resource id for an activity's output.
///
/// Re-dispatching the same activity always names the same wallet or key.
pub fn derived_resource_id(activity_id: &str) -> String {
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, activity_id.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_ids_are_stable() {
        assert_eq!(derived_resource_id("a-1"), derived_resource_id("a-1"));
        assert_ne!(derived_resource_id("a-1"), derived_resource_id("a-2"));
    }

    #[test]
    fn key_ref_wire_format() {
        let key = KeyRef::WalletAccount {
            wallet_id: "w".into(),
            path: "m/44'/60'/0'/0/0".into(),
            curve: Curve::Secp256k1,
        };
        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json["type"], "wallet_account");
        assert_eq!(json["curve"], "secp256k1");
    }
}
