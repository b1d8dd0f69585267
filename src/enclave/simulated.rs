// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process signer for development and tests.
//!
//! Generates real secp256k1 keys and keeps them in memory. Results are
//! cached per `activity_id` so repeated dispatches are idempotent, matching
//! the contract of the real enclave. Ed25519 is refused.
//!
//! Test hooks: [`SimulatedEnclave::fail_next`] queues errors and
//! [`SimulatedEnclave::set_delay`] slows every call down.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use alloy::primitives::keccak256;
use async_trait::async_trait;
use k256::ecdsa::{SigningKey, VerifyingKey};
use k256::elliptic_curve::rand_core::OsRng;
use sha2::{Digest, Sha256};

use super::{
    AccountMaterial, EnclaveClient, EnclaveError, KeyMaterial, KeyRef, PrivateKeySpec,
    SignPayload, SignatureMaterial, WalletMaterial, WalletSpec,
};
use crate::activity::HashFunction;
use crate::models::{AddressFormat, Curve};

#[derive(Default)]
struct State {
    keys: HashMap<String, SigningKey>,
    wallets: HashMap<String, WalletMaterial>,
    private_keys: HashMap<String, KeyMaterial>,
    signatures: HashMap<String, SignatureMaterial>,
    failures: VecDeque<EnclaveError>,
    delay: Option<Duration>,
}

#[derive(Default)]
pub struct SimulatedEnclave {
    state: Mutex<State>,
    calls: AtomicUsize,
}

impl SimulatedEnclave {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call fail with `error` (queued, first in first out).
    pub fn fail_next(&self, error: EnclaveError) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.push_back(error);
        }
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut state) = self.state.lock() {
            state.delay = delay;
        }
    }

    /// Number of calls received, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, EnclaveError> {
        self.state
            .lock()
            .map_err(|_| EnclaveError::Unavailable("simulated enclave poisoned".into()))
    }

    /// Count the call, apply the configured delay and pop a queued failure.
    async fn enter(&self) -> Result<(), EnclaveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.lock()?.delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.lock()?.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn require_secp256k1(curve: Curve) -> Result<(), EnclaveError> {
    match curve {
        Curve::Secp256k1 => Ok(()),
        Curve::Ed25519 => Err(EnclaveError::Rejected(
            "curve ed25519 is not supported by this signer".into(),
        )),
    }
}

fn public_key_hex(key: &VerifyingKey) -> String {
    alloy::hex::encode(key.to_encoded_point(true).as_bytes())
}

fn render_address(key: &VerifyingKey, format: AddressFormat) -> String {
    match format {
        AddressFormat::Ethereum => {
            let uncompressed = key.to_encoded_point(false);
            let hash = keccak256(&uncompressed.as_bytes()[1..]);
            format!("0x{}", alloy::hex::encode(&hash[12..]))
        }
        AddressFormat::Compressed => public_key_hex(key),
        AddressFormat::Uncompressed => {
            alloy::hex::encode(key.to_encoded_point(false).as_bytes())
        }
    }
}

fn digest(payload: &SignPayload) -> Result<[u8; 32], EnclaveError> {
    let bytes = alloy::hex::decode(&payload.payload)
        .map_err(|e| EnclaveError::Rejected(format!("payload is not hex: {e}")))?;
    Ok(match payload.hash_function {
        HashFunction::Sha256 => Sha256::digest(&bytes).into(),
        HashFunction::Keccak256 => keccak256(&bytes).0,
        HashFunction::NoOp => bytes
            .try_into()
            .map_err(|_| EnclaveError::Rejected("no_op payload must be 32 bytes".into()))?,
    })
}

fn key_handle(key: &KeyRef) -> String {
    match key {
        KeyRef::PrivateKey { private_key_id, .. } => private_key_id.clone(),
        KeyRef::WalletAccount {
            wallet_id, path, ..
        } => format!("{wallet_id}/{path}"),
    }
}

#[async_trait]
impl EnclaveClient for SimulatedEnclave {
    async fn create_wallet(&self, spec: &WalletSpec) -> Result<WalletMaterial, EnclaveError> {
        self.enter().await?;
        let mut state = self.lock()?;
        if let Some(existing) = state.wallets.get(&spec.activity_id) {
            return Ok(existing.clone());
        }
        for account in &spec.accounts {
            require_secp256k1(account.curve)?;
        }

        let root = SigningKey::random(&mut OsRng);
        let mut accounts = Vec::with_capacity(spec.accounts.len());
        for account in &spec.accounts {
            let key = SigningKey::random(&mut OsRng);
            let verifying = key.verifying_key();
            accounts.push(AccountMaterial {
                public_key: public_key_hex(verifying),
                address: render_address(verifying, account.address_format),
            });
            state
                .keys
                .insert(format!("{}/{}", spec.wallet_id, account.path), key);
        }

        let material = WalletMaterial {
            root_public_key: public_key_hex(root.verifying_key()),
            accounts,
        };
        state
            .wallets
            .insert(spec.activity_id.clone(), material.clone());
        Ok(material)
    }

    async fn create_private_key(
        &self,
        spec: &PrivateKeySpec,
    ) -> Result<KeyMaterial, EnclaveError> {
        self.enter().await?;
        let mut state = self.lock()?;
        if let Some(existing) = state.private_keys.get(&spec.activity_id) {
            return Ok(existing.clone());
        }
        require_secp256k1(spec.curve)?;

        let key = SigningKey::random(&mut OsRng);
        let material = KeyMaterial {
            public_key: public_key_hex(key.verifying_key()),
        };
        state.keys.insert(spec.private_key_id.clone(), key);
        state
            .private_keys
            .insert(spec.activity_id.clone(), material.clone());
        Ok(material)
    }

    async fn sign(
        &self,
        key: &KeyRef,
        payload: &SignPayload,
    ) -> Result<SignatureMaterial, EnclaveError> {
        self.enter().await?;
        let mut state = self.lock()?;
        if let Some(existing) = state.signatures.get(&payload.activity_id) {
            return Ok(existing.clone());
        }
        require_secp256k1(key.curve())?;

        let signing_key = state
            .keys
            .get(&key_handle(key))
            .ok_or_else(|| EnclaveError::Rejected("unknown signing key".into()))?;
        let prehash = digest(payload)?;
        let (signature, recovery_id) = signing_key
            .sign_prehash_recoverable(&prehash)
            .map_err(|e| EnclaveError::Rejected(format!("signing failed: {e}")))?;

        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte());
        let material = SignatureMaterial {
            signature: alloy::hex::encode(bytes),
        };
        state
            .signatures
            .insert(payload.activity_id.clone(), material.clone());
        Ok(material)
    }
}
