// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Typed intent parameters for each activity type.
//!
//! Parameters arrive as untyped JSON. [`ActivityPayload::parse`] checks them
//! against the schema of the requested activity type; anything that does
//! not fit is an `InvalidPayload` error. Checks that need the database
//! (tag ids, signing keys) are done by the engine.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{validate_derivation_path, AddressFormat, Curve};

use super::{ActivityError, ActivityType};

const MAX_NAME_LEN: usize = 256;
const MAX_ACCOUNTS: usize = 100;
const MAX_TAGS: usize = 32;
/// Upper bound on decoded payload/transaction size.
const MAX_PAYLOAD_BYTES: usize = 128 * 1024;

// =============================================================================
// Intents
// =============================================================================

/// One account to derive inside a new wallet.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WalletAccountParams {
    pub curve: Curve,
    pub path: String,
    pub address_format: AddressFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CreateWalletIntent {
    pub wallet_name: String,
    pub accounts: Vec<WalletAccountParams>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CreatePrivateKeyIntent {
    pub private_key_name: String,
    pub curve: Curve,
    /// Scope the key to an existing wallet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SignTransactionIntent {
    /// Private key id or wallet account address.
    pub sign_with: String,
    /// Hex-encoded unsigned transaction bytes.
    pub unsigned_transaction: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PayloadEncoding {
    Hexadecimal,
    TextUtf8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HashFunction {
    Sha256,
    Keccak256,
    /// Payload is already a 32-byte digest.
    NoOp,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SignRawPayloadIntent {
    /// Private key id or wallet account address.
    pub sign_with: String,
    pub payload: String,
    pub encoding: PayloadEncoding,
    pub hash_function: HashFunction,
}

// =============================================================================
// Payload
// =============================================================================

/// Validated intent of an activity, tagged by its type.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "type", content = "parameters", rename_all = "snake_case")]
pub enum ActivityPayload {
    CreateWallet(CreateWalletIntent),
    CreatePrivateKey(CreatePrivateKeyIntent),
    SignTransaction(SignTransactionIntent),
    SignRawPayload(SignRawPayloadIntent),
}

impl ActivityPayload {
    /// Parse untyped parameters against the schema of `activity_type`.
    pub fn parse(
        activity_type: ActivityType,
        parameters: serde_json::Value,
    ) -> Result<Self, ActivityError> {
        let invalid = |e: serde_json::Error| {
            ActivityError::InvalidPayload(format!("{activity_type} parameters: {e}"))
        };
        let payload = match activity_type {
            ActivityType::CreateWallet => {
                ActivityPayload::CreateWallet(serde_json::from_value(parameters).map_err(invalid)?)
            }
            ActivityType::CreatePrivateKey => ActivityPayload::CreatePrivateKey(
                serde_json::from_value(parameters).map_err(invalid)?,
            ),
            ActivityType::SignTransaction => ActivityPayload::SignTransaction(
                serde_json::from_value(parameters).map_err(invalid)?,
            ),
            ActivityType::SignRawPayload => ActivityPayload::SignRawPayload(
                serde_json::from_value(parameters).map_err(invalid)?,
            ),
        };
        payload.validate()?;
        Ok(payload)
    }

    pub fn activity_type(&self) -> ActivityType {
        match self {
            ActivityPayload::CreateWallet(_) => ActivityType::CreateWallet,
            ActivityPayload::CreatePrivateKey(_) => ActivityType::CreatePrivateKey,
            ActivityPayload::SignTransaction(_) => ActivityType::SignTransaction,
            ActivityPayload::SignRawPayload(_) => ActivityType::SignRawPayload,
        }
    }

    /// Tags the new resource will carry (empty for signing activities).
    pub fn new_resource_tags(&self) -> &[String] {
        match self {
            ActivityPayload::CreateWallet(intent) => &intent.tags,
            ActivityPayload::CreatePrivateKey(intent) => &intent.tags,
            ActivityPayload::SignTransaction(_) | ActivityPayload::SignRawPayload(_) => &[],
        }
    }

    /// Key reference of signing activities.
    pub fn sign_with(&self) -> Option<&str> {
        match self {
            ActivityPayload::SignTransaction(intent) => Some(&intent.sign_with),
            ActivityPayload::SignRawPayload(intent) => Some(&intent.sign_with),
            ActivityPayload::CreateWallet(_) | ActivityPayload::CreatePrivateKey(_) => None,
        }
    }

    /// Structural validation that needs no database access.
    pub fn validate(&self) -> Result<(), ActivityError> {
        match self {
            ActivityPayload::CreateWallet(intent) => {
                validate_name("wallet_name", &intent.wallet_name)?;
                validate_tags(&intent.tags)?;
                if intent.accounts.is_empty() || intent.accounts.len() > MAX_ACCOUNTS {
                    return Err(ActivityError::InvalidPayload(format!(
                        "a wallet needs between 1 and {MAX_ACCOUNTS} accounts"
                    )));
                }
                for account in &intent.accounts {
                    validate_derivation_path(&account.path).map_err(ActivityError::InvalidPayload)?;
                    if !account.address_format.supports(account.curve) {
                        return Err(ActivityError::InvalidPayload(format!(
                            "address format {:?} is not supported for curve {:?}",
                            account.address_format, account.curve
                        )));
                    }
                }
                let mut seen = HashSet::new();
                if !intent
                    .accounts
                    .iter()
                    .all(|a| seen.insert((a.curve, a.path.as_str())))
                {
                    return Err(ActivityError::InvalidPayload(
                        "duplicate account derivation path".to_string(),
                    ));
                }
                Ok(())
            }
            ActivityPayload::CreatePrivateKey(intent) => {
                validate_name("private_key_name", &intent.private_key_name)?;
                validate_tags(&intent.tags)?;
                if let Some(wallet_id) = &intent.wallet_id {
                    validate_name("wallet_id", wallet_id)?;
                }
                Ok(())
            }
            ActivityPayload::SignTransaction(intent) => {
                validate_name("sign_with", &intent.sign_with)?;
                decode_hex("unsigned_transaction", &intent.unsigned_transaction)?;
                Ok(())
            }
            ActivityPayload::SignRawPayload(intent) => {
                validate_name("sign_with", &intent.sign_with)?;
                let bytes = intent.payload_bytes()?;
                if intent.hash_function == HashFunction::NoOp && bytes.len() != 32 {
                    return Err(ActivityError::InvalidPayload(
                        "no_op hashing requires a 32-byte payload".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

impl SignTransactionIntent {
    pub fn transaction_bytes(&self) -> Result<Vec<u8>, ActivityError> {
        decode_hex("unsigned_transaction", &self.unsigned_transaction)
    }
}

impl SignRawPayloadIntent {
    /// Decoded payload bytes according to `encoding`.
    pub fn payload_bytes(&self) -> Result<Vec<u8>, ActivityError> {
        match self.encoding {
            PayloadEncoding::Hexadecimal => decode_hex("payload", &self.payload),
            PayloadEncoding::TextUtf8 => {
                if self.payload.is_empty() || self.payload.len() > MAX_PAYLOAD_BYTES {
                    return Err(ActivityError::InvalidPayload(format!(
                        "payload must be 1 to {MAX_PAYLOAD_BYTES} bytes"
                    )));
                }
                Ok(self.payload.as_bytes().to_vec())
            }
        }
    }
}

fn validate_name(field: &str, value: &str) -> Result<(), ActivityError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ActivityError::InvalidPayload(format!("{field} must not be empty")));
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(ActivityError::InvalidPayload(format!(
            "{field} must be at most {MAX_NAME_LEN} bytes"
        )));
    }
    Ok(())
}

fn validate_tags(tags: &[String]) -> Result<(), ActivityError> {
    if tags.len() > MAX_TAGS {
        return Err(ActivityError::InvalidPayload(format!(
            "at most {MAX_TAGS} tags are allowed"
        )));
    }
    for tag in tags {
        validate_name("tag", tag)?;
    }
    Ok(())
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, ActivityError> {
    let bytes = alloy::hex::decode(value)
        .map_err(|e| ActivityError::InvalidPayload(format!("{field} is not valid hex: {e}")))?;
    if bytes.is_empty() || bytes.len() > MAX_PAYLOAD_BYTES {
        return Err(ActivityError::InvalidPayload(format!(
            "{field} must be 1 to {MAX_PAYLOAD_BYTES} bytes"
        )));
    }
    Ok(bytes)
}
