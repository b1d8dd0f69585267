// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Domain Models
//!
//! Organization-scoped entities persisted by the storage layer. Every row
//! carries its `organization_id`; cross-organization reads are rejected by
//! the callers that load them.
//!
//! ## Model Categories
//!
//! - **Organizations & Users**: the isolation root and its members
//! - **Auth Methods**: credentials attached to a user (OAuth or API key)
//! - **Wallets, Accounts & Private Keys**: public material returned by the
//!   enclave. These rows exist only for completed activities.
//! - **Tags**: labels referenced by policy conditions
//! - **Invitations**: onboarding tokens

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use k256::elliptic_curve::rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use utoipa::ToSchema;

use crate::auth::Role;

// =============================================================================
// Organizations & Users
// =============================================================================

/// Root of isolation. Owns every other entity.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Organization {
    pub organization_id: String,
    pub name: String,
    /// Bumped on every configuration change.
    pub version: u64,
    /// Approvals required when no policy matches an activity.
    /// Zero means activities without a matching policy are auto-approved.
    pub default_quorum_threshold: u32,
    /// Users eligible to approve when a quorum names no approvers.
    pub root_quorum: Vec<String>,
    /// Rejections tolerated before a quorum-gated activity is rejected.
    pub rejection_tolerance: u32,
    pub created_at: DateTime<Utc>,
}

/// A member of an organization.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct User {
    pub user_id: String,
    pub organization_id: String,
    /// NFKC-normalized, lowercased email.
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub tags: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Credential kinds a user can authenticate with.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMethodKind {
    /// External OAuth identity (issuer + subject).
    Oauth { issuer: String, subject: String },
    /// Hex-encoded SEC1 secp256k1 public key used to sign approvals.
    ApiKey { public_key: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct AuthMethod {
    pub auth_method_id: String,
    pub user_id: String,
    pub organization_id: String,
    pub kind: AuthMethodKind,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Key Material (public parts only)
// =============================================================================

/// Signing curve supported by the enclave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Curve {
    Secp256k1,
    Ed25519,
}

/// How an account address is rendered from its public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AddressFormat {
    /// 0x-prefixed keccak256 address (secp256k1 only).
    Ethereum,
    /// Hex of the compressed public key.
    Compressed,
    /// Hex of the uncompressed public key (secp256k1 only).
    Uncompressed,
}

impl AddressFormat {
    /// Whether this format can be derived from keys on `curve`.
    pub fn supports(&self, curve: Curve) -> bool {
        match self {
            AddressFormat::Compressed => true,
            AddressFormat::Ethereum | AddressFormat::Uncompressed => curve == Curve::Secp256k1,
        }
    }
}

/// Wallet row. Created only as the result of a completed CreateWallet activity.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Wallet {
    pub wallet_id: String,
    pub organization_id: String,
    pub name: String,
    /// Root public key reported by the enclave.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub active: bool,
    /// Activity that materialized this wallet.
    pub activity_id: String,
    pub created_at: DateTime<Utc>,
}

/// Derived account of a wallet, written atomically with the wallet.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct WalletAccount {
    pub account_id: String,
    pub wallet_id: String,
    pub organization_id: String,
    pub curve: Curve,
    pub path: String,
    pub address_format: AddressFormat,
    pub address: String,
    pub public_key: String,
}

/// Private key row. Same creation discipline as [`Wallet`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PrivateKey {
    pub private_key_id: String,
    pub organization_id: String,
    /// Set for wallet-scoped keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_id: Option<String>,
    pub name: String,
    pub public_key: String,
    pub curve: Curve,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub active: bool,
    pub activity_id: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Tags & Invitations
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Tag {
    pub tag_id: String,
    pub organization_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Onboarding token. Redeeming it creates the user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Invitation {
    pub invitation_id: String,
    pub organization_id: String,
    pub email: String,
    pub role: Role,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redeemed_at: Option<DateTime<Utc>>,
    pub created_by: String,
}

impl Invitation {
    /// New invitation with a fresh 256-bit token.
    pub fn issue(
        organization_id: &str,
        created_by: &str,
        email: String,
        role: Role,
        valid_for: Duration,
    ) -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self {
            invitation_id: uuid::Uuid::new_v4().to_string(),
            organization_id: organization_id.to_string(),
            email,
            role,
            token: Base64UrlUnpadded::encode_string(&bytes),
            expires_at: Utc::now() + valid_for,
            redeemed_at: None,
            created_by: created_by.to_string(),
        }
    }

    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.redeemed_at.is_none() && now < self.expires_at
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Canonical form of an email address for uniqueness checks.
pub fn normalize_email(email: &str) -> String {
    email.trim().nfkc().collect::<String>().to_lowercase()
}

/// Maximum hardened/non-hardened BIP-32 child index.
const MAX_CHILD_INDEX: u64 = (1 << 31) - 1;

/// Validate a BIP-32 style derivation path such as `m/44'/60'/0'/0/0`.
pub fn validate_derivation_path(path: &str) -> Result<(), String> {
    let mut components = path.split('/');
    if components.next() != Some("m") {
        return Err(format!("derivation path `{path}` must start with `m`"));
    }

    let mut depth = 0usize;
    for component in components {
        let digits = component
            .strip_suffix('\'')
            .or_else(|| component.strip_suffix('h'))
            .unwrap_or(component);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("invalid derivation path component `{component}`"));
        }
        let index: u64 = digits
            .parse()
            .map_err(|_| format!("invalid derivation path component `{component}`"))?;
        if index > MAX_CHILD_INDEX {
            return Err(format!("derivation index {index} out of range"));
        }
        depth += 1;
    }

    if depth == 0 || depth > 10 {
        return Err(format!("derivation path `{path}` must have 1 to 10 levels"));
    }
    Ok(())
}
