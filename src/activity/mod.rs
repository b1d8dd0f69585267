// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Activities
//!
//! Every sensitive operation is recorded as an [`Activity`] and driven through
//! a one-way state machine:
//!
//! ```text
//! pending ──► rejected
//!    │
//!    ├──────► approved ──► completed
//!    │           ▲    └──► failed
//!    └──► needs_quorum ──► rejected
//! ```
//!
//! `rejected`, `completed` and `failed` are terminal. Each approval or
//! rejection is backed by an append-only [`Proof`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod engine;
pub mod error;
pub mod payload;
pub mod proof;
pub mod sweeper;

#[cfg(test)]
mod tests;

pub use engine::{ActivityEngine, ActivityFilter, EngineConfig, RecordApproval, SubmitActivity};
pub use error::ActivityError;
pub use payload::{
    ActivityPayload, CreatePrivateKeyIntent, CreateWalletIntent, HashFunction, PayloadEncoding,
    SignRawPayloadIntent, SignTransactionIntent, WalletAccountParams,
};
pub use proof::ProofSigner;
pub use sweeper::ActivitySweeper;

// =============================================================================
// Activity Type & Status
// =============================================================================

/// Kind of sensitive operation an activity requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    CreateWallet,
    CreatePrivateKey,
    SignTransaction,
    SignRawPayload,
}

impl ActivityType {
    pub const ALL: [ActivityType; 4] = [
        ActivityType::CreateWallet,
        ActivityType::CreatePrivateKey,
        ActivityType::SignTransaction,
        ActivityType::SignRawPayload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::CreateWallet => "create_wallet",
            ActivityType::CreatePrivateKey => "create_private_key",
            ActivityType::SignTransaction => "sign_transaction",
            ActivityType::SignRawPayload => "sign_raw_payload",
        }
    }
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of an activity in the approval state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Pending,
    NeedsQuorum,
    Approved,
    Rejected,
    Completed,
    Failed,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Pending => "pending",
            ActivityStatus::NeedsQuorum => "needs_quorum",
            ActivityStatus::Approved => "approved",
            ActivityStatus::Rejected => "rejected",
            ActivityStatus::Completed => "completed",
            ActivityStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ActivityStatus::Pending),
            "needs_quorum" => Some(ActivityStatus::NeedsQuorum),
            "approved" => Some(ActivityStatus::Approved),
            "rejected" => Some(ActivityStatus::Rejected),
            "completed" => Some(ActivityStatus::Completed),
            "failed" => Some(ActivityStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActivityStatus::Rejected | ActivityStatus::Completed | ActivityStatus::Failed
        )
    }

    /// Forward edges of the state machine. There are no self-loops.
    pub fn can_transition_to(&self, next: ActivityStatus) -> bool {
        use ActivityStatus::*;
        matches!(
            (self, next),
            (Pending, Rejected)
                | (Pending, Approved)
                | (Pending, NeedsQuorum)
                | (NeedsQuorum, Approved)
                | (NeedsQuorum, Rejected)
                | (Approved, Completed)
                | (Approved, Failed)
        )
    }
}

impl std::fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Activity
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StatusChange {
    pub status: ActivityStatus,
    pub at: DateTime<Utc>,
}

/// Outcome materialized when an activity completes.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityResult {
    CreateWallet {
        wallet_id: String,
        addresses: Vec<String>,
    },
    CreatePrivateKey {
        private_key_id: String,
        public_key: String,
    },
    Signature {
        signature: String,
    },
}

/// Terminal failure recorded on a `failed` activity.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ActivityFailure {
    pub code: String,
    pub message: String,
}

/// A recorded request to perform a sensitive operation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Activity {
    pub activity_id: String,
    pub organization_id: String,
    pub activity_type: ActivityType,
    pub status: ActivityStatus,
    pub payload: ActivityPayload,
    /// User who submitted the activity.
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ActivityResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ActivityFailure>,
    /// Last retryable dispatch error (activity stays `approved`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_dispatch_error: Option<String>,
    pub dispatch_attempts: u32,
    pub status_history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Activity {
    /// Build a new `pending` activity.
    pub fn new(
        organization_id: impl Into<String>,
        created_by: impl Into<String>,
        payload: ActivityPayload,
        idempotency_key: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            activity_id: uuid::Uuid::new_v4().to_string(),
            organization_id: organization_id.into(),
            activity_type: payload.activity_type(),
            status: ActivityStatus::Pending,
            payload,
            created_by: created_by.into(),
            idempotency_key,
            result: None,
            failure: None,
            last_dispatch_error: None,
            dispatch_attempts: 0,
            status_history: vec![StatusChange {
                status: ActivityStatus::Pending,
                at: now,
            }],
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance the status, refusing any edge outside the state machine.
    pub fn transition(&mut self, next: ActivityStatus) -> Result<(), ActivityError> {
        if !self.status.can_transition_to(next) {
            return Err(ActivityError::ActivityNotPending {
                activity_id: self.activity_id.clone(),
                status: self.status,
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        self.status_history.push(StatusChange { status: next, at: now });
        Ok(())
    }
}

// =============================================================================
// Proofs
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProofDecision {
    Approve,
    Reject,
}

impl ProofDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofDecision::Approve => "approve",
            ProofDecision::Reject => "reject",
        }
    }
}

/// Who produced a proof.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProofSource {
    /// A quorum member's vote.
    User { user_id: String },
    /// Policy evaluation (auto-approval or denial).
    Policy {
        #[serde(skip_serializing_if = "Option::is_none")]
        policy_id: Option<String>,
    },
    /// Engine-internal decision (expiry, enclave outcome).
    System { component: String },
}

/// Append-only, attested record of one decision on an activity.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Proof {
    pub proof_id: String,
    pub organization_id: String,
    pub activity_id: String,
    pub source: ProofSource,
    pub decision: ProofDecision,
    /// Approver-supplied signature, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Server HMAC over the proof body.
    pub attestation: String,
    pub created_at: DateTime<Utc>,
}

/// Canonical message an approver signs for a decision.
pub fn approval_message(
    organization_id: &str,
    activity_id: &str,
    decision: ProofDecision,
) -> String {
    format!("{organization_id}:{activity_id}:{}", decision.as_str())
}
