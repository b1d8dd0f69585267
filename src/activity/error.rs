// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy surfaced by the activity engine.

use crate::coordination::CoordinationError;
use crate::enclave::EnclaveError;
use crate::quorum::QuorumError;
use crate::storage::StorageError;

use super::ActivityStatus;

#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("user {user_id} is not a quorum member of activity {activity_id}")]
    NotAQuorumMember {
        activity_id: String,
        user_id: String,
    },

    #[error("user {user_id} already decided on activity {activity_id}")]
    AlreadyDecided {
        activity_id: String,
        user_id: String,
    },

    #[error("activity {activity_id} is not pending (status: {status})")]
    ActivityNotPending {
        activity_id: String,
        status: ActivityStatus,
    },

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("enclave unavailable: {0}")]
    EnclaveUnavailable(String),

    #[error("enclave rejected the request: {0}")]
    EnclaveRejected(String),

    #[error("activity {0} is being dispatched by another worker")]
    LockContention(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("coordination store error: {0}")]
    Coordination(CoordinationError),
}

impl ActivityError {
    /// Whether the same request may be retried unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActivityError::EnclaveUnavailable(_)
                | ActivityError::LockContention(_)
                | ActivityError::RateLimited { .. }
        )
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ActivityError::InvalidPayload(_) => "invalid_payload",
            ActivityError::Unauthorized(_) => "unauthorized",
            ActivityError::NotAQuorumMember { .. } => "not_a_quorum_member",
            ActivityError::AlreadyDecided { .. } => "already_decided",
            ActivityError::ActivityNotPending { .. } => "activity_not_pending",
            ActivityError::RateLimited { .. } => "rate_limited",
            ActivityError::EnclaveUnavailable(_) => "enclave_unavailable",
            ActivityError::EnclaveRejected(_) => "enclave_rejected",
            ActivityError::LockContention(_) => "lock_contention",
            ActivityError::NotFound(_) => "not_found",
            ActivityError::Storage(StorageError::NotFound(_)) => "not_found",
            ActivityError::Storage(_) | ActivityError::Coordination(_) => "internal_error",
        }
    }
}

impl From<CoordinationError> for ActivityError {
    fn from(e: CoordinationError) -> Self {
        match e {
            CoordinationError::RateLimited { retry_after } => ActivityError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            },
            CoordinationError::Contended(key) | CoordinationError::LeaseLost(key) => {
                ActivityError::LockContention(key)
            }
            other => ActivityError::Coordination(other),
        }
    }
}

impl From<EnclaveError> for ActivityError {
    fn from(e: EnclaveError) -> Self {
        match e {
            EnclaveError::Unavailable(msg) => ActivityError::EnclaveUnavailable(msg),
            EnclaveError::Rejected(msg) => ActivityError::EnclaveRejected(msg),
        }
    }
}

impl From<QuorumError> for ActivityError {
    fn from(e: QuorumError) -> Self {
        match e {
            QuorumError::NotAMember {
                activity_id,
                user_id,
            } => ActivityError::NotAQuorumMember {
                activity_id,
                user_id,
            },
            QuorumError::AlreadyDecided {
                activity_id,
                user_id,
            } => ActivityError::AlreadyDecided {
                activity_id,
                user_id,
            },
        }
    }
}
