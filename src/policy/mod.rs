// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Policies
//!
//! A [`Policy`] maps activity characteristics (type, requester tags,
//! resource tags) to an effect: allow, deny or require a quorum.
//!
//! When several policies match one activity the most restrictive
//! [`Decision`] wins:
//!
//! ```text
//! Deny  >  RequireQuorum(higher threshold)  >  RequireQuorum(lower)  >  Allow
//! ```
//!
//! Between quorums of equal threshold the lower rejection tolerance is
//! stricter. Exact ties keep the oldest policy.

use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::activity::{ActivityError, ActivityType};
use crate::quorum::QuorumRequirement;

pub mod evaluator;

pub use evaluator::{EvaluationContext, PolicyEvaluator};

/// When a policy applies. Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PolicyCondition {
    #[serde(default)]
    pub activity_types: Vec<ActivityType>,
    /// Tag ids; matches if the requester carries any of them.
    #[serde(default)]
    pub requester_tags: Vec<String>,
    /// Tag ids; matches if the affected wallet/key carries any of them.
    #[serde(default)]
    pub resource_tags: Vec<String>,
}

impl PolicyCondition {
    pub fn matches(
        &self,
        activity_type: ActivityType,
        requester_tags: &[String],
        resource_tags: &[String],
    ) -> bool {
        let type_ok = self.activity_types.is_empty() || self.activity_types.contains(&activity_type);
        type_ok
            && intersects_or_empty(&self.requester_tags, requester_tags)
            && intersects_or_empty(&self.resource_tags, resource_tags)
    }
}

fn intersects_or_empty(wanted: &[String], present: &[String]) -> bool {
    wanted.is_empty() || wanted.iter().any(|t| present.contains(t))
}

/// Who may approve under a quorum policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Approvers {
    #[serde(default)]
    pub users: Vec<String>,
    /// Users carrying any of these tag ids are eligible.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Approvers {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.tags.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyEffect {
    Allow,
    Deny {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    RequireQuorum {
        threshold: u32,
        /// Empty means the organization's root quorum.
        #[serde(default)]
        approvers: Approvers,
        #[serde(default)]
        required_approvers: Vec<String>,
        /// Overrides the organization's rejection tolerance.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rejection_tolerance: Option<u32>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Policy {
    pub policy_id: String,
    pub organization_id: String,
    pub name: String,
    #[serde(default)]
    pub condition: PolicyCondition,
    pub effect: PolicyEffect,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Policy {
    pub fn validate(&self) -> Result<(), ActivityError> {
        if self.name.trim().is_empty() {
            return Err(ActivityError::InvalidPayload(
                "policy name must not be empty".to_string(),
            ));
        }
        if let PolicyEffect::RequireQuorum { threshold, .. } = &self.effect {
            if *threshold == 0 {
                return Err(ActivityError::InvalidPayload(
                    "quorum threshold must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Resolved outcome of evaluating every matching policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow {
        policy_id: Option<String>,
    },
    Deny {
        policy_id: Option<String>,
        reason: String,
    },
    RequireQuorum(QuorumRequirement),
}

impl Decision {
    /// Total order used by the conflict reducer. Greater is stricter.
    pub fn rank(&self) -> (u8, u32, Reverse<u32>) {
        match self {
            Decision::Allow { .. } => (0, 0, Reverse(0)),
            Decision::RequireQuorum(req) => (1, req.threshold, Reverse(req.rejection_tolerance)),
            Decision::Deny { .. } => (2, 0, Reverse(0)),
        }
    }

    /// Keep the stricter of two decisions; on a tie keep `self`.
    pub fn most_restrictive(self, other: Decision) -> Decision {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }

    pub fn policy_id(&self) -> Option<&str> {
        match self {
            Decision::Allow { policy_id } | Decision::Deny { policy_id, .. } => {
                policy_id.as_deref()
            }
            Decision::RequireQuorum(req) => req.policy_id.as_deref(),
        }
    }
}
