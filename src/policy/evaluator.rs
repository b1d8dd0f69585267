// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Policy evaluation for proposed activities.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::{Decision, Policy, PolicyEffect};
use crate::activity::ActivityType;
use crate::models::{Organization, User};
use crate::quorum::QuorumRequirement;
use crate::storage::{Database, StorageError};

/// Facts about an activity that policies can match on.
#[derive(Debug, Clone)]
pub struct EvaluationContext<'a> {
    pub organization_id: &'a str,
    pub activity_type: ActivityType,
    pub requester: &'a User,
    /// Tags of the wallet/key being created or used.
    pub resource_tags: &'a [String],
}

#[derive(Clone)]
pub struct PolicyEvaluator {
    db: Arc<Database>,
}

impl PolicyEvaluator {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<Decision, StorageError> {
        let org = self
            .db
            .get_organization(ctx.organization_id)?
            .ok_or_else(|| StorageError::NotFound(format!("Organization {}", ctx.organization_id)))?;
        let policies = self.db.list_policies(ctx.organization_id)?;
        let users = self.db.list_users(ctx.organization_id)?;

        let decision = evaluate_policies(&org, &policies, &users, ctx);
        tracing::debug!(
            organization_id = %ctx.organization_id,
            activity_type = %ctx.activity_type,
            decision = ?decision,
            "Policy evaluated"
        );
        Ok(decision)
    }
}

/// Reduce every matching active policy to one decision.
///
/// With no match, the organization default applies: a threshold of zero
/// auto-approves, anything else requires that many root-quorum approvals.
pub fn evaluate_policies(
    org: &Organization,
    policies: &[Policy],
    users: &[User],
    ctx: &EvaluationContext<'_>,
) -> Decision {
    let mut matching: Vec<&Policy> = policies
        .iter()
        .filter(|p| p.active && p.organization_id == org.organization_id)
        .filter(|p| {
            p.condition
                .matches(ctx.activity_type, &ctx.requester.tags, ctx.resource_tags)
        })
        .collect();
    matching.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.policy_id.cmp(&b.policy_id))
    });

    matching
        .into_iter()
        .map(|p| resolve(org, users, p))
        .reduce(Decision::most_restrictive)
        .unwrap_or_else(|| default_decision(org, users))
}

fn default_decision(org: &Organization, users: &[User]) -> Decision {
    if org.default_quorum_threshold == 0 {
        return Decision::Allow { policy_id: None };
    }
    let members = active_subset(users, org.root_quorum.iter());
    requirement(
        org.default_quorum_threshold,
        members,
        &[],
        org.rejection_tolerance,
        None,
    )
}

fn resolve(org: &Organization, users: &[User], policy: &Policy) -> Decision {
    let policy_id = Some(policy.policy_id.clone());
    match &policy.effect {
        PolicyEffect::Allow => Decision::Allow { policy_id },
        PolicyEffect::Deny { reason } => Decision::Deny {
            policy_id,
            reason: reason
                .clone()
                .unwrap_or_else(|| format!("denied by policy {}", policy.name)),
        },
        PolicyEffect::RequireQuorum {
            threshold,
            approvers,
            required_approvers,
            rejection_tolerance,
        } => {
            let members = if approvers.is_empty() {
                active_subset(users, org.root_quorum.iter())
            } else {
                users
                    .iter()
                    .filter(|u| u.active)
                    .filter(|u| {
                        approvers.users.contains(&u.user_id)
                            || u.tags.iter().any(|t| approvers.tags.contains(t))
                    })
                    .map(|u| u.user_id.clone())
                    .collect()
            };
            requirement(
                *threshold,
                members,
                required_approvers,
                rejection_tolerance.unwrap_or(org.rejection_tolerance),
                policy_id,
            )
        }
    }
}

fn active_subset<'a>(users: &[User], ids: impl Iterator<Item = &'a String>) -> BTreeSet<String> {
    let wanted: BTreeSet<&String> = ids.collect();
    users
        .iter()
        .filter(|u| u.active && wanted.contains(&u.user_id))
        .map(|u| u.user_id.clone())
        .collect()
}

/// Build a quorum requirement, or a denial if it can never be satisfied.
fn requirement(
    threshold: u32,
    members: BTreeSet<String>,
    required: &[String],
    rejection_tolerance: u32,
    policy_id: Option<String>,
) -> Decision {
    if let Some(missing) = required.iter().find(|r| !members.contains(*r)) {
        return Decision::Deny {
            policy_id,
            reason: format!("required approver {missing} is not an eligible quorum member"),
        };
    }
    if threshold as usize > members.len() {
        return Decision::Deny {
            policy_id,
            reason: format!(
                "quorum threshold {threshold} exceeds {} eligible approver(s)",
                members.len()
            ),
        };
    }
    Decision::RequireQuorum(QuorumRequirement {
        threshold,
        members: members.into_iter().collect(),
        required: required.to_vec(),
        rejection_tolerance,
        policy_id,
    })
}
