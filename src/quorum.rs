// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Quorum Coordination
//!
//! A [`Quorum`] is seeded when an activity enters `needs_quorum`. Its roster
//! and threshold are fixed at that moment and never change for the lifetime
//! of the activity, even if the organization's membership does.
//!
//! Votes go through [`QuorumCoordinator::record_vote`], which runs
//! "append proof → recount → maybe transition" inside a single storage write
//! transaction. Two concurrent votes can therefore never both observe a
//! pre-threshold count.
//!
//! ## Outcome rules
//!
//! Rejection is evaluated before approval:
//! 1. rejections > `rejection_tolerance` → rejected
//! 2. a `required` member rejected → rejected
//! 3. approvals still possible < threshold → rejected
//! 4. approvals ≥ threshold and all required members approved → approved

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::activity::{
    Activity, ActivityError, ActivityStatus, Proof, ProofDecision, ProofSigner, ProofSource,
};
use crate::storage::{Database, StorageError};

/// Approval requirement produced by policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuorumRequirement {
    /// Absolute number of approvals needed.
    pub threshold: u32,
    /// Resolved, deduplicated roster.
    pub members: Vec<String>,
    /// Members whose approval is mandatory.
    #[serde(default)]
    pub required: Vec<String>,
    pub rejection_tolerance: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Vote {
    pub decision: ProofDecision,
    pub proof_id: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuorumMember {
    pub user_id: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<Vote>,
}

/// Result of recounting a quorum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuorumOutcome {
    Pending { approvals: u32, rejections: u32 },
    Approved,
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuorumError {
    #[error("user {user_id} is not a member of the quorum for {activity_id}")]
    NotAMember {
        activity_id: String,
        user_id: String,
    },

    #[error("user {user_id} already voted on {activity_id}")]
    AlreadyDecided {
        activity_id: String,
        user_id: String,
    },
}

/// Fixed roster and running tally of one activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Quorum {
    pub activity_id: String,
    pub organization_id: String,
    pub threshold: u32,
    pub rejection_tolerance: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    pub members: Vec<QuorumMember>,
    pub seeded_at: DateTime<Utc>,
}

impl Quorum {
    pub fn seed(activity: &Activity, requirement: &QuorumRequirement) -> Self {
        let members = requirement
            .members
            .iter()
            .map(|user_id| QuorumMember {
                user_id: user_id.clone(),
                required: requirement.required.contains(user_id),
                vote: None,
            })
            .collect();
        Self {
            activity_id: activity.activity_id.clone(),
            organization_id: activity.organization_id.clone(),
            threshold: requirement.threshold,
            rejection_tolerance: requirement.rejection_tolerance,
            policy_id: requirement.policy_id.clone(),
            members,
            seeded_at: Utc::now(),
        }
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m.user_id == user_id)
    }

    pub fn approvals(&self) -> u32 {
        self.count(ProofDecision::Approve)
    }

    pub fn rejections(&self) -> u32 {
        self.count(ProofDecision::Reject)
    }

    fn count(&self, decision: ProofDecision) -> u32 {
        self.members
            .iter()
            .filter(|m| m.vote.as_ref().map(|v| v.decision) == Some(decision))
            .count() as u32
    }

    fn undecided(&self) -> u32 {
        self.members.iter().filter(|m| m.vote.is_none()).count() as u32
    }

    /// Record one member's vote and recount.
    pub fn record(
        &mut self,
        user_id: &str,
        decision: ProofDecision,
        proof_id: &str,
    ) -> Result<QuorumOutcome, QuorumError> {
        let activity_id = self.activity_id.clone();
        let member = self
            .members
            .iter_mut()
            .find(|m| m.user_id == user_id)
            .ok_or_else(|| QuorumError::NotAMember {
                activity_id: activity_id.clone(),
                user_id: user_id.to_string(),
            })?;

        if member.vote.is_some() {
            return Err(QuorumError::AlreadyDecided {
                activity_id,
                user_id: user_id.to_string(),
            });
        }

        member.vote = Some(Vote {
            decision,
            proof_id: proof_id.to_string(),
            at: Utc::now(),
        });
        Ok(self.outcome())
    }

    /// Current outcome. Rejection rules are checked first.
    pub fn outcome(&self) -> QuorumOutcome {
        let approvals = self.approvals();
        let rejections = self.rejections();

        if rejections > self.rejection_tolerance {
            return QuorumOutcome::Rejected {
                reason: format!(
                    "{rejections} rejection(s) exceed tolerance of {}",
                    self.rejection_tolerance
                ),
            };
        }

        let required_rejected = self.members.iter().any(|m| {
            m.required && m.vote.as_ref().map(|v| v.decision) == Some(ProofDecision::Reject)
        });
        if required_rejected {
            return QuorumOutcome::Rejected {
                reason: "a required approver rejected".to_string(),
            };
        }

        if approvals + self.undecided() < self.threshold {
            return QuorumOutcome::Rejected {
                reason: format!("threshold of {} can no longer be reached", self.threshold),
            };
        }

        let required_approved = self.members.iter().all(|m| {
            !m.required || m.vote.as_ref().map(|v| v.decision) == Some(ProofDecision::Approve)
        });
        if approvals >= self.threshold && required_approved {
            return QuorumOutcome::Approved;
        }

        QuorumOutcome::Pending {
            approvals,
            rejections,
        }
    }
}

/// Result of a committed vote.
#[derive(Debug, Clone)]
pub struct VoteOutcome {
    pub activity: Activity,
    pub proof: Proof,
    pub outcome: QuorumOutcome,
}

/// Seeds quorums and serializes vote counting through storage transactions.
#[derive(Clone)]
pub struct QuorumCoordinator {
    db: Arc<Database>,
    proofs: ProofSigner,
}

impl QuorumCoordinator {
    pub fn new(db: Arc<Database>, proofs: ProofSigner) -> Self {
        Self { db, proofs }
    }

    /// Move a `pending` activity to `needs_quorum` with its roster.
    pub fn seed(
        &self,
        activity_id: &str,
        requirement: &QuorumRequirement,
    ) -> Result<Activity, ActivityError> {
        self.db.update_activity(activity_id, |txn| {
            let quorum = Quorum::seed(&txn.activity, requirement);
            txn.activity.transition(ActivityStatus::NeedsQuorum)?;
            txn.quorum = Some(quorum);
            Ok::<_, ActivityError>(txn.activity.clone())
        })
    }

    pub fn get(&self, activity_id: &str) -> Result<Option<Quorum>, StorageError> {
        self.db.get_quorum(activity_id)
    }

    /// Append a vote and apply the resulting transition atomically.
    pub fn record_vote(
        &self,
        organization_id: &str,
        activity_id: &str,
        user_id: &str,
        decision: ProofDecision,
        signature: Option<String>,
    ) -> Result<VoteOutcome, ActivityError> {
        self.db.update_activity(activity_id, |txn| {
            if txn.activity.organization_id != organization_id {
                return Err(ActivityError::NotFound(format!("Activity {activity_id}")));
            }
            if txn.activity.status != ActivityStatus::NeedsQuorum {
                return Err(ActivityError::ActivityNotPending {
                    activity_id: activity_id.to_string(),
                    status: txn.activity.status,
                });
            }

            let proof = self.proofs.issue(
                &txn.activity,
                ProofSource::User {
                    user_id: user_id.to_string(),
                },
                decision,
                signature,
                None,
            );

            let quorum = txn.quorum.as_mut().ok_or_else(|| {
                StorageError::Corrupted(format!("activity {activity_id} has no quorum"))
            })?;
            let outcome = quorum.record(user_id, decision, &proof.proof_id)?;

            match &outcome {
                QuorumOutcome::Approved => txn.activity.transition(ActivityStatus::Approved)?,
                QuorumOutcome::Rejected { .. } => {
                    txn.activity.transition(ActivityStatus::Rejected)?
                }
                QuorumOutcome::Pending { .. } => {}
            }
            txn.append_proof(proof.clone());

            Ok(VoteOutcome {
                activity: txn.activity.clone(),
                proof,
                outcome,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityPayload, CreatePrivateKeyIntent};
    use crate::models::Curve;

    fn activity() -> Activity {
        Activity::new(
            "org-1",
            "requester",
            ActivityPayload::CreatePrivateKey(CreatePrivateKeyIntent {
                private_key_name: "k".into(),
                curve: Curve::Secp256k1,
                wallet_id: None,
                tags: vec![],
            }),
            None,
        )
    }

    fn requirement(threshold: u32, members: &[&str], tolerance: u32) -> QuorumRequirement {
        QuorumRequirement {
            threshold,
            members: members.iter().map(|m| m.to_string()).collect(),
            required: vec![],
            rejection_tolerance: tolerance,
            policy_id: None,
        }
    }

    #[test]
    fn reaches_threshold() {
        let mut q = Quorum::seed(&activity(), &requirement(2, &["a", "b", "c"], 0));
        assert_eq!(
            q.record("a", ProofDecision::Approve, "p1").unwrap(),
            QuorumOutcome::Pending {
                approvals: 1,
                rejections: 0
            }
        );
        assert_eq!(
            q.record("b", ProofDecision::Approve, "p2").unwrap(),
            QuorumOutcome::Approved
        );
    }

    #[test]
    fn single_rejection_is_terminal_by_default() {
        let mut q = Quorum::seed(&activity(), &requirement(2, &["a", "b", "c"], 0));
        q.record("a", ProofDecision::Approve, "p1").unwrap();
        let outcome = q.record("b", ProofDecision::Reject, "p2").unwrap();
        assert!(matches!(outcome, QuorumOutcome::Rejected { .. }));
        // A later approval cannot out-vote it.
        let outcome = q.record("c", ProofDecision::Approve, "p3").unwrap();
        assert!(matches!(outcome, QuorumOutcome::Rejected { .. }));
    }

    #[test]
    fn tolerance_allows_some_rejections() {
        let mut q = Quorum::seed(&activity(), &requirement(2, &["a", "b", "c", "d"], 1));
        q.record("a", ProofDecision::Reject, "p1").unwrap();
        assert!(matches!(q.outcome(), QuorumOutcome::Pending { .. }));
        q.record("b", ProofDecision::Approve, "p2").unwrap();
        assert_eq!(
            q.record("c", ProofDecision::Approve, "p3").unwrap(),
            QuorumOutcome::Approved
        );
    }

    #[test]
    fn unreachable_threshold_rejects() {
        let mut q = Quorum::seed(&activity(), &requirement(3, &["a", "b", "c"], 5));
        let outcome = q.record("a", ProofDecision::Reject, "p1").unwrap();
        assert!(matches!(outcome, QuorumOutcome::Rejected { .. }));
    }

    #[test]
    fn required_member_must_approve() {
        let mut req = requirement(1, &["a", "b"], 1);
        req.required = vec!["b".into()];
        let mut q = Quorum::seed(&activity(), &req);
        assert!(matches!(
            q.record("a", ProofDecision::Approve, "p1").unwrap(),
            QuorumOutcome::Pending { .. }
        ));
        assert_eq!(
            q.record("b", ProofDecision::Approve, "p2").unwrap(),
            QuorumOutcome::Approved
        );

        let mut q = Quorum::seed(&activity(), &req);
        assert!(matches!(
            q.record("b", ProofDecision::Reject, "p1").unwrap(),
            QuorumOutcome::Rejected { .. }
        ));
    }

    #[test]
    fn membership_and_double_votes() {
        let mut q = Quorum::seed(&activity(), &requirement(2, &["a", "b"], 0));
        assert!(matches!(
            q.record("z", ProofDecision::Approve, "p0"),
            Err(QuorumError::NotAMember { .. })
        ));
        q.record("a", ProofDecision::Approve, "p1").unwrap();
        assert!(matches!(
            q.record("a", ProofDecision::Approve, "p2"),
            Err(QuorumError::AlreadyDecided { .. })
        ));
        assert_eq!(q.approvals(), 1);
        assert_eq!(q.rejections(), 0);
    }
}
