// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Activity Engine
//!
//! Orchestrates the life of an activity:
//!
//! 1. **Submit**: baseline permission check, payload parsing, replay of a
//!    known idempotency key, reference checks, rate limiting and an insert
//!    in `pending`.
//! 2. **Evaluate**: policy decides between deny, auto-approve and quorum.
//!    `needs_quorum` is a suspension point; the call returns immediately.
//! 3. **RecordApproval**: one vote per roster member, counted atomically.
//!    Only the vote that crosses the threshold triggers dispatch.
//! 4. **Dispatch**: under the `lock:<org>:<activity>` lease, call the
//!    enclave with a deadline and commit the outcome together with any
//!    wallet or key rows.
//!
//! A timeout or unreachable enclave leaves the activity `approved` so that
//! a retry (manual or by the sweeper) can finish it. The enclave treats the
//! activity id as an idempotency key, so a retry never duplicates a key.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::keccak256;
use chrono::Utc;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use super::{
    approval_message, Activity, ActivityError, ActivityFailure, ActivityPayload, ActivityResult,
    ActivityStatus, ActivityType, CreatePrivateKeyIntent, CreateWalletIntent, HashFunction, Proof,
    ProofDecision, ProofSigner, ProofSource,
};
use crate::auth::{verify_api_key_signature, KeyCheck};
use crate::coordination::{DistributedLock, KeyValueStore, LockGuard, RateLimiter};
use crate::enclave::{
    derived_resource_id, EnclaveClient, EnclaveError, KeyMaterial, KeyRef, PrivateKeySpec,
    SignKind, SignPayload, SignatureMaterial, WalletMaterial, WalletSpec,
};
use crate::models::{PrivateKey, User, Wallet, WalletAccount};
use crate::policy::{Decision, EvaluationContext, PolicyEvaluator};
use crate::quorum::{Quorum, QuorumCoordinator, QuorumOutcome};
use crate::storage::activities::ActivityQuery;
use crate::storage::{AuditEvent, AuditEventType, CreateOutcome, Database, StorageError};

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 1000;

/// Tunables of the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline of a single enclave call.
    pub enclave_timeout: Duration,
    /// Lease of the per-activity dispatch lock.
    pub lock_lease: Duration,
    /// How long an activity may wait in `needs_quorum`.
    pub approval_ttl: Duration,
    /// Submissions allowed per requester and activity type per window.
    pub rate_limit_max: u64,
    pub rate_limit_window: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enclave_timeout: Duration::from_secs(10),
            lock_lease: Duration::from_secs(30),
            approval_ttl: Duration::from_secs(24 * 60 * 60),
            rate_limit_max: 30,
            rate_limit_window: Duration::from_secs(60),
        }
    }
}

/// A new activity request.
#[derive(Debug, Clone)]
pub struct SubmitActivity {
    pub organization_id: String,
    pub requester_id: String,
    pub activity_type: ActivityType,
    pub parameters: serde_json::Value,
    pub idempotency_key: Option<String>,
}

/// One quorum member's decision.
#[derive(Debug, Clone)]
pub struct RecordApproval {
    pub organization_id: String,
    pub activity_id: String,
    pub approver_id: String,
    pub decision: ProofDecision,
    /// Hex-encoded ECDSA signature over `org:activity:decision`.
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActivityFilter {
    pub status: Option<ActivityStatus>,
    pub activity_type: Option<ActivityType>,
    /// Defaults to 100, capped at 1000.
    pub limit: Option<usize>,
}

/// Request sent to the enclave for one activity.
enum EnclaveRequest {
    Wallet(WalletSpec),
    PrivateKey(PrivateKeySpec),
    Sign(KeyRef, SignPayload),
}

enum EnclaveOutput {
    Wallet(WalletMaterial),
    PrivateKey(KeyMaterial),
    Signature(SignatureMaterial),
}

#[derive(Clone)]
pub struct ActivityEngine {
    db: Arc<Database>,
    policies: PolicyEvaluator,
    quorum: QuorumCoordinator,
    enclave: Arc<dyn EnclaveClient>,
    locks: DistributedLock,
    rate_limiter: RateLimiter,
    proofs: ProofSigner,
    config: EngineConfig,
}

impl ActivityEngine {
    pub fn new(
        db: Arc<Database>,
        enclave: Arc<dyn EnclaveClient>,
        kv: Arc<dyn KeyValueStore>,
        proofs: ProofSigner,
        config: EngineConfig,
    ) -> Self {
        Self {
            policies: PolicyEvaluator::new(Arc::clone(&db)),
            quorum: QuorumCoordinator::new(Arc::clone(&db), proofs.clone()),
            locks: DistributedLock::new(Arc::clone(&kv), config.lock_lease),
            rate_limiter: RateLimiter::new(kv, config.rate_limit_max, config.rate_limit_window),
            db,
            enclave,
            proofs,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn proof_signer(&self) -> &ProofSigner {
        &self.proofs
    }

    // =========================================================================
    // Submit & Evaluate
    // =========================================================================

    /// Record a new activity and drive it as far as policy allows.
    ///
    /// Returns the activity in whatever state it reached: `rejected`,
    /// `needs_quorum`, `completed`, `failed`, or `approved` if dispatch
    /// could not finish yet.
    pub async fn submit(&self, request: SubmitActivity) -> Result<Activity, ActivityError> {
        let requester = self.load_member(&request.organization_id, &request.requester_id)?;
        if !requester.role.can_submit(request.activity_type) {
            self.audit_denied(&requester, request.activity_type);
            return Err(ActivityError::Unauthorized(format!(
                "role {} may not submit {}",
                requester.role, request.activity_type
            )));
        }

        let payload = ActivityPayload::parse(request.activity_type, request.parameters)?;
        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = self.db.find_idempotent_activity(
                &request.organization_id,
                &request.requester_id,
                key,
            )? {
                return replayed(existing, &payload);
            }
        }
        self.check_references(&request.organization_id, &payload)?;

        self.rate_limiter
            .check(
                &request.organization_id,
                &request.requester_id,
                request.activity_type.as_str(),
            )
            .await?;

        let activity = Activity::new(
            &request.organization_id,
            &request.requester_id,
            payload,
            request.idempotency_key,
        );
        let activity = match self.db.create_activity(&activity)? {
            CreateOutcome::Created(activity) => activity,
            CreateOutcome::Existing(existing) => return replayed(existing, &activity.payload),
        };

        tracing::info!(
            activity_id = %activity.activity_id,
            organization_id = %activity.organization_id,
            activity_type = %activity.activity_type,
            "Activity submitted"
        );
        self.audit(&activity, AuditEventType::ActivitySubmitted, Some(&requester.user_id));

        self.evaluate(activity).await
    }

    /// Apply policy to a `pending` activity.
    pub async fn evaluate(&self, activity: Activity) -> Result<Activity, ActivityError> {
        let org_id = activity.organization_id.clone();
        let activity_id = activity.activity_id.clone();

        let requester = match self.load_member(&org_id, &activity.created_by) {
            Ok(user) => user,
            Err(ActivityError::Unauthorized(reason)) => {
                return self.reject_by_system(&activity_id, "policy", reason);
            }
            Err(e) => return Err(e),
        };
        let resource_tags = match self.resource_tags(&org_id, &activity.payload) {
            Ok(tags) => tags,
            Err(ActivityError::InvalidPayload(reason)) => {
                return self.reject_by_system(&activity_id, "policy", reason);
            }
            Err(e) => return Err(e),
        };
        let ctx = EvaluationContext {
            organization_id: &org_id,
            activity_type: activity.activity_type,
            requester: &requester,
            resource_tags: &resource_tags,
        };

        match self.policies.evaluate(&ctx)? {
            Decision::Deny { policy_id, reason } => {
                let rejected = self.db.update_activity(&activity_id, |txn| {
                    let proof = self.proofs.issue(
                        &txn.activity,
                        ProofSource::Policy { policy_id },
                        ProofDecision::Reject,
                        None,
                        Some(reason.clone()),
                    );
                    txn.activity.transition(ActivityStatus::Rejected)?;
                    txn.append_proof(proof);
                    Ok::<_, ActivityError>(txn.activity.clone())
                })?;
                tracing::info!(
                    activity_id = %activity_id,
                    organization_id = %org_id,
                    reason = %reason,
                    "Activity denied by policy"
                );
                self.audit(&rejected, AuditEventType::ActivityRejected, None);
                Ok(rejected)
            }
            Decision::Allow { policy_id } => {
                let approved = self.db.update_activity(&activity_id, |txn| {
                    let proof = self.proofs.issue(
                        &txn.activity,
                        ProofSource::Policy { policy_id },
                        ProofDecision::Approve,
                        None,
                        None,
                    );
                    txn.activity.transition(ActivityStatus::Approved)?;
                    txn.append_proof(proof);
                    Ok::<_, ActivityError>(txn.activity.clone())
                })?;
                tracing::info!(
                    activity_id = %activity_id,
                    organization_id = %org_id,
                    "Activity auto-approved by policy"
                );
                self.audit(&approved, AuditEventType::ActivityApproved, None);
                Ok(self.dispatch_absorbing(approved).await)
            }
            Decision::RequireQuorum(requirement) => {
                let waiting = self.quorum.seed(&activity_id, &requirement)?;
                tracing::info!(
                    activity_id = %activity_id,
                    organization_id = %org_id,
                    threshold = requirement.threshold,
                    members = requirement.members.len(),
                    "Activity awaiting quorum"
                );
                Ok(waiting)
            }
        }
    }

    // =========================================================================
    // Approvals
    // =========================================================================

    /// Record one quorum member's vote.
    ///
    /// Checked in order: activity exists in the organization, it is still
    /// in `needs_quorum`, the approver is on the roster, and has not voted.
    pub async fn record_approval(
        &self,
        request: RecordApproval,
    ) -> Result<Activity, ActivityError> {
        let activity = self.get_activity(&request.organization_id, &request.activity_id)?;
        if activity.status != ActivityStatus::NeedsQuorum {
            return Err(ActivityError::ActivityNotPending {
                activity_id: activity.activity_id,
                status: activity.status,
            });
        }

        let quorum = self.db.get_quorum(&activity.activity_id)?.ok_or_else(|| {
            StorageError::Corrupted(format!("activity {} has no quorum", activity.activity_id))
        })?;
        if !quorum.is_member(&request.approver_id) {
            return Err(ActivityError::NotAQuorumMember {
                activity_id: activity.activity_id,
                user_id: request.approver_id,
            });
        }

        let approver = self.load_member(&request.organization_id, &request.approver_id)?;
        self.verify_approval_signature(&approver, &activity, request.decision, request.signature.as_deref())?;

        let vote = self.quorum.record_vote(
            &request.organization_id,
            &request.activity_id,
            &request.approver_id,
            request.decision,
            request.signature,
        )?;

        tracing::info!(
            activity_id = %vote.activity.activity_id,
            organization_id = %vote.activity.organization_id,
            decision = vote.proof.decision.as_str(),
            outcome = ?vote.outcome,
            "Vote recorded"
        );
        self.audit(&vote.activity, AuditEventType::VoteRecorded, Some(&approver.user_id));

        match vote.outcome {
            QuorumOutcome::Approved => {
                self.audit(&vote.activity, AuditEventType::ActivityApproved, None);
                Ok(self.dispatch_absorbing(vote.activity).await)
            }
            QuorumOutcome::Rejected { reason } => {
                tracing::info!(
                    activity_id = %vote.activity.activity_id,
                    reason = %reason,
                    "Activity rejected by quorum"
                );
                self.audit(&vote.activity, AuditEventType::ActivityRejected, None);
                Ok(vote.activity)
            }
            QuorumOutcome::Pending { .. } => Ok(vote.activity),
        }
    }

    /// Approvers holding API keys must sign `org:activity:decision`.
    fn verify_approval_signature(
        &self,
        approver: &User,
        activity: &Activity,
        decision: ProofDecision,
        signature: Option<&str>,
    ) -> Result<(), ActivityError> {
        let message = approval_message(&activity.organization_id, &activity.activity_id, decision);
        match verify_api_key_signature(&self.db, &approver.user_id, message.as_bytes(), signature)? {
            KeyCheck::NoKeys | KeyCheck::Valid => Ok(()),
            KeyCheck::Invalid => Err(ActivityError::Unauthorized(
                "invalid approval signature".to_string(),
            )),
        }
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Execute an `approved` activity against the enclave.
    ///
    /// Fails fast with `LockContention` if another worker holds the lock.
    pub async fn dispatch(
        &self,
        organization_id: &str,
        activity_id: &str,
    ) -> Result<Activity, ActivityError> {
        let activity = self.get_activity(organization_id, activity_id)?;
        if activity.status != ActivityStatus::Approved {
            return Err(ActivityError::ActivityNotPending {
                activity_id: activity.activity_id,
                status: activity.status,
            });
        }

        let key = DistributedLock::activity_key(organization_id, activity_id);
        let guard = self.locks.acquire(&key).await?;
        let result = self.dispatch_locked(&guard, activity_id).await;
        if let Err(e) = guard.release().await {
            tracing::warn!(activity_id = %activity_id, error = %e, "Failed to release dispatch lock");
        }
        result
    }

    async fn dispatch_locked(
        &self,
        guard: &LockGuard,
        activity_id: &str,
    ) -> Result<Activity, ActivityError> {
        // Re-read under the lock: another worker may have finished it.
        let activity = self
            .db
            .get_activity(activity_id)?
            .ok_or_else(|| ActivityError::NotFound(format!("Activity {activity_id}")))?;
        if activity.status != ActivityStatus::Approved {
            return Err(ActivityError::ActivityNotPending {
                activity_id: activity.activity_id,
                status: activity.status,
            });
        }

        let request = match self.prepare_request(&activity) {
            Ok(request) => request,
            Err(ActivityError::InvalidPayload(message)) => {
                self.fail(activity_id, "invalid_payload", &message)?;
                return Err(ActivityError::InvalidPayload(message));
            }
            Err(e) => return Err(e),
        };

        tracing::info!(
            activity_id = %activity_id,
            organization_id = %activity.organization_id,
            attempt = activity.dispatch_attempts + 1,
            "Dispatching activity to enclave"
        );
        let call = tokio::time::timeout(self.config.enclave_timeout, self.execute(&request));
        match guard.hold_while(call).await {
            Err(lost) => {
                self.record_unavailable(activity_id, &lost.to_string())?;
                Err(lost.into())
            }
            Ok(Err(_elapsed)) => {
                let message = format!(
                    "enclave call exceeded {}ms deadline",
                    self.config.enclave_timeout.as_millis()
                );
                self.record_unavailable(activity_id, &message)?;
                Err(ActivityError::EnclaveUnavailable(message))
            }
            Ok(Ok(Err(EnclaveError::Unavailable(message)))) => {
                self.record_unavailable(activity_id, &message)?;
                Err(ActivityError::EnclaveUnavailable(message))
            }
            Ok(Ok(Err(EnclaveError::Rejected(message)))) => {
                self.fail(activity_id, "enclave_rejected", &message)?;
                Err(ActivityError::EnclaveRejected(message))
            }
            Ok(Ok(Ok(output))) => self.complete(activity_id, output),
        }
    }

    /// Dispatch inline after approval, keeping the activity state on error.
    async fn dispatch_absorbing(&self, activity: Activity) -> Activity {
        match self
            .dispatch(&activity.organization_id, &activity.activity_id)
            .await
        {
            Ok(done) => done,
            Err(e) => {
                tracing::warn!(
                    activity_id = %activity.activity_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Inline dispatch did not complete"
                );
                self.db
                    .get_activity(&activity.activity_id)
                    .ok()
                    .flatten()
                    .unwrap_or(activity)
            }
        }
    }

    fn prepare_request(&self, activity: &Activity) -> Result<EnclaveRequest, ActivityError> {
        let org = activity.organization_id.clone();
        let activity_id = activity.activity_id.clone();
        Ok(match &activity.payload {
            ActivityPayload::CreateWallet(intent) => EnclaveRequest::Wallet(WalletSpec {
                wallet_id: derived_resource_id(&activity_id),
                activity_id,
                organization_id: org,
                accounts: intent.accounts.clone(),
            }),
            ActivityPayload::CreatePrivateKey(intent) => {
                EnclaveRequest::PrivateKey(PrivateKeySpec {
                    private_key_id: derived_resource_id(&activity_id),
                    activity_id,
                    organization_id: org,
                    curve: intent.curve,
                })
            }
            ActivityPayload::SignTransaction(intent) => {
                let (key, _) = self.resolve_signer(&org, &intent.sign_with)?;
                let bytes = intent.transaction_bytes()?;
                EnclaveRequest::Sign(
                    key,
                    SignPayload {
                        activity_id,
                        organization_id: org,
                        kind: SignKind::Transaction,
                        payload: alloy::hex::encode(bytes),
                        hash_function: HashFunction::Keccak256,
                    },
                )
            }
            ActivityPayload::SignRawPayload(intent) => {
                let (key, _) = self.resolve_signer(&org, &intent.sign_with)?;
                let bytes = intent.payload_bytes()?;
                EnclaveRequest::Sign(
                    key,
                    SignPayload {
                        activity_id,
                        organization_id: org,
                        kind: SignKind::RawPayload,
                        payload: alloy::hex::encode(bytes),
                        hash_function: intent.hash_function,
                    },
                )
            }
        })
    }

    async fn execute(&self, request: &EnclaveRequest) -> Result<EnclaveOutput, EnclaveError> {
        match request {
            EnclaveRequest::Wallet(spec) => {
                let material = self.enclave.create_wallet(spec).await?;
                if material.accounts.len() != spec.accounts.len() {
                    return Err(EnclaveError::Rejected(format!(
                        "enclave returned {} accounts, expected {}",
                        material.accounts.len(),
                        spec.accounts.len()
                    )));
                }
                Ok(EnclaveOutput::Wallet(material))
            }
            EnclaveRequest::PrivateKey(spec) => self
                .enclave
                .create_private_key(spec)
                .await
                .map(EnclaveOutput::PrivateKey),
            EnclaveRequest::Sign(key, payload) => self
                .enclave
                .sign(key, payload)
                .await
                .map(EnclaveOutput::Signature),
        }
    }

    /// Commit the enclave output, materializing rows, and move to `completed`.
    fn complete(&self, activity_id: &str, output: EnclaveOutput) -> Result<Activity, ActivityError> {
        let completed = self.db.update_activity(activity_id, |txn| {
            let now = Utc::now();
            let org = txn.activity.organization_id.clone();
            let resource_id = derived_resource_id(activity_id);
            let payload = txn.activity.payload.clone();

            let (result, attested) = match (&payload, output) {
                (ActivityPayload::CreateWallet(intent), EnclaveOutput::Wallet(material)) => {
                    let accounts: Vec<WalletAccount> = intent
                        .accounts
                        .iter()
                        .zip(material.accounts)
                        .map(|(params, account)| WalletAccount {
                            account_id: derived_resource_id(&format!(
                                "{resource_id}/{}",
                                params.path
                            )),
                            wallet_id: resource_id.clone(),
                            organization_id: org.clone(),
                            curve: params.curve,
                            path: params.path.clone(),
                            address_format: params.address_format,
                            address: account.address,
                            public_key: account.public_key,
                        })
                        .collect();
                    let attested =
                        format!("wallet {resource_id} public key {}", material.root_public_key);
                    let wallet = Wallet {
                        wallet_id: resource_id.clone(),
                        organization_id: org.clone(),
                        name: intent.wallet_name.trim().to_string(),
                        public_key: Some(material.root_public_key),
                        tags: intent.tags.clone(),
                        active: true,
                        activity_id: activity_id.to_string(),
                        created_at: now,
                    };
                    let addresses = accounts.iter().map(|a| a.address.clone()).collect();
                    txn.insert_wallet(wallet, accounts);
                    let result = ActivityResult::CreateWallet {
                        wallet_id: resource_id,
                        addresses,
                    };
                    (result, attested)
                }
                (ActivityPayload::CreatePrivateKey(intent), EnclaveOutput::PrivateKey(material)) => {
                    let key = PrivateKey {
                        private_key_id: resource_id.clone(),
                        organization_id: org.clone(),
                        wallet_id: intent.wallet_id.clone(),
                        name: intent.private_key_name.trim().to_string(),
                        public_key: material.public_key.clone(),
                        curve: intent.curve,
                        path: None,
                        tags: intent.tags.clone(),
                        active: true,
                        activity_id: activity_id.to_string(),
                        created_at: now,
                    };
                    txn.insert_private_key(key);
                    let attested =
                        format!("private key {resource_id} public key {}", material.public_key);
                    let result = ActivityResult::CreatePrivateKey {
                        private_key_id: resource_id,
                        public_key: material.public_key,
                    };
                    (result, attested)
                }
                (
                    ActivityPayload::SignTransaction(_) | ActivityPayload::SignRawPayload(_),
                    EnclaveOutput::Signature(material),
                ) => {
                    let digest = keccak256(material.signature.as_bytes());
                    let attested = format!("signature digest {digest}");
                    let result = ActivityResult::Signature {
                        signature: material.signature,
                    };
                    (result, attested)
                }
                _ => {
                    return Err(ActivityError::from(StorageError::Corrupted(format!(
                        "enclave output does not match activity {activity_id}"
                    ))))
                }
            };

            let proof = self.proofs.issue(
                &txn.activity,
                ProofSource::System {
                    component: "enclave".to_string(),
                },
                ProofDecision::Approve,
                None,
                Some(attested),
            );
            txn.activity.result = Some(result);
            txn.activity.last_dispatch_error = None;
            txn.activity.dispatch_attempts += 1;
            txn.activity.transition(ActivityStatus::Completed)?;
            txn.append_proof(proof);
            Ok(txn.activity.clone())
        })?;

        tracing::info!(
            activity_id = %activity_id,
            organization_id = %completed.organization_id,
            "Activity completed"
        );
        self.audit(&completed, AuditEventType::ActivityCompleted, None);
        Ok(completed)
    }

    /// Keep the activity `approved` and note the retryable failure.
    fn record_unavailable(&self, activity_id: &str, message: &str) -> Result<(), ActivityError> {
        self.db.update_activity(activity_id, |txn| {
            txn.activity.last_dispatch_error = Some(message.to_string());
            txn.activity.dispatch_attempts += 1;
            txn.activity.updated_at = Utc::now();
            Ok::<_, ActivityError>(())
        })?;
        tracing::warn!(
            activity_id = %activity_id,
            error = %message,
            "Enclave unavailable, activity stays approved"
        );
        Ok(())
    }

    /// Terminal dispatch failure with a system proof.
    fn fail(&self, activity_id: &str, code: &str, message: &str) -> Result<Activity, ActivityError> {
        let failed = self.db.update_activity(activity_id, |txn| {
            let proof = self.proofs.issue(
                &txn.activity,
                ProofSource::System {
                    component: "enclave".to_string(),
                },
                ProofDecision::Reject,
                None,
                Some(message.to_string()),
            );
            txn.activity.failure = Some(ActivityFailure {
                code: code.to_string(),
                message: message.to_string(),
            });
            txn.activity.dispatch_attempts += 1;
            txn.activity.transition(ActivityStatus::Failed)?;
            txn.append_proof(proof);
            Ok::<_, ActivityError>(txn.activity.clone())
        })?;
        tracing::warn!(
            activity_id = %activity_id,
            code = %code,
            error = %message,
            "Activity failed"
        );
        self.audit(&failed, AuditEventType::ActivityFailed, None);
        Ok(failed)
    }

    fn reject_by_system(
        &self,
        activity_id: &str,
        component: &str,
        reason: String,
    ) -> Result<Activity, ActivityError> {
        let rejected = self.db.update_activity(activity_id, |txn| {
            let proof = self.proofs.issue(
                &txn.activity,
                ProofSource::System {
                    component: component.to_string(),
                },
                ProofDecision::Reject,
                None,
                Some(reason.clone()),
            );
            txn.activity.transition(ActivityStatus::Rejected)?;
            txn.append_proof(proof);
            Ok::<_, ActivityError>(txn.activity.clone())
        })?;
        self.audit(&rejected, AuditEventType::ActivityRejected, None);
        Ok(rejected)
    }

    // =========================================================================
    // Sweeps
    // =========================================================================

    /// Reject activities that waited in `needs_quorum` past the approval TTL.
    pub fn expire_stale(&self) -> Result<usize, ActivityError> {
        let ttl = chrono::Duration::from_std(self.config.approval_ttl)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let cutoff = Utc::now() - ttl;
        let mut expired = 0;

        for activity in self.db.list_open_activities()? {
            if activity.status != ActivityStatus::NeedsQuorum {
                continue;
            }
            let entered = activity
                .status_history
                .last()
                .map(|c| c.at)
                .unwrap_or(activity.created_at);
            if entered > cutoff {
                continue;
            }

            let outcome = self.db.update_activity(&activity.activity_id, |txn| {
                if txn.activity.status != ActivityStatus::NeedsQuorum {
                    return Ok::<_, ActivityError>(None);
                }
                let proof = self.proofs.issue(
                    &txn.activity,
                    ProofSource::System {
                        component: "sweeper".to_string(),
                    },
                    ProofDecision::Reject,
                    None,
                    Some("approval window expired".to_string()),
                );
                txn.activity.transition(ActivityStatus::Rejected)?;
                txn.append_proof(proof);
                Ok(Some(txn.activity.clone()))
            });
            match outcome {
                Ok(Some(rejected)) => {
                    tracing::info!(
                        activity_id = %rejected.activity_id,
                        organization_id = %rejected.organization_id,
                        "Activity expired awaiting quorum"
                    );
                    self.audit(&rejected, AuditEventType::ActivityExpired, None);
                    expired += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(activity_id = %activity.activity_id, error = %e, "Failed to expire activity");
                }
            }
        }
        Ok(expired)
    }

    /// Re-drive activities stuck in `pending` or `approved`.
    ///
    /// `pending` activities older than `min_age` are re-evaluated (a crash
    /// may have interrupted evaluation). `approved` ones are dispatched
    /// again. Returns the number of activities that reached a new state.
    pub async fn resume_open(&self, min_age: Duration) -> Result<usize, ActivityError> {
        let min_age = chrono::Duration::from_std(min_age).unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = Utc::now() - min_age;
        let mut progressed = 0;

        for activity in self.db.list_open_activities()? {
            if activity.updated_at > cutoff {
                continue;
            }
            let id = activity.activity_id.clone();
            let before = activity.status;
            let result = match activity.status {
                ActivityStatus::Pending => self.evaluate(activity).await,
                ActivityStatus::Approved => {
                    self.dispatch(&activity.organization_id, &activity.activity_id)
                        .await
                }
                _ => continue,
            };
            match result {
                Ok(after) if after.status != before => progressed += 1,
                Ok(_) => {}
                Err(ActivityError::LockContention(_)) => {
                    tracing::debug!(activity_id = %id, "Activity busy, skipping");
                }
                Err(e) => {
                    tracing::warn!(activity_id = %id, error = %e, "Failed to resume activity");
                }
            }
        }
        Ok(progressed)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get_activity(
        &self,
        organization_id: &str,
        activity_id: &str,
    ) -> Result<Activity, ActivityError> {
        self.db
            .get_activity(activity_id)?
            .filter(|a| a.organization_id == organization_id)
            .ok_or_else(|| ActivityError::NotFound(format!("Activity {activity_id}")))
    }

    pub fn list_activities(
        &self,
        organization_id: &str,
        filter: &ActivityFilter,
    ) -> Result<Vec<Activity>, ActivityError> {
        let query = ActivityQuery {
            status: filter.status,
            activity_type: filter.activity_type,
            limit: filter
                .limit
                .unwrap_or(DEFAULT_LIST_LIMIT)
                .clamp(1, MAX_LIST_LIMIT),
        };
        Ok(self.db.list_activities(organization_id, &query)?)
    }

    pub fn list_proofs(
        &self,
        organization_id: &str,
        activity_id: &str,
    ) -> Result<Vec<Proof>, ActivityError> {
        self.get_activity(organization_id, activity_id)?;
        Ok(self.db.list_proofs(activity_id)?)
    }

    pub fn get_quorum(
        &self,
        organization_id: &str,
        activity_id: &str,
    ) -> Result<Option<Quorum>, ActivityError> {
        self.get_activity(organization_id, activity_id)?;
        Ok(self.db.get_quorum(activity_id)?)
    }

    // =========================================================================
    // Convenience Wrappers
    // =========================================================================

    pub async fn create_wallet(
        &self,
        organization_id: &str,
        requester_id: &str,
        intent: CreateWalletIntent,
        idempotency_key: Option<String>,
    ) -> Result<Activity, ActivityError> {
        self.submit(SubmitActivity {
            organization_id: organization_id.to_string(),
            requester_id: requester_id.to_string(),
            activity_type: ActivityType::CreateWallet,
            parameters: serde_json::to_value(intent)
                .map_err(|e| ActivityError::InvalidPayload(e.to_string()))?,
            idempotency_key,
        })
        .await
    }

    pub async fn create_private_key(
        &self,
        organization_id: &str,
        requester_id: &str,
        intent: CreatePrivateKeyIntent,
        idempotency_key: Option<String>,
    ) -> Result<Activity, ActivityError> {
        self.submit(SubmitActivity {
            organization_id: organization_id.to_string(),
            requester_id: requester_id.to_string(),
            activity_type: ActivityType::CreatePrivateKey,
            parameters: serde_json::to_value(intent)
                .map_err(|e| ActivityError::InvalidPayload(e.to_string()))?,
            idempotency_key,
        })
        .await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Active user of `organization_id`, or `Unauthorized`.
    fn load_member(&self, organization_id: &str, user_id: &str) -> Result<User, ActivityError> {
        match self.db.get_user(user_id)? {
            Some(user) if user.organization_id == organization_id && user.active => Ok(user),
            _ => Err(ActivityError::Unauthorized(format!(
                "user {user_id} is not an active member of organization {organization_id}"
            ))),
        }
    }

    /// Database-dependent payload checks.
    fn check_references(
        &self,
        organization_id: &str,
        payload: &ActivityPayload,
    ) -> Result<(), ActivityError> {
        for tag_id in payload.new_resource_tags() {
            let known = self
                .db
                .get_tag(tag_id)?
                .is_some_and(|t| t.organization_id == organization_id);
            if !known {
                return Err(ActivityError::InvalidPayload(format!("unknown tag {tag_id}")));
            }
        }
        self.resource_tags(organization_id, payload)?;
        Ok(())
    }

    /// Tags of the resource an activity creates or uses.
    fn resource_tags(
        &self,
        organization_id: &str,
        payload: &ActivityPayload,
    ) -> Result<Vec<String>, ActivityError> {
        match payload {
            ActivityPayload::CreateWallet(intent) => Ok(intent.tags.clone()),
            ActivityPayload::CreatePrivateKey(intent) => {
                let mut tags = intent.tags.clone();
                if let Some(wallet_id) = &intent.wallet_id {
                    let wallet = self.load_wallet(organization_id, wallet_id)?;
                    tags.extend(wallet.tags);
                }
                Ok(tags)
            }
            ActivityPayload::SignTransaction(_) | ActivityPayload::SignRawPayload(_) => {
                let sign_with = payload.sign_with().unwrap_or_default();
                let (_, tags) = self.resolve_signer(organization_id, sign_with)?;
                Ok(tags)
            }
        }
    }

    fn load_wallet(&self, organization_id: &str, wallet_id: &str) -> Result<Wallet, ActivityError> {
        self.db
            .get_wallet(wallet_id)?
            .filter(|w| w.organization_id == organization_id && w.active)
            .ok_or_else(|| ActivityError::InvalidPayload(format!("unknown wallet {wallet_id}")))
    }

    /// Resolve `sign_with` (private key id or account address) to a key.
    fn resolve_signer(
        &self,
        organization_id: &str,
        sign_with: &str,
    ) -> Result<(KeyRef, Vec<String>), ActivityError> {
        if let Some(key) = self.db.get_private_key(sign_with)? {
            if key.organization_id == organization_id && key.active {
                return Ok((
                    KeyRef::PrivateKey {
                        private_key_id: key.private_key_id,
                        curve: key.curve,
                    },
                    key.tags,
                ));
            }
        }
        if let Some(account) = self.db.find_account_by_address(organization_id, sign_with)? {
            let wallet = self.load_wallet(organization_id, &account.wallet_id)?;
            return Ok((
                KeyRef::WalletAccount {
                    wallet_id: account.wallet_id,
                    path: account.path,
                    curve: account.curve,
                },
                wallet.tags,
            ));
        }
        Err(ActivityError::InvalidPayload(format!(
            "unknown or inactive signing key {sign_with}"
        )))
    }

    fn audit(&self, activity: &Activity, event_type: AuditEventType, user_id: Option<&str>) {
        let mut event = AuditEvent::new(&activity.organization_id, event_type)
            .with_resource("activity", &activity.activity_id)
            .with_details(serde_json::json!({
                "activity_type": activity.activity_type,
                "status": activity.status,
            }));
        if let Some(user_id) = user_id {
            event = event.with_user(user_id);
        }
        if let Err(e) = self.db.log_audit(&event) {
            tracing::warn!(error = %e, "Failed to write audit event");
        }
    }

    fn audit_denied(&self, user: &User, activity_type: ActivityType) {
        let event = AuditEvent::new(&user.organization_id, AuditEventType::PermissionDenied)
            .with_user(&user.user_id)
            .with_details(serde_json::json!({ "activity_type": activity_type }))
            .failed("role may not submit this activity type");
        if let Err(e) = self.db.log_audit(&event) {
            tracing::warn!(error = %e, "Failed to write audit event");
        }
    }
}

/// Resolve a submission whose idempotency key was already used.
fn replayed(existing: Activity, payload: &ActivityPayload) -> Result<Activity, ActivityError> {
    if existing.payload != *payload {
        return Err(ActivityError::InvalidPayload(format!(
            "idempotency key already used for a different request (activity {})",
            existing.activity_id
        )));
    }
    tracing::info!(
        activity_id = %existing.activity_id,
        organization_id = %existing.organization_id,
        "Duplicate submission resolved by idempotency key"
    );
    Ok(existing)
}
