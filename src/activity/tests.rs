// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! End-to-end activity scenarios against the simulated enclave.

use std::time::Duration;

use k256::ecdsa::signature::Signer;
use k256::ecdsa::Signature;
use serde_json::json;

use super::*;
use crate::auth::Role;
use crate::enclave::EnclaveError;
use crate::policy::{Approvers, PolicyEffect};
use crate::testing::{test_config, wallet_params, Harness};

fn submit(h: &Harness, activity_type: ActivityType, parameters: serde_json::Value) -> SubmitActivity {
    SubmitActivity {
        organization_id: h.org.organization_id.clone(),
        requester_id: h.admin.user_id.clone(),
        activity_type,
        parameters,
        idempotency_key: None,
    }
}

fn vote(h: &Harness, activity: &Activity, approver: &str, decision: ProofDecision) -> RecordApproval {
    RecordApproval {
        organization_id: h.org.organization_id.clone(),
        activity_id: activity.activity_id.clone(),
        approver_id: approver.to_string(),
        decision,
        signature: None,
    }
}

fn quorum(threshold: u32) -> PolicyEffect {
    PolicyEffect::RequireQuorum {
        threshold,
        approvers: Approvers::default(),
        required_approvers: vec![],
        rejection_tolerance: None,
    }
}

async fn create_key(h: &Harness) -> String {
    let activity = h
        .engine
        .submit(submit(
            h,
            ActivityType::CreatePrivateKey,
            json!({ "private_key_name": "hot", "curve": "secp256k1" }),
        ))
        .await
        .unwrap();
    assert_eq!(activity.status, ActivityStatus::Completed);
    match activity.result {
        Some(ActivityResult::CreatePrivateKey { private_key_id, .. }) => private_key_id,
        other => panic!("unexpected result {other:?}"),
    }
}

#[tokio::test]
async fn auto_approved_wallet_completes_with_rows() {
    let h = Harness::new(0, 0);
    let activity = h
        .engine
        .submit(submit(&h, ActivityType::CreateWallet, wallet_params("treasury")))
        .await
        .unwrap();

    assert_eq!(activity.status, ActivityStatus::Completed);
    let statuses: Vec<_> = activity.status_history.iter().map(|c| c.status).collect();
    assert_eq!(
        statuses,
        vec![ActivityStatus::Pending, ActivityStatus::Approved, ActivityStatus::Completed]
    );

    let Some(ActivityResult::CreateWallet { wallet_id, addresses }) = activity.result else {
        panic!("missing wallet result");
    };
    let wallet = h.db.get_wallet(&wallet_id).unwrap().unwrap();
    assert_eq!(wallet.activity_id, activity.activity_id);
    assert_eq!(wallet.name, "treasury");
    assert!(wallet.public_key.as_ref().is_some_and(|k| !k.is_empty()));
    let accounts = h.db.list_wallet_accounts(&wallet_id).unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].address, addresses[0]);

    let proofs = h.engine.list_proofs("org-1", &activity.activity_id).unwrap();
    assert_eq!(proofs.len(), 2);
    assert!(proofs.iter().all(|p| p.decision == ProofDecision::Approve));
    assert!(proofs.iter().all(|p| h.engine.proof_signer().verify(p)));
    assert!(proofs
        .iter()
        .any(|p| matches!(p.source, ProofSource::Policy { policy_id: None })));
    let completion = proofs
        .iter()
        .find(|p| matches!(&p.source, ProofSource::System { component } if component == "enclave"))
        .expect("completion proof");
    assert!(completion.reason.as_deref().unwrap().contains(&wallet_id));
}

#[tokio::test]
async fn default_quorum_two_of_three() {
    let h = Harness::new(2, 3);
    let activity = h
        .engine
        .submit(submit(&h, ActivityType::CreateWallet, wallet_params("cold")))
        .await
        .unwrap();
    assert_eq!(activity.status, ActivityStatus::NeedsQuorum);
    assert_eq!(h.enclave.calls(), 0);
    assert!(h.db.list_wallets("org-1").unwrap().is_empty());

    let a = &h.approvers;
    let after_one = h
        .engine
        .record_approval(vote(&h, &activity, &a[0].user_id, ProofDecision::Approve))
        .await
        .unwrap();
    assert_eq!(after_one.status, ActivityStatus::NeedsQuorum);

    let after_two = h
        .engine
        .record_approval(vote(&h, &activity, &a[1].user_id, ProofDecision::Approve))
        .await
        .unwrap();
    assert_eq!(after_two.status, ActivityStatus::Completed);
    assert_eq!(h.enclave.calls(), 1);
    let wallets = h.db.list_wallets("org-1").unwrap();
    assert_eq!(wallets.len(), 1);
    assert!(wallets[0].public_key.as_ref().is_some_and(|k| !k.is_empty()));

    let late = h
        .engine
        .record_approval(vote(&h, &activity, &a[2].user_id, ProofDecision::Approve))
        .await;
    assert!(matches!(late, Err(ActivityError::ActivityNotPending { .. })));
    assert_eq!(h.enclave.calls(), 1);

    let proofs = h.engine.list_proofs("org-1", &activity.activity_id).unwrap();
    assert_eq!(proofs.len(), 3);
    let voters = proofs
        .iter()
        .filter(|p| matches!(p.source, ProofSource::User { .. }))
        .count();
    assert_eq!(voters, 2);
    assert!(proofs.iter().any(|p| {
        matches!(&p.source, ProofSource::System { component } if component == "enclave")
            && p.decision == ProofDecision::Approve
    }));
}

#[tokio::test]
async fn votes_are_checked_before_counting() {
    let h = Harness::new(2, 2);
    let outsider = h.add_user("outsider", Role::Approver, &[]);
    let activity = h
        .engine
        .submit(submit(&h, ActivityType::CreateWallet, wallet_params("w")))
        .await
        .unwrap();

    let err = h
        .engine
        .record_approval(vote(&h, &activity, &outsider.user_id, ProofDecision::Approve))
        .await
        .unwrap_err();
    assert!(matches!(err, ActivityError::NotAQuorumMember { .. }));

    let first = &h.approvers[0].user_id;
    h.engine
        .record_approval(vote(&h, &activity, first, ProofDecision::Approve))
        .await
        .unwrap();
    let err = h
        .engine
        .record_approval(vote(&h, &activity, first, ProofDecision::Approve))
        .await
        .unwrap_err();
    assert!(matches!(err, ActivityError::AlreadyDecided { .. }));

    let mut other_org = vote(&h, &activity, first, ProofDecision::Approve);
    other_org.organization_id = "org-2".into();
    let err = h.engine.record_approval(other_org).await.unwrap_err();
    assert!(matches!(err, ActivityError::NotFound(_)));
}

#[tokio::test]
async fn rejection_is_terminal() {
    let h = Harness::new(2, 3);
    let activity = h
        .engine
        .submit(submit(&h, ActivityType::CreateWallet, wallet_params("w")))
        .await
        .unwrap();

    let rejected = h
        .engine
        .record_approval(vote(&h, &activity, &h.approvers[0].user_id, ProofDecision::Reject))
        .await
        .unwrap();
    assert_eq!(rejected.status, ActivityStatus::Rejected);

    let err = h
        .engine
        .record_approval(vote(&h, &activity, &h.approvers[1].user_id, ProofDecision::Approve))
        .await
        .unwrap_err();
    assert!(matches!(err, ActivityError::ActivityNotPending { .. }));
    assert_eq!(h.enclave.calls(), 0);
    assert!(h.db.list_wallets("org-1").unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_dispatch_once() {
    let h = Harness::new(3, 5);
    h.enclave.set_delay(Some(Duration::from_millis(20)));
    let activity = h
        .engine
        .submit(submit(&h, ActivityType::CreateWallet, wallet_params("w")))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for approver in &h.approvers {
        let engine = h.engine.clone();
        let request = vote(&h, &activity, &approver.user_id, ProofDecision::Approve);
        tasks.push(tokio::spawn(async move { engine.record_approval(request).await }));
    }
    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(ActivityError::ActivityNotPending { .. }) => {}
            Err(e) => panic!("unexpected error {e}"),
        }
    }

    assert!(accepted >= 3);
    let done = h.engine.get_activity("org-1", &activity.activity_id).unwrap();
    assert_eq!(done.status, ActivityStatus::Completed);
    assert_eq!(h.enclave.calls(), 1);
    assert_eq!(h.db.list_wallets("org-1").unwrap().len(), 1);
    let approvals = h
        .engine
        .list_proofs("org-1", &activity.activity_id)
        .unwrap()
        .into_iter()
        .filter(|p| {
            p.decision == ProofDecision::Approve && matches!(p.source, ProofSource::User { .. })
        })
        .count();
    assert_eq!(approvals, accepted);
}

#[tokio::test]
async fn idempotency_key_returns_original() {
    let h = Harness::new(2, 2);
    let mut request = submit(&h, ActivityType::CreateWallet, wallet_params("w"));
    request.idempotency_key = Some("req-1".into());

    let first = h.engine.submit(request.clone()).await.unwrap();
    let second = h.engine.submit(request.clone()).await.unwrap();
    assert_eq!(first.activity_id, second.activity_id);

    request.idempotency_key = Some("req-2".into());
    let third = h.engine.submit(request).await.unwrap();
    assert_ne!(first.activity_id, third.activity_id);

    let mut different = submit(&h, ActivityType::CreateWallet, wallet_params("other"));
    different.idempotency_key = Some("req-1".into());
    let err = h.engine.submit(different).await.unwrap_err();
    assert!(matches!(err, ActivityError::InvalidPayload(_)));

    let all = h
        .engine
        .list_activities("org-1", &ActivityFilter::default())
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn idempotent_retry_skips_rate_limit() {
    let mut config = test_config();
    config.rate_limit_max = 1;
    let h = Harness::with_config(0, 0, config);
    let mut request = submit(&h, ActivityType::CreateWallet, wallet_params("w"));
    request.idempotency_key = Some("req-1".into());

    let first = h.engine.submit(request.clone()).await.unwrap();
    let replay = h.engine.submit(request.clone()).await.unwrap();
    assert_eq!(replay.activity_id, first.activity_id);
    assert_eq!(replay.status, ActivityStatus::Completed);
    assert_eq!(h.enclave.calls(), 1);

    request.idempotency_key = Some("req-2".into());
    let err = h.engine.submit(request).await.unwrap_err();
    assert!(matches!(err, ActivityError::RateLimited { .. }));
}

#[tokio::test]
async fn enclave_timeout_keeps_activity_approved() {
    let mut config = test_config();
    config.enclave_timeout = Duration::from_millis(50);
    let h = Harness::with_config(0, 0, config);
    h.enclave.set_delay(Some(Duration::from_millis(500)));

    let activity = h
        .engine
        .submit(submit(&h, ActivityType::CreateWallet, wallet_params("w")))
        .await
        .unwrap();
    assert_eq!(activity.status, ActivityStatus::Approved);
    assert_eq!(activity.dispatch_attempts, 1);
    assert!(activity.last_dispatch_error.is_some());
    assert!(h.db.list_wallets("org-1").unwrap().is_empty());

    h.enclave.set_delay(None);
    let done = h
        .engine
        .dispatch("org-1", &activity.activity_id)
        .await
        .unwrap();
    assert_eq!(done.status, ActivityStatus::Completed);
    assert_eq!(done.dispatch_attempts, 2);
    assert!(done.last_dispatch_error.is_none());
    assert_eq!(h.db.list_wallets("org-1").unwrap().len(), 1);

    let again = h.engine.dispatch("org-1", &activity.activity_id).await;
    assert!(matches!(again, Err(ActivityError::ActivityNotPending { .. })));
    assert_eq!(h.db.list_wallets("org-1").unwrap().len(), 1);
}

#[tokio::test]
async fn unavailable_enclave_is_retried_by_sweeper() {
    let h = Harness::new(0, 0);
    h.enclave
        .fail_next(EnclaveError::Unavailable("connection refused".into()));

    let activity = h
        .engine
        .submit(submit(
            &h,
            ActivityType::CreatePrivateKey,
            json!({ "private_key_name": "k", "curve": "secp256k1" }),
        ))
        .await
        .unwrap();
    assert_eq!(activity.status, ActivityStatus::Approved);

    let sweeper = ActivitySweeper::new(h.engine.clone()).with_resume_after(Duration::ZERO);
    let (expired, progressed) = sweeper.sweep().await;
    assert_eq!((expired, progressed), (0, 1));

    let done = h.engine.get_activity("org-1", &activity.activity_id).unwrap();
    assert_eq!(done.status, ActivityStatus::Completed);
    assert_eq!(h.db.list_private_keys("org-1").unwrap().len(), 1);
}

#[tokio::test]
async fn stranded_pending_activity_is_evaluated_by_sweeper() {
    let h = Harness::new(0, 0);
    let payload = ActivityPayload::parse(ActivityType::CreateWallet, wallet_params("w")).unwrap();
    let stranded = Activity::new("org-1", &h.admin.user_id, payload, None);
    h.db.create_activity(&stranded).unwrap();
    assert_eq!(h.enclave.calls(), 0);

    let sweeper = ActivitySweeper::new(h.engine.clone()).with_resume_after(Duration::ZERO);
    let (expired, progressed) = sweeper.sweep().await;
    assert_eq!((expired, progressed), (0, 1));

    let done = h.engine.get_activity("org-1", &stranded.activity_id).unwrap();
    assert_eq!(done.status, ActivityStatus::Completed);
    assert_eq!(h.enclave.calls(), 1);
    assert_eq!(h.db.list_wallets("org-1").unwrap().len(), 1);

    // Nothing left to resume.
    assert_eq!(sweeper.sweep().await, (0, 0));
}

#[tokio::test]
async fn stranded_pending_activity_waits_for_quorum() {
    let h = Harness::new(1, 2);
    let payload = ActivityPayload::parse(ActivityType::CreateWallet, wallet_params("w")).unwrap();
    let stranded = Activity::new("org-1", &h.admin.user_id, payload, None);
    h.db.create_activity(&stranded).unwrap();

    let sweeper = ActivitySweeper::new(h.engine.clone()).with_resume_after(Duration::ZERO);
    sweeper.sweep().await;

    let waiting = h.engine.get_activity("org-1", &stranded.activity_id).unwrap();
    assert_eq!(waiting.status, ActivityStatus::NeedsQuorum);
    assert_eq!(h.enclave.calls(), 0);
    assert!(h.db.get_quorum(&stranded.activity_id).unwrap().is_some());
}

#[tokio::test]
async fn enclave_rejection_fails_activity() {
    let h = Harness::new(0, 0);
    let activity = h
        .engine
        .submit(submit(
            &h,
            ActivityType::CreatePrivateKey,
            json!({ "private_key_name": "k", "curve": "ed25519" }),
        ))
        .await
        .unwrap();

    assert_eq!(activity.status, ActivityStatus::Failed);
    let failure = activity.failure.unwrap();
    assert_eq!(failure.code, "enclave_rejected");
    assert!(h.db.list_private_keys("org-1").unwrap().is_empty());

    let proofs = h.engine.list_proofs("org-1", &activity.activity_id).unwrap();
    let last = proofs.last().unwrap();
    assert_eq!(last.decision, ProofDecision::Reject);
    assert!(matches!(&last.source, ProofSource::System { component } if component == "enclave"));
}

#[tokio::test]
async fn deny_policy_rejects_with_proof() {
    let h = Harness::new(0, 0);
    let policy = h.add_policy(
        "no-raw",
        &[ActivityType::SignRawPayload],
        PolicyEffect::Deny {
            reason: Some("raw signing disabled".into()),
        },
    );
    let key_id = create_key(&h).await;

    let activity = h
        .engine
        .submit(submit(
            &h,
            ActivityType::SignRawPayload,
            json!({
                "sign_with": key_id,
                "payload": "hello",
                "encoding": "text_utf8",
                "hash_function": "sha256"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(activity.status, ActivityStatus::Rejected);

    let proofs = h.engine.list_proofs("org-1", &activity.activity_id).unwrap();
    assert_eq!(proofs.len(), 1);
    assert_eq!(proofs[0].reason.as_deref(), Some("raw signing disabled"));
    assert_eq!(
        proofs[0].source,
        ProofSource::Policy {
            policy_id: Some(policy.policy_id)
        }
    );
}

#[tokio::test]
async fn stricter_quorum_policy_wins() {
    let h = Harness::new(0, 3);
    h.add_policy("q1", &[ActivityType::SignRawPayload], quorum(1));
    h.add_policy("q3", &[ActivityType::SignRawPayload], quorum(3));
    let key_id = create_key(&h).await;

    let activity = h
        .engine
        .submit(submit(
            &h,
            ActivityType::SignRawPayload,
            json!({
                "sign_with": key_id,
                "payload": "0x00ff",
                "encoding": "hexadecimal",
                "hash_function": "keccak256"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(activity.status, ActivityStatus::NeedsQuorum);

    for (i, approver) in h.approvers.iter().enumerate() {
        let after = h
            .engine
            .record_approval(vote(&h, &activity, &approver.user_id, ProofDecision::Approve))
            .await
            .unwrap();
        if i < 2 {
            assert_eq!(after.status, ActivityStatus::NeedsQuorum);
        } else {
            assert_eq!(after.status, ActivityStatus::Completed);
            let Some(ActivityResult::Signature { signature }) = after.result else {
                panic!("missing signature");
            };
            assert_eq!(alloy::hex::decode(signature).unwrap().len(), 65);
        }
    }
    let quorum = h
        .engine
        .get_quorum("org-1", &activity.activity_id)
        .unwrap()
        .unwrap();
    assert_eq!(quorum.threshold, 3);
    assert_eq!(quorum.policy_id.as_deref(), Some("q3"));
}

#[tokio::test]
async fn signing_by_wallet_address() {
    let h = Harness::new(0, 0);
    let wallet = h
        .engine
        .submit(submit(&h, ActivityType::CreateWallet, wallet_params("w")))
        .await
        .unwrap();
    let Some(ActivityResult::CreateWallet { addresses, .. }) = wallet.result else {
        panic!("missing wallet result");
    };

    let signed = h
        .engine
        .submit(submit(
            &h,
            ActivityType::SignTransaction,
            json!({
                "sign_with": addresses[0].to_uppercase().replacen("0X", "0x", 1),
                "unsigned_transaction": "0x02ea0180843b9aca00843b9aca0082520894000000000000000000000000000000000000000080c0"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(signed.status, ActivityStatus::Completed);
}

#[tokio::test]
async fn references_are_checked_on_submit() {
    let h = Harness::new(0, 0);
    let err = h
        .engine
        .submit(submit(
            &h,
            ActivityType::SignRawPayload,
            json!({
                "sign_with": "missing-key",
                "payload": "hi",
                "encoding": "text_utf8",
                "hash_function": "sha256"
            }),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ActivityError::InvalidPayload(_)));

    let mut params = wallet_params("w");
    params["tags"] = json!(["ghost-tag"]);
    let err = h
        .engine
        .submit(submit(&h, ActivityType::CreateWallet, params.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, ActivityError::InvalidPayload(_)));

    h.add_tag("ghost-tag");
    let ok = h
        .engine
        .submit(submit(&h, ActivityType::CreateWallet, params))
        .await
        .unwrap();
    assert_eq!(ok.status, ActivityStatus::Completed);

    // Nothing was persisted for the rejected submissions.
    let all = h
        .engine
        .list_activities("org-1", &ActivityFilter::default())
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn roles_gate_submission() {
    let h = Harness::new(0, 1);
    let mut request = submit(&h, ActivityType::CreateWallet, wallet_params("w"));
    request.requester_id = h.approvers[0].user_id.clone();
    assert!(matches!(
        h.engine.submit(request.clone()).await,
        Err(ActivityError::Unauthorized(_))
    ));

    request.requester_id = "nobody".into();
    assert!(matches!(
        h.engine.submit(request).await,
        Err(ActivityError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn submissions_are_rate_limited() {
    let mut config = test_config();
    config.rate_limit_max = 2;
    let h = Harness::with_config(2, 2, config);

    for _ in 0..2 {
        h.engine
            .submit(submit(&h, ActivityType::CreateWallet, wallet_params("w")))
            .await
            .unwrap();
    }
    let err = h
        .engine
        .submit(submit(&h, ActivityType::CreateWallet, wallet_params("w")))
        .await
        .unwrap_err();
    assert!(matches!(err, ActivityError::RateLimited { retry_after_secs } if retry_after_secs >= 1));

    // Counters are per activity type.
    h.engine
        .submit(submit(
            &h,
            ActivityType::CreatePrivateKey,
            json!({ "private_key_name": "k", "curve": "secp256k1" }),
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn api_key_holders_must_sign_votes() {
    let h = Harness::new(1, 2);
    let approver = h.approvers[0].user_id.clone();
    let key = h.add_api_key(&approver);
    let activity = h
        .engine
        .submit(submit(&h, ActivityType::CreateWallet, wallet_params("w")))
        .await
        .unwrap();

    let unsigned = vote(&h, &activity, &approver, ProofDecision::Approve);
    assert!(matches!(
        h.engine.record_approval(unsigned.clone()).await,
        Err(ActivityError::Unauthorized(_))
    ));

    // Signature over the wrong decision.
    let message = approval_message("org-1", &activity.activity_id, ProofDecision::Reject);
    let wrong: Signature = key.sign(message.as_bytes());
    let mut request = unsigned.clone();
    request.signature = Some(alloy::hex::encode(wrong.to_bytes()));
    assert!(matches!(
        h.engine.record_approval(request).await,
        Err(ActivityError::Unauthorized(_))
    ));

    let message = approval_message("org-1", &activity.activity_id, ProofDecision::Approve);
    let good: Signature = key.sign(message.as_bytes());
    let mut request = unsigned;
    request.signature = Some(alloy::hex::encode(good.to_bytes()));
    let done = h.engine.record_approval(request).await.unwrap();
    assert_eq!(done.status, ActivityStatus::Completed);

    let proofs = h.engine.list_proofs("org-1", &activity.activity_id).unwrap();
    assert!(proofs[0].signature.is_some());
}

#[tokio::test]
async fn expired_quorum_is_rejected_by_sweeper() {
    let mut config = test_config();
    config.approval_ttl = Duration::ZERO;
    let h = Harness::with_config(1, 1, config);
    let activity = h
        .engine
        .submit(submit(&h, ActivityType::CreateWallet, wallet_params("w")))
        .await
        .unwrap();
    assert_eq!(activity.status, ActivityStatus::NeedsQuorum);

    let sweeper = ActivitySweeper::new(h.engine.clone());
    let (expired, _) = sweeper.sweep().await;
    assert_eq!(expired, 1);

    let rejected = h.engine.get_activity("org-1", &activity.activity_id).unwrap();
    assert_eq!(rejected.status, ActivityStatus::Rejected);
    let proofs = h.engine.list_proofs("org-1", &activity.activity_id).unwrap();
    assert!(matches!(&proofs[0].source, ProofSource::System { component } if component == "sweeper"));
}

#[tokio::test]
async fn list_filters_by_status_and_org() {
    let h = Harness::new(0, 0);
    h.engine
        .submit(submit(&h, ActivityType::CreateWallet, wallet_params("a")))
        .await
        .unwrap();
    h.engine
        .submit(submit(
            &h,
            ActivityType::CreatePrivateKey,
            json!({ "private_key_name": "bad", "curve": "ed25519" }),
        ))
        .await
        .unwrap();

    let completed = h
        .engine
        .list_activities(
            "org-1",
            &ActivityFilter {
                status: Some(ActivityStatus::Completed),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].activity_type, ActivityType::CreateWallet);

    assert!(h
        .engine
        .list_activities("org-2", &ActivityFilter::default())
        .unwrap()
        .is_empty());
    assert!(matches!(
        h.engine.get_activity("org-2", &completed[0].activity_id),
        Err(ActivityError::NotFound(_))
    ));
}
