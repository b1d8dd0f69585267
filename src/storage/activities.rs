// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Activities, proofs and quorums.
//!
//! All mutation of an existing activity goes through
//! [`Database::update_activity`]: the closure edits an [`ActivityTxn`] and
//! everything it staged (status change, proofs, quorum, materialized wallet
//! or key) is committed in one redb write transaction, or not at all.

use redb::{ReadableTable, WriteTransaction};

use super::{
    load_rows, ordered_key, ordered_range, read_json, scoped_key, timestamp_nanos, write_json,
    Database, StorageError, StorageResult, ACTIVITIES, ACTIVITIES_BY_ORG, IDEMPOTENCY,
    OPEN_ACTIVITIES, PROOFS, PROOFS_BY_ACTIVITY, QUORUMS,
};
use crate::activity::{Activity, ActivityStatus, ActivityType, Proof};
use crate::models::{PrivateKey, Wallet, WalletAccount};
use crate::quorum::Quorum;

/// Result of inserting a new activity.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(Activity),
    /// The idempotency key was already used; this is the original activity.
    Existing(Activity),
}

/// Staged changes to one activity, committed atomically.
#[derive(Debug)]
pub struct ActivityTxn {
    pub activity: Activity,
    pub quorum: Option<Quorum>,
    original_status: ActivityStatus,
    original_history: usize,
    proofs: Vec<Proof>,
    wallet: Option<(Wallet, Vec<WalletAccount>)>,
    private_key: Option<PrivateKey>,
}

impl ActivityTxn {
    pub fn append_proof(&mut self, proof: Proof) {
        self.proofs.push(proof);
    }

    /// Stage the wallet produced by a completed `create_wallet` activity.
    pub fn insert_wallet(&mut self, wallet: Wallet, accounts: Vec<WalletAccount>) {
        self.wallet = Some((wallet, accounts));
    }

    /// Stage the key produced by a completed `create_private_key` activity.
    pub fn insert_private_key(&mut self, key: PrivateKey) {
        self.private_key = Some(key);
    }

    /// Reject staged states the state machine does not allow.
    fn check(&self) -> StorageResult<()> {
        let mut status = self.original_status;
        for change in &self.activity.status_history[self.original_history..] {
            if !status.can_transition_to(change.status) {
                return Err(StorageError::Corrupted(format!(
                    "illegal transition {status} -> {} on activity {}",
                    change.status, self.activity.activity_id
                )));
            }
            status = change.status;
        }
        if status != self.activity.status {
            return Err(StorageError::Corrupted(format!(
                "status of activity {} does not match its history",
                self.activity.activity_id
            )));
        }

        let materializes = self.wallet.is_some() || self.private_key.is_some();
        if materializes && self.activity.status != ActivityStatus::Completed {
            return Err(StorageError::Corrupted(format!(
                "activity {} is not completed but materializes a resource",
                self.activity.activity_id
            )));
        }
        Ok(())
    }
}

/// Listing filter for [`Database::list_activities`].
#[derive(Debug, Clone, Default)]
pub struct ActivityQuery {
    pub status: Option<ActivityStatus>,
    pub activity_type: Option<ActivityType>,
    pub limit: usize,
}

fn idempotency_key(organization_id: &str, requester_id: &str, key: &str) -> String {
    format!("{organization_id}|{requester_id}|{key}")
}

impl Database {
    // =========================================================================
    // Activities
    // =========================================================================

    /// Insert a new `pending` activity.
    ///
    /// If the activity carries an idempotency key that this requester already
    /// used, nothing is written and the original activity is returned.
    pub fn create_activity(&self, activity: &Activity) -> StorageResult<CreateOutcome> {
        let write_txn = self.begin_write()?;
        let outcome = {
            let mut idem = write_txn.open_table(IDEMPOTENCY)?;
            let mut activities = write_txn.open_table(ACTIVITIES)?;

            let existing_id = match &activity.idempotency_key {
                Some(key) => {
                    let idem_key =
                        idempotency_key(&activity.organization_id, &activity.created_by, key);
                    let existing = idem.get(idem_key.as_str())?.map(|v| v.value().to_string());
                    if existing.is_none() {
                        idem.insert(idem_key.as_str(), activity.activity_id.as_str())?;
                    }
                    existing
                }
                None => None,
            };

            match existing_id {
                Some(id) => {
                    let existing: Activity = read_json(&activities, &id)?.ok_or_else(|| {
                        StorageError::Corrupted(format!("idempotency entry points at missing {id}"))
                    })?;
                    CreateOutcome::Existing(existing)
                }
                None => {
                    if activities.get(activity.activity_id.as_str())?.is_some() {
                        return Err(StorageError::Conflict(format!(
                            "activity {} already exists",
                            activity.activity_id
                        )));
                    }
                    write_json(&mut activities, &activity.activity_id, activity)?;

                    let mut by_org = write_txn.open_table(ACTIVITIES_BY_ORG)?;
                    let key = ordered_key(
                        &activity.organization_id,
                        timestamp_nanos(activity.created_at),
                        &activity.activity_id,
                        true,
                    );
                    by_org.insert(key.as_slice(), activity.activity_id.as_str())?;

                    let mut open = write_txn.open_table(OPEN_ACTIVITIES)?;
                    open.insert(activity.activity_id.as_str(), activity.status.as_str())?;
                    CreateOutcome::Created(activity.clone())
                }
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Activity previously created by `requester_id` under `key`, if any.
    pub fn find_idempotent_activity(
        &self,
        organization_id: &str,
        requester_id: &str,
        key: &str,
    ) -> StorageResult<Option<Activity>> {
        let read_txn = self.begin_read()?;
        let idem = read_txn.open_table(IDEMPOTENCY)?;
        let idem_key = idempotency_key(organization_id, requester_id, key);
        let Some(id) = idem.get(idem_key.as_str())?.map(|v| v.value().to_string()) else {
            return Ok(None);
        };
        let table = read_txn.open_table(ACTIVITIES)?;
        read_json(&table, &id)
    }

    pub fn get_activity(&self, activity_id: &str) -> StorageResult<Option<Activity>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ACTIVITIES)?;
        read_json(&table, activity_id)
    }

    /// Activities of an organization, newest first.
    pub fn list_activities(
        &self,
        organization_id: &str,
        query: &ActivityQuery,
    ) -> StorageResult<Vec<Activity>> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(ACTIVITIES_BY_ORG)?;
        let table = read_txn.open_table(ACTIVITIES)?;

        let (start, end) = ordered_range(organization_id);
        let mut results = Vec::new();
        for entry in index.range(start.as_slice()..end.as_slice())? {
            let (_, id) = entry?;
            let Some(activity) = read_json::<Activity, _>(&table, id.value())? else {
                continue;
            };
            if query.status.is_some_and(|s| s != activity.status) {
                continue;
            }
            if query
                .activity_type
                .is_some_and(|t| t != activity.activity_type)
            {
                continue;
            }
            results.push(activity);
            if query.limit > 0 && results.len() >= query.limit {
                break;
            }
        }
        Ok(results)
    }

    /// Every non-terminal activity across all organizations.
    pub fn list_open_activities(&self) -> StorageResult<Vec<Activity>> {
        let read_txn = self.begin_read()?;
        let open = read_txn.open_table(OPEN_ACTIVITIES)?;
        let table = read_txn.open_table(ACTIVITIES)?;

        let mut ids = Vec::new();
        for entry in open.iter()? {
            let (id, _) = entry?;
            ids.push(id.value().to_string());
        }
        load_rows(&table, &ids)
    }

    /// Run `f` against the stored activity and commit what it staged.
    ///
    /// If `f` fails, or the staged state breaks an invariant, nothing is
    /// written.
    pub fn update_activity<R, E>(
        &self,
        activity_id: &str,
        f: impl FnOnce(&mut ActivityTxn) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<StorageError>,
    {
        let write_txn = self.begin_write()?;
        let mut txn = load_txn(&write_txn, activity_id)?;
        let out = f(&mut txn)?;
        txn.check()?;
        apply_txn(&write_txn, txn)?;
        write_txn.commit().map_err(StorageError::from)?;
        Ok(out)
    }

    // =========================================================================
    // Proofs & Quorums
    // =========================================================================

    /// Proofs of an activity, oldest first.
    pub fn list_proofs(&self, activity_id: &str) -> StorageResult<Vec<Proof>> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(PROOFS_BY_ACTIVITY)?;
        let table = read_txn.open_table(PROOFS)?;

        let (start, end) = ordered_range(activity_id);
        let mut ids = Vec::new();
        for entry in index.range(start.as_slice()..end.as_slice())? {
            let (_, id) = entry?;
            ids.push(id.value().to_string());
        }
        load_rows(&table, &ids)
    }

    pub fn get_quorum(&self, activity_id: &str) -> StorageResult<Option<Quorum>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(QUORUMS)?;
        read_json(&table, activity_id)
    }
}

fn load_txn(write_txn: &WriteTransaction, activity_id: &str) -> StorageResult<ActivityTxn> {
    let activities = write_txn.open_table(ACTIVITIES)?;
    let activity: Activity = read_json(&activities, activity_id)?
        .ok_or_else(|| StorageError::NotFound(format!("Activity {activity_id}")))?;
    let quorums = write_txn.open_table(QUORUMS)?;
    let quorum = read_json(&quorums, activity_id)?;

    Ok(ActivityTxn {
        original_status: activity.status,
        original_history: activity.status_history.len(),
        activity,
        quorum,
        proofs: Vec::new(),
        wallet: None,
        private_key: None,
    })
}

fn apply_txn(write_txn: &WriteTransaction, txn: ActivityTxn) -> StorageResult<()> {
    let ActivityTxn {
        activity,
        quorum,
        proofs,
        wallet,
        private_key,
        ..
    } = txn;
    let id = activity.activity_id.as_str();

    {
        let mut activities = write_txn.open_table(ACTIVITIES)?;
        write_json(&mut activities, id, &activity)?;

        let mut open = write_txn.open_table(OPEN_ACTIVITIES)?;
        if activity.status.is_terminal() {
            open.remove(id)?;
        } else {
            open.insert(id, activity.status.as_str())?;
        }
    }

    if let Some(quorum) = &quorum {
        let mut quorums = write_txn.open_table(QUORUMS)?;
        write_json(&mut quorums, id, quorum)?;
    }

    if !proofs.is_empty() {
        let mut table = write_txn.open_table(PROOFS)?;
        let mut index = write_txn.open_table(PROOFS_BY_ACTIVITY)?;
        for proof in &proofs {
            if table.get(proof.proof_id.as_str())?.is_some() {
                return Err(StorageError::Corrupted(format!(
                    "proof {} already recorded",
                    proof.proof_id
                )));
            }
            write_json(&mut table, &proof.proof_id, proof)?;
            let key = ordered_key(id, timestamp_nanos(proof.created_at), &proof.proof_id, false);
            index.insert(key.as_slice(), proof.proof_id.as_str())?;
        }
    }

    if let Some((wallet, accounts)) = &wallet {
        super::wallets::insert_wallet_rows(write_txn, wallet, accounts)?;
    }
    if let Some(key) = &private_key {
        super::wallets::insert_private_key_row(write_txn, key)?;
    }

    tracing::debug!(
        activity_id = %id,
        status = %activity.status,
        proofs = proofs.len(),
        "Activity transaction committed"
    );
    Ok(())
}
