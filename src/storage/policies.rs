// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Organization policies.

use redb::ReadableTable;

use super::{
    load_rows, read_json, scan_index, scoped_key, write_json, Database, StorageError,
    StorageResult, POLICIES, POLICIES_BY_ORG,
};
use crate::policy::Policy;

impl Database {
    pub fn create_policy(&self, policy: &Policy) -> StorageResult<()> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(POLICIES)?;
            if table.get(policy.policy_id.as_str())?.is_some() {
                return Err(StorageError::Conflict(format!(
                    "policy {} already exists",
                    policy.policy_id
                )));
            }
            write_json(&mut table, &policy.policy_id, policy)?;
            let mut index = write_txn.open_table(POLICIES_BY_ORG)?;
            index.insert(
                scoped_key(&policy.organization_id, &policy.policy_id).as_str(),
                policy.policy_id.as_str(),
            )?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_policy(&self, policy_id: &str) -> StorageResult<Option<Policy>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(POLICIES)?;
        read_json(&table, policy_id)
    }

    pub fn list_policies(&self, organization_id: &str) -> StorageResult<Vec<Policy>> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(POLICIES_BY_ORG)?;
        let table = read_txn.open_table(POLICIES)?;
        let ids = scan_index(&index, organization_id)?;
        load_rows(&table, &ids)
    }

    /// Enable or disable a policy. Policies are never deleted.
    pub fn set_policy_active(
        &self,
        organization_id: &str,
        policy_id: &str,
        active: bool,
    ) -> StorageResult<Policy> {
        let write_txn = self.begin_write()?;
        let policy = {
            let mut table = write_txn.open_table(POLICIES)?;
            let mut policy: Policy = read_json(&table, policy_id)?
                .filter(|p: &Policy| p.organization_id == organization_id)
                .ok_or_else(|| StorageError::NotFound(format!("Policy {policy_id}")))?;
            policy.active = active;
            write_json(&mut table, policy_id, &policy)?;
            policy
        };
        write_txn.commit()?;
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{PolicyCondition, PolicyEffect};
    use chrono::Utc;
    use tempfile::TempDir;

    fn policy(id: &str, org: &str) -> Policy {
        Policy {
            policy_id: id.into(),
            organization_id: org.into(),
            name: "deny raw".into(),
            condition: PolicyCondition::default(),
            effect: PolicyEffect::Deny { reason: None },
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn policies_are_org_scoped() {
        let temp = TempDir::new().unwrap();
        let db = Database::open(&temp.path().join("test.redb")).unwrap();
        db.create_policy(&policy("p1", "org-1")).unwrap();
        db.create_policy(&policy("p2", "org-2")).unwrap();
        assert!(db.create_policy(&policy("p1", "org-1")).is_err());

        assert_eq!(db.list_policies("org-1").unwrap().len(), 1);

        // Another organization cannot toggle it.
        assert!(matches!(
            db.set_policy_active("org-2", "p1", false),
            Err(StorageError::NotFound(_))
        ));
        let disabled = db.set_policy_active("org-1", "p1", false).unwrap();
        assert!(!disabled.active);
        assert!(!db.get_policy("p1").unwrap().unwrap().active);
    }
}
