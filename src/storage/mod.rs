// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Persistence
//!
//! Embedded ACID store backed by redb (pure Rust). Every entity is stored
//! as JSON bytes under its id, with secondary index tables for scoped
//! listings.
//!
//! ## Table Layout
//!
//! ```text
//! organizations          org_id → Organization
//! users                  user_id → User
//! users_by_org           "org|user_id" → user_id
//! users_by_email         "org|email" → user_id          (unique)
//! auth_methods           auth_method_id → AuthMethod
//! auth_methods_by_user   "user|auth_method_id" → id
//! tags                   tag_id → Tag
//! tags_by_org            "org|tag_id" → tag_id
//! tag_names              "org|name" → tag_id            (unique)
//! wallets                wallet_id → Wallet
//! wallets_by_org         "org|wallet_id" → wallet_id
//! wallet_accounts        account_id → WalletAccount
//! accounts_by_wallet     "wallet|account_id" → account_id
//! accounts_by_address    "org|address" → account_id
//! private_keys           private_key_id → PrivateKey
//! private_keys_by_org    "org|key_id" → key_id
//! policies               policy_id → Policy
//! policies_by_org        "org|policy_id" → policy_id
//! activities             activity_id → Activity
//! activities_by_org      org|!created_nanos|activity_id → activity_id
//! open_activities        activity_id → status           (non-terminal only)
//! idempotency            "org|user|key" → activity_id
//! proofs                 proof_id → Proof               (append-only)
//! proofs_by_activity     activity|created_nanos|proof_id → proof_id
//! quorums                activity_id → Quorum
//! invitations            invitation_id → Invitation
//! invitations_by_token   token → invitation_id
//! invitations_by_org     "org|invitation_id" → invitation_id
//! audit_events           org|!nanos|event_id → AuditEvent
//! ```
//!
//! Sessions, rate-limit counters and locks are not stored here; they live in
//! the coordination store.

use std::path::Path;

use redb::{ReadableTable, Table, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod activities;
pub mod audit;
pub mod organizations;
pub mod policies;
pub mod wallets;

pub use activities::{ActivityTxn, CreateOutcome};
pub use audit::{AuditEvent, AuditEventType};

// =============================================================================
// Table Definitions
// =============================================================================

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;
type IndexTable = TableDefinition<'static, &'static str, &'static str>;
type OrderedIndexTable = TableDefinition<'static, &'static [u8], &'static str>;

pub(crate) const ORGANIZATIONS: JsonTable = TableDefinition::new("organizations");
pub(crate) const USERS: JsonTable = TableDefinition::new("users");
pub(crate) const USERS_BY_ORG: IndexTable = TableDefinition::new("users_by_org");
pub(crate) const USERS_BY_EMAIL: IndexTable = TableDefinition::new("users_by_email");
pub(crate) const AUTH_METHODS: JsonTable = TableDefinition::new("auth_methods");
pub(crate) const AUTH_METHODS_BY_USER: IndexTable = TableDefinition::new("auth_methods_by_user");
pub(crate) const TAGS: JsonTable = TableDefinition::new("tags");
pub(crate) const TAGS_BY_ORG: IndexTable = TableDefinition::new("tags_by_org");
pub(crate) const TAG_NAMES: IndexTable = TableDefinition::new("tag_names");
pub(crate) const WALLETS: JsonTable = TableDefinition::new("wallets");
pub(crate) const WALLETS_BY_ORG: IndexTable = TableDefinition::new("wallets_by_org");
pub(crate) const WALLET_ACCOUNTS: JsonTable = TableDefinition::new("wallet_accounts");
pub(crate) const ACCOUNTS_BY_WALLET: IndexTable = TableDefinition::new("accounts_by_wallet");
pub(crate) const ACCOUNTS_BY_ADDRESS: IndexTable = TableDefinition::new("accounts_by_address");
pub(crate) const PRIVATE_KEYS: JsonTable = TableDefinition::new("private_keys");
pub(crate) const PRIVATE_KEYS_BY_ORG: IndexTable = TableDefinition::new("private_keys_by_org");
pub(crate) const POLICIES: JsonTable = TableDefinition::new("policies");
pub(crate) const POLICIES_BY_ORG: IndexTable = TableDefinition::new("policies_by_org");
pub(crate) const ACTIVITIES: JsonTable = TableDefinition::new("activities");
pub(crate) const ACTIVITIES_BY_ORG: OrderedIndexTable = TableDefinition::new("activities_by_org");
pub(crate) const OPEN_ACTIVITIES: IndexTable = TableDefinition::new("open_activities");
pub(crate) const IDEMPOTENCY: IndexTable = TableDefinition::new("idempotency");
pub(crate) const PROOFS: JsonTable = TableDefinition::new("proofs");
pub(crate) const PROOFS_BY_ACTIVITY: OrderedIndexTable = TableDefinition::new("proofs_by_activity");
pub(crate) const QUORUMS: JsonTable = TableDefinition::new("quorums");
pub(crate) const INVITATIONS: JsonTable = TableDefinition::new("invitations");
pub(crate) const INVITATIONS_BY_TOKEN: IndexTable = TableDefinition::new("invitations_by_token");
pub(crate) const INVITATIONS_BY_ORG: IndexTable = TableDefinition::new("invitations_by_org");
pub(crate) const AUDIT_EVENTS: TableDefinition<'static, &'static [u8], &'static [u8]> =
    TableDefinition::new("audit_events");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("integrity violation: {0}")]
    Corrupted(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Key Helpers
// =============================================================================

/// `"scope|id"` key for string-keyed index tables.
pub(crate) fn scoped_key(scope: &str, id: &str) -> String {
    format!("{scope}|{id}")
}

/// Half-open string range covering every `"scope|…"` key.
pub(crate) fn scope_range(scope: &str) -> (String, String) {
    (format!("{scope}|"), format!("{scope}|{}", char::MAX))
}

/// Ordered composite key: `scope | ts_be | id`.
///
/// With `newest_first` the timestamp is bit-inverted so forward scans
/// return the most recent entry first.
pub(crate) fn ordered_key(scope: &str, nanos: i64, id: &str, newest_first: bool) -> Vec<u8> {
    let ts = if newest_first {
        !(nanos as u64)
    } else {
        nanos as u64
    };
    let mut key = Vec::with_capacity(scope.len() + 1 + 8 + 1 + id.len());
    key.extend_from_slice(scope.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&ts.to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(id.as_bytes());
    key
}

/// Byte range covering every ordered key of `scope`.
pub(crate) fn ordered_range(scope: &str) -> (Vec<u8>, Vec<u8>) {
    let mut start = Vec::with_capacity(scope.len() + 1);
    start.extend_from_slice(scope.as_bytes());
    start.push(b'|');
    let mut end = start.clone();
    end.extend_from_slice(&[0xFF; 20]);
    (start, end)
}

pub(crate) fn timestamp_nanos(at: chrono::DateTime<chrono::Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

// =============================================================================
// JSON Row Helpers
// =============================================================================

pub(crate) fn read_json<T, R>(table: &R, key: &str) -> StorageResult<Option<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

pub(crate) fn write_json<T: Serialize>(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let json = serde_json::to_vec(value)?;
    table.insert(key, json.as_slice())?;
    Ok(())
}

/// Values of every `"scope|…"` entry of a string index.
pub(crate) fn scan_index<R>(index: &R, scope: &str) -> StorageResult<Vec<String>>
where
    R: ReadableTable<&'static str, &'static str>,
{
    let (start, end) = scope_range(scope);
    let mut ids = Vec::new();
    for entry in index.range(start.as_str()..end.as_str())? {
        let (_, value) = entry?;
        ids.push(value.value().to_string());
    }
    Ok(ids)
}

/// Load every row whose id appears in `ids`, skipping dangling index entries.
pub(crate) fn load_rows<T, R>(table: &R, ids: &[String]) -> StorageResult<Vec<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let mut rows = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(row) = read_json(table, id)? {
            rows.push(row);
        }
    }
    Ok(rows)
}

// =============================================================================
// Database
// =============================================================================

/// Embedded ACID database holding every organization-scoped entity.
pub struct Database {
    db: redb::Database,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = redb::Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            for def in [
                ORGANIZATIONS,
                USERS,
                AUTH_METHODS,
                TAGS,
                WALLETS,
                WALLET_ACCOUNTS,
                PRIVATE_KEYS,
                POLICIES,
                ACTIVITIES,
                PROOFS,
                QUORUMS,
                INVITATIONS,
            ] {
                let _ = write_txn.open_table(def)?;
            }
            for def in [
                USERS_BY_ORG,
                USERS_BY_EMAIL,
                AUTH_METHODS_BY_USER,
                TAGS_BY_ORG,
                TAG_NAMES,
                WALLETS_BY_ORG,
                ACCOUNTS_BY_WALLET,
                ACCOUNTS_BY_ADDRESS,
                PRIVATE_KEYS_BY_ORG,
                POLICIES_BY_ORG,
                OPEN_ACTIVITIES,
                IDEMPOTENCY,
                INVITATIONS_BY_TOKEN,
                INVITATIONS_BY_ORG,
            ] {
                let _ = write_txn.open_table(def)?;
            }
            let _ = write_txn.open_table(ACTIVITIES_BY_ORG)?;
            let _ = write_txn.open_table(PROOFS_BY_ACTIVITY)?;
            let _ = write_txn.open_table(AUDIT_EVENTS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    pub(crate) fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    pub(crate) fn begin_read(&self) -> StorageResult<redb::ReadTransaction> {
        use redb::ReadableDatabase;
        Ok(self.db.begin_read()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_keys_sort_newest_first() {
        let older = ordered_key("org", 1_000, "a", true);
        let newer = ordered_key("org", 2_000, "b", true);
        assert!(newer < older);

        let older = ordered_key("act", 1_000, "a", false);
        let newer = ordered_key("act", 2_000, "b", false);
        assert!(older < newer);
    }

    #[test]
    fn scope_ranges_do_not_overlap() {
        let (start, end) = scope_range("org-1");
        let inside = scoped_key("org-1", "user-9");
        let outside = scoped_key("org-10", "user-9");
        assert!(start.as_str() <= inside.as_str() && inside.as_str() < end.as_str());
        assert!(!(start.as_str() <= outside.as_str() && outside.as_str() < end.as_str()));

        let (start, end) = ordered_range("org-1");
        let key = ordered_key("org-1", 5, "x", true);
        assert!(start <= key && key < end);
    }

    #[test]
    fn open_creates_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("nested").join("custody.redb");
        Database::open(&path).unwrap();
        assert!(path.exists());
        // Re-opening an existing database is fine.
        drop(Database::open(&path));
    }
}
