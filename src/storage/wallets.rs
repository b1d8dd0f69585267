// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallets, wallet accounts and private keys.
//!
//! Rows are only ever inserted from inside an activity transaction (see
//! [`Database::update_activity`]); this module exposes reads plus the
//! insert helpers that transaction uses.

use redb::{ReadableTable, WriteTransaction};

use super::{
    load_rows, read_json, scan_index, scoped_key, write_json, Database, StorageError,
    StorageResult, ACCOUNTS_BY_ADDRESS, ACCOUNTS_BY_WALLET, PRIVATE_KEYS, PRIVATE_KEYS_BY_ORG,
    WALLETS, WALLETS_BY_ORG, WALLET_ACCOUNTS,
};
use crate::models::{PrivateKey, Wallet, WalletAccount};

pub(crate) fn insert_wallet_rows(
    write_txn: &WriteTransaction,
    wallet: &Wallet,
    accounts: &[WalletAccount],
) -> StorageResult<()> {
    let mut wallets = write_txn.open_table(WALLETS)?;
    if wallets.get(wallet.wallet_id.as_str())?.is_some() {
        return Err(StorageError::Conflict(format!(
            "wallet {} already exists",
            wallet.wallet_id
        )));
    }
    write_json(&mut wallets, &wallet.wallet_id, wallet)?;

    let mut by_org = write_txn.open_table(WALLETS_BY_ORG)?;
    by_org.insert(
        scoped_key(&wallet.organization_id, &wallet.wallet_id).as_str(),
        wallet.wallet_id.as_str(),
    )?;

    let mut rows = write_txn.open_table(WALLET_ACCOUNTS)?;
    let mut by_wallet = write_txn.open_table(ACCOUNTS_BY_WALLET)?;
    let mut by_address = write_txn.open_table(ACCOUNTS_BY_ADDRESS)?;
    for account in accounts {
        write_json(&mut rows, &account.account_id, account)?;
        by_wallet.insert(
            scoped_key(&account.wallet_id, &account.account_id).as_str(),
            account.account_id.as_str(),
        )?;
        let address_key = scoped_key(&account.organization_id, &account.address.to_lowercase());
        by_address.insert(address_key.as_str(), account.account_id.as_str())?;
    }
    Ok(())
}

pub(crate) fn insert_private_key_row(
    write_txn: &WriteTransaction,
    key: &PrivateKey,
) -> StorageResult<()> {
    let mut keys = write_txn.open_table(PRIVATE_KEYS)?;
    if keys.get(key.private_key_id.as_str())?.is_some() {
        return Err(StorageError::Conflict(format!(
            "private key {} already exists",
            key.private_key_id
        )));
    }
    write_json(&mut keys, &key.private_key_id, key)?;

    let mut by_org = write_txn.open_table(PRIVATE_KEYS_BY_ORG)?;
    by_org.insert(
        scoped_key(&key.organization_id, &key.private_key_id).as_str(),
        key.private_key_id.as_str(),
    )?;
    Ok(())
}

impl Database {
    // =========================================================================
    // Wallets
    // =========================================================================

    pub fn get_wallet(&self, wallet_id: &str) -> StorageResult<Option<Wallet>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        read_json(&table, wallet_id)
    }

    pub fn list_wallets(&self, organization_id: &str) -> StorageResult<Vec<Wallet>> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(WALLETS_BY_ORG)?;
        let table = read_txn.open_table(WALLETS)?;
        let ids = scan_index(&index, organization_id)?;
        load_rows(&table, &ids)
    }

    pub fn list_wallet_accounts(&self, wallet_id: &str) -> StorageResult<Vec<WalletAccount>> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(ACCOUNTS_BY_WALLET)?;
        let table = read_txn.open_table(WALLET_ACCOUNTS)?;
        let ids = scan_index(&index, wallet_id)?;
        load_rows(&table, &ids)
    }

    /// Resolve an account by address within an organization (case-insensitive).
    pub fn find_account_by_address(
        &self,
        organization_id: &str,
        address: &str,
    ) -> StorageResult<Option<WalletAccount>> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(ACCOUNTS_BY_ADDRESS)?;
        let key = scoped_key(organization_id, &address.to_lowercase());
        let account_id = match index.get(key.as_str())? {
            Some(v) => v.value().to_string(),
            None => return Ok(None),
        };
        let table = read_txn.open_table(WALLET_ACCOUNTS)?;
        read_json(&table, &account_id)
    }

    // =========================================================================
    // Private Keys
    // =========================================================================

    pub fn get_private_key(&self, private_key_id: &str) -> StorageResult<Option<PrivateKey>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(PRIVATE_KEYS)?;
        read_json(&table, private_key_id)
    }

    pub fn list_private_keys(&self, organization_id: &str) -> StorageResult<Vec<PrivateKey>> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(PRIVATE_KEYS_BY_ORG)?;
        let table = read_txn.open_table(PRIVATE_KEYS)?;
        let ids = scan_index(&index, organization_id)?;
        load_rows(&table, &ids)
    }
}
