// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Leased, owner-checked mutual exclusion.
//!
//! A lock is a key holding a random owner token with a TTL. Only the owner
//! can extend or release it. Acquisition never waits: a held lock is
//! reported as [`CoordinationError::Contended`] so callers can retry later.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::{CoordinationError, KeyValueStore};

#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn KeyValueStore>,
    lease: Duration,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn KeyValueStore>, lease: Duration) -> Self {
        Self { store, lease }
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// Key guarding dispatch of one activity.
    pub fn activity_key(organization_id: &str, activity_id: &str) -> String {
        format!("lock:{organization_id}:{activity_id}")
    }

    /// Try to take the lock once.
    pub async fn acquire(&self, key: &str) -> Result<LockGuard, CoordinationError> {
        let owner = uuid::Uuid::new_v4().to_string();
        if !self.store.set_nx(key, &owner, self.lease).await? {
            return Err(CoordinationError::Contended(key.to_string()));
        }
        tracing::debug!(key = %key, "Lock acquired");
        Ok(LockGuard {
            store: Arc::clone(&self.store),
            key: key.to_string(),
            owner,
            lease: self.lease,
        })
    }
}

/// Held lock. Must be released explicitly; otherwise the lease expires.
pub struct LockGuard {
    store: Arc<dyn KeyValueStore>,
    key: String,
    owner: String,
    lease: Duration,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Push the lease forward. Fails with `LeaseLost` if another owner holds it.
    pub async fn extend(&self) -> Result<(), CoordinationError> {
        if self
            .store
            .expire_if_eq(&self.key, &self.owner, self.lease)
            .await?
        {
            Ok(())
        } else {
            Err(CoordinationError::LeaseLost(self.key.clone()))
        }
    }

    /// Release if still owned. Returns whether this guard removed the key.
    pub async fn release(self) -> Result<bool, CoordinationError> {
        let released = self.store.delete_if_eq(&self.key, &self.owner).await?;
        if !released {
            tracing::warn!(key = %self.key, "Lock was no longer held at release");
        }
        Ok(released)
    }

    /// Drive `fut` while renewing the lease every third of its length.
    ///
    /// If a renewal fails the future is dropped and `LeaseLost` is returned.
    pub async fn hold_while<F, T>(&self, fut: F) -> Result<T, CoordinationError>
    where
        F: Future<Output = T>,
    {
        let period = (self.lease / 3).max(Duration::from_millis(10));
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        tokio::pin!(fut);

        loop {
            tokio::select! {
                out = &mut fut => return Ok(out),
                _ = ticker.tick() => {
                    self.extend().await?;
                }
            }
        }
    }
}
