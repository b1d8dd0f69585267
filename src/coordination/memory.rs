// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process [`KeyValueStore`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{CoordinationError, KeyValueStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(at) => at > now,
            None => true,
        }
    }
}

/// Mutex-guarded map with lazy expiry.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the map after dropping `key` if it has expired.
    fn with_key<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, Entry>, Instant) -> R,
    ) -> Result<R, CoordinationError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CoordinationError::Unavailable("memory store poisoned".into()))?;
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        Ok(f(&mut entries, now))
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError> {
        self.with_key(key, |entries, _| entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CoordinationError> {
        self.with_key(key, |entries, now| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: ttl.map(|t| now + t),
                },
            );
        })
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        self.with_key(key, |entries, now| {
            if entries.contains_key(key) {
                return false;
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: Some(now + ttl),
                },
            );
            true
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CoordinationError> {
        self.with_key(key, |entries, now| match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                true
            }
            None => false,
        })
    }

    async fn expire_if_eq(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        self.with_key(key, |entries, now| match entries.get_mut(key) {
            Some(entry) if entry.value == expected => {
                entry.expires_at = Some(now + ttl);
                true
            }
            _ => false,
        })
    }

    async fn delete(&self, key: &str) -> Result<bool, CoordinationError> {
        self.with_key(key, |entries, _| entries.remove(key).is_some())
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, CoordinationError> {
        self.with_key(key, |entries, _| match entries.get(key) {
            Some(entry) if entry.value == expected => {
                entries.remove(key);
                true
            }
            _ => false,
        })
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, CoordinationError> {
        self.with_key(key, |entries, now| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: "0".to_string(),
                expires_at: Some(now + ttl),
            });
            let next = entry.value.parse::<u64>().unwrap_or(0) + 1;
            entry.value = next.to_string();
            next
        })
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CoordinationError> {
        self.with_key(key, |entries, now| {
            entries
                .get(key)
                .and_then(|e| e.expires_at)
                .map(|at| at.saturating_duration_since(now))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_nx_only_writes_once() {
        let store = MemoryStore::new();
        assert!(store.set_nx("k", "a", Duration::from_secs(5)).await.unwrap());
        assert!(!store.set_nx("k", "b", Duration::from_secs(5)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn entries_expire() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.set_nx("k", "w", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn compare_and_delete() {
        let store = MemoryStore::new();
        store.set("k", "owner-a", None).await.unwrap();
        assert!(!store.delete_if_eq("k", "owner-b").await.unwrap());
        assert!(store.delete_if_eq("k", "owner-a").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_keys_are_dropped_on_access_and_purge() {
        let store = MemoryStore::new();
        let short = Some(Duration::from_millis(20));
        store.set("a", "1", short).await.unwrap();
        store.set("b", "2", short).await.unwrap();
        store.set("c", "3", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        // Touching one key only drops that key.
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.len(), 2);

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("c").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn incr_counts_within_window() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        assert_eq!(store.incr("c", ttl).await.unwrap(), 1);
        assert_eq!(store.incr("c", ttl).await.unwrap(), 2);
        assert!(store.ttl("c").await.unwrap().is_some());
    }
}
