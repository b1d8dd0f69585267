// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Distributed Coordination
//!
//! Cross-instance state that must be shared by every API node: sessions,
//! submission rate limits and per-activity dispatch locks. All of it sits on
//! a small [`KeyValueStore`] trait with TTL and compare-and-delete
//! semantics. [`MemoryStore`] backs single-node deployments and tests.
//!
//! Key namespaces:
//!
//! | Prefix        | Owner                 |
//! |---------------|-----------------------|
//! | `session:`    | [`SessionStore`]      |
//! | `ratelimit:`  | [`RateLimiter`]       |
//! | `lock:`       | [`DistributedLock`]   |

use std::time::Duration;

use async_trait::async_trait;

pub mod lock;
pub mod memory;
pub mod rate_limit;
pub mod session;

pub use lock::{DistributedLock, LockGuard};
pub use memory::MemoryStore;
pub use rate_limit::RateLimiter;
pub use session::{Session, SessionStore};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinationError {
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),

    #[error("lock {0} is held by another owner")]
    Contended(String),

    #[error("lease on {0} was lost")]
    LeaseLost(String),

    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoordinationError {
    fn from(e: serde_json::Error) -> Self {
        CoordinationError::Serialization(e.to_string())
    }
}

/// Shared key-value store with expiry.
///
/// Implementations must make `set_nx`, `incr`, `expire_if_eq` and
/// `delete_if_eq` atomic with respect to other callers.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError>;

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CoordinationError>;

    /// Set only if absent. Returns whether the value was written.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, CoordinationError>;

    /// Reset the TTL of an existing key. Returns false if the key is gone.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CoordinationError>;

    /// Reset the TTL only if the current value equals `expected`.
    async fn expire_if_eq(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError>;

    async fn delete(&self, key: &str) -> Result<bool, CoordinationError>;

    /// Delete only if the current value equals `expected`.
    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, CoordinationError>;

    /// Increment a counter. The TTL is applied when the key is created.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, CoordinationError>;

    /// Remaining time to live, if the key exists and has one.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CoordinationError>;
}
