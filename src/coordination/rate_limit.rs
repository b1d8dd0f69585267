// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fixed-window submission rate limiting.

use std::sync::Arc;
use std::time::Duration;

use super::{CoordinationError, KeyValueStore};

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    max: u64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, max: u64, window: Duration) -> Self {
        Self { store, max, window }
    }

    /// Count one hit against `(organization, user, scope)`.
    ///
    /// Returns the remaining budget, or `RateLimited` once the window's
    /// budget is spent.
    pub async fn check(
        &self,
        organization_id: &str,
        user_id: &str,
        scope: &str,
    ) -> Result<u64, CoordinationError> {
        let key = format!("ratelimit:{organization_id}:{user_id}:{scope}");
        let count = self.store.incr(&key, self.window).await?;
        if count > self.max {
            let retry_after = self.store.ttl(&key).await?.unwrap_or(self.window);
            tracing::debug!(
                organization_id = %organization_id,
                user_id = %user_id,
                scope = %scope,
                count,
                "Submission rate limit exceeded"
            );
            return Err(CoordinationError::RateLimited { retry_after });
        }
        Ok(self.max - count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::MemoryStore;

    #[tokio::test]
    async fn limits_per_user_and_scope() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), 2, Duration::from_secs(60));
        assert_eq!(limiter.check("org", "alice", "sign").await.unwrap(), 1);
        assert_eq!(limiter.check("org", "alice", "sign").await.unwrap(), 0);
        let err = limiter.check("org", "alice", "sign").await.unwrap_err();
        assert!(matches!(err, CoordinationError::RateLimited { .. }));

        // Other users and other scopes have their own budget.
        assert!(limiter.check("org", "bob", "sign").await.is_ok());
        assert!(limiter.check("org", "alice", "create").await.is_ok());
    }

    #[tokio::test]
    async fn window_resets() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), 1, Duration::from_millis(30));
        limiter.check("org", "alice", "sign").await.unwrap();
        assert!(limiter.check("org", "alice", "sign").await.is_err());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(limiter.check("org", "alice", "sign").await.is_ok());
    }
}
