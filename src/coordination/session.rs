// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer sessions shared across API instances.

use std::sync::Arc;
use std::time::Duration;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use k256::elliptic_curve::rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use super::{CoordinationError, KeyValueStore};
use crate::auth::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub organization_id: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn key(token: &str) -> String {
        format!("session:{token}")
    }

    /// Issue a new opaque token for `session`.
    pub async fn create(&self, session: &Session) -> Result<String, CoordinationError> {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        let token = Base64UrlUnpadded::encode_string(&bytes);

        let value = serde_json::to_string(session)?;
        self.store
            .set(&Self::key(&token), &value, Some(self.ttl))
            .await?;
        tracing::debug!(user_id = %session.user_id, "Session created");
        Ok(token)
    }

    pub async fn get(&self, token: &str) -> Result<Option<Session>, CoordinationError> {
        match self.store.get(&Self::key(token)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Slide the expiry forward. Returns false if the session already expired.
    pub async fn extend(&self, token: &str) -> Result<bool, CoordinationError> {
        self.store.expire(&Self::key(token), self.ttl).await
    }

    pub async fn revoke(&self, token: &str) -> Result<bool, CoordinationError> {
        self.store.delete(&Self::key(token)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::MemoryStore;

    fn session() -> Session {
        Session {
            user_id: "user-1".into(),
            organization_id: "org-1".into(),
            role: Role::Approver,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_get_revoke() {
        let sessions = SessionStore::new(Arc::new(MemoryStore::new()), Duration::from_secs(60));
        let token = sessions.create(&session()).await.unwrap();
        assert_eq!(token.len(), 43);

        let loaded = sessions.get(&token).await.unwrap().unwrap();
        assert_eq!(loaded.user_id, "user-1");
        assert_eq!(loaded.role, Role::Approver);

        assert!(sessions.extend(&token).await.unwrap());
        assert!(sessions.revoke(&token).await.unwrap());
        assert!(sessions.get(&token).await.unwrap().is_none());
        assert!(!sessions.extend(&token).await.unwrap());
    }

    #[tokio::test]
    async fn tokens_are_unique() {
        let sessions = SessionStore::new(Arc::new(MemoryStore::new()), Duration::from_secs(60));
        let a = sessions.create(&session()).await.unwrap();
        let b = sessions.create(&session()).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn sessions_expire() {
        let sessions =
            SessionStore::new(Arc::new(MemoryStore::new()), Duration::from_millis(20));
        let token = sessions.create(&session()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(sessions.get(&token).await.unwrap().is_none());
    }
}
