// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for unit tests: a temporary database, an in-memory
//! coordination store, the simulated enclave and a seeded organization.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::rand_core::OsRng;
use tempfile::TempDir;

use crate::activity::{ActivityEngine, ActivityType, EngineConfig, ProofSigner};
use crate::auth::Role;
use crate::coordination::{KeyValueStore, MemoryStore};
use crate::enclave::simulated::SimulatedEnclave;
use crate::models::{AuthMethod, AuthMethodKind, Organization, Tag, User};
use crate::policy::{Policy, PolicyCondition, PolicyEffect};
use crate::state::AppState;
use crate::storage::Database;

pub(crate) struct Harness {
    _temp: TempDir,
    pub db: Arc<Database>,
    pub kv: Arc<dyn KeyValueStore>,
    pub enclave: Arc<SimulatedEnclave>,
    pub engine: ActivityEngine,
    pub org: Organization,
    pub admin: User,
    /// Members of the root quorum.
    pub approvers: Vec<User>,
}

/// Engine settings short enough for tests.
pub(crate) fn test_config() -> EngineConfig {
    EngineConfig {
        enclave_timeout: Duration::from_millis(200),
        lock_lease: Duration::from_secs(5),
        approval_ttl: Duration::from_secs(3600),
        rate_limit_max: 100,
        rate_limit_window: Duration::from_secs(60),
    }
}

impl Harness {
    /// Organization with an admin and `approvers` root-quorum members.
    pub fn new(default_threshold: u32, approvers: usize) -> Self {
        Self::with_config(default_threshold, approvers, test_config())
    }

    pub fn with_config(default_threshold: u32, approvers: usize, config: EngineConfig) -> Self {
        let temp = TempDir::new().unwrap();
        let db = Arc::new(Database::open(&temp.path().join("test.redb")).unwrap());
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let enclave = Arc::new(SimulatedEnclave::new());

        let admin = user("org-1", "admin", Role::Admin);
        let approvers: Vec<User> = (0..approvers)
            .map(|i| user("org-1", &format!("approver-{i}"), Role::Approver))
            .collect();
        let org = Organization {
            organization_id: "org-1".into(),
            name: "Acme".into(),
            version: 1,
            default_quorum_threshold: default_threshold,
            root_quorum: approvers.iter().map(|u| u.user_id.clone()).collect(),
            rejection_tolerance: 0,
            created_at: Utc::now(),
        };
        db.create_organization(&org).unwrap();
        db.create_user(&admin).unwrap();
        for approver in &approvers {
            db.create_user(approver).unwrap();
        }

        let engine = ActivityEngine::new(
            Arc::clone(&db),
            enclave.clone(),
            Arc::clone(&kv),
            ProofSigner::new(b"test-proof-key"),
            config,
        );

        Self {
            _temp: temp,
            db,
            kv,
            enclave,
            engine,
            org,
            admin,
            approvers,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(
            Arc::clone(&self.db),
            Arc::clone(&self.kv),
            self.engine.clone(),
            Duration::from_secs(3600),
        )
    }

    pub fn add_user(&self, user_id: &str, role: Role, tags: &[&str]) -> User {
        let mut u = user(&self.org.organization_id, user_id, role);
        u.tags = tags.iter().map(|t| t.to_string()).collect();
        self.db.create_user(&u).unwrap();
        u
    }

    pub fn add_tag(&self, tag_id: &str) -> Tag {
        let tag = Tag {
            tag_id: tag_id.into(),
            organization_id: self.org.organization_id.clone(),
            name: tag_id.into(),
            created_at: Utc::now(),
        };
        self.db.create_tag(&tag).unwrap();
        tag
    }

    pub fn add_policy(&self, policy_id: &str, types: &[ActivityType], effect: PolicyEffect) -> Policy {
        let policy = Policy {
            policy_id: policy_id.into(),
            organization_id: self.org.organization_id.clone(),
            name: policy_id.into(),
            condition: PolicyCondition {
                activity_types: types.to_vec(),
                ..Default::default()
            },
            effect,
            active: true,
            created_at: Utc::now(),
        };
        self.db.create_policy(&policy).unwrap();
        policy
    }

    /// Register an API key for `user_id` and return its signing half.
    pub fn add_api_key(&self, user_id: &str) -> SigningKey {
        let key = SigningKey::random(&mut OsRng);
        let public_key = alloy::hex::encode(key.verifying_key().to_encoded_point(true).as_bytes());
        self.db
            .add_auth_method(&AuthMethod {
                auth_method_id: uuid::Uuid::new_v4().to_string(),
                user_id: user_id.into(),
                organization_id: self.org.organization_id.clone(),
                kind: AuthMethodKind::ApiKey { public_key },
                created_at: Utc::now(),
            })
            .unwrap();
        key
    }
}

pub(crate) fn user(organization_id: &str, user_id: &str, role: Role) -> User {
    User {
        user_id: user_id.into(),
        organization_id: organization_id.into(),
        email: format!("{user_id}@example.com"),
        display_name: None,
        role,
        tags: vec![],
        active: true,
        created_at: Utc::now(),
    }
}

pub(crate) fn wallet_params(name: &str) -> serde_json::Value {
    serde_json::json!({
        "wallet_name": name,
        "accounts": [
            { "curve": "secp256k1", "path": "m/44'/60'/0'/0/0", "address_format": "ethereum" }
        ]
    })
}
