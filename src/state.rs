// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Duration;

use crate::activity::ActivityEngine;
use crate::coordination::{KeyValueStore, SessionStore};
use crate::storage::Database;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// System of record.
    pub db: Arc<Database>,
    /// Coordination store (sessions, locks, rate limits).
    pub kv: Arc<dyn KeyValueStore>,
    pub engine: ActivityEngine,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(
        db: Arc<Database>,
        kv: Arc<dyn KeyValueStore>,
        engine: ActivityEngine,
        session_ttl: Duration,
    ) -> Self {
        Self {
            sessions: SessionStore::new(Arc::clone(&kv), session_ttl),
            db,
            kv,
            engine,
        }
    }
}
