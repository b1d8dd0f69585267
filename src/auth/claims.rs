// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticated caller representation.

use serde::Serialize;
use utoipa::ToSchema;

use super::roles::Role;
use crate::models::User;

/// The user behind a valid session.
///
/// This is the type handlers receive from the [`Auth`](super::Auth)
/// extractor.
#[derive(Clone, Serialize, ToSchema)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub organization_id: String,
    pub role: Role,
    /// Bearer token of the current session (never serialized).
    #[serde(skip)]
    pub session_token: String,
}

impl AuthenticatedUser {
    pub fn new(user: &User, session_token: impl Into<String>) -> Self {
        Self {
            user_id: user.user_id.clone(),
            organization_id: user.organization_id.clone(),
            role: user.role,
            session_token: session_token.into(),
        }
    }

    /// Check if user has a specific role (or higher).
    pub fn has_role(&self, required: Role) -> bool {
        self.role.has_privilege(required)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl std::fmt::Debug for AuthenticatedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedUser")
            .field("user_id", &self.user_id)
            .field("organization_id", &self.organization_id)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}
