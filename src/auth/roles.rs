// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles for authorization.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::activity::ActivityType;

/// User roles for authorization.
///
/// ## Role Hierarchy
///
/// - `Admin` - Manages users, tags, policies and may submit any activity
/// - `Operator` - May submit activities
/// - `Approver` - May only vote on activities it is a quorum member of
/// - `Auditor` - Read-only access to activities, proofs and audit events
///
/// Quorum membership is decided by policy, not by role: any active user
/// seeded into an activity's roster may vote on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Operator,
    Approver,
    Auditor,
}

impl Role {
    /// Check if this role has at least the privileges of the required role.
    pub fn has_privilege(&self, required: Role) -> bool {
        match (self, required) {
            (Role::Admin, _) => true,
            (Role::Operator, Role::Operator) => true,
            (Role::Approver, Role::Approver) => true,
            (Role::Auditor, Role::Auditor) => true,
            _ => false,
        }
    }

    /// Policy-independent baseline: may this role submit `activity_type` at all?
    pub fn can_submit(&self, activity_type: ActivityType) -> bool {
        match (self, activity_type) {
            (Role::Admin | Role::Operator, _) => true,
            (Role::Approver | Role::Auditor, _) => false,
        }
    }

    /// Parse role from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Role> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "operator" => Some(Role::Operator),
            "approver" => Some(Role::Approver),
            "auditor" => Some(Role::Auditor),
            _ => None,
        }
    }
}

impl Default for Role {
    /// Least privilege that can still act on its own activities.
    fn default() -> Self {
        Role::Operator
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Operator => write!(f, "operator"),
            Role::Approver => write!(f, "approver"),
            Role::Auditor => write!(f, "auditor"),
        }
    }
}
