// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! First-run provisioning.
//!
//! On an empty database the configured organization is created together
//! with an admin invitation. Redeeming that invitation yields the first
//! admin session.

use chrono::{Duration, Utc};

use crate::auth::Role;
use crate::config::Bootstrap;
use crate::models::{normalize_email, Invitation, Organization};
use crate::storage::{AuditEvent, AuditEventType, Database, StorageResult};

const BOOTSTRAP_INVITATION_HOURS: i64 = 24;

/// Provision the first organization if none exists.
///
/// Returns the admin invitation when one was created.
pub fn provision(db: &Database, bootstrap: &Bootstrap) -> StorageResult<Option<Invitation>> {
    if !db.list_organizations()?.is_empty() {
        tracing::debug!("Organizations present; skipping bootstrap");
        return Ok(None);
    }

    let org = Organization {
        organization_id: uuid::Uuid::new_v4().to_string(),
        name: bootstrap.organization_name.trim().to_string(),
        version: 1,
        default_quorum_threshold: 0,
        root_quorum: Vec::new(),
        rejection_tolerance: 0,
        created_at: Utc::now(),
    };
    db.create_organization(&org)?;

    let invitation = Invitation::issue(
        &org.organization_id,
        "bootstrap",
        normalize_email(&bootstrap.admin_email),
        Role::Admin,
        Duration::hours(BOOTSTRAP_INVITATION_HOURS),
    );
    db.create_invitation(&invitation)?;

    let event = AuditEvent::new(&org.organization_id, AuditEventType::InvitationCreated)
        .with_resource("invitation", &invitation.invitation_id);
    if let Err(e) = db.log_audit(&event) {
        tracing::warn!(error = %e, "Failed to write audit event");
    }

    tracing::info!(
        organization_id = %org.organization_id,
        invitation_id = %invitation.invitation_id,
        "Bootstrapped organization"
    );
    Ok(Some(invitation))
}
