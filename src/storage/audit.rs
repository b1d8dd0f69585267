// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for security-sensitive operations.
//!
//! Activity lifecycle events, approvals, administrative changes and session
//! events are appended to the `audit_events` table, newest first per
//! organization.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{ordered_key, ordered_range, timestamp_nanos, Database, StorageResult, AUDIT_EVENTS};

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Activity events
    ActivitySubmitted,
    ActivityApproved,
    ActivityRejected,
    ActivityCompleted,
    ActivityFailed,
    ActivityExpired,
    VoteRecorded,

    // Admin events
    UserCreated,
    TagCreated,
    PolicyCreated,
    PolicyUpdated,
    InvitationCreated,
    InvitationRedeemed,

    // Auth events
    SessionCreated,
    SessionRevoked,
    PermissionDenied,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    pub event_id: String,
    pub organization_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    /// User who triggered the event (if any).
    pub user_id: Option<String>,
    /// Resource affected (activity_id, policy_id, etc.).
    pub resource_id: Option<String>,
    /// Resource type (activity, policy, etc.).
    pub resource_type: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    pub success: bool,
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(organization_id: impl Into<String>, event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            organization_id: organization_id.into(),
            timestamp: Utc::now(),
            event_type,
            user_id: None,
            resource_id: None,
            resource_type: None,
            details: None,
            success: true,
            error: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

impl Database {
    /// Append an audit event.
    pub fn log_audit(&self, event: &AuditEvent) -> StorageResult<()> {
        let json = serde_json::to_vec(event)?;
        let key = ordered_key(
            &event.organization_id,
            timestamp_nanos(event.timestamp),
            &event.event_id,
            true,
        );
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(AUDIT_EVENTS)?;
            table.insert(key.as_slice(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Most recent audit events of an organization.
    pub fn list_audit_events(
        &self,
        organization_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<AuditEvent>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(AUDIT_EVENTS)?;
        let (start, end) = ordered_range(organization_id);
        let mut events = Vec::new();
        for entry in table.range(start.as_slice()..end.as_slice())? {
            let (_, value) = entry?;
            events.push(serde_json::from_slice(value.value())?);
            if events.len() >= limit {
                break;
            }
        }
        Ok(events)
    }
}

/// Helper macro for logging audit events.
///
/// Audit failures are logged and never fail the surrounding operation.
#[macro_export]
macro_rules! audit_log {
    ($db:expr, $event_type:expr, $user:expr) => {{
        let event = $crate::storage::AuditEvent::new(&$user.organization_id, $event_type)
            .with_user(&$user.user_id);
        if let Err(e) = $db.log_audit(&event) {
            tracing::warn!(error = %e, "Failed to write audit event");
        }
    }};
    ($db:expr, $event_type:expr, $user:expr, $resource_type:expr, $resource_id:expr) => {{
        let event = $crate::storage::AuditEvent::new(&$user.organization_id, $event_type)
            .with_user(&$user.user_id)
            .with_resource($resource_type, $resource_id);
        if let Err(e) = $db.log_audit(&event) {
            tracing::warn!(error = %e, "Failed to write audit event");
        }
    }};
}
