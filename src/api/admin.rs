// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Organization administration endpoints.
//!
//! Users, tags, policies, invitations and the organization's default
//! quorum. Mutations require the `admin` role and are audited.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    audit_log,
    auth::{api_key::decode_public_key, AdminOnly, Auth, Role},
    error::ApiError,
    models::{normalize_email, AuthMethod, AuthMethodKind, Invitation, Organization, Tag, User},
    policy::{Policy, PolicyCondition, PolicyEffect},
    state::AppState,
    storage::{AuditEvent, AuditEventType},
};

const DEFAULT_INVITATION_HOURS: i64 = 72;
const MAX_INVITATION_HOURS: i64 = 24 * 30;
const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 1000;

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateQuorumRequest {
    /// Approvals required when no policy matches; 0 auto-approves.
    pub default_quorum_threshold: u32,
    pub root_quorum: Vec<String>,
    #[serde(default)]
    pub rejection_tolerance: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Fields left out are unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub role: Option<Role>,
    pub tags: Option<Vec<String>>,
    pub active: Option<bool>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<User>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddApiKeyRequest {
    /// Hex SEC1 secp256k1 public key (compressed or uncompressed).
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateTagRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePolicyRequest {
    pub name: String,
    #[serde(default)]
    pub condition: PolicyCondition,
    pub effect: PolicyEffect,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SetPolicyActiveRequest {
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateInvitationRequest {
    pub email: String,
    #[serde(default)]
    pub role: Role,
    /// Validity in hours (default 72, at most 720).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in_hours: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditQuery {
    /// Defaults to 100, capped at 1000.
    pub limit: Option<usize>,
}

// =============================================================================
// Validation Helpers
// =============================================================================

fn check_tags(state: &AppState, organization_id: &str, tags: &[String]) -> Result<(), ApiError> {
    for tag_id in tags {
        let known = state
            .db
            .get_tag(tag_id)?
            .is_some_and(|t| t.organization_id == organization_id);
        if !known {
            return Err(ApiError::bad_request(format!("Unknown tag {tag_id}")));
        }
    }
    Ok(())
}

fn check_users(state: &AppState, organization_id: &str, user_ids: &[String]) -> Result<(), ApiError> {
    for user_id in user_ids {
        let known = state
            .db
            .get_user(user_id)?
            .is_some_and(|u| u.organization_id == organization_id && u.active);
        if !known {
            return Err(ApiError::bad_request(format!(
                "{user_id} is not an active user of the organization"
            )));
        }
    }
    Ok(())
}

fn check_email(email: &str) -> Result<String, ApiError> {
    let normalized = normalize_email(email);
    match normalized.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(normalized),
        _ => Err(ApiError::bad_request("Invalid email address")),
    }
}

fn load_member(state: &AppState, organization_id: &str, user_id: &str) -> Result<User, ApiError> {
    state
        .db
        .get_user(user_id)?
        .filter(|u| u.organization_id == organization_id)
        .ok_or_else(|| ApiError::not_found(format!("User {user_id} not found")))
}

// =============================================================================
// Organization
// =============================================================================

#[utoipa::path(
    get,
    path = "/v1/organization",
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller's organization", body = Organization)
    )
)]
pub async fn get_organization(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<Organization>, ApiError> {
    state
        .db
        .get_organization(&user.organization_id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Organization not found"))
}

/// Replace the organization's default quorum.
#[utoipa::path(
    put,
    path = "/v1/organization/quorum",
    tag = "Admin",
    security(("bearer_auth" = [])),
    request_body = UpdateQuorumRequest,
    responses(
        (status = 200, description = "Organization updated", body = Organization),
        (status = 400, description = "Threshold cannot be met by the root quorum"),
        (status = 403, description = "Admin only")
    )
)]
pub async fn update_quorum(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Json(request): Json<UpdateQuorumRequest>,
) -> Result<Json<Organization>, ApiError> {
    let mut root = request.root_quorum.clone();
    root.sort();
    root.dedup();
    check_users(&state, &admin.organization_id, &root)?;
    if request.default_quorum_threshold as usize > root.len() {
        return Err(ApiError::bad_request(format!(
            "Threshold {} exceeds root quorum of {}",
            request.default_quorum_threshold,
            root.len()
        )));
    }

    let org = state.db.update_organization(&admin.organization_id, |org| {
        org.default_quorum_threshold = request.default_quorum_threshold;
        org.root_quorum = root;
        org.rejection_tolerance = request.rejection_tolerance;
    })?;

    let event = AuditEvent::new(&admin.organization_id, AuditEventType::PolicyUpdated)
        .with_user(&admin.user_id)
        .with_resource("organization", &admin.organization_id)
        .with_details(serde_json::json!({
            "default_quorum_threshold": org.default_quorum_threshold,
            "root_quorum": org.root_quorum,
            "version": org.version,
        }));
    if let Err(e) = state.db.log_audit(&event) {
        tracing::warn!(error = %e, "Failed to write audit event");
    }

    tracing::info!(
        organization_id = %org.organization_id,
        version = org.version,
        threshold = org.default_quorum_threshold,
        "Organization quorum updated"
    );
    Ok(Json(org))
}

// =============================================================================
// Users
// =============================================================================

#[utoipa::path(
    post,
    path = "/v1/users",
    tag = "Admin",
    security(("bearer_auth" = [])),
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn create_user(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let email = check_email(&request.email)?;
    check_tags(&state, &admin.organization_id, &request.tags)?;

    let user = User {
        user_id: uuid::Uuid::new_v4().to_string(),
        organization_id: admin.organization_id.clone(),
        email,
        display_name: request.display_name,
        role: request.role,
        tags: request.tags,
        active: true,
        created_at: Utc::now(),
    };
    state.db.create_user(&user)?;

    audit_log!(state.db, AuditEventType::UserCreated, admin, "user", &user.user_id);
    tracing::info!(user_id = %user.user_id, role = %user.role, "User created");
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    get,
    path = "/v1/users",
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Users of the organization", body = UserListResponse)
    )
)]
pub async fn list_users(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<UserListResponse>, ApiError> {
    let users = state.db.list_users(&user.organization_id)?;
    let total = users.len();
    Ok(Json(UserListResponse { users, total }))
}

#[utoipa::path(
    put,
    path = "/v1/users/{user_id}",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(("user_id" = String, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_user(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    let mut user = load_member(&state, &admin.organization_id, &user_id)?;
    if user_id == admin.user_id && (request.active == Some(false) || request.role.is_some_and(|r| r != Role::Admin)) {
        return Err(ApiError::bad_request("Admins cannot demote or deactivate themselves"));
    }

    if let Some(tags) = request.tags {
        check_tags(&state, &admin.organization_id, &tags)?;
        user.tags = tags;
    }
    if let Some(role) = request.role {
        user.role = role;
    }
    if let Some(active) = request.active {
        user.active = active;
    }
    if let Some(display_name) = request.display_name {
        user.display_name = Some(display_name);
    }
    state.db.update_user(&user)?;

    audit_log!(state.db, AuditEventType::PolicyUpdated, admin, "user", &user.user_id);
    Ok(Json(user))
}

/// Register an API key used to sign approvals.
///
/// Users may add keys to themselves; admins to anyone in the organization.
#[utoipa::path(
    post,
    path = "/v1/users/{user_id}/api-keys",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(("user_id" = String, Path, description = "User ID")),
    request_body = AddApiKeyRequest,
    responses(
        (status = 201, description = "Key registered", body = AuthMethod),
        (status = 400, description = "Not a secp256k1 public key")
    )
)]
pub async fn add_api_key(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<AddApiKeyRequest>,
) -> Result<(StatusCode, Json<AuthMethod>), ApiError> {
    if caller.user_id != user_id && !caller.is_admin() {
        return Err(ApiError::forbidden("Cannot register keys for another user"));
    }
    let user = load_member(&state, &caller.organization_id, &user_id)?;

    let public_key = request.public_key.trim().trim_start_matches("0x").to_lowercase();
    if decode_public_key(&public_key).is_none() {
        return Err(ApiError::bad_request("public_key must be a hex SEC1 secp256k1 key"));
    }

    let method = AuthMethod {
        auth_method_id: uuid::Uuid::new_v4().to_string(),
        user_id: user.user_id.clone(),
        organization_id: user.organization_id.clone(),
        kind: AuthMethodKind::ApiKey { public_key },
        created_at: Utc::now(),
    };
    state.db.add_auth_method(&method)?;

    audit_log!(state.db, AuditEventType::UserCreated, caller, "auth_method", &method.auth_method_id);
    Ok((StatusCode::CREATED, Json(method)))
}

// =============================================================================
// Tags
// =============================================================================

#[utoipa::path(
    post,
    path = "/v1/tags",
    tag = "Admin",
    security(("bearer_auth" = [])),
    request_body = CreateTagRequest,
    responses(
        (status = 201, description = "Tag created", body = Tag),
        (status = 409, description = "Tag name already in use")
    )
)]
pub async fn create_tag(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Json(request): Json<CreateTagRequest>,
) -> Result<(StatusCode, Json<Tag>), ApiError> {
    let name = request.name.trim();
    if name.is_empty() || name.len() > 64 {
        return Err(ApiError::bad_request("Tag name must be 1 to 64 bytes"));
    }
    let tag = Tag {
        tag_id: uuid::Uuid::new_v4().to_string(),
        organization_id: admin.organization_id.clone(),
        name: name.to_string(),
        created_at: Utc::now(),
    };
    state.db.create_tag(&tag)?;

    audit_log!(state.db, AuditEventType::TagCreated, admin, "tag", &tag.tag_id);
    Ok((StatusCode::CREATED, Json(tag)))
}

#[utoipa::path(
    get,
    path = "/v1/tags",
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Tags of the organization", body = [Tag])
    )
)]
pub async fn list_tags(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<Vec<Tag>>, ApiError> {
    Ok(Json(state.db.list_tags(&user.organization_id)?))
}

// =============================================================================
// Policies
// =============================================================================

#[utoipa::path(
    post,
    path = "/v1/policies",
    tag = "Admin",
    security(("bearer_auth" = [])),
    request_body = CreatePolicyRequest,
    responses(
        (status = 201, description = "Policy created", body = Policy),
        (status = 400, description = "Invalid policy")
    )
)]
pub async fn create_policy(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Json(request): Json<CreatePolicyRequest>,
) -> Result<(StatusCode, Json<Policy>), ApiError> {
    let org = &admin.organization_id;
    check_tags(&state, org, &request.condition.requester_tags)?;
    check_tags(&state, org, &request.condition.resource_tags)?;
    if let PolicyEffect::RequireQuorum {
        approvers,
        required_approvers,
        ..
    } = &request.effect
    {
        check_tags(&state, org, &approvers.tags)?;
        check_users(&state, org, &approvers.users)?;
        check_users(&state, org, required_approvers)?;
    }

    let policy = Policy {
        policy_id: uuid::Uuid::new_v4().to_string(),
        organization_id: org.clone(),
        name: request.name.trim().to_string(),
        condition: request.condition,
        effect: request.effect,
        active: true,
        created_at: Utc::now(),
    };
    policy.validate()?;
    state.db.create_policy(&policy)?;

    audit_log!(state.db, AuditEventType::PolicyCreated, admin, "policy", &policy.policy_id);
    tracing::info!(policy_id = %policy.policy_id, organization_id = %org, "Policy created");
    Ok((StatusCode::CREATED, Json(policy)))
}

#[utoipa::path(
    get,
    path = "/v1/policies",
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Policies of the organization", body = [Policy])
    )
)]
pub async fn list_policies(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<Vec<Policy>>, ApiError> {
    Ok(Json(state.db.list_policies(&user.organization_id)?))
}

/// Enable or disable a policy. Running activities keep their quorum.
#[utoipa::path(
    put,
    path = "/v1/policies/{policy_id}/active",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(("policy_id" = String, Path, description = "Policy ID")),
    request_body = SetPolicyActiveRequest,
    responses(
        (status = 200, description = "Policy updated", body = Policy),
        (status = 404, description = "Policy not found")
    )
)]
pub async fn set_policy_active(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Path(policy_id): Path<String>,
    Json(request): Json<SetPolicyActiveRequest>,
) -> Result<Json<Policy>, ApiError> {
    let policy = state
        .db
        .set_policy_active(&admin.organization_id, &policy_id, request.active)?;
    audit_log!(state.db, AuditEventType::PolicyUpdated, admin, "policy", &policy_id);
    Ok(Json(policy))
}

// =============================================================================
// Invitations
// =============================================================================

/// Create an invitation. The token is only returned here.
#[utoipa::path(
    post,
    path = "/v1/invitations",
    tag = "Admin",
    security(("bearer_auth" = [])),
    request_body = CreateInvitationRequest,
    responses(
        (status = 201, description = "Invitation created", body = Invitation)
    )
)]
pub async fn create_invitation(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Json(request): Json<CreateInvitationRequest>,
) -> Result<(StatusCode, Json<Invitation>), ApiError> {
    let email = check_email(&request.email)?;
    if state
        .db
        .find_user_by_email(&admin.organization_id, &email)?
        .is_some()
    {
        return Err(ApiError::conflict(format!("A user with email {email} already exists")));
    }
    let hours = request.expires_in_hours.unwrap_or(DEFAULT_INVITATION_HOURS);
    if !(1..=MAX_INVITATION_HOURS).contains(&hours) {
        return Err(ApiError::bad_request(format!(
            "expires_in_hours must be between 1 and {MAX_INVITATION_HOURS}"
        )));
    }

    let invitation = Invitation::issue(
        &admin.organization_id,
        &admin.user_id,
        email,
        request.role,
        Duration::hours(hours),
    );
    state.db.create_invitation(&invitation)?;

    audit_log!(
        state.db,
        AuditEventType::InvitationCreated,
        admin,
        "invitation",
        &invitation.invitation_id
    );
    Ok((StatusCode::CREATED, Json(invitation)))
}

/// List invitations with their tokens blanked out.
#[utoipa::path(
    get,
    path = "/v1/invitations",
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Invitations", body = [Invitation])
    )
)]
pub async fn list_invitations(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
) -> Result<Json<Vec<Invitation>>, ApiError> {
    let invitations = state
        .db
        .list_invitations(&admin.organization_id)?
        .into_iter()
        .map(|mut i| {
            i.token = String::new();
            i
        })
        .collect();
    Ok(Json(invitations))
}

// =============================================================================
// Audit
// =============================================================================

#[utoipa::path(
    get,
    path = "/v1/audit-events",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(AuditQuery),
    responses(
        (status = 200, description = "Most recent audit events", body = [AuditEvent]),
        (status = 403, description = "Admins and auditors only")
    )
)]
pub async fn list_audit_events(
    Auth(user): Auth,
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEvent>>, ApiError> {
    if !user.has_role(Role::Auditor) {
        return Err(ApiError::forbidden("Admins and auditors only"));
    }
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);
    Ok(Json(state.db.list_audit_events(&user.organization_id, limit)?))
}
