// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Activity API endpoints.
//!
//! Submitting, listing and inspecting activities, voting on quorum-gated
//! activities and retrying dispatch of approved ones. Every call is scoped
//! to the caller's organization.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    activity::{
        Activity, ActivityFilter, ActivityType, Proof, ProofDecision, RecordApproval,
        SubmitActivity,
    },
    auth::{Auth, Role},
    error::ApiError,
    quorum::Quorum,
    state::AppState,
};

/// Request to submit a new activity.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitActivityRequest {
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    /// Intent parameters; schema depends on `type`.
    #[schema(value_type = Object)]
    pub parameters: serde_json::Value,
    /// Repeating a key returns the original activity instead of a new one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActivityListResponse {
    pub activities: Vec<Activity>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProofListResponse {
    pub proofs: Vec<Proof>,
}

/// A quorum member's vote.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApprovalRequest {
    pub decision: ProofDecision,
    /// Hex ECDSA signature over `<organization_id>:<activity_id>:<decision>`.
    /// Required when the approver has API keys registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Submit an activity.
///
/// The response carries the activity in the state it reached: `rejected`
/// by policy, waiting in `needs_quorum`, `completed`, `failed`, or
/// `approved` if the signer could not be reached yet.
#[utoipa::path(
    post,
    path = "/v1/activities",
    tag = "Activities",
    security(("bearer_auth" = [])),
    request_body = SubmitActivityRequest,
    responses(
        (status = 200, description = "Activity recorded", body = Activity),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Role may not submit this activity"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn submit_activity(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<SubmitActivityRequest>,
) -> Result<Json<Activity>, ApiError> {
    let activity = state
        .engine
        .submit(SubmitActivity {
            organization_id: user.organization_id,
            requester_id: user.user_id,
            activity_type: request.activity_type,
            parameters: request.parameters,
            idempotency_key: request.idempotency_key,
        })
        .await?;
    Ok(Json(activity))
}

/// List activities of the caller's organization, newest first.
#[utoipa::path(
    get,
    path = "/v1/activities",
    tag = "Activities",
    security(("bearer_auth" = [])),
    params(ActivityFilter),
    responses(
        (status = 200, description = "Activities", body = ActivityListResponse)
    )
)]
pub async fn list_activities(
    Auth(user): Auth,
    State(state): State<AppState>,
    Query(filter): Query<ActivityFilter>,
) -> Result<Json<ActivityListResponse>, ApiError> {
    let activities = state
        .engine
        .list_activities(&user.organization_id, &filter)?;
    let total = activities.len();
    Ok(Json(ActivityListResponse { activities, total }))
}

#[utoipa::path(
    get,
    path = "/v1/activities/{activity_id}",
    tag = "Activities",
    security(("bearer_auth" = [])),
    params(("activity_id" = String, Path, description = "Activity ID")),
    responses(
        (status = 200, description = "Activity", body = Activity),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_activity(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(activity_id): Path<String>,
) -> Result<Json<Activity>, ApiError> {
    let activity = state
        .engine
        .get_activity(&user.organization_id, &activity_id)?;
    Ok(Json(activity))
}

/// Proofs of an activity in the order they were recorded.
#[utoipa::path(
    get,
    path = "/v1/activities/{activity_id}/proofs",
    tag = "Activities",
    security(("bearer_auth" = [])),
    params(("activity_id" = String, Path, description = "Activity ID")),
    responses(
        (status = 200, description = "Proofs", body = ProofListResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn list_proofs(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(activity_id): Path<String>,
) -> Result<Json<ProofListResponse>, ApiError> {
    let proofs = state
        .engine
        .list_proofs(&user.organization_id, &activity_id)?;
    Ok(Json(ProofListResponse { proofs }))
}

/// Roster and tally of a quorum-gated activity.
#[utoipa::path(
    get,
    path = "/v1/activities/{activity_id}/quorum",
    tag = "Activities",
    security(("bearer_auth" = [])),
    params(("activity_id" = String, Path, description = "Activity ID")),
    responses(
        (status = 200, description = "Quorum", body = Quorum),
        (status = 404, description = "Not found or not quorum-gated")
    )
)]
pub async fn get_quorum(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(activity_id): Path<String>,
) -> Result<Json<Quorum>, ApiError> {
    state
        .engine
        .get_quorum(&user.organization_id, &activity_id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Activity {activity_id} has no quorum")))
}

/// Approve or reject a quorum-gated activity.
#[utoipa::path(
    post,
    path = "/v1/activities/{activity_id}/approvals",
    tag = "Activities",
    security(("bearer_auth" = [])),
    params(("activity_id" = String, Path, description = "Activity ID")),
    request_body = ApprovalRequest,
    responses(
        (status = 200, description = "Vote recorded", body = Activity),
        (status = 403, description = "Not a quorum member or bad signature"),
        (status = 409, description = "Already decided or activity not pending")
    )
)]
pub async fn record_approval(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(activity_id): Path<String>,
    Json(request): Json<ApprovalRequest>,
) -> Result<Json<Activity>, ApiError> {
    let activity = state
        .engine
        .record_approval(RecordApproval {
            organization_id: user.organization_id,
            activity_id,
            approver_id: user.user_id,
            decision: request.decision,
            signature: request.signature,
        })
        .await?;
    Ok(Json(activity))
}

/// Retry execution of an `approved` activity.
#[utoipa::path(
    post,
    path = "/v1/activities/{activity_id}/dispatch",
    tag = "Activities",
    security(("bearer_auth" = [])),
    params(("activity_id" = String, Path, description = "Activity ID")),
    responses(
        (status = 200, description = "Activity completed", body = Activity),
        (status = 409, description = "Not approved or being dispatched elsewhere"),
        (status = 503, description = "Signer unavailable; activity stays approved")
    )
)]
pub async fn dispatch_activity(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(activity_id): Path<String>,
) -> Result<Json<Activity>, ApiError> {
    if !user.has_role(Role::Operator) {
        return Err(ApiError::forbidden("Only operators may dispatch activities"));
    }
    let activity = state
        .engine
        .dispatch(&user.organization_id, &activity_id)
        .await?;
    Ok(Json(activity))
}
