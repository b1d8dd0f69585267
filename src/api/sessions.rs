// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session endpoints.
//!
//! Sessions are opaque bearer tokens kept in the coordination store. They
//! are issued when an invitation is redeemed or when a user signs a login
//! challenge with one of its API keys.

use std::time::Duration;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    audit_log,
    auth::{verify_api_key_signature, Auth, KeyCheck},
    coordination::Session,
    error::ApiError,
    models::User,
    state::AppState,
    storage::{AuditEvent, AuditEventType},
};

/// Accepted clock skew of a login challenge, in seconds.
const LOGIN_SKEW_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RedeemInvitationRequest {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Login by signing `login:<organization_id>:<user_id>:<timestamp>`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiKeyLoginRequest {
    pub organization_id: String,
    pub user_id: String,
    /// Unix seconds; must be within five minutes of the server clock.
    pub timestamp: i64,
    /// Hex ECDSA signature by a registered API key.
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub session_token: String,
    /// Seconds until the session expires unless refreshed.
    pub expires_in: u64,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshResponse {
    pub expires_in: u64,
}

pub fn login_message(organization_id: &str, user_id: &str, timestamp: i64) -> String {
    format!("login:{organization_id}:{user_id}:{timestamp}")
}

async fn open_session(state: &AppState, user: User) -> Result<SessionResponse, ApiError> {
    let token = state
        .sessions
        .create(&Session {
            user_id: user.user_id.clone(),
            organization_id: user.organization_id.clone(),
            role: user.role,
            created_at: Utc::now(),
        })
        .await?;
    audit_log!(state.db, AuditEventType::SessionCreated, user);
    Ok(SessionResponse {
        session_token: token,
        expires_in: state.sessions.ttl().as_secs(),
        user,
    })
}

/// Redeem an invitation: creates the invited user and a first session.
#[utoipa::path(
    post,
    path = "/v1/invitations/redeem",
    tag = "Sessions",
    request_body = RedeemInvitationRequest,
    responses(
        (status = 201, description = "User created and signed in", body = SessionResponse),
        (status = 404, description = "Unknown invitation"),
        (status = 409, description = "Invitation expired or already used")
    )
)]
pub async fn redeem_invitation(
    State(state): State<AppState>,
    Json(request): Json<RedeemInvitationRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let token = request.token.trim();
    if token.is_empty() {
        return Err(ApiError::bad_request("token is required"));
    }
    let now = Utc::now();
    let user = state.db.redeem_invitation(token, now, |invitation| User {
        user_id: uuid::Uuid::new_v4().to_string(),
        organization_id: invitation.organization_id.clone(),
        email: invitation.email.clone(),
        display_name: request.display_name.clone(),
        role: invitation.role,
        tags: Vec::new(),
        active: true,
        created_at: now,
    })?;

    audit_log!(state.db, AuditEventType::InvitationRedeemed, user, "user", &user.user_id);
    tracing::info!(
        user_id = %user.user_id,
        organization_id = %user.organization_id,
        "Invitation redeemed"
    );
    let session = open_session(&state, user).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// Open a session with an API-key signed challenge.
#[utoipa::path(
    post,
    path = "/v1/sessions",
    tag = "Sessions",
    request_body = ApiKeyLoginRequest,
    responses(
        (status = 201, description = "Signed in", body = SessionResponse),
        (status = 401, description = "Invalid or replayed challenge")
    )
)]
pub async fn login_with_api_key(
    State(state): State<AppState>,
    Json(request): Json<ApiKeyLoginRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let denied = || ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", "Invalid login");

    if Utc::now().timestamp().abs_diff(request.timestamp) > LOGIN_SKEW_SECS {
        return Err(denied());
    }
    let user = state
        .db
        .get_user(&request.user_id)?
        .filter(|u| u.active && u.organization_id == request.organization_id)
        .ok_or_else(denied)?;

    let message = login_message(&request.organization_id, &request.user_id, request.timestamp);
    let check = verify_api_key_signature(
        &state.db,
        &user.user_id,
        message.as_bytes(),
        Some(&request.signature),
    )?;
    if check != KeyCheck::Valid {
        let event = AuditEvent::new(&user.organization_id, AuditEventType::PermissionDenied)
            .with_user(&user.user_id)
            .failed("invalid login signature");
        if let Err(e) = state.db.log_audit(&event) {
            tracing::warn!(error = %e, "Failed to write audit event");
        }
        return Err(denied());
    }

    // Each signed challenge opens at most one session.
    let replay_key = format!("login:{}:{}:{}", user.organization_id, user.user_id, request.timestamp);
    let window = Duration::from_secs(2 * LOGIN_SKEW_SECS);
    if !state.kv.set_nx(&replay_key, "1", window).await? {
        return Err(denied());
    }

    let session = open_session(&state, user).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// Slide the current session's expiry forward.
#[utoipa::path(
    post,
    path = "/v1/sessions/refresh",
    tag = "Sessions",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Session extended", body = RefreshResponse),
        (status = 401, description = "Session expired")
    )
)]
pub async fn refresh_session(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<RefreshResponse>, ApiError> {
    if !state.sessions.extend(&user.session_token).await? {
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "Session expired",
        ));
    }
    Ok(Json(RefreshResponse {
        expires_in: state.sessions.ttl().as_secs(),
    }))
}

/// Sign out.
#[utoipa::path(
    delete,
    path = "/v1/sessions/current",
    tag = "Sessions",
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Session revoked")
    )
)]
pub async fn revoke_session(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.sessions.revoke(&user.session_token).await?;
    audit_log!(state.db, AuditEventType::SessionRevoked, user);
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/me",
    tag = "Sessions",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "The signed-in user", body = User)
    )
)]
pub async fn me(Auth(user): Auth, State(state): State<AppState>) -> Result<Json<User>, ApiError> {
    state
        .db
        .get_user(&user.user_id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("User not found"))
}
