// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    activity::{
        Activity, ActivityFailure, ActivityResult, ActivityStatus, ActivityType,
        CreatePrivateKeyIntent, CreateWalletIntent, Proof, ProofDecision, ProofSource,
        SignRawPayloadIntent, SignTransactionIntent, StatusChange,
    },
    auth::Role,
    models::{
        AddressFormat, AuthMethod, AuthMethodKind, Curve, Invitation, Organization, PrivateKey,
        Tag, User, Wallet, WalletAccount,
    },
    policy::{Approvers, Policy, PolicyCondition, PolicyEffect},
    quorum::{Quorum, QuorumMember, Vote},
    state::AppState,
    storage::{AuditEvent, AuditEventType},
};

pub mod activities;
pub mod admin;
pub mod health;
pub mod sessions;
pub mod wallets;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        // Activities
        .route(
            "/activities",
            get(activities::list_activities).post(activities::submit_activity),
        )
        .route("/activities/{activity_id}", get(activities::get_activity))
        .route(
            "/activities/{activity_id}/proofs",
            get(activities::list_proofs),
        )
        .route(
            "/activities/{activity_id}/quorum",
            get(activities::get_quorum),
        )
        .route(
            "/activities/{activity_id}/approvals",
            post(activities::record_approval),
        )
        .route(
            "/activities/{activity_id}/dispatch",
            post(activities::dispatch_activity),
        )
        // Wallets and keys
        .route(
            "/wallets",
            get(wallets::list_wallets).post(wallets::create_wallet),
        )
        .route("/wallets/{wallet_id}", get(wallets::get_wallet))
        .route(
            "/private-keys",
            get(wallets::list_private_keys).post(wallets::create_private_key),
        )
        .route(
            "/private-keys/{private_key_id}",
            get(wallets::get_private_key),
        )
        // Administration
        .route("/organization", get(admin::get_organization))
        .route("/organization/quorum", put(admin::update_quorum))
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route("/users/{user_id}", put(admin::update_user))
        .route("/users/{user_id}/api-keys", post(admin::add_api_key))
        .route("/tags", get(admin::list_tags).post(admin::create_tag))
        .route(
            "/policies",
            get(admin::list_policies).post(admin::create_policy),
        )
        .route(
            "/policies/{policy_id}/active",
            put(admin::set_policy_active),
        )
        .route(
            "/invitations",
            get(admin::list_invitations).post(admin::create_invitation),
        )
        .route("/audit-events", get(admin::list_audit_events))
        // Sessions
        .route("/invitations/redeem", post(sessions::redeem_invitation))
        .route("/sessions", post(sessions::login_with_api_key))
        .route("/sessions/refresh", post(sessions::refresh_session))
        .route("/sessions/current", delete(sessions::revoke_session))
        .route("/me", get(sessions::me));

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        activities::submit_activity,
        activities::list_activities,
        activities::get_activity,
        activities::list_proofs,
        activities::get_quorum,
        activities::record_approval,
        activities::dispatch_activity,
        wallets::create_wallet,
        wallets::list_wallets,
        wallets::get_wallet,
        wallets::create_private_key,
        wallets::list_private_keys,
        wallets::get_private_key,
        admin::get_organization,
        admin::update_quorum,
        admin::create_user,
        admin::list_users,
        admin::update_user,
        admin::add_api_key,
        admin::create_tag,
        admin::list_tags,
        admin::create_policy,
        admin::list_policies,
        admin::set_policy_active,
        admin::create_invitation,
        admin::list_invitations,
        admin::list_audit_events,
        sessions::redeem_invitation,
        sessions::login_with_api_key,
        sessions::refresh_session,
        sessions::revoke_session,
        sessions::me,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            Activity,
            ActivityType,
            ActivityStatus,
            ActivityResult,
            ActivityFailure,
            StatusChange,
            Proof,
            ProofDecision,
            ProofSource,
            Quorum,
            QuorumMember,
            Vote,
            CreateWalletIntent,
            CreatePrivateKeyIntent,
            SignTransactionIntent,
            SignRawPayloadIntent,
            Organization,
            User,
            Role,
            AuthMethod,
            AuthMethodKind,
            Wallet,
            WalletAccount,
            PrivateKey,
            Curve,
            AddressFormat,
            Tag,
            Invitation,
            Policy,
            PolicyCondition,
            PolicyEffect,
            Approvers,
            AuditEvent,
            AuditEventType,
            activities::SubmitActivityRequest,
            activities::ApprovalRequest,
            admin::UpdateQuorumRequest,
            admin::CreateUserRequest,
            admin::UpdateUserRequest,
            admin::AddApiKeyRequest,
            admin::CreateTagRequest,
            admin::CreatePolicyRequest,
            admin::SetPolicyActiveRequest,
            admin::CreateInvitationRequest,
            sessions::RedeemInvitationRequest,
            sessions::ApiKeyLoginRequest,
            sessions::SessionResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Activities", description = "Submission, approval and dispatch of activities"),
        (name = "Wallets", description = "HD wallets held by the signer"),
        (name = "Private Keys", description = "Standalone keys held by the signer"),
        (name = "Admin", description = "Users, tags, policies and invitations"),
        (name = "Sessions", description = "Sign-in and session management"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{wallet_params, Harness};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::post(uri).header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, token: &str) -> Request<Body> {
        Request::get(uri)
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    /// Redeem a fresh invitation and return the session token.
    async fn sign_in(h: &Harness, app: &Router, email: &str, role: Role) -> String {
        let invitation = Invitation::issue(
            &h.org.organization_id,
            "admin",
            email.to_string(),
            role,
            chrono::Duration::hours(1),
        );
        h.db.create_invitation(&invitation).unwrap();

        let (status, body) = call(
            app,
            post("/v1/invitations/redeem", None, json!({ "token": invitation.token })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["session_token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let h = Harness::new(0, 0);
        let app = router(h.app_state());
        let _ = app.into_make_service();
    }

    #[test]
    fn openapi_declares_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let schemes = &doc.components.as_ref().unwrap().security_schemes;
        assert!(schemes.contains_key("bearer_auth"));
        assert!(doc.paths.paths.contains_key("/v1/activities/{activity_id}/approvals"));
    }

    #[tokio::test]
    async fn health_is_public() {
        let h = Harness::new(0, 0);
        let app = router(h.app_state());
        let response = app
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn v1_requires_a_session() {
        let h = Harness::new(0, 0);
        let app = router(h.app_state());
        let (status, body) = call(
            &app,
            Request::get("/v1/activities").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "missing_auth_header");
    }

    #[tokio::test]
    async fn invited_operator_creates_a_wallet() {
        let h = Harness::new(0, 0);
        let app = router(h.app_state());
        let token = sign_in(&h, &app, "ops@example.com", Role::Operator).await;

        let (status, me) = call(&app, get("/v1/me", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["email"], "ops@example.com");
        assert_eq!(me["role"], "operator");

        let (status, activity) = call(
            &app,
            post("/v1/wallets", Some(&token), wallet_params("treasury")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(activity["status"], "completed");

        let (status, wallets) = call(&app, get("/v1/wallets", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(wallets["total"], 1);
        let wallet_id = wallets["wallets"][0]["wallet_id"].as_str().unwrap();

        let (status, wallet) = call(&app, get(&format!("/v1/wallets/{wallet_id}"), &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(wallet["accounts"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invitations_are_single_use() {
        let h = Harness::new(0, 0);
        let app = router(h.app_state());
        let invitation = Invitation::issue(
            &h.org.organization_id,
            "admin",
            "once@example.com".into(),
            Role::Approver,
            chrono::Duration::hours(1),
        );
        h.db.create_invitation(&invitation).unwrap();

        let redeem = || post("/v1/invitations/redeem", None, json!({ "token": invitation.token }));
        assert_eq!(call(&app, redeem()).await.0, StatusCode::CREATED);
        assert_eq!(call(&app, redeem()).await.0, StatusCode::CONFLICT);

        let (status, _) = call(
            &app,
            post("/v1/invitations/redeem", None, json!({ "token": "unknown" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn approver_cannot_submit_activities() {
        let h = Harness::new(0, 0);
        let app = router(h.app_state());
        let token = sign_in(&h, &app, "appr@example.com", Role::Approver).await;

        let (status, body) = call(
            &app,
            post(
                "/v1/activities",
                Some(&token),
                json!({ "type": "create_wallet", "parameters": wallet_params("w") }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error_code"], "unauthorized");
    }

    #[tokio::test]
    async fn revoked_session_is_rejected() {
        let h = Harness::new(0, 0);
        let app = router(h.app_state());
        let token = sign_in(&h, &app, "bye@example.com", Role::Operator).await;

        let (status, refreshed) = call(&app, post("/v1/sessions/refresh", Some(&token), json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(refreshed["expires_in"], 3600);

        let revoke = Request::delete("/v1/sessions/current")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(call(&app, revoke).await.0, StatusCode::NO_CONTENT);

        let (status, _) = call(&app, get("/v1/me", &token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn api_key_login_rejects_replays() {
        use k256::ecdsa::{signature::Signer, Signature};

        let h = Harness::new(0, 0);
        let app = router(h.app_state());
        h.add_user("bot", Role::Operator, &[]);
        let key = h.add_api_key("bot");

        let timestamp = chrono::Utc::now().timestamp();
        let message = sessions::login_message(&h.org.organization_id, "bot", timestamp);
        let signature: Signature = key.sign(message.as_bytes());
        let login = json!({
            "organization_id": h.org.organization_id,
            "user_id": "bot",
            "timestamp": timestamp,
            "signature": alloy::hex::encode(signature.to_bytes()),
        });

        let (status, body) = call(&app, post("/v1/sessions", None, login.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["user_id"], "bot");

        let (status, _) = call(&app, post("/v1/sessions", None, login)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let stale = json!({
            "organization_id": h.org.organization_id,
            "user_id": "bot",
            "timestamp": timestamp - 3600,
            "signature": alloy::hex::encode(signature.to_bytes()),
        });
        assert_eq!(call(&app, post("/v1/sessions", None, stale)).await.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_endpoints_require_admin() {
        let h = Harness::new(0, 0);
        let app = router(h.app_state());
        let token = sign_in(&h, &app, "op2@example.com", Role::Operator).await;

        let (status, _) = call(&app, post("/v1/tags", Some(&token), json!({ "name": "hot" }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let admin_token = h
            .app_state()
            .sessions
            .create(&crate::coordination::Session {
                user_id: h.admin.user_id.clone(),
                organization_id: h.org.organization_id.clone(),
                role: Role::Admin,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        let (status, tag) = call(&app, post("/v1/tags", Some(&admin_token), json!({ "name": "hot" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(tag["name"], "hot");

        // Duplicate names conflict.
        let (status, _) = call(&app, post("/v1/tags", Some(&admin_token), json!({ "name": "hot" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn quorum_threshold_cannot_exceed_root() {
        let h = Harness::new(0, 2);
        let app = router(h.app_state());
        let admin_token = h
            .app_state()
            .sessions
            .create(&crate::coordination::Session {
                user_id: h.admin.user_id.clone(),
                organization_id: h.org.organization_id.clone(),
                role: Role::Admin,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        let members: Vec<String> = h.approvers.iter().map(|u| u.user_id.clone()).collect();

        let put = |threshold: u32| {
            Request::put("/v1/organization/quorum")
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {admin_token}"))
                .body(Body::from(
                    json!({ "default_quorum_threshold": threshold, "root_quorum": members })
                        .to_string(),
                ))
                .unwrap()
        };
        assert_eq!(call(&app, put(3)).await.0, StatusCode::BAD_REQUEST);

        let (status, org) = call(&app, put(2)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(org["default_quorum_threshold"], 2);
        assert_eq!(org["version"], h.org.version + 1);
    }
}
