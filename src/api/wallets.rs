// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet and private key API endpoints.
//!
//! Creation goes through the activity engine like any other sensitive
//! operation; the response is the resulting activity. Rows only exist once
//! that activity has completed. The `Idempotency-Key` header is honoured.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    activity::{Activity, CreatePrivateKeyIntent, CreateWalletIntent},
    auth::Auth,
    error::ApiError,
    models::{PrivateKey, Wallet, WalletAccount},
    state::AppState,
};

const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Wallet with its derived accounts.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    pub wallet: Wallet,
    pub accounts: Vec<WalletAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletListResponse {
    pub wallets: Vec<Wallet>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PrivateKeyListResponse {
    pub private_keys: Vec<PrivateKey>,
    pub total: usize,
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    match headers.get(IDEMPOTENCY_KEY_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim().to_string()))
            .map_err(|_| ApiError::bad_request("Idempotency-Key must be visible ASCII")),
    }
}

/// Submit a `create_wallet` activity.
#[utoipa::path(
    post,
    path = "/v1/wallets",
    tag = "Wallets",
    security(("bearer_auth" = [])),
    request_body = CreateWalletIntent,
    responses(
        (status = 200, description = "Activity recorded", body = Activity),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Role may not create wallets")
    )
)]
pub async fn create_wallet(
    Auth(user): Auth,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(intent): Json<CreateWalletIntent>,
) -> Result<Json<Activity>, ApiError> {
    let activity = state
        .engine
        .create_wallet(
            &user.organization_id,
            &user.user_id,
            intent,
            idempotency_key(&headers)?,
        )
        .await?;
    Ok(Json(activity))
}

#[utoipa::path(
    get,
    path = "/v1/wallets",
    tag = "Wallets",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Wallets of the organization", body = WalletListResponse)
    )
)]
pub async fn list_wallets(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<WalletListResponse>, ApiError> {
    let wallets = state.db.list_wallets(&user.organization_id)?;
    let total = wallets.len();
    Ok(Json(WalletListResponse { wallets, total }))
}

#[utoipa::path(
    get,
    path = "/v1/wallets/{wallet_id}",
    tag = "Wallets",
    security(("bearer_auth" = [])),
    params(("wallet_id" = String, Path, description = "Wallet ID")),
    responses(
        (status = 200, description = "Wallet", body = WalletResponse),
        (status = 404, description = "Wallet not found")
    )
)]
pub async fn get_wallet(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
) -> Result<Json<WalletResponse>, ApiError> {
    let wallet = state
        .db
        .get_wallet(&wallet_id)?
        .filter(|w| w.organization_id == user.organization_id)
        .ok_or_else(|| ApiError::not_found(format!("Wallet {wallet_id} not found")))?;
    let accounts = state.db.list_wallet_accounts(&wallet_id)?;
    Ok(Json(WalletResponse { wallet, accounts }))
}

/// Submit a `create_private_key` activity.
#[utoipa::path(
    post,
    path = "/v1/private-keys",
    tag = "Private Keys",
    security(("bearer_auth" = [])),
    request_body = CreatePrivateKeyIntent,
    responses(
        (status = 200, description = "Activity recorded", body = Activity),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Role may not create keys")
    )
)]
pub async fn create_private_key(
    Auth(user): Auth,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(intent): Json<CreatePrivateKeyIntent>,
) -> Result<Json<Activity>, ApiError> {
    let activity = state
        .engine
        .create_private_key(
            &user.organization_id,
            &user.user_id,
            intent,
            idempotency_key(&headers)?,
        )
        .await?;
    Ok(Json(activity))
}

#[utoipa::path(
    get,
    path = "/v1/private-keys",
    tag = "Private Keys",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Private keys of the organization", body = PrivateKeyListResponse)
    )
)]
pub async fn list_private_keys(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<PrivateKeyListResponse>, ApiError> {
    let private_keys = state.db.list_private_keys(&user.organization_id)?;
    let total = private_keys.len();
    Ok(Json(PrivateKeyListResponse {
        private_keys,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/private-keys/{private_key_id}",
    tag = "Private Keys",
    security(("bearer_auth" = [])),
    params(("private_key_id" = String, Path, description = "Private key ID")),
    responses(
        (status = 200, description = "Private key (public part only)", body = PrivateKey),
        (status = 404, description = "Private key not found")
    )
)]
pub async fn get_private_key(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(private_key_id): Path<String>,
) -> Result<Json<PrivateKey>, ApiError> {
    state
        .db
        .get_private_key(&private_key_id)?
        .filter(|k| k.organization_id == user.organization_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Private key {private_key_id} not found")))
}
