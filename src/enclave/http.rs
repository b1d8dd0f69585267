// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON-over-HTTPS client for the remote enclave.
//!
//! | Operation            | Request                    |
//! |----------------------|----------------------------|
//! | `create_wallet`      | `POST {base}/v1/wallets`   |
//! | `create_private_key` | `POST {base}/v1/keys`      |
//! | `sign`               | `POST {base}/v1/sign`      |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use super::{
    EnclaveClient, EnclaveError, KeyMaterial, KeyRef, PrivateKeySpec, SignPayload,
    SignatureMaterial, WalletMaterial, WalletSpec,
};

#[derive(Debug, Clone)]
pub struct HttpEnclaveClient {
    base_url: Url,
    http: Client,
}

#[derive(Serialize)]
struct SignRequest<'a> {
    key: &'a KeyRef,
    #[serde(flatten)]
    payload: &'a SignPayload,
}

impl HttpEnclaveClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, EnclaveError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EnclaveError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { base_url, http })
    }

    fn endpoint(&self, path: &str) -> Result<Url, EnclaveError> {
        self.base_url
            .join(path)
            .map_err(|e| EnclaveError::Rejected(format!("invalid enclave endpoint {path}: {e}")))
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, EnclaveError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EnclaveError::Unavailable(format!("enclave request timed out: {e}"))
                } else {
                    EnclaveError::Unavailable(format!("enclave request failed: {e}"))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return response.json::<R>().await.map_err(|e| {
                EnclaveError::Unavailable(format!("invalid enclave response: {e}"))
            });
        }

        let text = response.text().await.unwrap_or_default();
        Err(classify_status(status, text))
    }
}

/// 4xx is a definitive refusal, everything else may succeed on retry.
fn classify_status(status: StatusCode, body: String) -> EnclaveError {
    let message = if body.is_empty() {
        format!("enclave returned HTTP {status}")
    } else {
        format!("enclave returned HTTP {status}: {body}")
    };
    let transient = matches!(
        status,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS
    );
    if status.is_client_error() && !transient {
        EnclaveError::Rejected(message)
    } else {
        EnclaveError::Unavailable(message)
    }
}

#[async_trait]
impl EnclaveClient for HttpEnclaveClient {
    async fn create_wallet(&self, spec: &WalletSpec) -> Result<WalletMaterial, EnclaveError> {
        let material: WalletMaterial = self.post("v1/wallets", spec).await?;
        if material.accounts.len() != spec.accounts.len() {
            return Err(EnclaveError::Rejected(format!(
                "enclave returned {} accounts, expected {}",
                material.accounts.len(),
                spec.accounts.len()
            )));
        }
        Ok(material)
    }

    async fn create_private_key(
        &self,
        spec: &PrivateKeySpec,
    ) -> Result<KeyMaterial, EnclaveError> {
        self.post("v1/keys", spec).await
    }

    async fn sign(
        &self,
        key: &KeyRef,
        payload: &SignPayload,
    ) -> Result<SignatureMaterial, EnclaveError> {
        self.post("v1/sign", &SignRequest { key, payload }).await
    }
}
