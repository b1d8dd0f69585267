// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::activity::ActivityError;
use crate::coordination::CoordinationError;
use crate::storage::StorageError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Seconds for the `Retry-After` header.
    pub retry_after: Option<u64>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            retry_after: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_payload", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "unauthorized", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl From<ActivityError> for ApiError {
    fn from(err: ActivityError) -> Self {
        let status = match &err {
            ActivityError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ActivityError::Unauthorized(_) | ActivityError::NotAQuorumMember { .. } => {
                StatusCode::FORBIDDEN
            }
            ActivityError::AlreadyDecided { .. }
            | ActivityError::ActivityNotPending { .. }
            | ActivityError::LockContention(_) => StatusCode::CONFLICT,
            ActivityError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ActivityError::EnclaveUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ActivityError::EnclaveRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ActivityError::NotFound(_) => StatusCode::NOT_FOUND,
            ActivityError::Storage(e) => return ApiError::from_storage(e),
            ActivityError::Coordination(e) => return ApiError::from_coordination(e),
        };
        let retry_after = match &err {
            ActivityError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };
        Self {
            status,
            message: err.to_string(),
            code: err.error_code(),
            retry_after,
        }
    }
}

impl ApiError {
    fn from_storage(err: &StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => ApiError::not_found(format!("{what} not found")),
            StorageError::Conflict(message) => ApiError::conflict(message.clone()),
            other => {
                tracing::error!(error = %other, "Storage failure");
                ApiError::internal("Internal storage error")
            }
        }
    }

    fn from_coordination(err: &CoordinationError) -> Self {
        tracing::error!(error = %err, "Coordination store failure");
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "internal_error",
            "Coordination store unavailable",
        )
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::from_storage(&err)
    }
}

impl From<CoordinationError> for ApiError {
    fn from(err: CoordinationError) -> Self {
        match err {
            CoordinationError::RateLimited { .. } => ActivityError::from(err).into(),
            other => ApiError::from_coordination(&other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code,
        });
        let mut response = (self.status, body).into_response();
        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityStatus;
    use axum::body::to_bytes;

    async fn body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.code, "invalid_payload");
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body(response).await;
        assert_eq!(body["error"], "bad data");
        assert_eq!(body["error_code"], "invalid_payload");
    }

    #[tokio::test]
    async fn activity_errors_map_to_codes() {
        let cases = vec![
            (
                ActivityError::NotAQuorumMember {
                    activity_id: "a".into(),
                    user_id: "u".into(),
                },
                StatusCode::FORBIDDEN,
                "not_a_quorum_member",
            ),
            (
                ActivityError::ActivityNotPending {
                    activity_id: "a".into(),
                    status: ActivityStatus::Completed,
                },
                StatusCode::CONFLICT,
                "activity_not_pending",
            ),
            (
                ActivityError::EnclaveUnavailable("timeout".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                "enclave_unavailable",
            ),
            (
                ActivityError::EnclaveRejected("bad curve".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
                "enclave_rejected",
            ),
            (
                ActivityError::LockContention("lock:o:a".into()),
                StatusCode::CONFLICT,
                "lock_contention",
            ),
        ];
        for (err, status, code) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), status);
            assert_eq!(body(response).await["error_code"], code);
        }
    }

    #[tokio::test]
    async fn rate_limited_sets_retry_after() {
        let response =
            ApiError::from(ActivityError::RateLimited { retry_after_secs: 7 }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "7");
    }

    #[tokio::test]
    async fn storage_details_are_not_leaked() {
        let err = ActivityError::Storage(StorageError::Corrupted("row 42 unreadable".into()));
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body(response).await;
        assert_eq!(body["error_code"], "internal_error");
        assert!(!body["error"].as_str().unwrap().contains("row 42"));
    }
}
