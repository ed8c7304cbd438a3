// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Error Handling
//!
//! This module provides a unified error type for all API responses.
//! Errors are automatically converted to JSON responses with appropriate
//! HTTP status codes.
//!
//! ## JSON Response Format
//!
//! All errors are returned as JSON with an `error` message and, for domain
//! rejections, a stable machine-readable `code`:
//!
//! ```json
//! { "error": "Stake is locked for 25 more days", "code": "STAKE_LOCKED" }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// API error with HTTP status, message, and optional stable code.
///
/// This type implements `IntoResponse`, allowing it to be returned directly
/// from Axum handlers. The error is serialized as JSON.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status code for the response.
    pub status: StatusCode,
    /// Human-readable error message (included in JSON response).
    pub message: String,
    /// Stable machine-readable code for domain rejections.
    pub code: Option<&'static str>,
}

/// JSON body structure for error responses.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl ApiError {
    /// Create a new API error with the given status and message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: None,
        }
    }

    /// Attach a stable code to this error.
    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    /// Create a 400 Bad Request error for malformed input.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Create a 400 error carrying a stable domain-rejection code
    /// (insufficient balance, locked stake, inactive pool, ...).
    pub fn domain(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message).with_code(code)
    }

    /// Create a 401 Unauthorized error.
    ///
    /// Invalid credentials and unknown accounts collapse into this single
    /// response so callers cannot enumerate users.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    /// Create a 403 Forbidden error.
    ///
    /// Use when the user is authenticated but lacks permission, or when a
    /// state machine refuses the transition.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    /// Create a 404 Not Found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Create a 409 Conflict error (unique constraint, state-machine CAS).
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// Create a 429 Too Many Requests error.
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            format!("Rate limit exceeded, retry in {retry_after_secs}s"),
        )
        .with_code("RATE_LIMITED")
    }

    /// Create a 500 Internal Server Error.
    ///
    /// Use for unexpected server-side failures. Avoid exposing internal details.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Create a 503 Service Unavailable error.
    ///
    /// Use when a required service (e.g., blockchain RPC) is unavailable.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}

impl IntoResponse for ApiError {
    /// Convert the error into an Axum HTTP response.
    fn into_response(self) -> Response {
        let mut response = (
            self.status,
            Json(ErrorBody {
                error: self.message,
                code: self.code,
            }),
        )
            .into_response();

        if self.status == StatusCode::TOO_MANY_REQUESTS {
            // Clients honor Retry-After for 429s; one second granularity.
            response
                .headers_mut()
                .insert(axum::http::header::RETRY_AFTER, "1".parse().expect("static header"));
        }
        response
    }
}

impl From<crate::store::StoreError> for ApiError {
    fn from(err: crate::store::StoreError) -> Self {
        match err {
            crate::store::StoreError::NotFound(what) => ApiError::not_found(what),
            crate::store::StoreError::Conflict(what) => ApiError::conflict(what),
            other => {
                tracing::error!(error = %other, "Store failure surfaced to API");
                ApiError::internal("Storage failure")
            }
        }
    }
}

impl From<crate::ledger::LedgerError> for ApiError {
    fn from(err: crate::ledger::LedgerError) -> Self {
        match err {
            crate::ledger::LedgerError::InsufficientBalance { .. } => {
                ApiError::domain("INSUFFICIENT_BALANCE", err.to_string())
            }
            crate::ledger::LedgerError::DuplicateEntry { .. } => ApiError::conflict(err.to_string()),
            other => {
                tracing::error!(error = %other, "Ledger failure surfaced to API");
                ApiError::internal("Ledger failure")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let dom = ApiError::domain("STAKE_LOCKED", "locked");
        assert_eq!(dom.status, StatusCode::BAD_REQUEST);
        assert_eq!(dom.code, Some("STAKE_LOCKED"));
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }

    #[tokio::test]
    async fn domain_code_is_serialized() {
        let response = ApiError::domain("POOL_INACTIVE", "pool closed").into_response();
        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["code"], "POOL_INACTIVE");
    }

    #[tokio::test]
    async fn rate_limited_sets_retry_after() {
        let response = ApiError::rate_limited(1).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(axum::http::header::RETRY_AFTER));
    }
}
