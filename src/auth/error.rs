// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication and authorization failures.
///
/// Invalid credentials and unknown accounts intentionally share one
/// variant so responses cannot be used to enumerate registered emails.
#[derive(Debug)]
pub enum AuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Invalid authorization header format
    InvalidAuthHeader,
    /// Token is malformed or its signature is invalid
    InvalidToken,
    /// Token has expired
    TokenExpired,
    /// Backing session is revoked, expired, or gone
    SessionInvalid,
    /// Wrong email/password (or unknown account)
    InvalidCredentials,
    /// Account exists but 2FA code was not supplied
    TwoFactorRequired,
    /// Supplied TOTP or recovery code is wrong
    InvalidTwoFactorCode,
    /// Admin roles must enable 2FA before logging in
    AdminTwoFactorRequired,
    /// 2FA setup attempted while already enabled
    TwoFactorAlreadyEnabled,
    /// 2FA operation attempted without an enabled secret
    TwoFactorNotEnabled,
    /// Account is deactivated
    AccountDisabled,
    /// Caller's role is below the endpoint's minimum
    InsufficientRole,
    /// Internal error
    Internal(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl AuthError {
    /// Stable code for clients that branch on failure kind.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            AuthError::TwoFactorRequired => Some("2FA_REQUIRED"),
            AuthError::InvalidTwoFactorCode => Some("2FA_INVALID"),
            AuthError::AdminTwoFactorRequired => Some("ADMIN_2FA_REQUIRED"),
            _ => None,
        }
    }

    /// HTTP status for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::InvalidToken
            | AuthError::TokenExpired
            | AuthError::SessionInvalid
            | AuthError::InvalidCredentials
            | AuthError::InvalidTwoFactorCode => StatusCode::UNAUTHORIZED,
            AuthError::TwoFactorRequired | AuthError::TwoFactorNotEnabled => {
                StatusCode::BAD_REQUEST
            }
            AuthError::TwoFactorAlreadyEnabled => StatusCode::CONFLICT,
            AuthError::AdminTwoFactorRequired
            | AuthError::AccountDisabled
            | AuthError::InsufficientRole => StatusCode::FORBIDDEN,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingAuthHeader => write!(f, "Authorization header is required"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::InvalidToken => write!(f, "Token is invalid"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::SessionInvalid => write!(f, "Session is no longer valid"),
            AuthError::InvalidCredentials => write!(f, "Invalid email or password"),
            AuthError::TwoFactorRequired => write!(f, "2FA required"),
            AuthError::InvalidTwoFactorCode => write!(f, "Invalid two-factor code"),
            AuthError::AdminTwoFactorRequired => {
                write!(f, "Administrators must enable two-factor authentication")
            }
            AuthError::TwoFactorAlreadyEnabled => {
                write!(f, "Two-factor authentication is already enabled")
            }
            AuthError::TwoFactorNotEnabled => {
                write!(f, "Two-factor authentication is not enabled")
            }
            AuthError::AccountDisabled => write!(f, "Account is disabled"),
            AuthError::InsufficientRole => {
                write!(f, "Insufficient permissions for this operation")
            }
            AuthError::Internal(msg) => write!(f, "Internal authentication error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<crate::store::StoreError> for AuthError {
    fn from(err: crate::store::StoreError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<crate::crypto::CryptoError> for AuthError {
    fn from(err: crate::crypto::CryptoError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Authentication internal error");
        }
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            code: self.code(),
        });
        (status, body).into_response()
    }
}
