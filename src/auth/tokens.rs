// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access token issuance and verification.
//!
//! Access tokens are short-lived HS256 JWTs bound to a session row.
//! Refresh tokens are opaque random values; only their peppered SHA-256
//! digest is stored. Expiry is checked against the injected clock rather
//! than the system time so tests can drive it.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{AuthError, Role};
use crate::config::TokenSettings;
use crate::crypto::{random_token, sha256_hex};

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id.
    pub sub: String,
    /// Session id the token is bound to.
    pub sid: String,
    /// Role at issuance (re-checked against the user row per request).
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// The pair returned by register/login/refresh.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Issues and verifies token pairs.
#[derive(Clone)]
pub struct TokenIssuer {
    settings: TokenSettings,
}

impl TokenIssuer {
    pub fn new(settings: TokenSettings) -> Self {
        Self { settings }
    }

    /// Refresh token lifetime in seconds.
    pub fn refresh_ttl_secs(&self) -> i64 {
        self.settings.refresh_expires_secs
    }

    /// Mint an access token for a session.
    pub fn issue_access(
        &self,
        user_id: &str,
        session_id: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<(String, i64), AuthError> {
        let claims = AccessClaims {
            sub: user_id.to_string(),
            sid: session_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: now.timestamp() + self.settings.access_expires_secs,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.settings.access_secret.as_bytes()),
        )
        .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))?;
        Ok((token, self.settings.access_expires_secs))
    }

    /// Verify signature and expiry of an access token.
    pub fn verify_access(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, AuthError> {
        // Expiry is checked against the injected clock below.
        let mut validation = Validation::default();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.settings.access_secret.as_bytes()),
            &validation,
        )
        .map_err(|_| AuthError::InvalidToken)?;

        if data.claims.exp <= now.timestamp() {
            return Err(AuthError::TokenExpired);
        }
        Ok(data.claims)
    }

    /// Mint a fresh opaque refresh token (64 hex chars, 32 bytes entropy).
    pub fn new_refresh_token(&self) -> String {
        random_token(32)
    }

    /// Peppered digest of a refresh token; the only form ever persisted.
    pub fn hash_refresh_token(&self, token: &str) -> String {
        let mut input = Vec::with_capacity(self.settings.refresh_secret.len() + token.len());
        input.extend_from_slice(self.settings.refresh_secret.as_bytes());
        input.extend_from_slice(token.as_bytes());
        sha256_hex(&input)
    }
}
