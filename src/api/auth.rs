// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and session endpoints.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{service, Auth, AuthError, TokenPair},
    error::ApiError,
    state::AppState,
    store::Session,
    validate,
};

/// Request body for registration.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// 6-digit TOTP or an 8-character recovery code, required when 2FA is
    /// enabled on the account.
    #[serde(default)]
    pub totp_code: Option<String>,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Request body carrying a TOTP code.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TotpRequest {
    pub totp_code: String,
}

/// Response for a successful 2FA setup.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorSetupResponse {
    /// Base32 secret for manual entry.
    pub secret: String,
    /// otpauth:// URL for authenticator apps.
    pub qr_code_url: String,
}

/// Response for a completed 2FA verification.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryCodesResponse {
    /// One-shot recovery codes, shown exactly once.
    pub recovery_codes: Vec<String>,
}

/// One session row as exposed to clients; the token hash never leaves
/// the store.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: String,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub last_active_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub is_revoked: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// True for the session serving this request.
    pub current: bool,
}

impl SessionResponse {
    fn from_session(session: Session, current_session_id: &str) -> Self {
        Self {
            current: session.id == current_session_id,
            id: session.id,
            device_name: session.device_name,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
            last_active_at: session.last_active_at,
            expires_at: session.expires_at,
            is_revoked: session.is_revoked,
            created_at: session.created_at,
        }
    }
}

/// Session list response.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionResponse>,
    pub total: usize,
}

fn session_meta(headers: &HeaderMap) -> service::SessionMeta {
    service::SessionMeta {
        device_name: header_string(headers, "x-device-name"),
        ip_address: header_string(headers, "x-forwarded-for")
            .map(|v| v.split(',').next().unwrap_or_default().trim().to_string()),
        user_agent: header_string(headers, "user-agent"),
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Register a new account.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = TokenPair),
        (status = 400, description = "Validation failure"),
        (status = 409, description = "Email already registered"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenPair>), ApiError> {
    let email = validate::email(&request.email)?;
    validate::password(&request.password)?;
    let meta = session_meta(&headers);

    // Argon2id is CPU-bound; keep it off the async runtime.
    let result = tokio::task::spawn_blocking(move || {
        service::register(&state, email, &request.password, meta)
    })
    .await
    .map_err(|e| ApiError::internal(format!("registration task failed: {e}")))?;

    match result {
        Ok((_user, pair)) => Ok((StatusCode::CREATED, Json(pair))),
        Err(AuthError::Internal(msg)) if msg.contains("already registered") => {
            Err(ApiError::conflict("Email is already registered"))
        }
        Err(e) => Err(auth_error(e)),
    }
}

/// Log in with email, password, and an optional second factor.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = TokenPair),
        (status = 400, description = "2FA required"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account disabled or admin 2FA missing"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let email = validate::email(&request.email)?;
    if let Some(code) = &request.totp_code {
        if code.len() == 6 {
            validate::totp_code(code)?;
        }
    }
    let meta = session_meta(&headers);

    let result = tokio::task::spawn_blocking(move || {
        service::login(
            &state,
            &email,
            &request.password,
            request.totp_code.as_deref(),
            meta,
        )
    })
    .await
    .map_err(|e| ApiError::internal(format!("login task failed: {e}")))?;

    match result {
        Ok((_user, pair)) => Ok(Json(pair)),
        Err(e) => Err(auth_error(e)),
    }
}

/// Rotate a refresh token.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Rotated pair", body = TokenPair),
        (status = 401, description = "Refresh token invalid, expired, or revoked")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let meta = session_meta(&headers);
    service::refresh(&state, &request.refresh_token, meta)
        .map(Json)
        .map_err(auth_error)
}

/// Revoke the current session.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "Auth",
    security(("bearer" = [])),
    responses((status = 204, description = "Logged out"))
)]
pub async fn logout(Auth(user): Auth, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    service::logout(&state, &user.session_id).map_err(auth_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// List the caller's sessions.
#[utoipa::path(
    get,
    path = "/v1/auth/sessions",
    tag = "Auth",
    security(("bearer" = [])),
    responses((status = 200, description = "Sessions", body = SessionListResponse))
)]
pub async fn list_sessions(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let sessions: Vec<SessionResponse> = service::list_sessions(&state, &user.user_id)
        .map_err(auth_error)?
        .into_iter()
        .map(|s| SessionResponse::from_session(s, &user.session_id))
        .collect();
    let total = sessions.len();
    Ok(Json(SessionListResponse { sessions, total }))
}

/// Revoke one of the caller's sessions.
#[utoipa::path(
    delete,
    path = "/v1/auth/sessions/{session_id}",
    tag = "Auth",
    security(("bearer" = [])),
    params(("session_id" = String, Path, description = "Session ID")),
    responses(
        (status = 204, description = "Revoked"),
        (status = 403, description = "Not your session")
    )
)]
pub async fn revoke_session(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    service::revoke_session(&state, &user.user_id, &session_id).map_err(|e| match e {
        AuthError::SessionInvalid => ApiError::not_found("Session not found"),
        AuthError::InsufficientRole => ApiError::forbidden("Not your session"),
        other => auth_error(other),
    })?;
    Ok(StatusCode::NO_CONTENT)
}

/// Begin 2FA setup.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/setup",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Secret minted", body = TwoFactorSetupResponse),
        (status = 409, description = "Already enabled")
    )
)]
pub async fn setup_2fa(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<TwoFactorSetupResponse>), ApiError> {
    let (secret, qr_code_url) = service::setup_two_factor(&state, &user).map_err(auth_error)?;
    Ok((
        StatusCode::CREATED,
        Json(TwoFactorSetupResponse { secret, qr_code_url }),
    ))
}

/// Complete 2FA setup with the first correct code.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/verify",
    tag = "Auth",
    security(("bearer" = [])),
    request_body = TotpRequest,
    responses(
        (status = 200, description = "Enabled; recovery codes issued", body = RecoveryCodesResponse),
        (status = 401, description = "Wrong code")
    )
)]
pub async fn verify_2fa(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<TotpRequest>,
) -> Result<Json<RecoveryCodesResponse>, ApiError> {
    validate::totp_code(&request.totp_code)?;
    let recovery_codes =
        service::verify_two_factor(&state, &user.user_id, &request.totp_code).map_err(auth_error)?;
    Ok(Json(RecoveryCodesResponse { recovery_codes }))
}

/// Disable 2FA with a current code.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/disable",
    tag = "Auth",
    security(("bearer" = [])),
    request_body = TotpRequest,
    responses(
        (status = 204, description = "Disabled"),
        (status = 401, description = "Wrong code")
    )
)]
pub async fn disable_2fa(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<TotpRequest>,
) -> Result<StatusCode, ApiError> {
    validate::totp_code(&request.totp_code)?;
    service::disable_two_factor(&state, &user.user_id, &request.totp_code).map_err(auth_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Map an auth-layer error onto the API error shape.
fn auth_error(err: AuthError) -> ApiError {
    let mut api = ApiError::new(err.status_code(), err.to_string());
    api.code = err.code();
    api
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_meta_takes_first_forwarded_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.1, 10.0.0.2".parse().unwrap());
        headers.insert("user-agent", "tests/1.0".parse().unwrap());

        let meta = session_meta(&headers);
        assert_eq!(meta.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(meta.user_agent.as_deref(), Some("tests/1.0"));
        assert!(meta.device_name.is_none());
    }

    #[test]
    fn auth_error_mapping_carries_codes() {
        let api = auth_error(AuthError::TwoFactorRequired);
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.code, Some("2FA_REQUIRED"));

        let api = auth_error(AuthError::InvalidCredentials);
        assert_eq!(api.status, StatusCode::UNAUTHORIZED);
        assert_eq!(api.code, None);
    }
}
