// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated users.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthUser
//! }
//! ```
//!
//! Access validation is two-step: verify the JWT signature and expiry,
//! then confirm the backing session row still exists and is not revoked.
//! A logout or refresh rotation therefore invalidates outstanding access
//! tokens at the next request, not at their natural expiry.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::{AuthError, Role};
use crate::state::AppState;
use crate::store::{SessionRepo, UserRepo};

/// The authenticated caller, loaded fresh from the store per request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub session_id: String,
    pub email: String,
    /// Role from the user row, which wins over the role claim baked into
    /// the token at issuance.
    pub role: Role,
}

impl AuthUser {
    pub fn has_role(&self, required: Role) -> bool {
        self.role.has_privilege(required)
    }
}

/// Extractor requiring a valid access token and live session.
pub struct Auth(pub AuthUser);

async fn authenticate(parts: &mut Parts, state: &AppState) -> Result<AuthUser, AuthError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)?;

    let now = state.clock.now();
    let claims = state.tokens.verify_access(token, now)?;

    state.store.read(|tx| {
        let session = SessionRepo::new(tx)
            .get(&claims.sid)?
            .ok_or(AuthError::SessionInvalid)?;
        if !session.is_live(now) || session.user_id != claims.sub {
            return Err(AuthError::SessionInvalid);
        }

        let user = UserRepo::new(tx)
            .get(&claims.sub)?
            .ok_or(AuthError::SessionInvalid)?;
        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        Ok(AuthUser {
            user_id: user.id,
            session_id: session.id,
            email: user.email,
            role: user.role,
        })
    })
}

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Auth(authenticate(parts, state).await?))
    }
}

/// Extractor requiring at least the Admin role.
pub struct AdminOnly(pub AuthUser);

impl FromRequestParts<AppState> for AdminOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = authenticate(parts, state).await?;
        if !user.has_role(Role::Admin) {
            return Err(AuthError::InsufficientRole);
        }
        Ok(AdminOnly(user))
    }
}

/// Extractor requiring the SuperAdmin role (treasury mutation).
pub struct SuperAdminOnly(pub AuthUser);

impl FromRequestParts<AppState> for SuperAdminOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = authenticate(parts, state).await?;
        if !user.has_role(Role::SuperAdmin) {
            return Err(AuthError::InsufficientRole);
        }
        Ok(SuperAdminOnly(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testutil::test_state;
    use crate::store::{Session, User};
    use axum::http::Request;
    use bigdecimal::BigDecimal;

    fn seed_user(state: &AppState, role: Role, active: bool) -> (User, Session, String) {
        let now = state.clock.now();
        let mut user = User::new(
            format!("{}@example.com", uuid::Uuid::new_v4()),
            "$argon2id$stub".into(),
            now,
            BigDecimal::from(50_000u32),
        );
        user.role = role;
        user.is_active = active;

        let refresh = state.tokens.new_refresh_token();
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            refresh_token_hash: state.tokens.hash_refresh_token(&refresh),
            device_name: None,
            ip_address: None,
            user_agent: None,
            last_active_at: now,
            expires_at: now + chrono::Duration::days(7),
            is_revoked: false,
            created_at: now,
        };

        state
            .store
            .write(|tx| {
                UserRepo::new(tx).insert(&user)?;
                SessionRepo::new(tx).insert(&session)
            })
            .unwrap();

        let (token, _) = state
            .tokens
            .issue_access(&user.id, &session.id, user.role, now)
            .unwrap();
        (user, session, token)
    }

    fn parts_with_token(token: &str) -> Parts {
        Request::builder()
            .uri("/test")
            .header("Authorization", format!("Bearer {token}"))
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[tokio::test]
    async fn missing_header_is_rejected() {
        let (_dir, state, _clock) = test_state();
        let mut parts = Request::builder().uri("/test").body(()).unwrap().into_parts().0;
        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::MissingAuthHeader)));
    }

    #[tokio::test]
    async fn valid_token_with_live_session_passes() {
        let (_dir, state, _clock) = test_state();
        let (user, _session, token) = seed_user(&state, Role::User, true);

        let mut parts = parts_with_token(&token);
        let Auth(auth_user) = Auth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(auth_user.user_id, user.id);
        assert_eq!(auth_user.role, Role::User);
    }

    #[tokio::test]
    async fn revoked_session_rejects_outstanding_token() {
        let (_dir, state, _clock) = test_state();
        let (_user, mut session, token) = seed_user(&state, Role::User, true);

        session.is_revoked = true;
        state
            .store
            .write(|tx| SessionRepo::new(tx).update(&session))
            .unwrap();

        let mut parts = parts_with_token(&token);
        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::SessionInvalid)));
    }

    #[tokio::test]
    async fn disabled_account_is_forbidden() {
        let (_dir, state, _clock) = test_state();
        let (_user, _session, token) = seed_user(&state, Role::User, false);

        let mut parts = parts_with_token(&token);
        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::AccountDisabled)));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let (_dir, state, clock) = test_state();
        let (_user, _session, token) = seed_user(&state, Role::User, true);

        clock.advance_secs(901);
        let mut parts = parts_with_token(&token);
        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::TokenExpired)));
    }

    #[tokio::test]
    async fn admin_gate_refuses_users_and_support() {
        let (_dir, state, _clock) = test_state();
        let (_u, _s, user_token) = seed_user(&state, Role::User, true);
        let (_u2, _s2, support_token) = seed_user(&state, Role::Support, true);
        let (_u3, _s3, admin_token) = seed_user(&state, Role::Admin, true);

        for token in [&user_token, &support_token] {
            let mut parts = parts_with_token(token);
            let result = AdminOnly::from_request_parts(&mut parts, &state).await;
            assert!(matches!(result, Err(AuthError::InsufficientRole)));
        }

        let mut parts = parts_with_token(&admin_token);
        assert!(AdminOnly::from_request_parts(&mut parts, &state).await.is_ok());
    }

    #[tokio::test]
    async fn super_admin_gate_refuses_admin() {
        let (_dir, state, _clock) = test_state();
        let (_u, _s, admin_token) = seed_user(&state, Role::Admin, true);
        let (_u2, _s2, super_token) = seed_user(&state, Role::SuperAdmin, true);

        let mut parts = parts_with_token(&admin_token);
        let result = SuperAdminOnly::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::InsufficientRole)));

        let mut parts = parts_with_token(&super_token);
        assert!(SuperAdminOnly::from_request_parts(&mut parts, &state).await.is_ok());
    }
}
