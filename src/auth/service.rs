// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication flows: register, login, refresh rotation, logout,
//! session management, and the TOTP 2FA lifecycle.
//!
//! Every flow that touches more than one row runs in a single store write
//! transaction, so a crashed login can never leave a session without its
//! token hash or vice versa.

use chrono::{DateTime, Duration, Utc};

use super::{password, totp, AuthError, Role, TokenPair};
use crate::state::AppState;
use crate::store::{
    RecoveryCode, Session, SessionRepo, TwoFactorRepo, TwoFactorSecret, User, UserRepo, Writer,
};

/// Request metadata recorded on the session row.
#[derive(Debug, Clone, Default)]
pub struct SessionMeta {
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Issuer name embedded in provisioning URLs.
const TOTP_ISSUER: &str = "StakeVault";

fn mint_session(
    state: &AppState,
    tx: &impl Writer,
    user: &User,
    meta: &SessionMeta,
    now: DateTime<Utc>,
) -> Result<TokenPair, AuthError> {
    let refresh_token = state.tokens.new_refresh_token();
    let session = Session {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        refresh_token_hash: state.tokens.hash_refresh_token(&refresh_token),
        device_name: meta.device_name.clone(),
        ip_address: meta.ip_address.clone(),
        user_agent: meta.user_agent.clone(),
        last_active_at: now,
        expires_at: now + Duration::seconds(state.tokens.refresh_ttl_secs()),
        is_revoked: false,
        created_at: now,
    };
    SessionRepo::new(tx).insert(&session)?;

    let (access_token, expires_in) = state
        .tokens
        .issue_access(&user.id, &session.id, user.role, now)?;
    Ok(TokenPair {
        access_token,
        refresh_token,
        expires_in,
    })
}

/// Create an account and log it in.
///
/// `email` must already be validated and lowercased; `password` must have
/// passed strength validation. Hashing is CPU-bound, so callers run this
/// on the blocking pool.
pub fn register(
    state: &AppState,
    email: String,
    password_plain: &str,
    meta: SessionMeta,
) -> Result<(User, TokenPair), AuthError> {
    let password_hash = password::hash_password(password_plain)?;
    let now = state.clock.now();
    let user = User::new(
        email,
        password_hash,
        now,
        state.security.default_daily_withdrawal_limit_usd.clone(),
    );

    let pair = state.store.write(|tx| {
        UserRepo::new(tx).insert(&user)?;
        mint_session(state, tx, &user, &meta, now)
    })?;
    Ok((user, pair))
}

fn verify_second_factor(
    state: &AppState,
    tx: &impl Writer,
    user: &User,
    code: &str,
    now: DateTime<Utc>,
) -> Result<(), AuthError> {
    let repo = TwoFactorRepo::new(tx);
    let secret = repo
        .secret(&user.id)?
        .filter(|s| s.is_verified)
        .ok_or(AuthError::TwoFactorNotEnabled)?;

    if code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit()) {
        let plain = state.secrets.decrypt_string(&secret.encrypted_secret)?;
        if totp::verify_code(&plain, code, now)? {
            return Ok(());
        }
        return Err(AuthError::InvalidTwoFactorCode);
    }

    // Anything else is treated as a one-shot recovery code.
    let hash = totp::hash_recovery_code(code);
    match repo.recovery_code(&user.id, &hash)? {
        Some(recovery) if !recovery.used => {
            repo.put_recovery_code(&RecoveryCode {
                used: true,
                ..recovery
            })?;
            Ok(())
        }
        _ => Err(AuthError::InvalidTwoFactorCode),
    }
}

/// Password (+ second factor) login.
pub fn login(
    state: &AppState,
    email: &str,
    password_plain: &str,
    totp_code: Option<&str>,
    meta: SessionMeta,
) -> Result<(User, TokenPair), AuthError> {
    let now = state.clock.now();

    state.store.write(|tx| {
        // Unknown account and wrong password collapse into one error.
        let mut user = UserRepo::new(tx)
            .by_email(email)?
            .ok_or(AuthError::InvalidCredentials)?;
        if !password::verify_password(password_plain, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }
        if user.role.requires_two_factor() && !user.two_factor_enabled {
            return Err(AuthError::AdminTwoFactorRequired);
        }

        if user.two_factor_enabled {
            let code = totp_code.ok_or(AuthError::TwoFactorRequired)?;
            verify_second_factor(state, tx, &user, code, now)?;
        }

        user.last_login_at = Some(now);
        UserRepo::new(tx).update(&user)?;

        let pair = mint_session(state, tx, &user, &meta, now)?;
        Ok((user, pair))
    })
}

/// Rotate a refresh token: revoke its session, mint a new pair.
///
/// Concurrent refreshes with the same token race on the revocation flag
/// inside one serialized transaction, so at most one of them wins.
pub fn refresh(
    state: &AppState,
    refresh_token: &str,
    meta: SessionMeta,
) -> Result<TokenPair, AuthError> {
    let now = state.clock.now();
    let token_hash = state.tokens.hash_refresh_token(refresh_token);

    state.store.write(|tx| {
        let repo = SessionRepo::new(tx);
        let mut session = repo
            .by_token_hash(&token_hash)?
            .ok_or(AuthError::SessionInvalid)?;
        if !session.is_live(now) {
            return Err(AuthError::SessionInvalid);
        }

        session.is_revoked = true;
        session.last_active_at = now;
        repo.update(&session)?;

        let user = UserRepo::new(tx)
            .get(&session.user_id)?
            .ok_or(AuthError::SessionInvalid)?;
        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        mint_session(state, tx, &user, &meta, now)
    })
}

/// Revoke the caller's current session.
pub fn logout(state: &AppState, session_id: &str) -> Result<(), AuthError> {
    state.store.write(|tx| {
        let repo = SessionRepo::new(tx);
        if let Some(mut session) = repo.get(session_id)? {
            session.is_revoked = true;
            repo.update(&session)?;
        }
        Ok(())
    })
}

/// List a user's sessions.
pub fn list_sessions(state: &AppState, user_id: &str) -> Result<Vec<Session>, AuthError> {
    Ok(state
        .store
        .read(|tx| SessionRepo::new(tx).list_for_user(user_id))?)
}

/// Revoke one of the caller's sessions. Revoking an already revoked
/// session is a no-op; revoking someone else's is refused.
pub fn revoke_session(state: &AppState, user_id: &str, session_id: &str) -> Result<(), AuthError> {
    state.store.write(|tx| {
        let repo = SessionRepo::new(tx);
        let Some(mut session) = repo.get(session_id)? else {
            return Err(AuthError::SessionInvalid);
        };
        if session.user_id != user_id {
            return Err(AuthError::InsufficientRole);
        }
        if !session.is_revoked {
            session.is_revoked = true;
            repo.update(&session)?;
        }
        Ok(())
    })
}

/// Begin 2FA setup: mint a secret, store it encrypted and unverified.
pub fn setup_two_factor(state: &AppState, user: &crate::auth::AuthUser) -> Result<(String, String), AuthError> {
    state.store.write(|tx| {
        let user_row = UserRepo::new(tx)
            .get(&user.user_id)?
            .ok_or(AuthError::SessionInvalid)?;
        if user_row.two_factor_enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }

        let secret = totp::generate_secret();
        TwoFactorRepo::new(tx).put_secret(&TwoFactorSecret {
            user_id: user.user_id.clone(),
            encrypted_secret: state.secrets.encrypt(secret.as_bytes())?,
            is_verified: false,
        })?;

        let url = totp::provisioning_url(&secret, &user.email, TOTP_ISSUER);
        Ok((secret, url))
    })
}

/// Complete 2FA setup with the first correct code. Enables the user flag
/// and returns the plaintext recovery codes, shown exactly once.
pub fn verify_two_factor(
    state: &AppState,
    user_id: &str,
    code: &str,
) -> Result<Vec<String>, AuthError> {
    let now = state.clock.now();

    state.store.write(|tx| {
        let repo = TwoFactorRepo::new(tx);
        let secret = repo.secret(user_id)?.ok_or(AuthError::TwoFactorNotEnabled)?;
        if secret.is_verified {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }

        let plain = state.secrets.decrypt_string(&secret.encrypted_secret)?;
        if !totp::verify_code(&plain, code, now)? {
            return Err(AuthError::InvalidTwoFactorCode);
        }

        repo.put_secret(&TwoFactorSecret {
            is_verified: true,
            ..secret
        })?;

        let mut user = UserRepo::new(tx)
            .get(user_id)?
            .ok_or(AuthError::SessionInvalid)?;
        user.two_factor_enabled = true;
        UserRepo::new(tx).update(&user)?;

        // Fresh codes replace anything from an earlier aborted setup.
        repo.clear_recovery_codes(user_id)?;
        let codes = totp::generate_recovery_codes();
        for code in &codes {
            repo.put_recovery_code(&RecoveryCode {
                user_id: user_id.to_string(),
                code_hash: totp::hash_recovery_code(code),
                used: false,
            })?;
        }
        Ok(codes)
    })
}

/// Disable 2FA after verifying a current code.
pub fn disable_two_factor(state: &AppState, user_id: &str, code: &str) -> Result<(), AuthError> {
    let now = state.clock.now();

    state.store.write(|tx| {
        let repo = TwoFactorRepo::new(tx);
        let secret = repo
            .secret(user_id)?
            .filter(|s| s.is_verified)
            .ok_or(AuthError::TwoFactorNotEnabled)?;

        let plain = state.secrets.decrypt_string(&secret.encrypted_secret)?;
        if !totp::verify_code(&plain, code, now)? {
            return Err(AuthError::InvalidTwoFactorCode);
        }

        repo.delete_secret(user_id)?;
        repo.clear_recovery_codes(user_id)?;

        let mut user = UserRepo::new(tx)
            .get(user_id)?
            .ok_or(AuthError::SessionInvalid)?;
        user.two_factor_enabled = false;
        UserRepo::new(tx).update(&user)?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testutil::test_state;

    const PASSWORD: &str = "Str0ng!pass";

    fn registered(state: &AppState, email: &str) -> (User, TokenPair) {
        register(state, email.to_string(), PASSWORD, SessionMeta::default()).unwrap()
    }

    #[test]
    fn register_then_login() {
        let (_dir, state, _clock) = test_state();
        let (user, pair) = registered(&state, "alice@example.com");
        assert!(!pair.access_token.is_empty());
        assert_eq!(pair.expires_in, 900);
        assert_eq!(user.role, Role::User);

        let (logged_in, _pair) = login(
            &state,
            "alice@example.com",
            PASSWORD,
            None,
            SessionMeta::default(),
        )
        .unwrap();
        assert_eq!(logged_in.id, user.id);
        assert!(logged_in.last_login_at.is_some());
    }

    #[test]
    fn wrong_password_and_unknown_email_look_identical() {
        let (_dir, state, _clock) = test_state();
        registered(&state, "alice@example.com");

        let wrong_password = login(
            &state,
            "alice@example.com",
            "Wrong1!pass",
            None,
            SessionMeta::default(),
        )
        .unwrap_err();
        let unknown_email = login(
            &state,
            "nobody@example.com",
            PASSWORD,
            None,
            SessionMeta::default(),
        )
        .unwrap_err();

        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_email, AuthError::InvalidCredentials));
    }

    #[test]
    fn refresh_rotates_and_old_token_dies() {
        let (_dir, state, _clock) = test_state();
        let (_user, pair) = registered(&state, "alice@example.com");

        let rotated = refresh(&state, &pair.refresh_token, SessionMeta::default()).unwrap();
        assert_ne!(rotated.refresh_token, pair.refresh_token);

        // The first refresh token is now revoked.
        let err = refresh(&state, &pair.refresh_token, SessionMeta::default()).unwrap_err();
        assert!(matches!(err, AuthError::SessionInvalid));

        // The rotated one still works.
        assert!(refresh(&state, &rotated.refresh_token, SessionMeta::default()).is_ok());
    }

    #[test]
    fn expired_refresh_token_is_rejected() {
        let (_dir, state, clock) = test_state();
        let (_user, pair) = registered(&state, "alice@example.com");

        clock.advance_secs(604_801);
        let err = refresh(&state, &pair.refresh_token, SessionMeta::default()).unwrap_err();
        assert!(matches!(err, AuthError::SessionInvalid));
    }

    #[test]
    fn two_factor_setup_verify_login_cycle() {
        let (_dir, state, _clock) = test_state();
        let (user, _pair) = registered(&state, "alice@example.com");
        let auth_user = crate::auth::AuthUser {
            user_id: user.id.clone(),
            session_id: "s".into(),
            email: user.email.clone(),
            role: user.role,
        };

        let (secret, url) = setup_two_factor(&state, &auth_user).unwrap();
        assert!(url.contains(&secret));

        // Wrong code does not enable.
        assert!(matches!(
            verify_two_factor(&state, &user.id, "000000"),
            Err(AuthError::InvalidTwoFactorCode) | Err(AuthError::TwoFactorAlreadyEnabled)
        ));

        let code = totp::current_code(&secret, state.clock.now()).unwrap();
        let recovery_codes = verify_two_factor(&state, &user.id, &code).unwrap();
        assert_eq!(recovery_codes.len(), 10);

        // Login now demands a second factor.
        let err = login(&state, "alice@example.com", PASSWORD, None, SessionMeta::default())
            .unwrap_err();
        assert!(matches!(err, AuthError::TwoFactorRequired));

        let code = totp::current_code(&secret, state.clock.now()).unwrap();
        assert!(login(
            &state,
            "alice@example.com",
            PASSWORD,
            Some(&code),
            SessionMeta::default()
        )
        .is_ok());
    }

    #[test]
    fn recovery_code_works_exactly_once() {
        let (_dir, state, _clock) = test_state();
        let (user, _pair) = registered(&state, "alice@example.com");
        let auth_user = crate::auth::AuthUser {
            user_id: user.id.clone(),
            session_id: "s".into(),
            email: user.email.clone(),
            role: user.role,
        };

        let (secret, _url) = setup_two_factor(&state, &auth_user).unwrap();
        let code = totp::current_code(&secret, state.clock.now()).unwrap();
        let recovery_codes = verify_two_factor(&state, &user.id, &code).unwrap();
        let recovery = &recovery_codes[0];

        assert!(login(
            &state,
            "alice@example.com",
            PASSWORD,
            Some(recovery),
            SessionMeta::default()
        )
        .is_ok());

        // Second use of the same code fails.
        let err = login(
            &state,
            "alice@example.com",
            PASSWORD,
            Some(recovery),
            SessionMeta::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::InvalidTwoFactorCode));
    }

    #[test]
    fn admin_without_two_factor_cannot_login() {
        let (_dir, state, _clock) = test_state();
        let (mut user, _pair) = registered(&state, "admin@example.com");
        user.role = Role::Admin;
        state.store.write(|tx| UserRepo::new(tx).update(&user)).unwrap();

        let err = login(&state, "admin@example.com", PASSWORD, None, SessionMeta::default())
            .unwrap_err();
        assert!(matches!(err, AuthError::AdminTwoFactorRequired));
    }

    #[test]
    fn disable_two_factor_clears_secret_and_codes() {
        let (_dir, state, _clock) = test_state();
        let (user, _pair) = registered(&state, "alice@example.com");
        let auth_user = crate::auth::AuthUser {
            user_id: user.id.clone(),
            session_id: "s".into(),
            email: user.email.clone(),
            role: user.role,
        };

        let (secret, _url) = setup_two_factor(&state, &auth_user).unwrap();
        let code = totp::current_code(&secret, state.clock.now()).unwrap();
        verify_two_factor(&state, &user.id, &code).unwrap();

        let code = totp::current_code(&secret, state.clock.now()).unwrap();
        disable_two_factor(&state, &user.id, &code).unwrap();

        let stored = state
            .store
            .read(|tx| TwoFactorRepo::new(tx).secret(&user.id))
            .unwrap();
        assert!(stored.is_none());

        // Login no longer requires a code.
        assert!(login(&state, "alice@example.com", PASSWORD, None, SessionMeta::default()).is_ok());
    }

    #[test]
    fn revoke_session_enforces_ownership() {
        let (_dir, state, _clock) = test_state();
        let (user_a, _) = registered(&state, "a@example.com");
        let (_user_b, pair_b) = registered(&state, "b@example.com");

        let sessions_b = list_sessions(&state, &_user_b.id).unwrap();
        assert_eq!(sessions_b.len(), 1);
        let session_b = &sessions_b[0];

        let err = revoke_session(&state, &user_a.id, &session_b.id).unwrap_err();
        assert!(matches!(err, AuthError::InsufficientRole));

        revoke_session(&state, &_user_b.id, &session_b.id).unwrap();
        // Idempotent.
        revoke_session(&state, &_user_b.id, &session_b.id).unwrap();

        // The revoked session can no longer refresh.
        let err = refresh(&state, &pair_b.refresh_token, SessionMeta::default()).unwrap_err();
        assert!(matches!(err, AuthError::SessionInvalid));
    }
}
