// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User accounts.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Reader, StoreError, StoreResult, Writer, USERS, USERS_BY_EMAIL};
use crate::auth::Role;

/// KYC review status for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycStatus {
    NotStarted,
    Pending,
    Approved,
    Rejected,
}

/// A platform account.
///
/// The password hash and 2FA linkage never leave the store through the API;
/// see `api::user::ProfileResponse` for the public projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Unique, stored lowercase.
    pub email: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub role: Role,
    pub email_verified: bool,
    pub two_factor_enabled: bool,
    pub kyc_status: KycStatus,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    /// Per-user daily withdrawal ceiling in USD, consumed by fraud scoring.
    pub daily_withdrawal_limit_usd: BigDecimal,
}

impl User {
    /// Build a fresh account with the default role and limits.
    pub fn new(
        email: String,
        password_hash: String,
        now: DateTime<Utc>,
        daily_limit_usd: BigDecimal,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            password_hash,
            role: Role::User,
            email_verified: false,
            two_factor_enabled: false,
            kyc_status: KycStatus::NotStarted,
            created_at: now,
            last_login_at: None,
            is_active: true,
            daily_withdrawal_limit_usd: daily_limit_usd,
        }
    }
}

/// Repository for user rows.
pub struct UserRepo<'a, T> {
    tx: &'a T,
}

impl<'a, T: Reader> UserRepo<'a, T> {
    pub fn new(tx: &'a T) -> Self {
        Self { tx }
    }

    pub fn get(&self, user_id: &str) -> StoreResult<Option<User>> {
        self.tx.get(USERS, user_id)
    }

    /// Fetch a user or fail with `NotFound`.
    pub fn require(&self, user_id: &str) -> StoreResult<User> {
        self.get(user_id)?
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))
    }

    /// Look up a user by (already lowercased) email.
    pub fn by_email(&self, email: &str) -> StoreResult<Option<User>> {
        match self.tx.index_get(USERS_BY_EMAIL, email)? {
            Some(id) => self.get(&id),
            None => Ok(None),
        }
    }

    /// All users, ordered by id. Admin listing only.
    pub fn list(&self) -> StoreResult<Vec<User>> {
        Ok(self.tx.scan_all(USERS)?.into_iter().map(|(_, u)| u).collect())
    }
}

impl<'a, T: Writer> UserRepo<'a, T> {
    /// Insert a new user, enforcing email uniqueness.
    pub fn insert(&self, user: &User) -> StoreResult<()> {
        self.tx
            .index_insert_unique(USERS_BY_EMAIL, &user.email, &user.id)
            .map_err(|_| StoreError::Conflict(format!("email {} already registered", user.email)))?;
        self.tx.insert_new(USERS, &user.id, user)
    }

    /// Replace an existing user row.
    pub fn update(&self, user: &User) -> StoreResult<()> {
        self.tx.put(USERS, &user.id, user)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::temp_store;
    use super::*;
    use std::str::FromStr;

    fn sample(email: &str) -> User {
        User::new(
            email.to_string(),
            "$argon2id$stub".to_string(),
            Utc::now(),
            BigDecimal::from_str("50000").unwrap(),
        )
    }

    #[test]
    fn insert_and_fetch_by_email() {
        let (_dir, store) = temp_store();
        let user = sample("alice@example.com");
        store.write(|tx| UserRepo::new(tx).insert(&user)).unwrap();

        let found = store
            .read(|tx| UserRepo::new(tx).by_email("alice@example.com"))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.role, Role::User);
        assert!(!found.two_factor_enabled);
    }

    #[test]
    fn duplicate_email_conflicts() {
        let (_dir, store) = temp_store();
        store.write(|tx| UserRepo::new(tx).insert(&sample("dup@example.com"))).unwrap();
        let err = store
            .write(|tx| UserRepo::new(tx).insert(&sample("dup@example.com")))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn update_preserves_email_index() {
        let (_dir, store) = temp_store();
        let mut user = sample("bob@example.com");
        store.write(|tx| UserRepo::new(tx).insert(&user)).unwrap();

        user.two_factor_enabled = true;
        user.role = Role::Admin;
        store.write(|tx| UserRepo::new(tx).update(&user)).unwrap();

        let found = store
            .read(|tx| UserRepo::new(tx).by_email("bob@example.com"))
            .unwrap()
            .unwrap();
        assert!(found.two_factor_enabled);
        assert_eq!(found.role, Role::Admin);
    }

    #[test]
    fn require_missing_user_is_not_found() {
        let (_dir, store) = temp_store();
        let err = store.read(|tx| UserRepo::new(tx).require("nope")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
