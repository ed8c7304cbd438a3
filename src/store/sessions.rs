// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Refresh-token sessions.
//!
//! A session row is created on register/login/refresh and keyed by the
//! SHA-256 hash of its refresh token. The plaintext token exists only in
//! the response that minted it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    composite_key, composite_prefix, Reader, StoreResult, Writer, SESSIONS, SESSIONS_BY_TOKEN,
    SESSIONS_BY_USER,
};

/// One device session bound to a refresh token.
///
/// API responses go through `api::auth::SessionResponse`, which never
/// carries the token hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    /// SHA-256 hex of the refresh token; unique.
    pub refresh_token_hash: String,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub last_active_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// True when the session can still mint tokens at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && self.expires_at > now
    }
}

/// Repository for session rows.
pub struct SessionRepo<'a, T> {
    tx: &'a T,
}

impl<'a, T: Reader> SessionRepo<'a, T> {
    pub fn new(tx: &'a T) -> Self {
        Self { tx }
    }

    pub fn get(&self, session_id: &str) -> StoreResult<Option<Session>> {
        self.tx.get(SESSIONS, session_id)
    }

    /// Resolve a refresh-token hash to its session.
    pub fn by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>> {
        match self.tx.index_get(SESSIONS_BY_TOKEN, token_hash)? {
            Some(id) => self.get(&id),
            None => Ok(None),
        }
    }

    /// All sessions belonging to a user, revoked ones included.
    pub fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Session>> {
        let ids = self
            .tx
            .scan_ids(SESSIONS_BY_USER, &composite_prefix(&[user_id]))?;
        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(session) = self.get(&id)? {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }
}

impl<'a, T: Writer> SessionRepo<'a, T> {
    /// Insert a new session, enforcing token-hash uniqueness.
    pub fn insert(&self, session: &Session) -> StoreResult<()> {
        self.tx
            .index_insert_unique(SESSIONS_BY_TOKEN, &session.refresh_token_hash, &session.id)?;
        self.tx.index_put_by(
            SESSIONS_BY_USER,
            &composite_key(&[&session.user_id, &session.id]),
            &session.id,
        )?;
        self.tx.insert_new(SESSIONS, &session.id, session)
    }

    /// Replace an existing session row (revocation, activity bump).
    pub fn update(&self, session: &Session) -> StoreResult<()> {
        self.tx.put(SESSIONS, &session.id, session)
    }
}
