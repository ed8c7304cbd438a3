// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Credential verification, token issuance, session rotation, TOTP 2FA,
//! and role-gated authorization for the staking platform.
//!
//! ## Auth Flow
//!
//! 1. Client registers or logs in with email + password (+ TOTP when
//!    enabled) and receives a short-lived access JWT plus an opaque
//!    refresh token.
//! 2. Every protected request carries `Authorization: Bearer <access>`.
//!    The [`extractor::Auth`] extractor verifies the signature and expiry,
//!    then confirms the backing session is still live.
//! 3. Refresh rotates: the old session is revoked and a new
//!    (access, refresh) pair is minted against a new session row.
//!
//! ## Security
//!
//! - Passwords hashed with Argon2id.
//! - Refresh tokens stored only as SHA-256 digests.
//! - TOTP secrets encrypted at rest (AES-256-GCM under the master key).
//! - Admin and super-admin accounts cannot log in without 2FA enabled.

pub mod error;
pub mod extractor;
pub mod password;
pub mod rate_limit;
pub mod roles;
pub mod service;
pub mod tokens;
pub mod totp;

pub use error::AuthError;
pub use extractor::{AdminOnly, Auth, AuthUser, SuperAdminOnly};
pub use rate_limit::{RateLimiter, RouteClass};
pub use roles::Role;
pub use tokens::{TokenIssuer, TokenPair};
