// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and the settings structs
//! loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for the embedded database | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `JWT_ACCESS_SECRET` | HMAC secret for access tokens | Required |
//! | `JWT_REFRESH_SECRET` | HMAC secret mixed into refresh token hashing | Required |
//! | `JWT_ACCESS_EXPIRES` | Access token lifetime in seconds | `900` |
//! | `JWT_REFRESH_EXPIRES` | Refresh token lifetime in seconds | `604800` |
//! | `MASTER_KEY` | Master key for encrypting stored secrets | Required |
//! | `{CHAIN}_RPC_URL` | JSON-RPC endpoint per chain slug (e.g. `SEPOLIA_RPC_URL`) | — |
//! | `{CHAIN}_CONFIRMATIONS` | Confirmation depth per chain slug | `12` |
//! | `CORS_ORIGINS` | Comma-separated allowed origins | Permissive (dev) |
//! | `LARGE_WITHDRAWAL_THRESHOLD_USD` | Fraud rule threshold | `10000` |
//! | `DEFAULT_DAILY_WITHDRAWAL_LIMIT_USD` | Per-user default daily limit | `50000` |
//! | `MAX_DAILY_WITHDRAWAL_REQUESTS` | Velocity rule ceiling | `10` |
//! | `WITHDRAWAL_FEE_RATE` | Proportional fee (e.g. `0.001`) | `0.001` |
//! | `WITHDRAWAL_MIN_FEE` | Floor fee in asset units | `0.0001` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use bigdecimal::BigDecimal;
use std::str::FromStr;

/// Environment variable name for the database directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable for the access token signing secret.
pub const JWT_ACCESS_SECRET_ENV: &str = "JWT_ACCESS_SECRET";

/// Environment variable for the refresh token pepper.
pub const JWT_REFRESH_SECRET_ENV: &str = "JWT_REFRESH_SECRET";

/// Environment variable for the master encryption key.
pub const MASTER_KEY_ENV: &str = "MASTER_KEY";

/// Environment variable for allowed CORS origins.
pub const CORS_ORIGINS_ENV: &str = "CORS_ORIGINS";

/// Default access token lifetime in seconds (15 minutes).
pub const DEFAULT_ACCESS_EXPIRES_SECS: i64 = 900;

/// Default refresh token lifetime in seconds (7 days).
pub const DEFAULT_REFRESH_EXPIRES_SECS: i64 = 604_800;

/// Default confirmation depth when `{CHAIN}_CONFIRMATIONS` is unset.
pub const DEFAULT_CONFIRMATIONS: u64 = 12;

/// Security thresholds consumed by the withdrawal fraud rules.
#[derive(Debug, Clone)]
pub struct SecuritySettings {
    /// USD value above which a withdrawal is flagged as large.
    pub large_withdrawal_threshold_usd: BigDecimal,
    /// Default per-user daily withdrawal limit in USD.
    pub default_daily_withdrawal_limit_usd: BigDecimal,
    /// Maximum withdrawal requests per rolling 24 hours before the
    /// velocity rule fires.
    pub max_daily_withdrawal_requests: u32,
    /// Proportional withdrawal fee rate.
    pub withdrawal_fee_rate: BigDecimal,
    /// Minimum withdrawal fee in asset units.
    pub withdrawal_min_fee: BigDecimal,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            large_withdrawal_threshold_usd: BigDecimal::from(10_000u32),
            default_daily_withdrawal_limit_usd: BigDecimal::from(50_000u32),
            max_daily_withdrawal_requests: 10,
            withdrawal_fee_rate: BigDecimal::from_str("0.001").expect("static decimal"),
            withdrawal_min_fee: BigDecimal::from_str("0.0001").expect("static decimal"),
        }
    }
}

impl SecuritySettings {
    /// Load thresholds from the environment, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            large_withdrawal_threshold_usd: env_decimal(
                "LARGE_WITHDRAWAL_THRESHOLD_USD",
                defaults.large_withdrawal_threshold_usd,
            ),
            default_daily_withdrawal_limit_usd: env_decimal(
                "DEFAULT_DAILY_WITHDRAWAL_LIMIT_USD",
                defaults.default_daily_withdrawal_limit_usd,
            ),
            max_daily_withdrawal_requests: std::env::var("MAX_DAILY_WITHDRAWAL_REQUESTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_daily_withdrawal_requests),
            withdrawal_fee_rate: env_decimal("WITHDRAWAL_FEE_RATE", defaults.withdrawal_fee_rate),
            withdrawal_min_fee: env_decimal("WITHDRAWAL_MIN_FEE", defaults.withdrawal_min_fee),
        }
    }
}

/// Token issuance configuration.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    /// Secret used to sign access tokens (HS256).
    pub access_secret: String,
    /// Pepper mixed into refresh token hashes before storage.
    pub refresh_secret: String,
    /// Access token lifetime in seconds.
    pub access_expires_secs: i64,
    /// Refresh token lifetime in seconds.
    pub refresh_expires_secs: i64,
}

impl TokenSettings {
    /// Load token settings from the environment.
    ///
    /// Returns `None` if either secret is missing, in which case the caller
    /// should refuse to start (tokens cannot be issued without secrets).
    pub fn from_env() -> Option<Self> {
        let access_secret = std::env::var(JWT_ACCESS_SECRET_ENV).ok()?;
        let refresh_secret = std::env::var(JWT_REFRESH_SECRET_ENV).ok()?;
        Some(Self {
            access_secret,
            refresh_secret,
            access_expires_secs: std::env::var("JWT_ACCESS_EXPIRES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_ACCESS_EXPIRES_SECS),
            refresh_expires_secs: std::env::var("JWT_REFRESH_EXPIRES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_REFRESH_EXPIRES_SECS),
        })
    }
}

fn env_decimal(name: &str, fallback: BigDecimal) -> BigDecimal {
    std::env::var(name)
        .ok()
        .and_then(|v| BigDecimal::from_str(&v).ok())
        .unwrap_or(fallback)
}

/// Read the RPC URL for a chain slug, e.g. `sepolia` reads `SEPOLIA_RPC_URL`.
pub fn chain_rpc_url(slug: &str) -> Option<String> {
    std::env::var(format!("{}_RPC_URL", slug.to_uppercase())).ok()
}

/// Read the confirmation depth for a chain slug.
pub fn chain_confirmations(slug: &str) -> u64 {
    std::env::var(format!("{}_CONFIRMATIONS", slug.to_uppercase()))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_CONFIRMATIONS)
}
