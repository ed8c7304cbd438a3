// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP API: router, CORS, rate limiting, and the OpenAPI document.

use std::net::IpAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use utoipa::OpenApi;

use crate::{
    auth::RouteClass,
    config::CORS_ORIGINS_ENV,
    error::ApiError,
    state::AppState,
};

pub mod admin;
pub mod auth;
pub mod deposits;
pub mod health;
pub mod pools;
pub mod stakes;
pub mod user;
pub mod withdrawals;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        // Auth endpoints
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/sessions", get(auth::list_sessions))
        .route("/auth/sessions/{session_id}", delete(auth::revoke_session))
        .route("/auth/2fa/setup", post(auth::setup_2fa))
        .route("/auth/2fa/verify", post(auth::verify_2fa))
        .route("/auth/2fa/disable", post(auth::disable_2fa))
        // User endpoints
        .route("/user/profile", get(user::profile))
        .route("/user/dashboard", get(user::dashboard))
        .route("/user/balances", get(user::balances))
        .route("/user/notifications", get(user::notifications))
        .route(
            "/user/notifications/{notification_id}/read",
            post(user::mark_notification_read),
        )
        // Catalog endpoints (public)
        .route("/chains", get(pools::list_chains))
        .route("/assets", get(pools::list_assets))
        .route("/pools", get(pools::list_pools))
        .route("/pools/{pool_id}", get(pools::get_pool))
        .route("/pools/{pool_id}/calculator", get(pools::calculator))
        .route("/pools/{pool_id}/apr-history", get(pools::apr_history))
        // Stake endpoints
        .route("/stakes", get(stakes::list_stakes).post(stakes::create_stake))
        .route("/stakes/{position_id}/unstake", post(stakes::unstake))
        .route("/stakes/{position_id}/claim", post(stakes::claim))
        // Deposit endpoints
        .route("/deposits/address", post(deposits::deposit_address))
        .route("/deposits", get(deposits::list_deposits))
        // Withdrawal endpoints
        .route(
            "/withdrawals",
            get(withdrawals::list).post(withdrawals::submit),
        )
        .route("/withdrawals/{request_id}", get(withdrawals::get))
        // Admin endpoints (admin role enforced by extractors)
        .route("/admin/withdrawals", get(admin::list_withdrawals))
        .route(
            "/admin/withdrawals/{request_id}/approve",
            post(admin::approve_withdrawal),
        )
        .route(
            "/admin/withdrawals/{request_id}/reject",
            post(admin::reject_withdrawal),
        )
        .route(
            "/admin/withdrawals/{request_id}/mark-paid",
            post(admin::mark_withdrawal_paid),
        )
        .route(
            "/admin/withdrawals/{request_id}/retry",
            post(admin::retry_withdrawal),
        )
        .route("/admin/deposits", get(admin::list_deposits))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/{user_id}/suspend", post(admin::suspend_user))
        .route("/admin/users/{user_id}/activate", post(admin::activate_user))
        .route("/admin/pools", post(admin::create_pool))
        .route("/admin/pools/{pool_id}/apr", post(admin::change_apr))
        .route(
            "/admin/positions/{position_id}/cancel",
            post(admin::cancel_position),
        )
        .route("/admin/audit", get(admin::list_audit))
        .route(
            "/admin/treasury",
            get(admin::list_treasury).post(admin::create_treasury),
        )
        .route("/admin/adjustments", post(admin::create_adjustment))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .with_state(state.clone());

    Router::new()
        // Health endpoints (no auth, no rate limit)
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        // API v1 routes
        .nest("/v1", v1_routes)
        // OpenAPI document
        .route("/api-doc/openapi.json", get(openapi_json))
        .layer(build_cors_layer())
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Per-IP token-bucket rate limiting for the versioned API.
async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let ip = client_ip(&request);
    let class = match request.uri().path() {
        "/auth/login" | "/v1/auth/login" => RouteClass::Login,
        "/auth/register" | "/v1/auth/register" => RouteClass::Register,
        "/auth/refresh" | "/v1/auth/refresh" => RouteClass::Refresh,
        _ => RouteClass::General,
    };

    match state.rate_limiter.check(ip, class, state.clock.now()) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => ApiError::rate_limited(retry_after).into_response(),
    }
}

/// Client IP: first X-Forwarded-For hop, else the socket peer address.
fn client_ip(request: &Request) -> IpAddr {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(ip) = forwarded
            .split(',')
            .next()
            .and_then(|first| first.trim().parse().ok())
        {
            return ip;
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

/// Build CORS layer from environment configuration.
///
/// - If `CORS_ORIGINS` is set, only those origins are allowed (comma
///   separated).
/// - If not set, falls back to permissive CORS (development only).
fn build_cors_layer() -> CorsLayer {
    if let Ok(origins) = std::env::var(CORS_ORIGINS_ENV) {
        let allowed: Vec<_> = origins
            .split(',')
            .map(|s| s.trim().parse().expect("Invalid CORS origin"))
            .collect();
        tracing::info!(origins = %origins, "CORS: restricting to configured origins");
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    } else {
        tracing::warn!("CORS_ORIGINS not set - using permissive CORS (development only)");
        CorsLayer::permissive()
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Auth endpoints
        auth::register,
        auth::login,
        auth::refresh,
        auth::logout,
        auth::list_sessions,
        auth::revoke_session,
        auth::setup_2fa,
        auth::verify_2fa,
        auth::disable_2fa,
        // User endpoints
        user::profile,
        user::dashboard,
        user::balances,
        user::notifications,
        user::mark_notification_read,
        // Catalog endpoints
        pools::list_chains,
        pools::list_assets,
        pools::list_pools,
        pools::get_pool,
        pools::calculator,
        pools::apr_history,
        // Stake endpoints
        stakes::list_stakes,
        stakes::create_stake,
        stakes::unstake,
        stakes::claim,
        // Deposit endpoints
        deposits::deposit_address,
        deposits::list_deposits,
        // Withdrawal endpoints
        withdrawals::submit,
        withdrawals::get,
        withdrawals::list,
        // Admin endpoints
        admin::list_withdrawals,
        admin::approve_withdrawal,
        admin::reject_withdrawal,
        admin::mark_withdrawal_paid,
        admin::retry_withdrawal,
        admin::list_deposits,
        admin::list_users,
        admin::suspend_user,
        admin::activate_user,
        admin::create_pool,
        admin::change_apr,
        admin::cancel_position,
        admin::list_audit,
        admin::create_treasury,
        admin::list_treasury,
        admin::create_adjustment,
        // Health endpoints
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            // Auth schemas
            crate::auth::Role,
            crate::auth::tokens::TokenPair,
            auth::RegisterRequest,
            auth::LoginRequest,
            auth::RefreshRequest,
            auth::TotpRequest,
            auth::TwoFactorSetupResponse,
            auth::RecoveryCodesResponse,
            auth::SessionResponse,
            auth::SessionListResponse,
            // User schemas
            user::ProfileResponse,
            user::DashboardResponse,
            user::BalanceListResponse,
            user::NotificationListResponse,
            crate::store::KycStatus,
            crate::store::Notification,
            crate::ledger::BalanceCache,
            crate::ledger::LedgerEntry,
            crate::ledger::EntryType,
            crate::ledger::Direction,
            // Catalog schemas
            pools::PoolListResponse,
            pools::ChainListResponse,
            pools::AssetListResponse,
            pools::AprHistoryResponse,
            pools::CalculatorResponse,
            crate::store::Chain,
            crate::store::Asset,
            crate::store::Pool,
            crate::store::PoolType,
            crate::store::AprSchedule,
            // Stake schemas
            stakes::CreateStakeRequest,
            stakes::StakeListResponse,
            stakes::UnstakeResponse,
            stakes::ClaimResponse,
            crate::store::StakePosition,
            crate::store::PositionStatus,
            // Deposit schemas
            deposits::DepositAddressRequest,
            deposits::DepositAddressResponse,
            deposits::DepositListResponse,
            crate::store::Deposit,
            crate::store::DepositStatus,
            // Withdrawal schemas
            withdrawals::SubmitWithdrawalRequest,
            crate::store::WithdrawalRequest,
            crate::store::WithdrawalStatus,
            crate::store::PayoutTx,
            crate::store::PayoutStatus,
            crate::withdrawals::fraud::FraudIndicator,
            crate::withdrawals::fraud::Severity,
            // Admin schemas
            admin::AdminWithdrawalListResponse,
            admin::ApproveRequest,
            admin::RejectRequest,
            admin::MarkPaidRequest,
            admin::AdminDepositListResponse,
            admin::AdminUserSummary,
            admin::AdminUserListResponse,
            admin::CreatePoolRequest,
            admin::AprChangeRequest,
            admin::CancelPositionRequest,
            admin::AuditListResponse,
            admin::CreateTreasuryRequest,
            admin::TreasuryListResponse,
            admin::AdjustmentRequest,
            crate::store::AuditLogEntry,
            crate::store::TreasuryWallet,
            // Health schemas
            health::HealthResponse,
            health::HealthChecks,
            health::ReadyResponse
        )
    ),
    tags(
        (name = "Auth", description = "Registration, login, sessions, 2FA"),
        (name = "User", description = "Profile, balances, notifications"),
        (name = "Catalog", description = "Chains and assets"),
        (name = "Pools", description = "Staking pool catalog"),
        (name = "Stakes", description = "Stake position lifecycle"),
        (name = "Deposits", description = "Deposit addresses and history"),
        (name = "Withdrawals", description = "Withdrawal requests"),
        (name = "Admin", description = "Review, catalog, treasury, audit"),
        (name = "Health", description = "Liveness and readiness checks")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

/// Security scheme for OpenAPI documentation
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
            let scheme = Http::builder()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("JWT")
                .description(Some("Access token from /v1/auth/login"))
                .build();
            components.add_security_scheme("bearer", SecurityScheme::Http(scheme));
        }
    }
}
