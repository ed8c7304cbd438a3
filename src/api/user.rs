// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User profile, dashboard, balances, and notifications.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    auth::{Auth, Role},
    error::ApiError,
    ledger::{balances_for_user, BalanceCache},
    money::quantize,
    state::AppState,
    store::{
        AssetRepo, KycStatus, Notification, NotificationRepo, PositionRepo, PositionStatus,
        StoreError, UserRepo, WithdrawalRepo,
    },
};

/// Public projection of a user row; secrets never leave the store.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub email_verified: bool,
    pub two_factor_enabled: bool,
    pub kyc_status: KycStatus,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    #[schema(value_type = String)]
    pub daily_withdrawal_limit_usd: BigDecimal,
}

/// Aggregate shown on the landing dashboard.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    #[schema(value_type = String)]
    pub total_available_usd: BigDecimal,
    #[schema(value_type = String)]
    pub total_staked_usd: BigDecimal,
    #[schema(value_type = String)]
    pub total_rewards_usd: BigDecimal,
    #[schema(value_type = String)]
    pub total_pending_withdrawals_usd: BigDecimal,
    pub active_positions: usize,
    pub pending_withdrawals: usize,
    pub unread_notifications: usize,
    pub balances: Vec<BalanceCache>,
}

/// Balance list response.
#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceListResponse {
    pub balances: Vec<BalanceCache>,
    pub total: usize,
}

/// Notification list response.
#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationListResponse {
    pub notifications: Vec<Notification>,
    pub total: usize,
}

/// Get the caller's profile.
#[utoipa::path(
    get,
    path = "/v1/user/profile",
    tag = "User",
    security(("bearer" = [])),
    responses((status = 200, description = "Profile", body = ProfileResponse))
)]
pub async fn profile(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let row = state
        .store
        .read(|tx| UserRepo::new(tx).require(&user.user_id))?;
    Ok(Json(ProfileResponse {
        id: row.id,
        email: row.email,
        role: row.role,
        email_verified: row.email_verified,
        two_factor_enabled: row.two_factor_enabled,
        kyc_status: row.kyc_status,
        created_at: row.created_at,
        last_login_at: row.last_login_at,
        daily_withdrawal_limit_usd: row.daily_withdrawal_limit_usd,
    }))
}

/// Get the caller's balances.
#[utoipa::path(
    get,
    path = "/v1/user/balances",
    tag = "User",
    security(("bearer" = [])),
    responses((status = 200, description = "Balances", body = BalanceListResponse))
)]
pub async fn balances(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<BalanceListResponse>, ApiError> {
    let balances = state.store.read(|tx| balances_for_user(tx, &user.user_id))?;
    let total = balances.len();
    Ok(Json(BalanceListResponse { balances, total }))
}

/// Get the caller's dashboard aggregate.
#[utoipa::path(
    get,
    path = "/v1/user/dashboard",
    tag = "User",
    security(("bearer" = [])),
    responses((status = 200, description = "Aggregate", body = DashboardResponse))
)]
pub async fn dashboard(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<DashboardResponse>, ApiError> {
    state.store.read(|tx| {
        let balances = balances_for_user(tx, &user.user_id)?;

        let mut total_available_usd = BigDecimal::zero();
        let mut total_staked_usd = BigDecimal::zero();
        let mut total_rewards_usd = BigDecimal::zero();
        let mut total_pending_usd = BigDecimal::zero();
        for balance in &balances {
            let price = AssetRepo::new(tx)
                .get(&balance.asset_id)?
                .map(|a| a.price_usd)
                .unwrap_or_else(BigDecimal::zero);
            total_available_usd += quantize(&(&balance.available * &price));
            total_staked_usd += quantize(&(&balance.staked * &price));
            total_rewards_usd += quantize(&(&balance.rewards_accrued * &price));
            total_pending_usd += quantize(&(&balance.withdrawals_pending * &price));
        }

        let active_positions = PositionRepo::new(tx)
            .list_for_user(&user.user_id)?
            .into_iter()
            .filter(|p| matches!(p.status, PositionStatus::Active | PositionStatus::Unstaking))
            .count();

        let pending_withdrawals = WithdrawalRepo::new(tx)
            .list_for_user(&user.user_id)?
            .into_iter()
            .filter(|w| !w.status.is_terminal())
            .count();

        let unread_notifications = NotificationRepo::new(tx)
            .list_for_user(&user.user_id)?
            .into_iter()
            .filter(|n| !n.is_read)
            .count();

        Ok::<_, StoreError>(Json(DashboardResponse {
            total_available_usd: quantize(&total_available_usd),
            total_staked_usd: quantize(&total_staked_usd),
            total_rewards_usd: quantize(&total_rewards_usd),
            total_pending_withdrawals_usd: quantize(&total_pending_usd),
            active_positions,
            pending_withdrawals,
            unread_notifications,
            balances,
        }))
    })
    .map_err(ApiError::from)
}

/// List the caller's notifications, newest first.
#[utoipa::path(
    get,
    path = "/v1/user/notifications",
    tag = "User",
    security(("bearer" = [])),
    responses((status = 200, description = "Notifications", body = NotificationListResponse))
)]
pub async fn notifications(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<NotificationListResponse>, ApiError> {
    let notifications = state
        .store
        .read(|tx| NotificationRepo::new(tx).list_for_user(&user.user_id))?;
    let total = notifications.len();
    Ok(Json(NotificationListResponse { notifications, total }))
}

/// Mark one notification read.
#[utoipa::path(
    post,
    path = "/v1/user/notifications/{notification_id}/read",
    tag = "User",
    security(("bearer" = [])),
    params(("notification_id" = String, Path, description = "Notification ID")),
    responses(
        (status = 204, description = "Marked read"),
        (status = 404, description = "Not found")
    )
)]
pub async fn mark_notification_read(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let found = state
        .store
        .write(|tx| NotificationRepo::new(tx).mark_read(&user.user_id, &notification_id))?;
    if !found {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
