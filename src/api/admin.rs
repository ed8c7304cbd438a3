// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin endpoints: withdrawal review, catalog management, treasury,
//! adjustments, audit queries, and user administration.
//!
//! Every mutating handler writes an audit entry with before/after
//! snapshots; the audit writer redacts secret-bearing fields before
//! persistence.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::{AdminOnly, Role, SuperAdminOnly},
    error::ApiError,
    ledger::{post, Direction, Posting},
    payout,
    staking,
    state::AppState,
    store::{
        AuditLogEntry, AuditRepo, ChainRepo, Deposit, DepositRepo, DepositStatus, KycStatus, Pool,
        PoolRepo, PoolType, StakePosition, StoreError, TreasuryRepo, TreasuryWallet, UserRepo,
        WithdrawalRepo, WithdrawalRequest, WithdrawalStatus,
    },
    validate,
    withdrawals,
};

// =============================================================================
// Pagination
// =============================================================================

/// Common page/limit query.
#[derive(Debug, Deserialize, IntoParams)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

fn paginate<T>(mut items: Vec<T>, page: u32, limit: u32) -> (Vec<T>, usize, u32) {
    let total = items.len();
    let total_pages = (total as u32).div_ceil(limit).max(1);
    let start = ((page - 1) * limit) as usize;
    let items = if start >= total {
        Vec::new()
    } else {
        items.drain(start..(start + limit as usize).min(total)).collect()
    };
    (items, total, total_pages)
}

// =============================================================================
// Withdrawal review
// =============================================================================

/// Filters for the admin withdrawal listing.
#[derive(Debug, Deserialize, IntoParams)]
pub struct AdminWithdrawalQuery {
    pub status: Option<WithdrawalStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Paginated withdrawal listing.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminWithdrawalListResponse {
    pub items: Vec<WithdrawalRequest>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

/// Body for approve (notes optional).
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    #[serde(default)]
    pub admin_notes: Option<String>,
}

/// Body for reject (notes required).
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequest {
    pub admin_notes: String,
}

/// Body for mark-paid.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkPaidRequest {
    pub admin_notes: String,
    #[serde(default)]
    pub proof_url: Option<String>,
}

/// List withdrawal requests for review.
#[utoipa::path(
    get,
    path = "/v1/admin/withdrawals",
    tag = "Admin",
    security(("bearer" = [])),
    params(AdminWithdrawalQuery),
    responses((status = 200, description = "Requests", body = AdminWithdrawalListResponse))
)]
pub async fn list_withdrawals(
    AdminOnly(_admin): AdminOnly,
    State(state): State<AppState>,
    Query(query): Query<AdminWithdrawalQuery>,
) -> Result<Json<AdminWithdrawalListResponse>, ApiError> {
    let (page, limit) = validate::pagination(query.page, query.limit)?;
    let mut requests = state.store.read(|tx| {
        let repo = WithdrawalRepo::new(tx);
        match query.status {
            Some(status) => repo.list_by_status(status),
            None => repo.list_all(),
        }
    })?;
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let (items, total, total_pages) = paginate(requests, page, limit);
    Ok(Json(AdminWithdrawalListResponse {
        items,
        total,
        page,
        limit,
        total_pages,
    }))
}

/// Approve a pending withdrawal.
#[utoipa::path(
    post,
    path = "/v1/admin/withdrawals/{request_id}/approve",
    tag = "Admin",
    security(("bearer" = [])),
    params(("request_id" = String, Path, description = "Withdrawal request ID")),
    request_body = ApproveRequest,
    responses(
        (status = 200, description = "Approved", body = WithdrawalRequest),
        (status = 409, description = "Not pending review")
    )
)]
pub async fn approve_withdrawal(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Json(request): Json<ApproveRequest>,
) -> Result<Json<WithdrawalRequest>, ApiError> {
    let approved = withdrawals::approve(&state, &admin, &request_id, request.admin_notes)?;
    Ok(Json(approved))
}

/// Reject a pending withdrawal. Notes are required.
#[utoipa::path(
    post,
    path = "/v1/admin/withdrawals/{request_id}/reject",
    tag = "Admin",
    security(("bearer" = [])),
    params(("request_id" = String, Path, description = "Withdrawal request ID")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Rejected", body = WithdrawalRequest),
        (status = 409, description = "Not pending review")
    )
)]
pub async fn reject_withdrawal(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<WithdrawalRequest>, ApiError> {
    if request.admin_notes.trim().is_empty() {
        return Err(ApiError::bad_request("adminNotes: required when rejecting"));
    }
    let rejected = withdrawals::reject(&state, &admin, &request_id, request.admin_notes)?;
    Ok(Json(rejected))
}

/// Mark a withdrawal settled outside the payout executor.
#[utoipa::path(
    post,
    path = "/v1/admin/withdrawals/{request_id}/mark-paid",
    tag = "Admin",
    security(("bearer" = [])),
    params(("request_id" = String, Path, description = "Withdrawal request ID")),
    request_body = MarkPaidRequest,
    responses(
        (status = 200, description = "Marked paid", body = WithdrawalRequest),
        (status = 403, description = "State does not allow manual settlement")
    )
)]
pub async fn mark_withdrawal_paid(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Json(request): Json<MarkPaidRequest>,
) -> Result<Json<WithdrawalRequest>, ApiError> {
    if request.admin_notes.trim().is_empty() {
        return Err(ApiError::bad_request("adminNotes: required when marking paid"));
    }
    let paid = withdrawals::mark_paid(
        &state,
        &admin,
        &request_id,
        request.admin_notes,
        request.proof_url,
    )?;
    Ok(Json(paid))
}

/// Re-queue a failed payout.
#[utoipa::path(
    post,
    path = "/v1/admin/withdrawals/{request_id}/retry",
    tag = "Admin",
    security(("bearer" = [])),
    params(("request_id" = String, Path, description = "Withdrawal request ID")),
    responses(
        (status = 202, description = "Retry queued"),
        (status = 403, description = "Request is not failed")
    )
)]
pub async fn retry_withdrawal(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    payout::retry_failed_payout(&state, &admin, &request_id)?;
    Ok(StatusCode::ACCEPTED)
}

// =============================================================================
// Deposits and users
// =============================================================================

/// Filters for the admin deposit listing.
#[derive(Debug, Deserialize, IntoParams)]
pub struct AdminDepositQuery {
    pub status: Option<DepositStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Paginated deposit listing.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminDepositListResponse {
    pub items: Vec<Deposit>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

/// One row of the admin user listing.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserSummary {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub email_verified: bool,
    pub two_factor_enabled: bool,
    pub kyc_status: KycStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Paginated user listing.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserListResponse {
    pub items: Vec<AdminUserSummary>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

/// List deposits across all users.
#[utoipa::path(
    get,
    path = "/v1/admin/deposits",
    tag = "Admin",
    security(("bearer" = [])),
    params(AdminDepositQuery),
    responses((status = 200, description = "Deposits", body = AdminDepositListResponse))
)]
pub async fn list_deposits(
    AdminOnly(_admin): AdminOnly,
    State(state): State<AppState>,
    Query(query): Query<AdminDepositQuery>,
) -> Result<Json<AdminDepositListResponse>, ApiError> {
    let (page, limit) = validate::pagination(query.page, query.limit)?;
    let mut deposits = state.store.read(|tx| {
        let repo = DepositRepo::new(tx);
        match query.status {
            Some(status) => repo.list_by_status(status),
            None => repo.list_all(),
        }
    })?;
    deposits.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));

    let (items, total, total_pages) = paginate(deposits, page, limit);
    Ok(Json(AdminDepositListResponse {
        items,
        total,
        page,
        limit,
        total_pages,
    }))
}

/// List users.
#[utoipa::path(
    get,
    path = "/v1/admin/users",
    tag = "Admin",
    security(("bearer" = [])),
    params(PageQuery),
    responses((status = 200, description = "Users", body = AdminUserListResponse))
)]
pub async fn list_users(
    AdminOnly(_admin): AdminOnly,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<AdminUserListResponse>, ApiError> {
    let (page, limit) = validate::pagination(query.page, query.limit)?;
    let users = state.store.read(|tx| UserRepo::new(tx).list())?;
    let summaries: Vec<AdminUserSummary> = users
        .into_iter()
        .map(|u| AdminUserSummary {
            id: u.id,
            email: u.email,
            role: u.role,
            email_verified: u.email_verified,
            two_factor_enabled: u.two_factor_enabled,
            kyc_status: u.kyc_status,
            is_active: u.is_active,
            created_at: u.created_at,
            last_login_at: u.last_login_at,
        })
        .collect();

    let (items, total, total_pages) = paginate(summaries, page, limit);
    Ok(Json(AdminUserListResponse {
        items,
        total,
        page,
        limit,
        total_pages,
    }))
}

/// Deactivate a user account.
#[utoipa::path(
    post,
    path = "/v1/admin/users/{user_id}/suspend",
    tag = "Admin",
    security(("bearer" = [])),
    params(("user_id" = String, Path, description = "User ID")),
    responses((status = 204, description = "Suspended"))
)]
pub async fn suspend_user(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    set_user_active(&state, &admin, &user_id, false)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Reactivate a user account.
#[utoipa::path(
    post,
    path = "/v1/admin/users/{user_id}/activate",
    tag = "Admin",
    security(("bearer" = [])),
    params(("user_id" = String, Path, description = "User ID")),
    responses((status = 204, description = "Activated"))
)]
pub async fn activate_user(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    set_user_active(&state, &admin, &user_id, true)?;
    Ok(StatusCode::NO_CONTENT)
}

fn set_user_active(
    state: &AppState,
    admin: &crate::auth::AuthUser,
    user_id: &str,
    active: bool,
) -> Result<(), ApiError> {
    let now = state.clock.now();
    state.store.write(|tx| {
        let repo = UserRepo::new(tx);
        let before = repo.require(user_id)?;
        let mut after = before.clone();
        after.is_active = active;
        repo.update(&after)?;

        AuditRepo::new(tx).append(
            &AuditLogEntry::new(
                if active { "user.activate" } else { "user.suspend" },
                "User",
                user_id,
                now,
            )
            .with_actor(&admin.user_id, &admin.email)
            .with_before(serde_json::to_value(&before).map_err(StoreError::from)?)
            .with_after(serde_json::to_value(&after).map_err(StoreError::from)?),
        )?;
        Ok::<_, ApiError>(())
    })
}

// =============================================================================
// Pools and positions
// =============================================================================

/// Body for pool creation.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePoolRequest {
    pub name: String,
    pub slug: String,
    pub asset_id: String,
    pub pool_type: PoolType,
    #[serde(default)]
    pub lock_days: u32,
    /// Decimal percentage, e.g. `4.5`.
    pub apr: String,
    pub min_stake: String,
    #[serde(default)]
    pub max_stake: Option<String>,
    #[serde(default)]
    pub total_capacity: Option<String>,
    #[serde(default)]
    pub cooldown_hours: u32,
}

/// Body for an APR schedule change.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AprChangeRequest {
    /// Decimal percentage, e.g. `6.25`.
    pub new_apr: String,
    /// When the new regime takes effect.
    pub effective_from: DateTime<Utc>,
}

/// Body for cancelling a position.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelPositionRequest {
    pub admin_notes: String,
}

/// Create a pool.
#[utoipa::path(
    post,
    path = "/v1/admin/pools",
    tag = "Admin",
    security(("bearer" = [])),
    request_body = CreatePoolRequest,
    responses(
        (status = 201, description = "Pool created", body = Pool),
        (status = 404, description = "Asset not found")
    )
)]
pub async fn create_pool(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Json(request): Json<CreatePoolRequest>,
) -> Result<(StatusCode, Json<Pool>), ApiError> {
    let apr = validate::amount(&request.apr)?;
    let min_stake = validate::amount(&request.min_stake)?;
    let max_stake = request.max_stake.as_deref().map(validate::amount).transpose()?;
    let total_capacity = request
        .total_capacity
        .as_deref()
        .map(validate::amount)
        .transpose()?;
    if request.name.trim().is_empty() || request.slug.trim().is_empty() {
        return Err(ApiError::bad_request("name and slug are required"));
    }
    if request.pool_type == PoolType::Flexible && request.lock_days != 0 {
        return Err(ApiError::bad_request("lockDays: must be 0 for flexible pools"));
    }

    let now = state.clock.now();
    let pool = state.store.write(|tx| {
        crate::store::AssetRepo::new(tx).require(&request.asset_id)?;

        let mut pool = Pool {
            id: uuid::Uuid::new_v4().to_string(),
            name: request.name.clone(),
            slug: request.slug.clone(),
            asset_id: request.asset_id.clone(),
            pool_type: request.pool_type,
            lock_days: request.lock_days,
            current_apr: apr.clone(),
            min_stake,
            max_stake,
            total_capacity,
            total_staked: BigDecimal::from(0u32),
            cooldown_hours: request.cooldown_hours,
            is_active: true,
            created_at: now,
        };
        let repo = PoolRepo::new(tx);
        repo.insert(&pool)?;
        repo.apply_schedule(&mut pool, apr.clone(), now)?;

        AuditRepo::new(tx).append(
            &AuditLogEntry::new("pool.create", "Pool", &pool.id, now)
                .with_actor(&admin.user_id, &admin.email)
                .with_after(serde_json::to_value(&pool).map_err(StoreError::from)?),
        )?;
        Ok::<_, ApiError>(pool)
    })?;

    Ok((StatusCode::CREATED, Json(pool)))
}

/// Install a new APR regime for a pool.
#[utoipa::path(
    post,
    path = "/v1/admin/pools/{pool_id}/apr",
    tag = "Admin",
    security(("bearer" = [])),
    params(("pool_id" = String, Path, description = "Pool ID")),
    request_body = AprChangeRequest,
    responses(
        (status = 201, description = "Schedule created", body = crate::store::AprSchedule),
        (status = 404, description = "Pool not found")
    )
)]
pub async fn change_apr(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Path(pool_id): Path<String>,
    Json(request): Json<AprChangeRequest>,
) -> Result<(StatusCode, Json<crate::store::AprSchedule>), ApiError> {
    let new_apr = validate::amount(&request.new_apr)?;
    let now = state.clock.now();

    let schedule = state.store.write(|tx| {
        let repo = PoolRepo::new(tx);
        let mut pool = repo.require(&pool_id)?;
        let before = serde_json::to_value(&pool).map_err(StoreError::from)?;
        let schedule = repo.apply_schedule(&mut pool, new_apr.clone(), request.effective_from)?;

        AuditRepo::new(tx).append(
            &AuditLogEntry::new("pool.apr_change", "Pool", &pool_id, now)
                .with_actor(&admin.user_id, &admin.email)
                .with_before(before)
                .with_after(serde_json::to_value(&pool).map_err(StoreError::from)?),
        )?;
        Ok::<_, ApiError>(schedule)
    })?;

    Ok((StatusCode::CREATED, Json(schedule)))
}

/// Cancel a stake position, returning its principal.
#[utoipa::path(
    post,
    path = "/v1/admin/positions/{position_id}/cancel",
    tag = "Admin",
    security(("bearer" = [])),
    params(("position_id" = String, Path, description = "Position ID")),
    request_body = CancelPositionRequest,
    responses(
        (status = 200, description = "Cancelled", body = StakePosition),
        (status = 409, description = "Already settled")
    )
)]
pub async fn cancel_position(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Path(position_id): Path<String>,
    Json(request): Json<CancelPositionRequest>,
) -> Result<Json<StakePosition>, ApiError> {
    if request.admin_notes.trim().is_empty() {
        return Err(ApiError::bad_request("adminNotes: required when cancelling"));
    }

    let before = state
        .store
        .read(|tx| crate::store::PositionRepo::new(tx).require(&position_id))?;
    let cancelled = staking::admin_cancel(&state, &position_id)?;

    let now = state.clock.now();
    state.store.write(|tx| {
        AuditRepo::new(tx).append(
            &AuditLogEntry::new("position.cancel", "StakePosition", &position_id, now)
                .with_actor(&admin.user_id, &admin.email)
                .with_before(serde_json::to_value(&before).map_err(StoreError::from)?)
                .with_after(serde_json::to_value(&cancelled).map_err(StoreError::from)?),
        )
    })?;

    Ok(Json(cancelled))
}

// =============================================================================
// Audit log
// =============================================================================

/// Filters for the audit listing.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub entity: Option<String>,
    pub actor_id: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Paginated audit listing.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditListResponse {
    pub items: Vec<AuditLogEntry>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

/// Query the admin action log.
#[utoipa::path(
    get,
    path = "/v1/admin/audit",
    tag = "Admin",
    security(("bearer" = [])),
    params(AuditQuery),
    responses((status = 200, description = "Audit entries", body = AuditListResponse))
)]
pub async fn list_audit(
    AdminOnly(_admin): AdminOnly,
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditListResponse>, ApiError> {
    let (page, limit) = validate::pagination(query.page, query.limit)?;
    let mut entries = state.store.read(|tx| AuditRepo::new(tx).list())?;
    entries.retain(|e| {
        query.entity.as_ref().map(|v| &e.entity == v).unwrap_or(true)
            && query
                .actor_id
                .as_ref()
                .map(|v| e.actor_id.as_ref() == Some(v))
                .unwrap_or(true)
    });
    // Newest first for review.
    entries.reverse();

    let (items, total, total_pages) = paginate(entries, page, limit);
    Ok(Json(AuditListResponse {
        items,
        total,
        page,
        limit,
        total_pages,
    }))
}

// =============================================================================
// Treasury and adjustments (SUPER_ADMIN)
// =============================================================================

/// Body for registering a treasury wallet.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTreasuryRequest {
    pub chain_id: String,
    pub address: String,
    pub label: String,
    /// Hex private key, encrypted at rest immediately and never echoed.
    #[serde(default)]
    pub private_key: Option<String>,
}

/// Treasury listing (key material stripped).
#[derive(Debug, Serialize, ToSchema)]
pub struct TreasuryListResponse {
    pub wallets: Vec<TreasuryWallet>,
    pub total: usize,
}

/// Body for a manual balance adjustment.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentRequest {
    pub user_id: String,
    pub asset_id: String,
    pub chain_id: String,
    pub direction: Direction,
    /// Decimal amount string.
    pub amount: String,
    pub note: String,
}

/// Register a treasury hot wallet.
#[utoipa::path(
    post,
    path = "/v1/admin/treasury",
    tag = "Admin",
    security(("bearer" = [])),
    request_body = CreateTreasuryRequest,
    responses(
        (status = 201, description = "Wallet registered", body = TreasuryWallet),
        (status = 404, description = "Chain not found")
    )
)]
pub async fn create_treasury(
    SuperAdminOnly(admin): SuperAdminOnly,
    State(state): State<AppState>,
    Json(request): Json<CreateTreasuryRequest>,
) -> Result<(StatusCode, Json<TreasuryWallet>), ApiError> {
    let address = validate::evm_address(&request.address)?;
    let encrypted_private_key = match &request.private_key {
        Some(key) => Some(
            state
                .secrets
                .encrypt(key.as_bytes())
                .map_err(|_| ApiError::internal("key encryption failed"))?,
        ),
        None => None,
    };

    let now = state.clock.now();
    let wallet = state.store.write(|tx| {
        ChainRepo::new(tx).require(&request.chain_id)?;
        let wallet = TreasuryWallet {
            id: uuid::Uuid::new_v4().to_string(),
            chain_id: request.chain_id.clone(),
            address,
            label: request.label.clone(),
            encrypted_private_key,
            is_active: true,
            created_at: now,
        };
        TreasuryRepo::new(tx).insert(&wallet)?;

        AuditRepo::new(tx).append(
            &AuditLogEntry::new("treasury.create", "TreasuryWallet", &wallet.id, now)
                .with_actor(&admin.user_id, &admin.email)
                .with_after(serde_json::to_value(&wallet).map_err(StoreError::from)?),
        )?;
        Ok::<_, ApiError>(wallet)
    })?;

    Ok((StatusCode::CREATED, Json(wallet.redacted())))
}

/// List treasury wallets without key material.
#[utoipa::path(
    get,
    path = "/v1/admin/treasury",
    tag = "Admin",
    security(("bearer" = [])),
    responses((status = 200, description = "Wallets", body = TreasuryListResponse))
)]
pub async fn list_treasury(
    SuperAdminOnly(_admin): SuperAdminOnly,
    State(state): State<AppState>,
) -> Result<Json<TreasuryListResponse>, ApiError> {
    let wallets: Vec<TreasuryWallet> = state
        .store
        .read(|tx| TreasuryRepo::new(tx).list())?
        .into_iter()
        .map(|w| w.redacted())
        .collect();
    let total = wallets.len();
    Ok(Json(TreasuryListResponse { wallets, total }))
}

/// Post a manual balance adjustment.
#[utoipa::path(
    post,
    path = "/v1/admin/adjustments",
    tag = "Admin",
    security(("bearer" = [])),
    request_body = AdjustmentRequest,
    responses(
        (status = 201, description = "Adjustment posted"),
        (status = 400, description = "Would overdraw the available balance")
    )
)]
pub async fn create_adjustment(
    SuperAdminOnly(admin): SuperAdminOnly,
    State(state): State<AppState>,
    Json(request): Json<AdjustmentRequest>,
) -> Result<StatusCode, ApiError> {
    let amount = validate::amount(&request.amount)?;
    if request.note.trim().is_empty() {
        return Err(ApiError::bad_request("note: required for adjustments"));
    }

    let now = state.clock.now();
    state.store.write(|tx| {
        UserRepo::new(tx).require(&request.user_id)?;
        let adjustment_id = uuid::Uuid::new_v4().to_string();
        let entry = post(
            tx,
            Posting::adjustment(
                &request.user_id,
                &request.asset_id,
                &request.chain_id,
                request.direction,
                amount.clone(),
                &adjustment_id,
                &request.note,
            ),
            now,
        )?;

        AuditRepo::new(tx).append(
            &AuditLogEntry::new("balance.adjust", "LedgerEntry", &entry.id, now)
                .with_actor(&admin.user_id, &admin.email)
                .with_after(serde_json::to_value(&entry).map_err(StoreError::from)?),
        )?;
        Ok::<_, ApiError>(())
    })?;

    Ok(StatusCode::CREATED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_slices_and_counts() {
        let items: Vec<u32> = (0..25).collect();
        let (page_1, total, pages) = paginate(items.clone(), 1, 10);
        assert_eq!(page_1.len(), 10);
        assert_eq!(total, 25);
        assert_eq!(pages, 3);

        let (page_3, _, _) = paginate(items.clone(), 3, 10);
        assert_eq!(page_3, vec![20, 21, 22, 23, 24]);

        let (beyond, _, _) = paginate(items, 9, 10);
        assert!(beyond.is_empty());
    }

    #[test]
    fn empty_listing_has_one_page() {
        let (items, total, pages) = paginate(Vec::<u32>::new(), 1, 20);
        assert!(items.is_empty());
        assert_eq!(total, 0);
        assert_eq!(pages, 1);
    }
}
