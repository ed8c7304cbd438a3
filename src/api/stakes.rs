// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Stake position endpoints.

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
    auth::Auth,
    error::ApiError,
    staking::{self, UnstakeOutcome},
    state::AppState,
    store::{PositionRepo, PositionStatus, StakePosition},
    validate,
};

/// Request body to create a stake.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateStakeRequest {
    pub pool_id: String,
    /// Decimal amount string.
    pub amount: String,
}

/// Filters for the position listing.
#[derive(Debug, Deserialize, IntoParams)]
pub struct StakeListQuery {
    pub status: Option<PositionStatus>,
}

/// Position list response.
#[derive(Debug, Serialize, ToSchema)]
pub struct StakeListResponse {
    pub positions: Vec<StakePosition>,
    pub total: usize,
}

/// Unstake response.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnstakeResponse {
    /// `UNSTAKING` while a cooldown runs, `COMPLETED` otherwise.
    pub status: PositionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_ends_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub principal: Option<BigDecimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub rewards: Option<BigDecimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub total_returned: Option<BigDecimal>,
}

/// Claim response.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    #[schema(value_type = String)]
    pub claimed_amount: BigDecimal,
}

/// List the caller's stake positions.
#[utoipa::path(
    get,
    path = "/v1/stakes",
    tag = "Stakes",
    security(("bearer" = [])),
    params(StakeListQuery),
    responses((status = 200, description = "Positions", body = StakeListResponse))
)]
pub async fn list_stakes(
    Auth(user): Auth,
    State(state): State<AppState>,
    Query(query): Query<StakeListQuery>,
) -> Result<Json<StakeListResponse>, ApiError> {
    let positions = state.store.read(|tx| {
        Ok::<_, crate::store::StoreError>(
            PositionRepo::new(tx)
                .list_for_user(&user.user_id)?
                .into_iter()
                .filter(|p| query.status.map(|s| p.status == s).unwrap_or(true))
                .collect::<Vec<_>>(),
        )
    })?;
    let total = positions.len();
    Ok(Json(StakeListResponse { positions, total }))
}

/// Stake into a pool.
#[utoipa::path(
    post,
    path = "/v1/stakes",
    tag = "Stakes",
    security(("bearer" = [])),
    request_body = CreateStakeRequest,
    responses(
        (status = 201, description = "Position created", body = StakePosition),
        (status = 400, description = "Validation or domain rejection"),
        (status = 404, description = "Pool not found")
    )
)]
pub async fn create_stake(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<CreateStakeRequest>,
) -> Result<(StatusCode, Json<StakePosition>), ApiError> {
    let amount = validate::amount(&request.amount)?;
    let position = staking::create_stake(&state, &user.user_id, &request.pool_id, amount)?;
    Ok((StatusCode::CREATED, Json(position)))
}

/// Unstake a position (or start its cooldown).
#[utoipa::path(
    post,
    path = "/v1/stakes/{position_id}/unstake",
    tag = "Stakes",
    security(("bearer" = [])),
    params(("position_id" = String, Path, description = "Position ID")),
    responses(
        (status = 200, description = "Unstake outcome", body = UnstakeResponse),
        (status = 400, description = "Locked or already settled"),
        (status = 403, description = "Not your position")
    )
)]
pub async fn unstake(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(position_id): Path<String>,
) -> Result<Json<UnstakeResponse>, ApiError> {
    let outcome = staking::unstake(&state, &user.user_id, &position_id)?;
    Ok(Json(match outcome {
        UnstakeOutcome::CooldownStarted { cooldown_ends_at } => UnstakeResponse {
            status: PositionStatus::Unstaking,
            cooldown_ends_at: Some(cooldown_ends_at),
            principal: None,
            rewards: None,
            total_returned: None,
        },
        UnstakeOutcome::Completed {
            principal,
            rewards,
            total,
        } => UnstakeResponse {
            status: PositionStatus::Completed,
            cooldown_ends_at: None,
            principal: Some(principal),
            rewards: Some(rewards),
            total_returned: Some(total),
        },
    }))
}

/// Claim accrued rewards on a position.
#[utoipa::path(
    post,
    path = "/v1/stakes/{position_id}/claim",
    tag = "Stakes",
    security(("bearer" = [])),
    params(("position_id" = String, Path, description = "Position ID")),
    responses(
        (status = 200, description = "Claimed", body = ClaimResponse),
        (status = 400, description = "Nothing to claim or position not active"),
        (status = 403, description = "Not your position")
    )
)]
pub async fn claim(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(position_id): Path<String>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let claimed_amount = staking::claim_rewards(&state, &user.user_id, &position_id)?;
    Ok(Json(ClaimResponse { claimed_amount }))
}
