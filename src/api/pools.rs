// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Public catalog endpoints: chains, assets, pools, and the reward
//! calculator.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::ApiError,
    staking::estimate_rewards,
    state::AppState,
    store::{AprSchedule, Asset, AssetRepo, Chain, ChainRepo, Pool, PoolRepo, PoolType},
    validate,
};

/// Filters for the pool listing.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct PoolListQuery {
    /// Restrict to pools of one asset.
    pub asset_id: Option<String>,
    /// Restrict to one pool type.
    #[serde(rename = "type")]
    pub pool_type: Option<PoolType>,
}

/// Query for the reward calculator.
#[derive(Debug, Deserialize, IntoParams)]
pub struct CalculatorQuery {
    /// Stake amount as a decimal string.
    pub amount: String,
    /// Holding period in days.
    pub days: u32,
}

/// Calculator response.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CalculatorResponse {
    pub pool_id: String,
    #[schema(value_type = String)]
    pub apr: BigDecimal,
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    pub days: u32,
    #[schema(value_type = String)]
    pub estimated_rewards: BigDecimal,
    #[schema(value_type = String)]
    pub total_at_maturity: BigDecimal,
}

/// Pool list response.
#[derive(Debug, Serialize, ToSchema)]
pub struct PoolListResponse {
    pub pools: Vec<Pool>,
    pub total: usize,
}

/// Chain list response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChainListResponse {
    pub chains: Vec<Chain>,
    pub total: usize,
}

/// Asset list response.
#[derive(Debug, Serialize, ToSchema)]
pub struct AssetListResponse {
    pub assets: Vec<Asset>,
    pub total: usize,
}

/// APR history response.
#[derive(Debug, Serialize, ToSchema)]
pub struct AprHistoryResponse {
    pub schedules: Vec<AprSchedule>,
    pub total: usize,
}

/// List active chains.
#[utoipa::path(
    get,
    path = "/v1/chains",
    tag = "Catalog",
    responses((status = 200, description = "Active chains", body = ChainListResponse))
)]
pub async fn list_chains(State(state): State<AppState>) -> Result<Json<ChainListResponse>, ApiError> {
    let chains = state.store.read(|tx| ChainRepo::new(tx).list_active())?;
    let total = chains.len();
    Ok(Json(ChainListResponse { chains, total }))
}

/// List active assets.
#[utoipa::path(
    get,
    path = "/v1/assets",
    tag = "Catalog",
    responses((status = 200, description = "Active assets", body = AssetListResponse))
)]
pub async fn list_assets(State(state): State<AppState>) -> Result<Json<AssetListResponse>, ApiError> {
    let assets = state.store.read(|tx| {
        Ok::<_, crate::store::StoreError>(
            AssetRepo::new(tx)
                .list()?
                .into_iter()
                .filter(|a| a.is_active)
                .collect::<Vec<_>>(),
        )
    })?;
    let total = assets.len();
    Ok(Json(AssetListResponse { assets, total }))
}

/// List active pools, optionally filtered.
#[utoipa::path(
    get,
    path = "/v1/pools",
    tag = "Pools",
    params(PoolListQuery),
    responses((status = 200, description = "Pools", body = PoolListResponse))
)]
pub async fn list_pools(
    State(state): State<AppState>,
    Query(query): Query<PoolListQuery>,
) -> Result<Json<PoolListResponse>, ApiError> {
    let pools = state.store.read(|tx| {
        Ok::<_, crate::store::StoreError>(
            PoolRepo::new(tx)
                .list()?
                .into_iter()
                .filter(|p| p.is_active)
                .filter(|p| query.asset_id.as_ref().map(|a| &p.asset_id == a).unwrap_or(true))
                .filter(|p| query.pool_type.map(|t| p.pool_type == t).unwrap_or(true))
                .collect::<Vec<_>>(),
        )
    })?;
    let total = pools.len();
    Ok(Json(PoolListResponse { pools, total }))
}

/// Get one pool.
#[utoipa::path(
    get,
    path = "/v1/pools/{pool_id}",
    tag = "Pools",
    params(("pool_id" = String, Path, description = "Pool ID")),
    responses(
        (status = 200, description = "Pool", body = Pool),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_pool(
    State(state): State<AppState>,
    Path(pool_id): Path<String>,
) -> Result<Json<Pool>, ApiError> {
    let pool = state.store.read(|tx| PoolRepo::new(tx).require(&pool_id))?;
    Ok(Json(pool))
}

/// Estimate rewards for an amount held over a number of days.
#[utoipa::path(
    get,
    path = "/v1/pools/{pool_id}/calculator",
    tag = "Pools",
    params(("pool_id" = String, Path, description = "Pool ID"), CalculatorQuery),
    responses(
        (status = 200, description = "Estimate", body = CalculatorResponse),
        (status = 404, description = "Pool not found")
    )
)]
pub async fn calculator(
    State(state): State<AppState>,
    Path(pool_id): Path<String>,
    Query(query): Query<CalculatorQuery>,
) -> Result<Json<CalculatorResponse>, ApiError> {
    let amount = validate::amount(&query.amount)?;
    if query.days > 36_500 {
        return Err(ApiError::bad_request("days: must be at most 36500"));
    }

    let now = state.clock.now();
    let (pool, apr) = state.store.read(|tx| {
        let repo = PoolRepo::new(tx);
        let pool = repo.require(&pool_id)?;
        let apr = repo.effective_apr(&pool, now)?;
        Ok::<_, crate::store::StoreError>((pool, apr))
    })?;

    let estimated_rewards = estimate_rewards(&apr, &amount, query.days);
    let total_at_maturity = crate::money::quantize(&(&amount + &estimated_rewards));
    Ok(Json(CalculatorResponse {
        pool_id: pool.id,
        apr,
        amount,
        days: query.days,
        estimated_rewards,
        total_at_maturity,
    }))
}

/// APR schedule history for a pool.
#[utoipa::path(
    get,
    path = "/v1/pools/{pool_id}/apr-history",
    tag = "Pools",
    params(("pool_id" = String, Path, description = "Pool ID")),
    responses((status = 200, description = "Schedules", body = AprHistoryResponse))
)]
pub async fn apr_history(
    State(state): State<AppState>,
    Path(pool_id): Path<String>,
) -> Result<Json<AprHistoryResponse>, ApiError> {
    let schedules = state.store.read(|tx| {
        let repo = PoolRepo::new(tx);
        repo.require(&pool_id)?;
        repo.schedules(&pool_id)
    })?;
    let total = schedules.len();
    Ok(Json(AprHistoryResponse { schedules, total }))
}
