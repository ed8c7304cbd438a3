// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deposit endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::Auth,
    deposits,
    error::ApiError,
    state::AppState,
    store::{Deposit, DepositRepo, DepositStatus},
};

/// Request body for address allocation.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DepositAddressRequest {
    pub chain_id: String,
}

/// Allocated deposit address with usage instructions.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DepositAddressResponse {
    pub address: String,
    pub chain_id: String,
    pub instructions: String,
}

/// Filters for the deposit listing.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct DepositListQuery {
    pub chain_id: Option<String>,
    pub status: Option<DepositStatus>,
}

/// Deposit list response.
#[derive(Debug, Serialize, ToSchema)]
pub struct DepositListResponse {
    pub deposits: Vec<Deposit>,
    pub total: usize,
}

/// Get (or allocate) the caller's deposit address on a chain.
#[utoipa::path(
    post,
    path = "/v1/deposits/address",
    tag = "Deposits",
    security(("bearer" = [])),
    request_body = DepositAddressRequest,
    responses(
        (status = 200, description = "Address", body = DepositAddressResponse),
        (status = 400, description = "Chain inactive"),
        (status = 404, description = "Chain not found")
    )
)]
pub async fn deposit_address(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<DepositAddressRequest>,
) -> Result<Json<DepositAddressResponse>, ApiError> {
    let address = deposits::get_or_create_address(&state, &user.user_id, &request.chain_id)?;
    Ok(Json(DepositAddressResponse {
        instructions: format!(
            "Send only supported tokens to {} on this chain. Deposits credit after the chain's confirmation depth.",
            address.address
        ),
        address: address.address,
        chain_id: address.chain_id,
    }))
}

/// List the caller's deposits.
#[utoipa::path(
    get,
    path = "/v1/deposits",
    tag = "Deposits",
    security(("bearer" = [])),
    params(DepositListQuery),
    responses((status = 200, description = "Deposits", body = DepositListResponse))
)]
pub async fn list_deposits(
    Auth(user): Auth,
    State(state): State<AppState>,
    Query(query): Query<DepositListQuery>,
) -> Result<Json<DepositListResponse>, ApiError> {
    let deposits = state.store.read(|tx| {
        Ok::<_, crate::store::StoreError>(
            DepositRepo::new(tx)
                .list_for_user(&user.user_id)?
                .into_iter()
                .filter(|d| query.chain_id.as_ref().map(|c| &d.chain_id == c).unwrap_or(true))
                .filter(|d| query.status.map(|s| d.status == s).unwrap_or(true))
                .collect::<Vec<_>>(),
        )
    })?;
    let total = deposits.len();
    Ok(Json(DepositListResponse { deposits, total }))
}
