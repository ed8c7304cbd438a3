// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User withdrawal endpoints.
//!
//! Submission is idempotent on the client-supplied key and always returns
//! a PENDING_REVIEW request; nothing is paid out from here.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    auth::Auth,
    error::ApiError,
    state::AppState,
    store::{WithdrawalRepo, WithdrawalRequest},
    validate,
    withdrawals::{self, SubmitParams},
};

/// Request body for a withdrawal submission.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitWithdrawalRequest {
    pub asset_id: String,
    pub chain_id: String,
    /// Decimal amount string.
    pub amount: String,
    pub destination_address: String,
    #[serde(default)]
    pub user_notes: Option<String>,
    /// Client-generated deduplication token.
    pub idempotency_key: String,
}

/// Submit a withdrawal request for admin review.
#[utoipa::path(
    post,
    path = "/v1/withdrawals",
    tag = "Withdrawals",
    security(("bearer" = [])),
    request_body = SubmitWithdrawalRequest,
    responses(
        (status = 201, description = "Pending review", body = WithdrawalRequest),
        (status = 400, description = "Validation or domain rejection"),
        (status = 409, description = "Idempotency key owned by another request")
    )
)]
pub async fn submit(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<SubmitWithdrawalRequest>,
) -> Result<(StatusCode, Json<WithdrawalRequest>), ApiError> {
    let amount = validate::amount(&request.amount)?;
    let destination_address = validate::evm_address(&request.destination_address)?;
    if request.idempotency_key.trim().is_empty() || request.idempotency_key.len() > 128 {
        return Err(ApiError::bad_request("idempotencyKey: must be 1-128 characters"));
    }

    let created = withdrawals::submit(
        &state,
        &user.user_id,
        SubmitParams {
            asset_id: request.asset_id,
            chain_id: request.chain_id,
            amount,
            destination_address,
            user_notes: request.user_notes,
            idempotency_key: request.idempotency_key,
        },
    )?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Get one of the caller's withdrawal requests.
#[utoipa::path(
    get,
    path = "/v1/withdrawals/{request_id}",
    tag = "Withdrawals",
    security(("bearer" = [])),
    params(("request_id" = String, Path, description = "Withdrawal request ID")),
    responses(
        (status = 200, description = "Request", body = WithdrawalRequest),
        (status = 403, description = "Not your request"),
        (status = 404, description = "Not found")
    )
)]
pub async fn get(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<WithdrawalRequest>, ApiError> {
    let request = state
        .store
        .read(|tx| WithdrawalRepo::new(tx).require(&request_id))?;
    if request.user_id != user.user_id {
        return Err(ApiError::forbidden("Not your withdrawal request"));
    }
    Ok(Json(request))
}

/// List the caller's withdrawal requests, newest first.
#[utoipa::path(
    get,
    path = "/v1/withdrawals",
    tag = "Withdrawals",
    security(("bearer" = [])),
    responses((status = 200, description = "Requests", body = [WithdrawalRequest]))
)]
pub async fn list(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<Vec<WithdrawalRequest>>, ApiError> {
    let requests = state
        .store
        .read(|tx| WithdrawalRepo::new(tx).list_for_user(&user.user_id))?;
    Ok(Json(requests))
}
