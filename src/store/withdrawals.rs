// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Withdrawal requests and payout attempts.
//!
//! Requests move through an admin-gated state machine; every transition is
//! compare-and-swap on the stored status so concurrent reviewers or workers
//! cannot double-apply an edge.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{
    composite_key, composite_prefix, inverted_ts, Reader, StoreError, StoreResult, Writer,
    PAYOUTS, WITHDRAWALS, WITHDRAWALS_BY_KEY, WITHDRAWALS_BY_STATUS, WITHDRAWALS_BY_USER,
};
use crate::withdrawals::fraud::FraudIndicator;

/// Admin-gated withdrawal lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    /// Awaiting an admin decision. Funds are reserved.
    PendingReview,
    /// Approved; a payout job is queued.
    Approved,
    /// Claimed by the payout worker.
    Processing,
    /// Broadcast on-chain, waiting for the receipt.
    Sent,
    /// Receipt seen, accumulating confirmations.
    Confirming,
    /// Final: paid on-chain and settled in the ledger.
    Completed,
    /// Final: rejected by an admin, reserve released.
    Rejected,
    /// Broadcast or confirmation failure; operator decides retry or manual.
    Failed,
    /// Final: settled outside the payout executor.
    PaidManually,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::PendingReview => "PENDING_REVIEW",
            WithdrawalStatus::Approved => "APPROVED",
            WithdrawalStatus::Processing => "PROCESSING",
            WithdrawalStatus::Sent => "SENT",
            WithdrawalStatus::Confirming => "CONFIRMING",
            WithdrawalStatus::Completed => "COMPLETED",
            WithdrawalStatus::Rejected => "REJECTED",
            WithdrawalStatus::Failed => "FAILED",
            WithdrawalStatus::PaidManually => "PAID_MANUALLY",
        }
    }

    /// True once no further transition can apply.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WithdrawalStatus::Completed | WithdrawalStatus::Rejected | WithdrawalStatus::PaidManually
        )
    }

    /// The edges the state machine allows out of `self`.
    pub fn can_transition_to(&self, next: WithdrawalStatus) -> bool {
        use WithdrawalStatus::*;
        matches!(
            (self, next),
            (PendingReview, Approved)
                | (PendingReview, Rejected)
                | (PendingReview, PaidManually)
                | (Approved, Processing)
                | (Approved, PaidManually)
                | (Processing, Sent)
                | (Processing, Failed)
                | (Sent, Confirming)
                | (Sent, Failed)
                | (Confirming, Completed)
                | (Confirming, Failed)
                | (Failed, Processing)
                | (Failed, PaidManually)
        )
    }
}

/// A user's request to withdraw funds to an external address.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WithdrawalRequest {
    pub id: String,
    pub user_id: String,
    pub asset_id: String,
    pub chain_id: String,
    /// Gross amount reserved from the available balance.
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    #[schema(value_type = String)]
    pub fee: BigDecimal,
    /// `amount - fee`, the on-chain transfer value.
    #[schema(value_type = String)]
    pub net_amount: BigDecimal,
    /// Lowercase destination.
    pub destination_address: String,
    pub status: WithdrawalStatus,
    pub user_notes: Option<String>,
    pub admin_notes: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Evidence link for manually settled requests.
    pub manual_proof_url: Option<String>,
    /// Client-supplied deduplication token; unique.
    pub idempotency_key: String,
    pub fraud_score: u32,
    pub fraud_indicators: Vec<FraudIndicator>,
    pub created_at: DateTime<Utc>,
}

/// Broadcast state for an approved withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    Pending,
    Sent,
    Confirming,
    Confirmed,
    Failed,
}

/// One payout record per withdrawal request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PayoutTx {
    pub withdrawal_request_id: String,
    pub tx_hash: Option<String>,
    pub nonce: Option<u64>,
    pub gas_used: Option<u64>,
    pub status: PayoutStatus,
    pub confirmations: u64,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub attempts: u32,
}

/// Repository for withdrawal requests and payouts.
pub struct WithdrawalRepo<'a, T> {
    tx: &'a T,
}

impl<'a, T: Reader> WithdrawalRepo<'a, T> {
    pub fn new(tx: &'a T) -> Self {
        Self { tx }
    }

    pub fn get(&self, request_id: &str) -> StoreResult<Option<WithdrawalRequest>> {
        self.tx.get(WITHDRAWALS, request_id)
    }

    pub fn require(&self, request_id: &str) -> StoreResult<WithdrawalRequest> {
        self.get(request_id)?
            .ok_or_else(|| StoreError::NotFound(format!("withdrawal {request_id}")))
    }

    pub fn by_idempotency_key(&self, key: &str) -> StoreResult<Option<WithdrawalRequest>> {
        match self.tx.index_get(WITHDRAWALS_BY_KEY, key)? {
            Some(id) => self.get(&id),
            None => Ok(None),
        }
    }

    /// A user's requests, newest first.
    pub fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<WithdrawalRequest>> {
        let ids = self
            .tx
            .scan_ids(WITHDRAWALS_BY_USER, &composite_prefix(&[user_id]))?;
        let mut requests = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(request) = self.get(&id)? {
                requests.push(request);
            }
        }
        Ok(requests)
    }

    pub fn list_by_status(&self, status: WithdrawalStatus) -> StoreResult<Vec<WithdrawalRequest>> {
        let ids = self
            .tx
            .scan_ids(WITHDRAWALS_BY_STATUS, &composite_prefix(&[status.as_str()]))?;
        let mut requests = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(request) = self.get(&id)? {
                requests.push(request);
            }
        }
        Ok(requests)
    }

    pub fn list_all(&self) -> StoreResult<Vec<WithdrawalRequest>> {
        Ok(self.tx.scan_all(WITHDRAWALS)?.into_iter().map(|(_, w)| w).collect())
    }

    pub fn payout(&self, request_id: &str) -> StoreResult<Option<PayoutTx>> {
        self.tx.get(PAYOUTS, request_id)
    }
}

impl<'a, T: Writer> WithdrawalRepo<'a, T> {
    /// Insert a new request, enforcing idempotency-key uniqueness.
    pub fn insert(&self, request: &WithdrawalRequest) -> StoreResult<()> {
        self.tx
            .index_insert_unique(WITHDRAWALS_BY_KEY, &request.idempotency_key, &request.id)?;
        let mut user_key = composite_prefix(&[&request.user_id]);
        user_key.extend_from_slice(&inverted_ts(request.created_at.timestamp()));
        user_key.push(b'|');
        user_key.extend_from_slice(request.id.as_bytes());
        self.tx.index_put_by(WITHDRAWALS_BY_USER, &user_key, &request.id)?;
        self.tx.index_put_by(
            WITHDRAWALS_BY_STATUS,
            &composite_key(&[request.status.as_str(), &request.id]),
            &request.id,
        )?;
        self.tx.insert_new(WITHDRAWALS, &request.id, request)
    }

    /// Compare-and-swap the status and persist the mutated request.
    ///
    /// `mutate` runs only after the CAS guard passes and may fill review
    /// fields. Fails with `Conflict` when the stored status is not
    /// `expected` or the edge is not in the state machine.
    pub fn transition(
        &self,
        request_id: &str,
        expected: WithdrawalStatus,
        next: WithdrawalStatus,
        mutate: impl FnOnce(&mut WithdrawalRequest),
    ) -> StoreResult<WithdrawalRequest> {
        let mut request = self.require(request_id)?;
        if request.status != expected {
            return Err(StoreError::Conflict(format!(
                "withdrawal {request_id} is {}, expected {}",
                request.status.as_str(),
                expected.as_str()
            )));
        }
        if !expected.can_transition_to(next) {
            return Err(StoreError::Conflict(format!(
                "withdrawal transition {} -> {} is not allowed",
                expected.as_str(),
                next.as_str()
            )));
        }

        self.tx.delete_by(
            WITHDRAWALS_BY_STATUS,
            &composite_key(&[expected.as_str(), request_id]),
        )?;
        self.tx.index_put_by(
            WITHDRAWALS_BY_STATUS,
            &composite_key(&[next.as_str(), request_id]),
            request_id,
        )?;

        request.status = next;
        mutate(&mut request);
        self.tx.put(WITHDRAWALS, request_id, &request)?;
        Ok(request)
    }

    pub fn put_payout(&self, payout: &PayoutTx) -> StoreResult<()> {
        self.tx.put(PAYOUTS, &payout.withdrawal_request_id, payout)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use std::str::FromStr;

    pub fn pending(user_id: &str, key: &str) -> WithdrawalRequest {
        WithdrawalRequest {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            asset_id: "asset-1".into(),
            chain_id: "chain-1".into(),
            amount: BigDecimal::from_str("1.0").unwrap(),
            fee: BigDecimal::from_str("0.001").unwrap(),
            net_amount: BigDecimal::from_str("0.999").unwrap(),
            destination_address: "0x00000000000000000000000000000000000000aa".into(),
            status: WithdrawalStatus::PendingReview,
            user_notes: None,
            admin_notes: None,
            reviewed_by: None,
            reviewed_at: None,
            manual_proof_url: None,
            idempotency_key: key.to_string(),
            fraud_score: 0,
            fraud_indicators: Vec::new(),
            created_at: Utc::now(),
        }
    }
}
