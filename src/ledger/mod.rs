// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Double-Entry Ledger
//!
//! The append-only journal of every monetary movement, plus the
//! materialized balance projection derived from it.
//!
//! ## Posting discipline
//!
//! [`post`] is the only way money moves between buckets. It runs inside the
//! caller's write transaction and atomically:
//!
//! 1. validates the entry amount is strictly positive,
//! 2. enforces one-shot uniqueness for transition entries
//!    (a deposit credits exactly once, a withdrawal settles exactly once),
//! 3. folds the entry's effect into the balance projection, refusing any
//!    fold that would drive a bucket negative,
//! 4. appends the journal row.
//!
//! Because projection updates co-commit with journal appends, replaying the
//! journal from empty must always reproduce the cached projection; the
//! reconciler in [`crate::ledger::reconcile`] verifies exactly that.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::money::quantize;
use crate::store::{
    composite_key, composite_prefix, seq_bytes, Reader, StoreError, StoreResult, Writer, BALANCES,
    LEDGER, LEDGER_ONESHOT,
};

pub mod reconcile;

/// Ledger entry kinds and their projection semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    DepositConfirmed,
    StakeCreated,
    UnstakeCompleted,
    RewardAccrued,
    RewardClaimed,
    WithdrawalRequested,
    WithdrawalRejected,
    WithdrawalPaid,
    Adjustment,
    StakeCancelled,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::DepositConfirmed => "DEPOSIT_CONFIRMED",
            EntryType::StakeCreated => "STAKE_CREATED",
            EntryType::UnstakeCompleted => "UNSTAKE_COMPLETED",
            EntryType::RewardAccrued => "REWARD_ACCRUED",
            EntryType::RewardClaimed => "REWARD_CLAIMED",
            EntryType::WithdrawalRequested => "WITHDRAWAL_REQUESTED",
            EntryType::WithdrawalRejected => "WITHDRAWAL_REJECTED",
            EntryType::WithdrawalPaid => "WITHDRAWAL_PAID",
            EntryType::Adjustment => "ADJUSTMENT",
            EntryType::StakeCancelled => "STAKE_CANCELLED",
        }
    }

    /// One-shot transitions may post at most once per reference.
    pub fn is_one_shot(&self) -> bool {
        !matches!(self, EntryType::RewardAccrued | EntryType::Adjustment)
    }
}

/// Credit increases the user's claim against the platform; debit decreases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Credit,
    Debit,
}

/// An immutable journal row. Never mutated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    pub asset_id: String,
    pub chain_id: String,
    pub entry_type: EntryType,
    pub direction: Direction,
    /// Strictly positive.
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    /// Available balance after this entry folded in.
    #[schema(value_type = Option<String>)]
    pub balance_after: Option<BigDecimal>,
    /// Entity kind this entry settles, e.g. `Deposit`.
    pub reference_type: String,
    pub reference_id: String,
    /// Structured context. Unstake entries carry the principal/rewards
    /// split needed to replay their projection effect.
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Materialized per-(user, asset, chain) balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BalanceCache {
    pub user_id: String,
    pub asset_id: String,
    pub chain_id: String,
    #[schema(value_type = String)]
    pub available: BigDecimal,
    #[schema(value_type = String)]
    pub staked: BigDecimal,
    #[schema(value_type = String)]
    pub rewards_accrued: BigDecimal,
    #[schema(value_type = String)]
    pub withdrawals_pending: BigDecimal,
    pub updated_at: DateTime<Utc>,
}

impl BalanceCache {
    /// Empty projection for a tuple.
    pub fn empty(user_id: &str, asset_id: &str, chain_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            asset_id: asset_id.to_string(),
            chain_id: chain_id.to_string(),
            available: BigDecimal::zero(),
            staked: BigDecimal::zero(),
            rewards_accrued: BigDecimal::zero(),
            withdrawals_pending: BigDecimal::zero(),
            updated_at: now,
        }
    }

    fn storage_key(&self) -> Vec<u8> {
        balance_key(&self.user_id, &self.asset_id, &self.chain_id)
    }
}

/// Projection storage key for a tuple.
pub fn balance_key(user_id: &str, asset_id: &str, chain_id: &str) -> Vec<u8> {
    composite_key(&[user_id, asset_id, chain_id])
}

/// Errors from ledger posting and folding.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger amount must be positive, got {0}")]
    AmountNotPositive(BigDecimal),

    #[error("{bucket} balance would go negative (have {have}, need {need})")]
    InsufficientBalance {
        bucket: &'static str,
        have: BigDecimal,
        need: BigDecimal,
    },

    #[error("{entry_type} already posted for {reference_type} {reference_id}")]
    DuplicateEntry {
        entry_type: &'static str,
        reference_type: String,
        reference_id: String,
    },

    #[error("unstake entry is missing its principal/rewards metadata")]
    MissingUnstakeSplit,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A movement to record, built by the domain services.
#[derive(Debug, Clone)]
pub struct Posting {
    pub user_id: String,
    pub asset_id: String,
    pub chain_id: String,
    pub entry_type: EntryType,
    pub direction: Direction,
    pub amount: BigDecimal,
    pub reference_type: String,
    pub reference_id: String,
    pub metadata: serde_json::Value,
}

impl Posting {
    /// A deposit credit: `available += amount`.
    pub fn deposit_confirmed(
        user_id: &str,
        asset_id: &str,
        chain_id: &str,
        amount: BigDecimal,
        deposit_id: &str,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            asset_id: asset_id.into(),
            chain_id: chain_id.into(),
            entry_type: EntryType::DepositConfirmed,
            direction: Direction::Credit,
            amount,
            reference_type: "Deposit".into(),
            reference_id: deposit_id.into(),
            metadata: serde_json::json!({}),
        }
    }

    /// Stake debit: `available -= amount; staked += amount`.
    pub fn stake_created(
        user_id: &str,
        asset_id: &str,
        chain_id: &str,
        amount: BigDecimal,
        position_id: &str,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            asset_id: asset_id.into(),
            chain_id: chain_id.into(),
            entry_type: EntryType::StakeCreated,
            direction: Direction::Debit,
            amount,
            reference_type: "StakePosition".into(),
            reference_id: position_id.into(),
            metadata: serde_json::json!({}),
        }
    }

    /// Unstake credit for `principal + rewards`; the split rides in the
    /// metadata so replay can apply the same projection effect.
    pub fn unstake_completed(
        user_id: &str,
        asset_id: &str,
        chain_id: &str,
        principal: BigDecimal,
        rewards: BigDecimal,
        position_id: &str,
    ) -> Self {
        let amount = quantize(&(&principal + &rewards));
        Self {
            user_id: user_id.into(),
            asset_id: asset_id.into(),
            chain_id: chain_id.into(),
            entry_type: EntryType::UnstakeCompleted,
            direction: Direction::Credit,
            amount,
            reference_type: "StakePosition".into(),
            reference_id: position_id.into(),
            metadata: serde_json::json!({
                "principal": principal.to_string(),
                "rewards": rewards.to_string(),
            }),
        }
    }

    /// Reward credit: `rewards_accrued += amount`.
    pub fn reward_accrued(
        user_id: &str,
        asset_id: &str,
        chain_id: &str,
        amount: BigDecimal,
        position_id: &str,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            asset_id: asset_id.into(),
            chain_id: chain_id.into(),
            entry_type: EntryType::RewardAccrued,
            direction: Direction::Credit,
            amount,
            reference_type: "StakePosition".into(),
            reference_id: position_id.into(),
            metadata: serde_json::json!({}),
        }
    }

    /// Claim credit: `rewards_accrued -= amount; available += amount`.
    pub fn reward_claimed(
        user_id: &str,
        asset_id: &str,
        chain_id: &str,
        amount: BigDecimal,
        position_id: &str,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            asset_id: asset_id.into(),
            chain_id: chain_id.into(),
            entry_type: EntryType::RewardClaimed,
            direction: Direction::Credit,
            amount,
            reference_type: "StakePosition".into(),
            reference_id: position_id.into(),
            metadata: serde_json::json!({}),
        }
    }

    /// Reservation debit: `available -= amount; withdrawals_pending += amount`.
    pub fn withdrawal_requested(
        user_id: &str,
        asset_id: &str,
        chain_id: &str,
        amount: BigDecimal,
        request_id: &str,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            asset_id: asset_id.into(),
            chain_id: chain_id.into(),
            entry_type: EntryType::WithdrawalRequested,
            direction: Direction::Debit,
            amount,
            reference_type: "WithdrawalRequest".into(),
            reference_id: request_id.into(),
            metadata: serde_json::json!({}),
        }
    }

    /// Release credit: `withdrawals_pending -= amount; available += amount`.
    pub fn withdrawal_rejected(
        user_id: &str,
        asset_id: &str,
        chain_id: &str,
        amount: BigDecimal,
        request_id: &str,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            asset_id: asset_id.into(),
            chain_id: chain_id.into(),
            entry_type: EntryType::WithdrawalRejected,
            direction: Direction::Credit,
            amount,
            reference_type: "WithdrawalRequest".into(),
            reference_id: request_id.into(),
            metadata: serde_json::json!({}),
        }
    }

    /// Settlement debit: `withdrawals_pending -= amount`.
    pub fn withdrawal_paid(
        user_id: &str,
        asset_id: &str,
        chain_id: &str,
        amount: BigDecimal,
        request_id: &str,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            asset_id: asset_id.into(),
            chain_id: chain_id.into(),
            entry_type: EntryType::WithdrawalPaid,
            direction: Direction::Debit,
            amount,
            reference_type: "WithdrawalRequest".into(),
            reference_id: request_id.into(),
            metadata: serde_json::json!({}),
        }
    }

    /// Admin adjustment: `available ± amount`. Audited by the caller.
    pub fn adjustment(
        user_id: &str,
        asset_id: &str,
        chain_id: &str,
        direction: Direction,
        amount: BigDecimal,
        reference_id: &str,
        note: &str,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            asset_id: asset_id.into(),
            chain_id: chain_id.into(),
            entry_type: EntryType::Adjustment,
            direction,
            amount,
            reference_type: "AdminAdjustment".into(),
            reference_id: reference_id.into(),
            metadata: serde_json::json!({ "note": note }),
        }
    }

    /// Cancellation credit: `staked -= amount; available += amount`.
    pub fn stake_cancelled(
        user_id: &str,
        asset_id: &str,
        chain_id: &str,
        amount: BigDecimal,
        position_id: &str,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            asset_id: asset_id.into(),
            chain_id: chain_id.into(),
            entry_type: EntryType::StakeCancelled,
            direction: Direction::Credit,
            amount,
            reference_type: "StakePosition".into(),
            reference_id: position_id.into(),
            metadata: serde_json::json!({}),
        }
    }
}

/// Subtract `delta` from `bucket`, refusing a negative result.
fn debit_bucket(
    bucket: &mut BigDecimal,
    bucket_name: &'static str,
    delta: &BigDecimal,
) -> Result<(), LedgerError> {
    if &*bucket < delta {
        return Err(LedgerError::InsufficientBalance {
            bucket: bucket_name,
            have: bucket.clone(),
            need: delta.clone(),
        });
    }
    *bucket = quantize(&(&*bucket - delta));
    Ok(())
}

fn credit_bucket(bucket: &mut BigDecimal, delta: &BigDecimal) {
    *bucket = quantize(&(&*bucket + delta));
}

/// Fold one journal entry into a projection.
///
/// Shared by live posting and ledger replay, which is what guarantees the
/// reconciler reproduces the cache bit for bit.
pub fn fold_entry(balance: &mut BalanceCache, entry: &LedgerEntry) -> Result<(), LedgerError> {
    let amount = &entry.amount;
    match entry.entry_type {
        EntryType::DepositConfirmed => credit_bucket(&mut balance.available, amount),
        EntryType::StakeCreated => {
            debit_bucket(&mut balance.available, "available", amount)?;
            credit_bucket(&mut balance.staked, amount);
        }
        EntryType::UnstakeCompleted => {
            let principal = metadata_decimal(&entry.metadata, "principal")
                .ok_or(LedgerError::MissingUnstakeSplit)?;
            let rewards = metadata_decimal(&entry.metadata, "rewards")
                .ok_or(LedgerError::MissingUnstakeSplit)?;
            debit_bucket(&mut balance.staked, "staked", &principal)?;
            credit_bucket(&mut balance.available, amount);
            // The position's accrued rewards settle with the principal.
            debit_bucket(&mut balance.rewards_accrued, "rewards_accrued", &rewards)?;
        }
        EntryType::RewardAccrued => credit_bucket(&mut balance.rewards_accrued, amount),
        EntryType::RewardClaimed => {
            debit_bucket(&mut balance.rewards_accrued, "rewards_accrued", amount)?;
            credit_bucket(&mut balance.available, amount);
        }
        EntryType::WithdrawalRequested => {
            debit_bucket(&mut balance.available, "available", amount)?;
            credit_bucket(&mut balance.withdrawals_pending, amount);
        }
        EntryType::WithdrawalRejected => {
            debit_bucket(&mut balance.withdrawals_pending, "withdrawals_pending", amount)?;
            credit_bucket(&mut balance.available, amount);
        }
        EntryType::WithdrawalPaid => {
            debit_bucket(&mut balance.withdrawals_pending, "withdrawals_pending", amount)?;
        }
        EntryType::Adjustment => match entry.direction {
            Direction::Credit => credit_bucket(&mut balance.available, amount),
            Direction::Debit => debit_bucket(&mut balance.available, "available", amount)?,
        },
        EntryType::StakeCancelled => {
            debit_bucket(&mut balance.staked, "staked", amount)?;
            credit_bucket(&mut balance.available, amount);
        }
    }
    balance.updated_at = entry.created_at;
    Ok(())
}

fn metadata_decimal(metadata: &serde_json::Value, field: &str) -> Option<BigDecimal> {
    use std::str::FromStr;
    metadata
        .get(field)
        .and_then(|v| v.as_str())
        .and_then(|s| BigDecimal::from_str(s).ok())
}

/// Current projection for a tuple, zero when never touched.
pub fn balance_of(
    tx: &impl Reader,
    user_id: &str,
    asset_id: &str,
    chain_id: &str,
    now: DateTime<Utc>,
) -> StoreResult<BalanceCache> {
    Ok(tx
        .get_by(BALANCES, &balance_key(user_id, asset_id, chain_id))?
        .unwrap_or_else(|| BalanceCache::empty(user_id, asset_id, chain_id, now)))
}

/// Every projection row in the store.
pub fn all_balances(tx: &impl Reader) -> StoreResult<Vec<BalanceCache>> {
    Ok(tx
        .scan_rows(BALANCES, &[])?
        .into_iter()
        .map(|(_, b)| b)
        .collect())
}

/// All projection rows for one user.
pub fn balances_for_user(tx: &impl Reader, user_id: &str) -> StoreResult<Vec<BalanceCache>> {
    Ok(tx
        .scan_rows(BALANCES, &composite_prefix(&[user_id]))?
        .into_iter()
        .map(|(_, b)| b)
        .collect())
}

/// The journal tail for a tuple, in commit order.
pub fn entries_for(
    tx: &impl Reader,
    user_id: &str,
    asset_id: &str,
    chain_id: &str,
) -> StoreResult<Vec<LedgerEntry>> {
    Ok(tx
        .scan_rows(LEDGER, &composite_prefix(&[user_id, asset_id, chain_id]))?
        .into_iter()
        .map(|(_, e)| e)
        .collect())
}

/// The whole journal, in commit order per tuple.
pub fn all_entries(tx: &impl Reader) -> StoreResult<Vec<LedgerEntry>> {
    Ok(tx
        .scan_rows(LEDGER, &[])?
        .into_iter()
        .map(|(_, e)| e)
        .collect())
}

/// Append a journal entry and fold it into the projection, atomically with
/// the caller's transaction.
pub fn post(tx: &impl Writer, posting: Posting, now: DateTime<Utc>) -> Result<LedgerEntry, LedgerError> {
    let amount = quantize(&posting.amount);
    if amount <= BigDecimal::zero() {
        return Err(LedgerError::AmountNotPositive(amount));
    }

    if posting.entry_type.is_one_shot() {
        let oneshot_key = composite_key(&[
            posting.entry_type.as_str(),
            &posting.reference_type,
            &posting.reference_id,
        ]);
        tx.index_insert_unique_by(LEDGER_ONESHOT, &oneshot_key, &posting.reference_id)
            .map_err(|_| LedgerError::DuplicateEntry {
                entry_type: posting.entry_type.as_str(),
                reference_type: posting.reference_type.clone(),
                reference_id: posting.reference_id.clone(),
            })?;
    }

    let mut entry = LedgerEntry {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: posting.user_id,
        asset_id: posting.asset_id,
        chain_id: posting.chain_id,
        entry_type: posting.entry_type,
        direction: posting.direction,
        amount,
        balance_after: None,
        reference_type: posting.reference_type,
        reference_id: posting.reference_id,
        metadata: posting.metadata,
        created_at: now,
    };

    let mut balance = balance_of(tx, &entry.user_id, &entry.asset_id, &entry.chain_id, now)?;
    fold_entry(&mut balance, &entry)?;
    entry.balance_after = Some(balance.available.clone());

    let seq = tx.next_counter("ledger_seq")?;
    let mut key = composite_prefix(&[&entry.user_id, &entry.asset_id, &entry.chain_id]);
    key.extend_from_slice(&seq_bytes(seq));

    tx.put_by(LEDGER, &key, &entry)?;
    tx.put_by(BALANCES, &balance.storage_key(), &balance)?;
    Ok(entry)
}
