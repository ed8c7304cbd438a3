// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Staking Engine
//!
//! Pool catalog, position lifecycle, continuous reward accrual, cooldown
//! handling, and claims.
//!
//! Accrual is simple interest: `reward = principal * apr/100 / year_secs *
//! elapsed_secs`, where `apr` comes from the pool's active schedule row.
//! Every accrual advances `last_reward_calculation` in the same
//! transaction as the `REWARD_ACCRUED` ledger entry, so re-running a sweep
//! never double-pays.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Duration, Utc};

use crate::error::ApiError;
use crate::ledger::{post, Posting};
use crate::money::{accrued_reward, quantize};
use crate::state::AppState;
use crate::store::{
    AssetRepo, Notification, NotificationRepo, Pool, PoolRepo, PositionRepo, PositionStatus,
    StakePosition, Writer,
};

pub mod accrual;

/// Outcome of an unstake call.
#[derive(Debug, Clone)]
pub enum UnstakeOutcome {
    /// Cooldown started; principal releases when the sweep reaches
    /// `cooldown_ends_at`.
    CooldownStarted { cooldown_ends_at: DateTime<Utc> },
    /// Principal and rewards are back in the available balance.
    Completed {
        principal: BigDecimal,
        rewards: BigDecimal,
        total: BigDecimal,
    },
}

/// Stake `amount` into a pool.
pub fn create_stake(
    state: &AppState,
    user_id: &str,
    pool_id: &str,
    amount: BigDecimal,
) -> Result<StakePosition, ApiError> {
    let now = state.clock.now();
    let amount = quantize(&amount);

    state.store.write(|tx| {
        let pool_repo = PoolRepo::new(tx);
        let mut pool = pool_repo.require(pool_id)?;
        if !pool.is_active {
            return Err(ApiError::domain("POOL_INACTIVE", "Pool is not accepting stakes"));
        }
        if amount < pool.min_stake {
            return Err(ApiError::domain(
                "BELOW_MIN_STAKE",
                format!("Minimum stake is {}", pool.min_stake),
            ));
        }
        if let Some(max_stake) = &pool.max_stake {
            if &amount > max_stake {
                return Err(ApiError::domain(
                    "ABOVE_MAX_STAKE",
                    format!("Maximum stake is {max_stake}"),
                ));
            }
        }
        if let Some(capacity) = &pool.total_capacity {
            if quantize(&(&pool.total_staked + &amount)) > *capacity {
                return Err(ApiError::domain(
                    "POOL_CAPACITY_EXCEEDED",
                    "Pool does not have capacity for this stake",
                ));
            }
        }

        let asset = AssetRepo::new(tx).require(&pool.asset_id)?;

        let locked_until = (pool.lock_days > 0)
            .then(|| now + Duration::hours(pool.lock_days as i64 * 24));

        let position = StakePosition {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            pool_id: pool.id.clone(),
            amount: amount.clone(),
            rewards_accrued: BigDecimal::zero(),
            rewards_claimed: BigDecimal::zero(),
            last_reward_calculation: now,
            status: PositionStatus::Active,
            locked_until,
            cooldown_ends_at: None,
            unstaked_at: None,
            created_at: now,
        };
        PositionRepo::new(tx).insert(&position)?;

        pool.total_staked = quantize(&(&pool.total_staked + &amount));
        pool_repo.update(&pool)?;

        // The reservation debit fails here when available < amount.
        post(
            tx,
            Posting::stake_created(user_id, &pool.asset_id, &asset.chain_id, amount, &position.id),
            now,
        )?;

        Ok(position)
    })
}

/// Accrue rewards on a position up to `now`, posting the ledger credit.
///
/// Returns the newly accrued delta. Skips (returning zero) when less than
/// one second has elapsed or the delta rounds to nothing; the timestamp
/// only advances when a posting happens, so dust keeps accumulating.
pub fn accrue_in_tx(
    tx: &impl Writer,
    position: &mut StakePosition,
    pool: &Pool,
    now: DateTime<Utc>,
) -> Result<BigDecimal, ApiError> {
    let elapsed = (now - position.last_reward_calculation).num_seconds();
    if elapsed < 1 {
        return Ok(BigDecimal::zero());
    }

    let apr = PoolRepo::new(tx).effective_apr(pool, now)?;
    let delta = accrued_reward(&position.amount, &apr, elapsed as u64);
    if !crate::money::is_positive(&delta) {
        return Ok(BigDecimal::zero());
    }

    let asset = AssetRepo::new(tx).require(&pool.asset_id)?;
    post(
        tx,
        Posting::reward_accrued(
            &position.user_id,
            &pool.asset_id,
            &asset.chain_id,
            delta.clone(),
            &position.id,
        ),
        now,
    )?;

    position.rewards_accrued = quantize(&(&position.rewards_accrued + &delta));
    position.last_reward_calculation = now;
    PositionRepo::new(tx).update(position)?;
    Ok(delta)
}

/// Claim accrued rewards into the available balance.
pub fn claim_rewards(
    state: &AppState,
    user_id: &str,
    position_id: &str,
) -> Result<BigDecimal, ApiError> {
    let now = state.clock.now();

    state.store.write(|tx| {
        let repo = PositionRepo::new(tx);
        let mut position = repo.require(position_id)?;
        if position.user_id != user_id {
            return Err(ApiError::forbidden("Not your stake position"));
        }
        if position.status != PositionStatus::Active {
            return Err(ApiError::domain(
                "POSITION_NOT_ACTIVE",
                "Rewards can only be claimed on active positions",
            ));
        }

        let pool = PoolRepo::new(tx).require(&position.pool_id)?;
        accrue_in_tx(tx, &mut position, &pool, now)?;

        let claimed = position.rewards_accrued.clone();
        if !crate::money::is_positive(&claimed) {
            return Err(ApiError::domain("NOTHING_TO_CLAIM", "No rewards accrued yet"));
        }

        let asset = AssetRepo::new(tx).require(&pool.asset_id)?;
        post(
            tx,
            Posting::reward_claimed(
                user_id,
                &pool.asset_id,
                &asset.chain_id,
                claimed.clone(),
                &position.id,
            ),
            now,
        )?;

        position.rewards_accrued = BigDecimal::zero();
        position.rewards_claimed = quantize(&(&position.rewards_claimed + &claimed));
        repo.update(&position)?;

        Ok(claimed)
    })
}

/// Settle a position: final accrual, principal + rewards credit, pool
/// counter release. Shared by direct unstakes and the cooldown sweep.
fn finalize_in_tx(
    tx: &impl Writer,
    position: &mut StakePosition,
    now: DateTime<Utc>,
) -> Result<UnstakeOutcome, ApiError> {
    let pool_repo = PoolRepo::new(tx);
    let mut pool = pool_repo.require(&position.pool_id)?;

    accrue_in_tx(tx, position, &pool, now)?;

    let principal = position.amount.clone();
    let rewards = position.rewards_accrued.clone();
    let asset = AssetRepo::new(tx).require(&pool.asset_id)?;

    post(
        tx,
        Posting::unstake_completed(
            &position.user_id,
            &pool.asset_id,
            &asset.chain_id,
            principal.clone(),
            rewards.clone(),
            &position.id,
        ),
        now,
    )?;

    position.status = PositionStatus::Completed;
    position.unstaked_at = Some(now);
    position.rewards_claimed = quantize(&(&position.rewards_claimed + &rewards));
    position.rewards_accrued = BigDecimal::zero();
    PositionRepo::new(tx).update(position)?;

    pool.total_staked = quantize(&(&pool.total_staked - &principal));
    pool_repo.update(&pool)?;

    let total = quantize(&(&principal + &rewards));
    NotificationRepo::new(tx).insert(&Notification::new(
        &position.user_id,
        "unstake_completed",
        "Unstake completed",
        format!("{total} has been returned to your available balance"),
        serde_json::json!({
            "positionId": position.id,
            "principal": principal.to_string(),
            "rewards": rewards.to_string(),
        }),
        now,
    ))?;

    Ok(UnstakeOutcome::Completed {
        principal,
        rewards,
        total,
    })
}

/// Request an unstake.
///
/// Locked positions are refused. Pools with a cooldown move to UNSTAKING
/// and keep accruing until the sweep finalizes them; everything else
/// settles immediately.
pub fn unstake(
    state: &AppState,
    user_id: &str,
    position_id: &str,
) -> Result<UnstakeOutcome, ApiError> {
    let now = state.clock.now();

    state.store.write(|tx| {
        let repo = PositionRepo::new(tx);
        let mut position = repo.require(position_id)?;
        if position.user_id != user_id {
            return Err(ApiError::forbidden("Not your stake position"));
        }
        match position.status {
            PositionStatus::Active => {}
            PositionStatus::Unstaking => {
                return Err(ApiError::domain(
                    "ALREADY_UNSTAKING",
                    "Position is already in its cooldown period",
                ));
            }
            _ => {
                return Err(ApiError::domain(
                    "POSITION_NOT_ACTIVE",
                    "Position has already been settled",
                ));
            }
        }

        if let Some(locked_until) = position.locked_until {
            if locked_until > now {
                let remaining_days = (locked_until - now).num_days() + 1;
                return Err(ApiError::domain(
                    "STAKE_LOCKED",
                    format!("Stake is locked for {remaining_days} more day(s)"),
                ));
            }
        }

        let pool = PoolRepo::new(tx).require(&position.pool_id)?;
        if pool.cooldown_hours > 0 && position.cooldown_ends_at.is_none() {
            accrue_in_tx(tx, &mut position, &pool, now)?;
            let cooldown_ends_at = now + Duration::hours(pool.cooldown_hours as i64);
            position.status = PositionStatus::Unstaking;
            position.cooldown_ends_at = Some(cooldown_ends_at);
            repo.update(&position)?;
            return Ok(UnstakeOutcome::CooldownStarted { cooldown_ends_at });
        }

        finalize_in_tx(tx, &mut position, now)
    })
}

/// Finalize one UNSTAKING position whose cooldown has elapsed. Called by
/// the background sweep.
pub fn finalize_cooldown(state: &AppState, position_id: &str) -> Result<Option<UnstakeOutcome>, ApiError> {
    let now = state.clock.now();

    state.store.write(|tx| {
        let repo = PositionRepo::new(tx);
        let mut position = repo.require(position_id)?;
        if position.status != PositionStatus::Unstaking {
            return Ok(None);
        }
        match position.cooldown_ends_at {
            Some(ends_at) if ends_at <= now => {}
            _ => return Ok(None),
        }
        finalize_in_tx(tx, &mut position, now).map(Some)
    })
}

/// Void a position by admin action: accrued rewards settle as a claim,
/// the principal returns via a cancellation credit, and the position is
/// marked CANCELLED. The caller records the audit entry.
pub fn admin_cancel(state: &AppState, position_id: &str) -> Result<StakePosition, ApiError> {
    let now = state.clock.now();

    state.store.write(|tx| {
        let repo = PositionRepo::new(tx);
        let mut position = repo.require(position_id)?;
        if !matches!(position.status, PositionStatus::Active | PositionStatus::Unstaking) {
            return Err(ApiError::conflict("Position is already settled"));
        }

        let pool_repo = PoolRepo::new(tx);
        let mut pool = pool_repo.require(&position.pool_id)?;
        let asset = AssetRepo::new(tx).require(&pool.asset_id)?;

        // Settle whatever has accrued so the rewards bucket drains cleanly.
        accrue_in_tx(tx, &mut position, &pool, now)?;
        let rewards = position.rewards_accrued.clone();
        if crate::money::is_positive(&rewards) {
            post(
                tx,
                Posting::reward_claimed(
                    &position.user_id,
                    &pool.asset_id,
                    &asset.chain_id,
                    rewards.clone(),
                    &position.id,
                ),
                now,
            )?;
            position.rewards_claimed = quantize(&(&position.rewards_claimed + &rewards));
            position.rewards_accrued = BigDecimal::zero();
        }

        post(
            tx,
            Posting::stake_cancelled(
                &position.user_id,
                &pool.asset_id,
                &asset.chain_id,
                position.amount.clone(),
                &position.id,
            ),
            now,
        )?;

        position.status = PositionStatus::Cancelled;
        position.unstaked_at = Some(now);
        repo.update(&position)?;

        pool.total_staked = quantize(&(&pool.total_staked - &position.amount));
        pool_repo.update(&pool)?;

        Ok(position)
    })
}

/// Simple-interest reward estimate for the public calculator.
pub fn estimate_rewards(apr: &BigDecimal, amount: &BigDecimal, days: u32) -> BigDecimal {
    accrued_reward(amount, apr, days as u64 * 86_400)
}
