// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Reward Accrual Worker
//!
//! Single background task (concurrency 1) that periodically:
//! 1. accrues rewards on every ACTIVE and UNSTAKING position, and
//! 2. finalizes UNSTAKING positions whose cooldown has elapsed.
//!
//! Per-position idempotency does not depend on this worker being alone:
//! `last_reward_calculation` advances in the same transaction as each
//! reward posting, so an overlapping manual accrual cannot double-pay.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{accrue_in_tx, finalize_cooldown};
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::{PoolRepo, PositionRepo, PositionStatus};

/// Default interval between accrual sweeps.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Background reward accruer and cooldown sweeper.
pub struct RewardAccruer {
    state: AppState,
    poll_interval: Duration,
}

impl RewardAccruer {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Run the accrual loop until the cancellation token fires.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Reward accruer starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Reward accruer shutting down");
                return;
            }

            self.sweep();

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Reward accruer shutting down");
                    return;
                }
            }
        }
    }

    /// One full pass: accrue everything, then settle elapsed cooldowns.
    pub fn sweep(&self) {
        let ids = match self.state.store.read(|tx| {
            let repo = PositionRepo::new(tx);
            let mut active = repo.list_by_status(PositionStatus::Active)?;
            active.extend(repo.list_by_status(PositionStatus::Unstaking)?);
            Ok::<_, crate::store::StoreError>(
                active.into_iter().map(|p| (p.id, p.status)).collect::<Vec<_>>(),
            )
        }) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Accruer could not list positions");
                return;
            }
        };

        let now = self.state.clock.now();
        for (position_id, status) in ids {
            // One transaction per position keeps writer hold times short.
            let result = self.state.store.write(|tx| {
                let repo = PositionRepo::new(tx);
                let mut position = repo.require(&position_id)?;
                if !matches!(
                    position.status,
                    PositionStatus::Active | PositionStatus::Unstaking
                ) {
                    return Ok(());
                }
                let pool = PoolRepo::new(tx).require(&position.pool_id)?;
                accrue_in_tx(tx, &mut position, &pool, now)?;
                Ok::<_, ApiError>(())
            });
            if let Err(e) = result {
                warn!(position_id = %position_id, error = %e, "Accrual failed for position");
                continue;
            }

            if status == PositionStatus::Unstaking {
                match finalize_cooldown(&self.state, &position_id) {
                    Ok(Some(_)) => {
                        info!(position_id = %position_id, "Cooldown elapsed, position settled");
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(position_id = %position_id, error = %e, "Cooldown settlement failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::balance_of;
    use crate::staking::{create_stake, unstake, UnstakeOutcome};
    use crate::state::testutil::test_state;
    use crate::store::catalog::fixtures as catalog_fixtures;
    use crate::store::pools::fixtures as pool_fixtures;
    use crate::store::{AssetRepo, ChainRepo};
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn sweep_accrues_and_settles_cooldowns() {
        let (_dir, state, clock) = test_state();

        let chain = catalog_fixtures::chain("sepolia");
        let asset = catalog_fixtures::token(&chain.id, "USDT");
        let mut pool = pool_fixtures::flexible(&asset.id);
        pool.cooldown_hours = 24;
        let pool_id = pool.id.clone();
        let asset_id = asset.id.clone();
        let chain_id = chain.id.clone();

        state
            .store
            .write(|tx| {
                ChainRepo::new(tx).insert(&chain)?;
                AssetRepo::new(tx).insert(&asset)?;
                crate::store::PoolRepo::new(tx).insert(&pool)?;
                crate::ledger::post(
                    tx,
                    crate::ledger::Posting::deposit_confirmed(
                        "u1", &asset_id, &chain_id, dec("1.0"), "d1",
                    ),
                    state.clock.now(),
                )
                .map_err(crate::error::ApiError::from)?;
                Ok::<_, crate::error::ApiError>(())
            })
            .unwrap();

        let position = create_stake(&state, "u1", &pool_id, dec("1.0")).unwrap();
        let outcome = unstake(&state, "u1", &position.id).unwrap();
        assert!(matches!(outcome, UnstakeOutcome::CooldownStarted { .. }));

        let accruer = RewardAccruer::new(state.clone());

        // Mid-cooldown: rewards accrue, nothing settles.
        clock.advance_secs(12 * 3600);
        accruer.sweep();
        let balance = state
            .store
            .read(|tx| balance_of(tx, "u1", &asset_id, &chain_id, state.clock.now()))
            .unwrap();
        assert!(crate::money::is_positive(&balance.rewards_accrued));
        assert_eq!(balance.staked, crate::money::quantize(&dec("1.0")));

        // Past the cooldown: the sweep settles principal plus rewards.
        clock.advance_secs(13 * 3600);
        accruer.sweep();
        let balance = state
            .store
            .read(|tx| balance_of(tx, "u1", &asset_id, &chain_id, state.clock.now()))
            .unwrap();
        assert_eq!(balance.staked, BigDecimal::zero());
        assert_eq!(balance.rewards_accrued, BigDecimal::zero());
        assert!(balance.available > dec("1.0"));

        // Idempotent: another sweep changes nothing.
        let before = balance.available.clone();
        accruer.sweep();
        let balance = state
            .store
            .read(|tx| balance_of(tx, "u1", &asset_id, &chain_id, state.clock.now()))
            .unwrap();
        assert_eq!(balance.available, before);
    }
}
