// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Confirmation Tracker
//!
//! Walks every `CONFIRMING` deposit, recomputes its confirmation depth
//! from the chain head, and finalizes it once the chain's required depth
//! is reached: status flips to `CONFIRMED`, the ledger credit posts, the
//! balance projection gains `available`, and the user is notified, all in
//! one transaction.
//!
//! The credit is exactly-once: the one-shot uniqueness of
//! `(DEPOSIT_CONFIRMED, Deposit, id)` in the ledger makes a racing second
//! finalization abort before anything is applied.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::scanner::ScanError;
use crate::ledger::{post, Posting};
use crate::state::AppState;
use crate::store::{ChainRepo, Deposit, DepositRepo, DepositStatus, Notification, NotificationRepo};

/// Default interval between tracker sweeps.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Background confirmation tracker.
pub struct ConfirmationTracker {
    state: AppState,
    poll_interval: Duration,
}

impl ConfirmationTracker {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Run the tracker loop until the cancellation token fires.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Confirmation tracker starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Confirmation tracker shutting down");
                return;
            }

            self.sweep().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Confirmation tracker shutting down");
                    return;
                }
            }
        }
    }

    /// One pass over every confirming deposit.
    pub async fn sweep(&self) {
        let confirming = match self
            .state
            .store
            .read(|tx| DepositRepo::new(tx).list_by_status(DepositStatus::Confirming))
        {
            Ok(deposits) => deposits,
            Err(e) => {
                warn!(error = %e, "Tracker could not list confirming deposits");
                return;
            }
        };

        for deposit in confirming {
            if let Err(e) = self.track_deposit(&deposit).await {
                warn!(
                    deposit_id = %deposit.id,
                    tx_hash = %deposit.tx_hash,
                    error = %e,
                    "Deposit confirmation check failed, will retry"
                );
            }
        }
    }

    /// Recompute one deposit's confirmations and finalize when deep enough.
    pub async fn track_deposit(&self, deposit: &Deposit) -> Result<(), ScanError> {
        let Some(client) = self.state.chains.get(&deposit.chain_id) else {
            return Ok(());
        };

        // RPC outside the transaction.
        let head = client.current_block().await?;
        let Some(receipt) = client.receipt(&deposit.tx_hash).await? else {
            return Ok(());
        };

        let now = self.state.clock.now();
        let deposit_id = deposit.id.clone();

        self.state.store.write(|tx| {
            let repo = DepositRepo::new(tx);
            // Reload under the writer; someone may have finalized already.
            let mut deposit = repo.require(&deposit_id)?;
            if deposit.status != DepositStatus::Confirming {
                return Ok(());
            }

            if !receipt.success {
                deposit.status = DepositStatus::Failed;
                repo.update(&deposit)?;
                warn!(deposit_id = %deposit.id, "Deposit transaction reverted on-chain");
                return Ok(());
            }

            let required = ChainRepo::new(tx)
                .require(&deposit.chain_id)?
                .confirmations_required;
            let confirmations = head.saturating_sub(receipt.block_number) + 1;
            deposit.confirmations = confirmations;

            if confirmations < required {
                repo.update(&deposit)?;
                return Ok(());
            }

            deposit.status = DepositStatus::Confirmed;
            deposit.confirmed_at = Some(now);
            repo.update(&deposit)?;

            post(
                tx,
                Posting::deposit_confirmed(
                    &deposit.user_id,
                    &deposit.asset_id,
                    &deposit.chain_id,
                    deposit.amount.clone(),
                    &deposit.id,
                ),
                now,
            )?;

            // Best-effort within the same commit; a notify failure here
            // aborts nothing financial because it aborts everything.
            NotificationRepo::new(tx).insert(&Notification::new(
                &deposit.user_id,
                "deposit_confirmed",
                "Deposit confirmed",
                format!("Your deposit of {} has been credited", deposit.amount),
                serde_json::json!({
                    "depositId": deposit.id,
                    "amount": deposit.amount.to_string(),
                    "txHash": deposit.tx_hash,
                }),
                now,
            ))?;

            info!(
                deposit_id = %deposit.id,
                user_id = %deposit.user_id,
                amount = %deposit.amount,
                "Deposit confirmed and credited"
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use crate::chain::{ChainRegistry, TxReceipt};
    use crate::ledger::balance_of;
    use crate::state::testutil::test_state_with_chains;
    use crate::state::AppState;
    use crate::store::catalog::fixtures as catalog_fixtures;
    use crate::store::deposits::fixtures as deposit_fixtures;
    use std::sync::Arc;

    struct Setup {
        state: AppState,
        chain: Arc<MockChain>,
        chain_id: String,
        asset_id: String,
        _dir: tempfile::TempDir,
    }

    fn setup() -> Setup {
        let mock = Arc::new(MockChain::new(100));
        let mut registry = ChainRegistry::new();

        let chain_row = catalog_fixtures::chain("sepolia");
        let chain_id = chain_row.id.clone();
        registry.insert(chain_id.clone(), mock.clone() as Arc<dyn crate::chain::ChainClient>);

        let (dir, state, _clock) = test_state_with_chains(registry);

        let asset = catalog_fixtures::token(&chain_id, "USDT");
        let asset_id = asset.id.clone();
        state
            .store
            .write(|tx| {
                ChainRepo::new(tx).insert(&chain_row)?;
                crate::store::AssetRepo::new(tx).insert(&asset)
            })
            .unwrap();

        Setup {
            state,
            chain: mock,
            chain_id,
            asset_id,
            _dir: dir,
        }
    }

    fn seed_confirming(s: &Setup, tx_hash: &str) -> Deposit {
        let deposit = {
            let mut d = deposit_fixtures::confirming("u1", &s.asset_id, &s.chain_id, tx_hash);
            d.amount = bigdecimal::BigDecimal::from(2u32);
            d
        };
        s.state
            .store
            .write(|tx| DepositRepo::new(tx).insert(&deposit))
            .unwrap();
        deposit
    }

    #[tokio::test]
    async fn shallow_deposit_updates_count_only() {
        let s = setup();
        let deposit = seed_confirming(&s, "0xdead");
        // Mined at 95, head 100: 6 confirmations, 12 required.
        s.chain.set_receipt(TxReceipt {
            tx_hash: "0xdead".into(),
            block_number: 95,
            success: true,
            gas_used: Some(21_000),
        });

        let tracker = ConfirmationTracker::new(s.state.clone());
        tracker.track_deposit(&deposit).await.unwrap();

        let stored = s
            .state
            .store
            .read(|tx| DepositRepo::new(tx).require(&deposit.id))
            .unwrap();
        assert_eq!(stored.status, DepositStatus::Confirming);
        assert_eq!(stored.confirmations, 6);

        let balance = s
            .state
            .store
            .read(|tx| balance_of(tx, "u1", &s.asset_id, &s.chain_id, s.state.clock.now()))
            .unwrap();
        assert_eq!(balance.available, bigdecimal::BigDecimal::from(0u32));
    }

    #[tokio::test]
    async fn deep_deposit_confirms_and_credits_once() {
        let s = setup();
        let deposit = seed_confirming(&s, "0xdead");
        s.chain.set_receipt(TxReceipt {
            tx_hash: "0xdead".into(),
            block_number: 89,
            success: true,
            gas_used: Some(21_000),
        });
        // head 100 - 89 + 1 = 12 = required.

        let tracker = ConfirmationTracker::new(s.state.clone());
        tracker.track_deposit(&deposit).await.unwrap();

        let stored = s
            .state
            .store
            .read(|tx| DepositRepo::new(tx).require(&deposit.id))
            .unwrap();
        assert_eq!(stored.status, DepositStatus::Confirmed);
        assert!(stored.confirmed_at.is_some());

        let balance = s
            .state
            .store
            .read(|tx| balance_of(tx, "u1", &s.asset_id, &s.chain_id, s.state.clock.now()))
            .unwrap();
        assert_eq!(balance.available, crate::money::quantize(&bigdecimal::BigDecimal::from(2u32)));

        // A second pass is a no-op: status is no longer CONFIRMING.
        tracker.track_deposit(&deposit).await.unwrap();
        let balance = s
            .state
            .store
            .read(|tx| balance_of(tx, "u1", &s.asset_id, &s.chain_id, s.state.clock.now()))
            .unwrap();
        assert_eq!(balance.available, crate::money::quantize(&bigdecimal::BigDecimal::from(2u32)));

        // And the user was notified exactly once.
        let notifications = s
            .state
            .store
            .read(|tx| NotificationRepo::new(tx).list_for_user("u1"))
            .unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, "deposit_confirmed");
    }

    #[tokio::test]
    async fn reverted_transaction_fails_the_deposit() {
        let s = setup();
        let deposit = seed_confirming(&s, "0xdead");
        s.chain.set_receipt(TxReceipt {
            tx_hash: "0xdead".into(),
            block_number: 80,
            success: false,
            gas_used: Some(21_000),
        });

        let tracker = ConfirmationTracker::new(s.state.clone());
        tracker.track_deposit(&deposit).await.unwrap();

        let stored = s
            .state
            .store
            .read(|tx| DepositRepo::new(tx).require(&deposit.id))
            .unwrap();
        assert_eq!(stored.status, DepositStatus::Failed);

        // No credit posted.
        let balance = s
            .state
            .store
            .read(|tx| balance_of(tx, "u1", &s.asset_id, &s.chain_id, s.state.clock.now()))
            .unwrap();
        assert_eq!(balance.available, bigdecimal::BigDecimal::from(0u32));
    }

    #[tokio::test]
    async fn missing_receipt_leaves_deposit_untouched() {
        let s = setup();
        let deposit = seed_confirming(&s, "0xunmined");

        let tracker = ConfirmationTracker::new(s.state.clone());
        tracker.track_deposit(&deposit).await.unwrap();

        let stored = s
            .state
            .store
            .read(|tx| DepositRepo::new(tx).require(&deposit.id))
            .unwrap();
        assert_eq!(stored.status, DepositStatus::Confirming);
        assert_eq!(stored.confirmations, 0);
    }
}
