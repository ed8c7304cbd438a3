// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Deposit Scanner
//!
//! Background task that watches ERC-20 `Transfer` events on every active
//! chain and records hits to platform deposit addresses.
//!
//! ## Strategy
//!
//! Every sweep, per chain:
//! 1. Read the checkpoint and compute
//!    `from_block = max(checkpoint + 1, head - 10_000)`.
//! 2. For each active token contract, fetch `Transfer` logs in chunks of
//!    at most 2000 blocks and keep events whose recipient is a registered
//!    deposit address.
//! 3. In one write transaction: upsert a Deposit per `(tx_hash, log_index,
//!    chain)` outpoint (conflicts are re-scans and are ignored) and
//!    persist `checkpoint = head`.
//!
//! RPC happens outside the transaction; only the resulting state update is
//! transactional. Overlapping passes are safe because the outpoint is
//! unique.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chain::{ChainError, TransferLog};
use crate::ledger::LedgerError;
use crate::state::AppState;
use crate::store::{
    Asset, AssetRepo, ChainRepo, Deposit, DepositRepo, DepositStatus, StoreError, SystemConfigRepo,
};

/// Default interval between sweeps.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Block chunk per log query.
const CHUNK_SIZE: u64 = 2000;

/// How far back to look when a chain has no checkpoint.
const INITIAL_LOOKBACK_BLOCKS: u64 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("rpc: {0}")]
    Chain(#[from] ChainError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
}

/// Per-chain deposit scanner running as a background task.
pub struct DepositScanner {
    state: AppState,
    poll_interval: Duration,
}

impl DepositScanner {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Run the scanner loop until the cancellation token fires.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Deposit scanner starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Deposit scanner shutting down");
                return;
            }

            self.sweep().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Deposit scanner shutting down");
                    return;
                }
            }
        }
    }

    /// One sweep across every active chain.
    pub async fn sweep(&self) {
        let chains = match self.state.store.read(|tx| ChainRepo::new(tx).list_active()) {
            Ok(chains) => chains,
            Err(e) => {
                warn!(error = %e, "Scanner could not list chains");
                return;
            }
        };

        for chain in chains {
            if let Err(e) = self.scan_chain(&chain.id).await {
                // Transient RPC failures back off to the next sweep.
                warn!(chain = %chain.slug, error = %e, "Chain scan failed, will retry");
            }
        }
    }

    /// Scan one chain from its checkpoint to the current head.
    pub async fn scan_chain(&self, chain_id: &str) -> Result<usize, ScanError> {
        let Some(client) = self.state.chains.get(chain_id) else {
            debug!(chain_id, "No RPC client configured, skipping");
            return Ok(0);
        };

        let head = client.current_block().await?;

        let (checkpoint, assets) = self.state.store.read(|tx| {
            Ok::<_, StoreError>((
                SystemConfigRepo::new(tx).last_scanned_block(chain_id)?,
                AssetRepo::new(tx).active_tokens_on_chain(chain_id)?,
            ))
        })?;

        let from_block = (checkpoint + 1).max(head.saturating_sub(INITIAL_LOOKBACK_BLOCKS));
        if from_block > head {
            return Ok(0);
        }

        // Collect hits outside any transaction.
        let mut hits: Vec<(Asset, TransferLog)> = Vec::new();
        for asset in &assets {
            let contract = asset
                .contract_address
                .as_deref()
                .expect("active_tokens_on_chain yields contract assets");

            let mut from = from_block;
            while from <= head {
                let to = (from + CHUNK_SIZE - 1).min(head);
                let transfers = client.erc20_transfers(contract, from, to).await?;
                if !transfers.is_empty() {
                    debug!(
                        chain_id,
                        contract,
                        from_block = from,
                        to_block = to,
                        events = transfers.len(),
                        "Fetched transfer events"
                    );
                }
                for transfer in transfers {
                    hits.push((asset.clone(), transfer));
                }
                from = to + 1;
            }
        }

        // One transaction: deposits for this window plus the checkpoint.
        let inserted = self.state.store.write(|tx| {
            let repo = DepositRepo::new(tx);
            let mut inserted = 0usize;

            for (asset, transfer) in &hits {
                let Some(address_row) =
                    repo.address_by_chain_address(chain_id, &transfer.to.to_lowercase())?
                else {
                    continue;
                };

                let amount = crate::chain::erc20::from_base_units(
                    &transfer.value_raw,
                    asset.decimals,
                )
                .map_err(ScanError::Chain)?;
                if !crate::money::is_positive(&amount) {
                    continue;
                }

                let deposit = Deposit {
                    id: uuid::Uuid::new_v4().to_string(),
                    user_id: address_row.user_id.clone(),
                    asset_id: asset.id.clone(),
                    chain_id: chain_id.to_string(),
                    deposit_address_id: address_row.id.clone(),
                    tx_hash: transfer.tx_hash.clone(),
                    log_index: Some(transfer.log_index),
                    from_address: transfer.from.to_lowercase(),
                    amount,
                    confirmations: 0,
                    status: DepositStatus::Confirming,
                    confirmed_at: None,
                    observed_at: self.state.clock.now(),
                };

                match repo.insert(&deposit) {
                    Ok(()) => inserted += 1,
                    // Seen in an earlier overlapping pass.
                    Err(StoreError::Conflict(_)) => {}
                    Err(e) => return Err(ScanError::Store(e)),
                }
            }

            SystemConfigRepo::new(tx).set_last_scanned_block(chain_id, head)?;
            Ok(inserted)
        })?;

        if inserted > 0 {
            info!(chain_id, inserted, head, "Recorded new deposits");
        }
        Ok(inserted)
    }
}
