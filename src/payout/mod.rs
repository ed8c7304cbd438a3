// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Payout Executor
//!
//! Queue-driven worker that turns APPROVED withdrawals into on-chain
//! transfers. Subscribed at concurrency 1 so the treasury wallet's nonce
//! advances strictly sequentially on every chain.
//!
//! ## Safety rules
//!
//! - Every request transition is compare-and-swap; a duplicate job that
//!   finds the request already PROCESSING (or beyond) skips silently.
//! - A failure before anything was broadcast marks the request FAILED with
//!   no `tx_hash`; such requests are safe to retry automatically.
//! - A failure at or after the broadcast call also marks FAILED but is
//!   never retried automatically: the transaction may have landed, and
//!   only an operator (retry or mark-paid) decides what happens next.
//! - Settlement is exactly-once through the one-shot WITHDRAWAL_PAID
//!   ledger entry.

use std::time::Duration;

use tracing::{info, warn};

use crate::chain::{erc20, ChainError};
use crate::error::ApiError;
use crate::ledger::{post, Posting};
use crate::queue::{Job, JobOptions};
use crate::state::AppState;
use crate::store::{
    AssetRepo, AuditLogEntry, AuditRepo, ChainRepo, Notification, NotificationRepo, PayoutStatus,
    PayoutTx, TreasuryRepo, WithdrawalRepo, WithdrawalStatus,
};

/// Queue carrying `processPayout` jobs.
pub const PROCESS_QUEUE: &str = "payout.process";

/// Queue carrying `checkPayoutStatus` jobs.
pub const CHECK_QUEUE: &str = "payout.check";

/// Queue driving the periodic stale-approval sweep.
pub const SWEEP_QUEUE: &str = "payout.sweep";

/// How often the sweep looks for approved requests without a live job.
const SWEEP_PERIOD: Duration = Duration::from_secs(300);

/// Age after which an APPROVED request is considered stranded (its payout
/// job was lost, e.g. across a restart).
const STALE_APPROVAL_MINUTES: i64 = 10;

/// Initial delay before the first status check.
const CHECK_INITIAL_DELAY: Duration = Duration::from_secs(30);

/// Status checks per payout before the job dead-letters.
const CHECK_MAX_ATTEMPTS: u32 = 20;

/// Delivery attempts for the payout job itself.
const PROCESS_MAX_ATTEMPTS: u32 = 3;

/// Queue a payout job for an approved withdrawal.
pub fn enqueue_payout(state: &AppState, withdrawal_request_id: &str) {
    state.queue.enqueue(
        PROCESS_QUEUE,
        serde_json::json!({ "withdrawalRequestId": withdrawal_request_id }),
        JobOptions {
            delay: Duration::ZERO,
            max_attempts: PROCESS_MAX_ATTEMPTS,
            backoff_base: Duration::from_secs(5),
            backoff_cap: Duration::from_secs(300),
        },
    );
}

/// Operator-triggered retry of a FAILED payout.
pub fn retry_failed_payout(
    state: &AppState,
    admin: &crate::auth::AuthUser,
    withdrawal_request_id: &str,
) -> Result<(), ApiError> {
    let now = state.clock.now();
    state.store.write(|tx| {
        let request = WithdrawalRepo::new(tx).require(withdrawal_request_id)?;
        if request.status != WithdrawalStatus::Failed {
            return Err(ApiError::forbidden("Only failed payouts can be retried"));
        }
        AuditRepo::new(tx).append(
            &AuditLogEntry::new("withdrawal.retry_payout", "WithdrawalRequest", &request.id, now)
                .with_actor(&admin.user_id, &admin.email),
        )?;
        Ok::<_, ApiError>(())
    })?;

    state.queue.enqueue(
        PROCESS_QUEUE,
        serde_json::json!({ "withdrawalRequestId": withdrawal_request_id, "retry": true }),
        JobOptions {
            delay: Duration::ZERO,
            max_attempts: PROCESS_MAX_ATTEMPTS,
            backoff_base: Duration::from_secs(5),
            backoff_cap: Duration::from_secs(300),
        },
    );
    Ok(())
}

/// The worker driving payout jobs. Construct once and [`spawn`](Self::spawn).
#[derive(Clone)]
pub struct PayoutExecutor {
    state: AppState,
}

impl PayoutExecutor {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Attach the process and check subscriptions to the shared queue.
    pub fn spawn(self) {
        let process = self.clone();
        self.state.queue.subscribe(PROCESS_QUEUE, 1, move |job| {
            let executor = process.clone();
            async move { executor.process(job).await.map_err(|e| e.to_string()) }
        });

        let check = self.clone();
        self.state.queue.subscribe(CHECK_QUEUE, 1, move |job| {
            let executor = check.clone();
            async move { executor.check(job).await.map_err(|e| e.to_string()) }
        });

        // Crash recovery: approvals whose queued job was lost get re-queued.
        let sweep = self.clone();
        self.state.queue.subscribe(SWEEP_QUEUE, 1, move |_job| {
            let executor = sweep.clone();
            async move { executor.sweep_stale_approvals().map_err(|e| e.to_string()) }
        });
        self.state.queue.schedule_recurring(
            SWEEP_QUEUE,
            serde_json::json!({}),
            SWEEP_PERIOD,
            JobOptions::default(),
        );
    }

    /// Re-queue APPROVED requests older than the staleness window.
    fn sweep_stale_approvals(&self) -> Result<(), ApiError> {
        let now = self.state.clock.now();
        let stale: Vec<String> = self.state.store.read(|tx| {
            Ok::<_, ApiError>(
                WithdrawalRepo::new(tx)
                    .list_by_status(WithdrawalStatus::Approved)?
                    .into_iter()
                    .filter(|r| {
                        r.reviewed_at
                            .map(|t| now - t > chrono::Duration::minutes(STALE_APPROVAL_MINUTES))
                            .unwrap_or(true)
                    })
                    .map(|r| r.id)
                    .collect(),
            )
        })?;

        for request_id in stale {
            warn!(request_id = %request_id, "Re-queueing stranded approved payout");
            enqueue_payout(&self.state, &request_id);
        }
        Ok(())
    }

    fn request_id(job: &Job) -> Result<String, ApiError> {
        job.payload
            .get("withdrawalRequestId")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ApiError::internal("payout job without withdrawalRequestId"))
    }

    /// Handle one `processPayout` job: claim, sign, broadcast, track.
    pub async fn process(&self, job: Job) -> Result<(), ApiError> {
        let request_id = Self::request_id(&job)?;
        let operator_retry = job.payload.get("retry").and_then(|v| v.as_bool()).unwrap_or(false);
        let now = self.state.clock.now();

        // Claim the request, or decide this job is stale.
        let claim = self.state.store.write(|tx| {
            let repo = WithdrawalRepo::new(tx);
            let request = repo.require(&request_id)?;
            match request.status {
                WithdrawalStatus::Approved => {}
                WithdrawalStatus::Failed => {
                    let payout = repo.payout(&request_id)?;
                    let broadcast_attempted =
                        payout.as_ref().and_then(|p| p.tx_hash.as_ref()).is_some();
                    if broadcast_attempted && !operator_retry {
                        // The chain may already carry this transfer.
                        return Ok(None);
                    }
                }
                // Duplicate, raced, or already settled; nothing to do.
                _ => return Ok(None),
            }

            let request = repo.transition(
                &request_id,
                request.status,
                WithdrawalStatus::Processing,
                |_| {},
            )?;

            let asset = AssetRepo::new(tx).require(&request.asset_id)?;
            let treasury = TreasuryRepo::new(tx).active_for_chain(&request.chain_id)?;
            let attempts = repo.payout(&request_id)?.map(|p| p.attempts).unwrap_or(0);
            Ok::<_, ApiError>(Some((request, asset, treasury, attempts)))
        })?;

        let Some((request, asset, treasury, prior_attempts)) = claim else {
            return Ok(());
        };

        // From here on a failure must release the claim to FAILED.
        let prepared: Result<(String, String, Option<Vec<u8>>), ApiError> = (|| {
            let encrypted = treasury
                .encrypted_private_key
                .as_deref()
                .ok_or_else(|| ApiError::internal("treasury wallet has no key material"))?;
            let private_key = self
                .state
                .secrets
                .decrypt_string(encrypted)
                .map_err(|_| ApiError::internal("treasury key decryption failed"))?;

            let (value, data) = if asset.is_native {
                let value = erc20::to_base_units(&request.net_amount, asset.decimals)
                    .map_err(|e| ApiError::internal(e.to_string()))?;
                (value, None)
            } else {
                let contract = asset
                    .contract_address
                    .clone()
                    .ok_or_else(|| ApiError::internal("token asset without contract"))?;
                let raw = erc20::to_base_units(&request.net_amount, asset.decimals)
                    .map_err(|e| ApiError::internal(e.to_string()))?;
                let calldata = erc20::encode_transfer(&request.destination_address, &raw)
                    .map_err(|e| ApiError::internal(e.to_string()))?;
                (contract, Some(calldata))
            };
            Ok((private_key, value, data))
        })();

        let (private_key, value_or_contract, data) = match prepared {
            Ok(parts) => parts,
            Err(e) => {
                // Nothing broadcast yet; FAILED with no tx_hash is
                // auto-retryable by the next delivery.
                self.mark_failed(&request_id, prior_attempts + 1, &e.to_string())?;
                return Err(e);
            }
        };

        let client = match self.state.chains.get(&request.chain_id) {
            Some(client) => client,
            None => {
                let message = format!("no RPC client for chain {}", request.chain_id);
                self.mark_failed(&request_id, prior_attempts + 1, &message)?;
                return Err(ApiError::internal(message));
            }
        };

        // ERC-20 sends target the contract with zero value; native sends
        // target the destination with the value in wei.
        let (to, value) = if data.is_some() {
            (value_or_contract.as_str(), "0".to_string())
        } else {
            (request.destination_address.as_str(), value_or_contract.clone())
        };

        let sent = match client.send(&private_key, to, &value, data).await {
            Ok(sent) => sent,
            Err(e) => {
                // The broadcast may or may not have reached the mempool;
                // never auto-retry past this point.
                let message = match &e {
                    ChainError::Broadcast(msg) => format!("broadcast rejected: {msg}"),
                    other => format!("broadcast attempt failed: {other}"),
                };
                self.mark_failed(&request_id, prior_attempts + 1, &message)?;
                warn!(request_id = %request_id, error = %message, "Payout broadcast failed");
                return Ok(());
            }
        };

        self.state.store.write(|tx| {
            let repo = WithdrawalRepo::new(tx);
            repo.transition(
                &request_id,
                WithdrawalStatus::Processing,
                WithdrawalStatus::Sent,
                |_| {},
            )?;
            repo.put_payout(&PayoutTx {
                withdrawal_request_id: request_id.clone(),
                tx_hash: Some(sent.tx_hash.clone()),
                nonce: Some(sent.nonce),
                gas_used: None,
                status: PayoutStatus::Sent,
                confirmations: 0,
                error_message: None,
                sent_at: Some(now),
                confirmed_at: None,
                attempts: prior_attempts + 1,
            })?;
            Ok::<_, ApiError>(())
        })?;

        info!(
            request_id = %request_id,
            tx_hash = %sent.tx_hash,
            nonce = sent.nonce,
            "Payout broadcast"
        );

        self.state.queue.enqueue(
            CHECK_QUEUE,
            serde_json::json!({ "withdrawalRequestId": request_id }),
            JobOptions {
                delay: CHECK_INITIAL_DELAY,
                max_attempts: CHECK_MAX_ATTEMPTS,
                backoff_base: CHECK_INITIAL_DELAY,
                backoff_cap: Duration::from_secs(600),
            },
        );
        Ok(())
    }

    fn mark_failed(&self, request_id: &str, attempts: u32, message: &str) -> Result<(), ApiError> {
        self.state.store.write(|tx| {
            let repo = WithdrawalRepo::new(tx);
            let request = repo.require(request_id)?;
            if request.status == WithdrawalStatus::Processing {
                repo.transition(
                    request_id,
                    WithdrawalStatus::Processing,
                    WithdrawalStatus::Failed,
                    |_| {},
                )?;
            }
            let payout = repo.payout(request_id)?.unwrap_or(PayoutTx {
                withdrawal_request_id: request_id.to_string(),
                tx_hash: None,
                nonce: None,
                gas_used: None,
                status: PayoutStatus::Failed,
                confirmations: 0,
                error_message: None,
                sent_at: None,
                confirmed_at: None,
                attempts: 0,
            });
            repo.put_payout(&PayoutTx {
                status: PayoutStatus::Failed,
                error_message: Some(message.to_string()),
                attempts,
                ..payout
            })?;
            Ok::<_, ApiError>(())
        })
    }

    /// Handle one `checkPayoutStatus` job.
    pub async fn check(&self, job: Job) -> Result<(), ApiError> {
        let request_id = Self::request_id(&job)?;
        let now = self.state.clock.now();

        let snapshot = self.state.store.read(|tx| {
            let repo = WithdrawalRepo::new(tx);
            let request = repo.require(&request_id)?;
            let payout = repo.payout(&request_id)?;
            let required = ChainRepo::new(tx)
                .require(&request.chain_id)?
                .confirmations_required;
            Ok::<_, ApiError>((request, payout, required))
        })?;
        let (request, payout, required) = snapshot;

        if !matches!(
            request.status,
            WithdrawalStatus::Sent | WithdrawalStatus::Confirming
        ) {
            return Ok(());
        }
        let Some(payout) = payout else {
            return Ok(());
        };
        let Some(tx_hash) = payout.tx_hash.clone() else {
            return Ok(());
        };

        let client = self
            .state
            .chains
            .get(&request.chain_id)
            .ok_or_else(|| ApiError::internal("no RPC client for payout chain"))?;

        let head = client
            .current_block()
            .await
            .map_err(|e| ApiError::service_unavailable(e.to_string()))?;
        let receipt = client
            .receipt(&tx_hash)
            .await
            .map_err(|e| ApiError::service_unavailable(e.to_string()))?;

        let Some(receipt) = receipt else {
            // Not mined yet; let the queue back off and re-check.
            return Err(ApiError::service_unavailable("payout receipt not yet available"));
        };

        if !receipt.success {
            self.state.store.write(|tx| {
                let repo = WithdrawalRepo::new(tx);
                let request = repo.require(&request_id)?;
                if matches!(
                    request.status,
                    WithdrawalStatus::Sent | WithdrawalStatus::Confirming
                ) {
                    repo.transition(&request_id, request.status, WithdrawalStatus::Failed, |_| {})?;
                }
                repo.put_payout(&PayoutTx {
                    status: PayoutStatus::Failed,
                    gas_used: receipt.gas_used,
                    error_message: Some("transaction reverted on-chain".into()),
                    ..payout.clone()
                })?;
                Ok::<_, ApiError>(())
            })?;
            warn!(request_id = %request_id, tx_hash = %tx_hash, "Payout reverted on-chain");
            return Ok(());
        }

        let confirmations = head.saturating_sub(receipt.block_number) + 1;

        if confirmations < required {
            self.state.store.write(|tx| {
                let repo = WithdrawalRepo::new(tx);
                let request = repo.require(&request_id)?;
                if request.status == WithdrawalStatus::Sent {
                    repo.transition(
                        &request_id,
                        WithdrawalStatus::Sent,
                        WithdrawalStatus::Confirming,
                        |_| {},
                    )?;
                }
                repo.put_payout(&PayoutTx {
                    status: PayoutStatus::Confirming,
                    confirmations,
                    ..payout.clone()
                })?;
                Ok::<_, ApiError>(())
            })?;
            return Err(ApiError::service_unavailable(format!(
                "payout at {confirmations}/{required} confirmations"
            )));
        }

        // Final: settle the ledger and complete the request.
        self.state.store.write(|tx| {
            let repo = WithdrawalRepo::new(tx);
            let request = repo.require(&request_id)?;
            match request.status {
                WithdrawalStatus::Sent => {
                    repo.transition(
                        &request_id,
                        WithdrawalStatus::Sent,
                        WithdrawalStatus::Confirming,
                        |_| {},
                    )?;
                    repo.transition(
                        &request_id,
                        WithdrawalStatus::Confirming,
                        WithdrawalStatus::Completed,
                        |_| {},
                    )?;
                }
                WithdrawalStatus::Confirming => {
                    repo.transition(
                        &request_id,
                        WithdrawalStatus::Confirming,
                        WithdrawalStatus::Completed,
                        |_| {},
                    )?;
                }
                // Raced another checker that already settled.
                _ => return Ok(()),
            }

            post(
                tx,
                Posting::withdrawal_paid(
                    &request.user_id,
                    &request.asset_id,
                    &request.chain_id,
                    request.amount.clone(),
                    &request.id,
                ),
                now,
            )?;

            repo.put_payout(&PayoutTx {
                status: PayoutStatus::Confirmed,
                confirmations,
                gas_used: receipt.gas_used,
                confirmed_at: Some(now),
                ..payout.clone()
            })?;

            NotificationRepo::new(tx).insert(&Notification::new(
                &request.user_id,
                "withdrawal_completed",
                "Withdrawal completed",
                format!("Your withdrawal of {} has been paid out", request.net_amount),
                serde_json::json!({ "withdrawalId": request.id, "txHash": tx_hash }),
                now,
            ))?;

            info!(
                request_id = %request_id,
                tx_hash = %tx_hash,
                confirmations,
                "Payout confirmed and settled"
            );
            Ok::<_, ApiError>(())
        })
    }
}
