// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Chain Client
//!
//! Abstraction over one JSON-RPC endpoint per chain: block height, log
//! queries, receipts, balances, and signed broadcasts. The deposit scanner
//! and payout executor consume this trait; production wires the alloy
//! implementation in [`rpc`], tests use the in-memory mock.
//!
//! RPC failures surface as [`ChainError::Transient`] so workers back off
//! and retry instead of failing the deposit or payout outright.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

pub mod erc20;
pub mod rpc;

#[cfg(test)]
pub mod mock;

/// Errors from chain interactions.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Provider hiccup: timeouts, rate limits, connectivity. Retryable.
    #[error("transient RPC failure: {0}")]
    Transient(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid private key")]
    InvalidKey,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The node rejected the transaction outright (bad nonce, underpriced,
    /// reverted estimation). Not retryable without intervention.
    #[error("broadcast rejected: {0}")]
    Broadcast(String),
}

/// One ERC-20 `Transfer` event observed on-chain.
#[derive(Debug, Clone)]
pub struct TransferLog {
    pub tx_hash: String,
    pub log_index: u64,
    pub block_number: u64,
    /// Lowercase token contract address.
    pub contract: String,
    /// Lowercase sender.
    pub from: String,
    /// Lowercase recipient.
    pub to: String,
    /// Token value in base units, decimal string.
    pub value_raw: String,
}

/// A mined transaction receipt.
#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    /// False when the transaction reverted.
    pub success: bool,
    pub gas_used: Option<u64>,
}

/// Result of a signed broadcast.
#[derive(Debug, Clone)]
pub struct SentTx {
    pub tx_hash: String,
    pub nonce: u64,
}

/// Per-chain JSON-RPC operations.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current head block number.
    async fn current_block(&self) -> Result<u64, ChainError>;

    /// All `Transfer` events for a token contract in `[from_block, to_block]`.
    ///
    /// Callers chunk ranges (≤ 2000 blocks) to respect provider limits.
    async fn erc20_transfers(
        &self,
        contract: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferLog>, ChainError>;

    /// Receipt for a transaction, `None` while unmined.
    async fn receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, ChainError>;

    /// Native balance of an address in wei, decimal string.
    async fn balance(&self, address: &str) -> Result<String, ChainError>;

    /// Sign and broadcast a transaction from a hex private key.
    ///
    /// `value_raw` is wei for native transfers; `data` carries ERC-20
    /// calldata (with `value_raw` zero).
    async fn send(
        &self,
        private_key_hex: &str,
        to: &str,
        value_raw: &str,
        data: Option<Vec<u8>>,
    ) -> Result<SentTx, ChainError>;
}

/// Clients keyed by chain row id.
#[derive(Default)]
pub struct ChainRegistry {
    clients: HashMap<String, Arc<dyn ChainClient>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chain_id: impl Into<String>, client: Arc<dyn ChainClient>) {
        self.clients.insert(chain_id.into(), client);
    }

    pub fn get(&self, chain_id: &str) -> Option<Arc<dyn ChainClient>> {
        self.clients.get(chain_id).cloned()
    }

    pub fn chain_ids(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_round_trip() {
        let mut registry = ChainRegistry::new();
        let client: Arc<dyn ChainClient> = Arc::new(mock::MockChain::new(100));
        registry.insert("c1", client);

        assert!(registry.get("c1").is_some());
        assert!(registry.get("c2").is_none());
        assert_eq!(registry.chain_ids(), vec!["c1".to_string()]);
    }
}
