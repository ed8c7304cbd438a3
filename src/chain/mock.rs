// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory chain client for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChainClient, ChainError, SentTx, TransferLog, TxReceipt};

/// Scriptable fake chain. Tests push logs and receipts, advance the head,
/// and inspect broadcasts.
pub struct MockChain {
    state: Mutex<MockState>,
}

struct MockState {
    head: u64,
    transfers: Vec<TransferLog>,
    receipts: HashMap<String, TxReceipt>,
    sent: Vec<(String, String, String)>,
    next_nonce: u64,
    fail_broadcast: bool,
    fail_transient: bool,
}

impl MockChain {
    pub fn new(head: u64) -> Self {
        Self {
            state: Mutex::new(MockState {
                head,
                transfers: Vec::new(),
                receipts: HashMap::new(),
                sent: Vec::new(),
                next_nonce: 0,
                fail_broadcast: false,
                fail_transient: false,
            }),
        }
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().unwrap().head = head;
    }

    pub fn push_transfer(&self, transfer: TransferLog) {
        self.state.lock().unwrap().transfers.push(transfer);
    }

    pub fn set_receipt(&self, receipt: TxReceipt) {
        self.state
            .lock()
            .unwrap()
            .receipts
            .insert(receipt.tx_hash.clone(), receipt);
    }

    /// Broadcasts recorded as (to, value_raw, data_hex).
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn fail_next_broadcast(&self, fail: bool) {
        self.state.lock().unwrap().fail_broadcast = fail;
    }

    pub fn fail_transient(&self, fail: bool) {
        self.state.lock().unwrap().fail_transient = fail;
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn current_block(&self) -> Result<u64, ChainError> {
        let state = self.state.lock().unwrap();
        if state.fail_transient {
            return Err(ChainError::Transient("mock outage".into()));
        }
        Ok(state.head)
    }

    async fn erc20_transfers(
        &self,
        contract: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferLog>, ChainError> {
        let state = self.state.lock().unwrap();
        if state.fail_transient {
            return Err(ChainError::Transient("mock outage".into()));
        }
        Ok(state
            .transfers
            .iter()
            .filter(|t| {
                t.contract == contract && t.block_number >= from_block && t.block_number <= to_block
            })
            .cloned()
            .collect())
    }

    async fn receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, ChainError> {
        let state = self.state.lock().unwrap();
        if state.fail_transient {
            return Err(ChainError::Transient("mock outage".into()));
        }
        Ok(state.receipts.get(tx_hash).cloned())
    }

    async fn balance(&self, _address: &str) -> Result<String, ChainError> {
        Ok("0".into())
    }

    async fn send(
        &self,
        _private_key_hex: &str,
        to: &str,
        value_raw: &str,
        data: Option<Vec<u8>>,
    ) -> Result<SentTx, ChainError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_broadcast {
            state.fail_broadcast = false;
            return Err(ChainError::Broadcast("mock rejection".into()));
        }
        let nonce = state.next_nonce;
        state.next_nonce += 1;
        let tx_hash = format!("0xmock{nonce:060}");
        state.sent.push((
            to.to_string(),
            value_raw.to_string(),
            data.map(|d| alloy::hex::encode(d)).unwrap_or_default(),
        ));
        Ok(SentTx { tx_hash, nonce })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_filters_by_contract_and_range() {
        let chain = MockChain::new(100);
        chain.push_transfer(TransferLog {
            tx_hash: "0x1".into(),
            log_index: 0,
            block_number: 50,
            contract: "0xtoken".into(),
            from: "0xa".into(),
            to: "0xb".into(),
            value_raw: "100".into(),
        });
        chain.push_transfer(TransferLog {
            tx_hash: "0x2".into(),
            log_index: 0,
            block_number: 150,
            contract: "0xtoken".into(),
            from: "0xa".into(),
            to: "0xb".into(),
            value_raw: "100".into(),
        });

        let hits = chain.erc20_transfers("0xtoken", 0, 100).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tx_hash, "0x1");
    }

    #[tokio::test]
    async fn mock_send_advances_nonce() {
        let chain = MockChain::new(1);
        let a = chain.send("key", "0xdest", "5", None).await.unwrap();
        let b = chain.send("key", "0xdest", "5", None).await.unwrap();
        assert_eq!(a.nonce, 0);
        assert_eq!(b.nonce, 1);
        assert_eq!(chain.sent().len(), 2);
    }
}
