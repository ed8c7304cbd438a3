// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Alloy-backed chain client.

use std::str::FromStr;

use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, TxHash, U256},
    providers::{Provider, ProviderBuilder},
    rpc::types::{Filter, TransactionRequest},
    signers::local::PrivateKeySigner,
};
use async_trait::async_trait;

use super::erc20::TRANSFER_TOPIC;
use super::{ChainClient, ChainError, SentTx, TransferLog, TxReceipt};

/// JSON-RPC client for one EVM chain.
pub struct RpcChainClient {
    rpc_url: url::Url,
    chain_id: u64,
}

impl RpcChainClient {
    /// Create a client for the given endpoint and numeric chain id.
    pub fn new(rpc_url: &str, chain_id: u64) -> Result<Self, ChainError> {
        let rpc_url = rpc_url
            .parse()
            .map_err(|e: url::ParseError| ChainError::Transient(format!("invalid RPC URL: {e}")))?;
        Ok(Self { rpc_url, chain_id })
    }

    fn provider(&self) -> impl Provider + Clone {
        ProviderBuilder::new().on_http(self.rpc_url.clone()).boxed()
    }

    /// Parse a hex private key (no 0x prefix) into a signer.
    pub fn signer_from_hex(private_key_hex: &str) -> Result<PrivateKeySigner, ChainError> {
        let key_bytes =
            alloy::hex::decode(private_key_hex).map_err(|_| ChainError::InvalidKey)?;
        PrivateKeySigner::from_slice(&key_bytes).map_err(|_| ChainError::InvalidKey)
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn current_block(&self) -> Result<u64, ChainError> {
        self.provider()
            .get_block_number()
            .await
            .map_err(|e| ChainError::Transient(e.to_string()))
    }

    async fn erc20_transfers(
        &self,
        contract: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferLog>, ChainError> {
        let contract_addr = Address::from_str(contract)
            .map_err(|e| ChainError::InvalidAddress(e.to_string()))?;

        let filter = Filter::new()
            .address(contract_addr)
            .event_signature(TRANSFER_TOPIC)
            .from_block(from_block)
            .to_block(to_block);

        let logs = self
            .provider()
            .get_logs(&filter)
            .await
            .map_err(|e| ChainError::Transient(e.to_string()))?;

        let mut transfers = Vec::with_capacity(logs.len());
        for log in &logs {
            // Transfer carries [event_sig, from, to] topics; value in data.
            if log.topics().len() < 3 {
                continue;
            }
            let (Some(tx_hash), Some(block_number), Some(log_index)) =
                (log.transaction_hash, log.block_number, log.log_index)
            else {
                continue;
            };

            let from_topic = log.topics()[1];
            let to_topic = log.topics()[2];
            let value = if log.data().data.len() >= 32 {
                U256::from_be_slice(&log.data().data[..32])
            } else {
                U256::ZERO
            };

            transfers.push(TransferLog {
                tx_hash: format!("{tx_hash:#x}"),
                log_index,
                block_number,
                contract: format!("{contract_addr:#x}").to_lowercase(),
                from: format!("0x{}", alloy::hex::encode(&from_topic[12..])),
                to: format!("0x{}", alloy::hex::encode(&to_topic[12..])),
                value_raw: value.to_string(),
            });
        }
        Ok(transfers)
    }

    async fn receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, ChainError> {
        let hash = TxHash::from_str(tx_hash)
            .map_err(|e| ChainError::InvalidAddress(e.to_string()))?;
        let receipt = self
            .provider()
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| ChainError::Transient(e.to_string()))?;

        Ok(receipt.map(|r| TxReceipt {
            tx_hash: tx_hash.to_string(),
            block_number: r.block_number.unwrap_or_default(),
            success: r.status(),
            gas_used: Some(r.gas_used),
        }))
    }

    async fn balance(&self, address: &str) -> Result<String, ChainError> {
        let addr =
            Address::from_str(address).map_err(|e| ChainError::InvalidAddress(e.to_string()))?;
        let balance = self
            .provider()
            .get_balance(addr)
            .await
            .map_err(|e| ChainError::Transient(e.to_string()))?;
        Ok(balance.to_string())
    }

    async fn send(
        &self,
        private_key_hex: &str,
        to: &str,
        value_raw: &str,
        data: Option<Vec<u8>>,
    ) -> Result<SentTx, ChainError> {
        let signer = Self::signer_from_hex(private_key_hex)?;
        let sender = signer.address();
        let wallet = EthereumWallet::from(signer);

        let to_addr =
            Address::from_str(to).map_err(|e| ChainError::InvalidAddress(e.to_string()))?;
        let value = U256::from_str(value_raw)
            .map_err(|_| ChainError::InvalidAmount(value_raw.to_string()))?;

        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .on_http(self.rpc_url.clone());

        // The payout executor serializes sends per chain, so reading the
        // pending nonce here is race-free.
        let nonce = provider
            .get_transaction_count(sender)
            .await
            .map_err(|e| ChainError::Transient(e.to_string()))?;

        let mut request = TransactionRequest::default()
            .with_to(to_addr)
            .with_value(value)
            .with_nonce(nonce)
            .with_chain_id(self.chain_id);
        if let Some(data) = data {
            request = request.with_input(data);
        }

        let pending = provider
            .send_transaction(request)
            .await
            .map_err(|e| ChainError::Broadcast(e.to_string()))?;

        Ok(SentTx {
            tx_hash: format!("{:#x}", *pending.tx_hash()),
            nonce,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signer_parses_valid_hex_key() {
        let key = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
        let signer = RpcChainClient::signer_from_hex(key).unwrap();
        assert_ne!(signer.address(), Address::ZERO);
    }

    #[test]
    fn signer_rejects_garbage() {
        assert!(RpcChainClient::signer_from_hex("zz").is_err());
        assert!(RpcChainClient::signer_from_hex("").is_err());
    }

    #[test]
    fn client_rejects_malformed_url() {
        assert!(RpcChainClient::new("not a url", 1).is_err());
        assert!(RpcChainClient::new("http://localhost:8545", 1).is_ok());
    }
}
