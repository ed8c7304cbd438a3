// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Treasury hot wallets.
//!
//! Each chain has platform-controlled signing keys authorized to disburse
//! funds. Private keys are stored AES-256-GCM encrypted under the master
//! key and decrypted only inside the payout executor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{
    composite_key, composite_prefix, Reader, StoreError, StoreResult, Writer, TREASURY,
    TREASURY_BY_CHAIN,
};

/// A hot wallet for one chain.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TreasuryWallet {
    pub id: String,
    pub chain_id: String,
    /// Lowercase EVM address.
    pub address: String,
    pub label: String,
    /// AES-256-GCM ciphertext of the hex private key. Listings go through
    /// [`TreasuryWallet::redacted`], which strips it.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub encrypted_private_key: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl TreasuryWallet {
    /// Copy with key material stripped, safe for listings.
    pub fn redacted(&self) -> Self {
        Self {
            encrypted_private_key: None,
            ..self.clone()
        }
    }
}

/// Repository for treasury wallets.
pub struct TreasuryRepo<'a, T> {
    tx: &'a T,
}

impl<'a, T: Reader> TreasuryRepo<'a, T> {
    pub fn new(tx: &'a T) -> Self {
        Self { tx }
    }

    pub fn get(&self, wallet_id: &str) -> StoreResult<Option<TreasuryWallet>> {
        self.tx.get(TREASURY, wallet_id)
    }

    /// The first active hot wallet on a chain.
    pub fn active_for_chain(&self, chain_id: &str) -> StoreResult<TreasuryWallet> {
        let ids = self
            .tx
            .scan_ids(TREASURY_BY_CHAIN, &composite_prefix(&[chain_id]))?;
        for id in ids {
            if let Some(wallet) = self.get(&id)? {
                if wallet.is_active {
                    return Ok(wallet);
                }
            }
        }
        Err(StoreError::NotFound(format!(
            "no active treasury wallet on chain {chain_id}"
        )))
    }

    pub fn list(&self) -> StoreResult<Vec<TreasuryWallet>> {
        Ok(self.tx.scan_all(TREASURY)?.into_iter().map(|(_, w)| w).collect())
    }
}

impl<'a, T: Writer> TreasuryRepo<'a, T> {
    pub fn insert(&self, wallet: &TreasuryWallet) -> StoreResult<()> {
        self.tx.index_put_by(
            TREASURY_BY_CHAIN,
            &composite_key(&[&wallet.chain_id, &wallet.id]),
            &wallet.id,
        )?;
        self.tx.insert_new(TREASURY, &wallet.id, wallet)
    }

    pub fn update(&self, wallet: &TreasuryWallet) -> StoreResult<()> {
        self.tx.put(TREASURY, &wallet.id, wallet)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::temp_store;
    use super::*;

    fn wallet(chain_id: &str, active: bool) -> TreasuryWallet {
        TreasuryWallet {
            id: uuid::Uuid::new_v4().to_string(),
            chain_id: chain_id.to_string(),
            address: "0x00000000000000000000000000000000000000ff".into(),
            label: "hot-1".into(),
            encrypted_private_key: Some("ciphertext".into()),
            is_active: active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn active_lookup_skips_disabled_wallets() {
        let (_dir, store) = temp_store();
        let disabled = wallet("c1", false);
        let active = wallet("c1", true);
        store
            .write(|tx| {
                let repo = TreasuryRepo::new(tx);
                repo.insert(&disabled)?;
                repo.insert(&active)
            })
            .unwrap();

        let found = store.read(|tx| TreasuryRepo::new(tx).active_for_chain("c1")).unwrap();
        assert_eq!(found.id, active.id);
    }

    #[test]
    fn missing_chain_is_not_found() {
        let (_dir, store) = temp_store();
        let err = store
            .read(|tx| TreasuryRepo::new(tx).active_for_chain("nope"))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn redacted_strips_key_material() {
        let w = wallet("c1", true);
        assert!(w.redacted().encrypted_private_key.is_none());
    }
}
