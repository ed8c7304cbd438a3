// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain and asset catalog.
//!
//! Chains describe the RPC endpoints the platform observes and pays out on.
//! Assets are the tokens users can deposit, stake, and withdraw. USD prices
//! live on the asset row and are maintained by operators, not sourced here.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Reader, StoreError, StoreResult, Writer, ASSETS, CHAINS, CHAINS_BY_SLUG};

/// An EVM chain the platform operates on.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Chain {
    pub id: String,
    /// Short lowercase handle, e.g. `sepolia`. Unique.
    pub slug: String,
    /// Numeric EVM chain id.
    pub chain_id: u64,
    pub rpc_endpoint: String,
    pub explorer_url: String,
    /// Blocks required before a deposit or payout is final.
    pub confirmations_required: u64,
    pub is_active: bool,
}

/// A token on a chain.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Asset {
    pub id: String,
    pub chain_id: String,
    pub symbol: String,
    pub decimals: u8,
    /// `None` means the chain's native token.
    pub contract_address: Option<String>,
    pub is_native: bool,
    pub is_active: bool,
    /// Operator-maintained display price.
    #[schema(value_type = String)]
    pub price_usd: BigDecimal,
    pub updated_at: DateTime<Utc>,
}

/// Repository for chain rows.
pub struct ChainRepo<'a, T> {
    tx: &'a T,
}

impl<'a, T: Reader> ChainRepo<'a, T> {
    pub fn new(tx: &'a T) -> Self {
        Self { tx }
    }

    pub fn get(&self, chain_id: &str) -> StoreResult<Option<Chain>> {
        self.tx.get(CHAINS, chain_id)
    }

    pub fn require(&self, chain_id: &str) -> StoreResult<Chain> {
        self.get(chain_id)?
            .ok_or_else(|| StoreError::NotFound(format!("chain {chain_id}")))
    }

    pub fn by_slug(&self, slug: &str) -> StoreResult<Option<Chain>> {
        match self.tx.index_get(CHAINS_BY_SLUG, slug)? {
            Some(id) => self.get(&id),
            None => Ok(None),
        }
    }

    pub fn list(&self) -> StoreResult<Vec<Chain>> {
        Ok(self.tx.scan_all(CHAINS)?.into_iter().map(|(_, c)| c).collect())
    }

    pub fn list_active(&self) -> StoreResult<Vec<Chain>> {
        Ok(self.list()?.into_iter().filter(|c| c.is_active).collect())
    }
}

impl<'a, T: Writer> ChainRepo<'a, T> {
    pub fn insert(&self, chain: &Chain) -> StoreResult<()> {
        self.tx
            .index_insert_unique(CHAINS_BY_SLUG, &chain.slug, &chain.id)
            .map_err(|_| StoreError::Conflict(format!("chain slug {} taken", chain.slug)))?;
        self.tx.insert_new(CHAINS, &chain.id, chain)
    }

    pub fn update(&self, chain: &Chain) -> StoreResult<()> {
        self.tx.put(CHAINS, &chain.id, chain)
    }
}

/// Repository for asset rows.
pub struct AssetRepo<'a, T> {
    tx: &'a T,
}

impl<'a, T: Reader> AssetRepo<'a, T> {
    pub fn new(tx: &'a T) -> Self {
        Self { tx }
    }

    pub fn get(&self, asset_id: &str) -> StoreResult<Option<Asset>> {
        self.tx.get(ASSETS, asset_id)
    }

    pub fn require(&self, asset_id: &str) -> StoreResult<Asset> {
        self.get(asset_id)?
            .ok_or_else(|| StoreError::NotFound(format!("asset {asset_id}")))
    }

    pub fn list(&self) -> StoreResult<Vec<Asset>> {
        Ok(self.tx.scan_all(ASSETS)?.into_iter().map(|(_, a)| a).collect())
    }

    /// Active ERC-20 assets on one chain; what the deposit scanner watches.
    pub fn active_tokens_on_chain(&self, chain_id: &str) -> StoreResult<Vec<Asset>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|a| a.chain_id == chain_id && a.is_active && a.contract_address.is_some())
            .collect())
    }
}

impl<'a, T: Writer> AssetRepo<'a, T> {
    pub fn insert(&self, asset: &Asset) -> StoreResult<()> {
        self.tx.insert_new(ASSETS, &asset.id, asset)
    }

    pub fn update(&self, asset: &Asset) -> StoreResult<()> {
        self.tx.put(ASSETS, &asset.id, asset)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use std::str::FromStr;

    /// A test chain requiring 12 confirmations.
    pub fn chain(slug: &str) -> Chain {
        Chain {
            id: uuid::Uuid::new_v4().to_string(),
            slug: slug.to_string(),
            chain_id: 11_155_111,
            rpc_endpoint: "http://localhost:8545".into(),
            explorer_url: "https://explorer.example".into(),
            confirmations_required: 12,
            is_active: true,
        }
    }

    /// An 18-decimal ERC-20 asset priced at 1 USD.
    pub fn token(chain_id: &str, symbol: &str) -> Asset {
        Asset {
            id: uuid::Uuid::new_v4().to_string(),
            chain_id: chain_id.to_string(),
            symbol: symbol.to_string(),
            decimals: 18,
            contract_address: Some("0x5425890298aed601595a70ab815c96711a31bc65".into()),
            is_native: false,
            is_active: true,
            price_usd: BigDecimal::from_str("1").unwrap(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::temp_store;
    use super::fixtures;
    use super::*;

    #[test]
    fn chain_slug_lookup() {
        let (_dir, store) = temp_store();
        let chain = fixtures::chain("sepolia");
        store.write(|tx| ChainRepo::new(tx).insert(&chain)).unwrap();

        let found = store.read(|tx| ChainRepo::new(tx).by_slug("sepolia")).unwrap().unwrap();
        assert_eq!(found.id, chain.id);
        assert_eq!(found.confirmations_required, 12);
    }

    #[test]
    fn duplicate_slug_conflicts() {
        let (_dir, store) = temp_store();
        store.write(|tx| ChainRepo::new(tx).insert(&fixtures::chain("base"))).unwrap();
        assert!(store
            .write(|tx| ChainRepo::new(tx).insert(&fixtures::chain("base")))
            .is_err());
    }

    #[test]
    fn scanner_asset_filter_excludes_native_and_inactive() {
        let (_dir, store) = temp_store();
        let chain = fixtures::chain("sepolia");
        let token = fixtures::token(&chain.id, "USDT");
        let mut inactive = fixtures::token(&chain.id, "OLD");
        inactive.is_active = false;
        let mut native = fixtures::token(&chain.id, "ETH");
        native.contract_address = None;
        native.is_native = true;

        store
            .write(|tx| {
                let repo = AssetRepo::new(tx);
                repo.insert(&token)?;
                repo.insert(&inactive)?;
                repo.insert(&native)
            })
            .unwrap();

        let watched = store
            .read(|tx| AssetRepo::new(tx).active_tokens_on_chain(&chain.id))
            .unwrap();
        assert_eq!(watched.len(), 1);
        assert_eq!(watched[0].symbol, "USDT");
    }
}
