// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deposit addresses and observed deposits.
//!
//! A deposit is unique per on-chain outpoint `(chain, tx_hash, log_index)`,
//! which is what makes overlapping scanner passes safe: the second upsert
//! of the same outpoint is a no-op.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{
    composite_key, composite_prefix, Reader, StoreError, StoreResult, Writer, DEPOSITS,
    DEPOSITS_BY_OUTPOINT, DEPOSITS_BY_STATUS, DEPOSITS_BY_USER, DEPOSIT_ADDRESSES,
    DEPOSIT_ADDRESSES_BY_ADDRESS, DEPOSIT_ADDRESSES_BY_OWNER,
};

/// Confirmation lifecycle of a deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositStatus {
    /// Known to the platform but not yet seen in a block.
    Awaiting,
    /// Observed on-chain, accumulating confirmations.
    Confirming,
    /// Final; the ledger credit has been emitted.
    Confirmed,
    /// Reverted or invalid on-chain.
    Failed,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::Awaiting => "AWAITING",
            DepositStatus::Confirming => "CONFIRMING",
            DepositStatus::Confirmed => "CONFIRMED",
            DepositStatus::Failed => "FAILED",
        }
    }
}

/// A platform-controlled receiving address, unique per (user, chain).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DepositAddress {
    pub id: String,
    pub user_id: String,
    pub chain_id: String,
    /// Lowercase EVM address.
    pub address: String,
    /// HD derivation path when allocated from the signer.
    pub derivation_path: Option<String>,
    /// Monotonic per-chain index the path was derived at.
    pub derivation_index: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// An observed inbound transfer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Deposit {
    pub id: String,
    pub user_id: String,
    pub asset_id: String,
    pub chain_id: String,
    pub deposit_address_id: String,
    pub tx_hash: String,
    pub log_index: Option<u64>,
    pub from_address: String,
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    pub confirmations: u64,
    pub status: DepositStatus,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub observed_at: DateTime<Utc>,
}

impl Deposit {
    /// Composite outpoint key: `chain|tx_hash|log_index`.
    pub fn outpoint_key(chain_id: &str, tx_hash: &str, log_index: Option<u64>) -> Vec<u8> {
        let log_index = log_index.map(|i| i.to_string()).unwrap_or_else(|| "-".into());
        composite_key(&[chain_id, tx_hash, &log_index])
    }
}

/// Repository for deposit addresses.
pub struct DepositRepo<'a, T> {
    tx: &'a T,
}

impl<'a, T: Reader> DepositRepo<'a, T> {
    pub fn new(tx: &'a T) -> Self {
        Self { tx }
    }

    pub fn address(&self, address_id: &str) -> StoreResult<Option<DepositAddress>> {
        self.tx.get(DEPOSIT_ADDRESSES, address_id)
    }

    /// The (at most one) address a user holds on a chain.
    pub fn address_for_owner(
        &self,
        user_id: &str,
        chain_id: &str,
    ) -> StoreResult<Option<DepositAddress>> {
        match self
            .tx
            .index_get_by(DEPOSIT_ADDRESSES_BY_OWNER, &composite_key(&[user_id, chain_id]))?
        {
            Some(id) => self.address(&id),
            None => Ok(None),
        }
    }

    /// Resolve a lowercase on-chain address to its row; how the scanner
    /// maps a `Transfer` recipient to a user.
    pub fn address_by_chain_address(
        &self,
        chain_id: &str,
        address: &str,
    ) -> StoreResult<Option<DepositAddress>> {
        match self
            .tx
            .index_get_by(DEPOSIT_ADDRESSES_BY_ADDRESS, &composite_key(&[chain_id, address]))?
        {
            Some(id) => self.address(&id),
            None => Ok(None),
        }
    }

    pub fn get(&self, deposit_id: &str) -> StoreResult<Option<Deposit>> {
        self.tx.get(DEPOSITS, deposit_id)
    }

    pub fn require(&self, deposit_id: &str) -> StoreResult<Deposit> {
        self.get(deposit_id)?
            .ok_or_else(|| StoreError::NotFound(format!("deposit {deposit_id}")))
    }

    pub fn by_outpoint(
        &self,
        chain_id: &str,
        tx_hash: &str,
        log_index: Option<u64>,
    ) -> StoreResult<Option<Deposit>> {
        let key = Deposit::outpoint_key(chain_id, tx_hash, log_index);
        match self.tx.index_get_by(DEPOSITS_BY_OUTPOINT, &key)? {
            Some(id) => self.get(&id),
            None => Ok(None),
        }
    }

    pub fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Deposit>> {
        let ids = self.tx.scan_ids(DEPOSITS_BY_USER, &composite_prefix(&[user_id]))?;
        let mut deposits = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(deposit) = self.get(&id)? {
                deposits.push(deposit);
            }
        }
        Ok(deposits)
    }

    pub fn list_by_status(&self, status: DepositStatus) -> StoreResult<Vec<Deposit>> {
        let ids = self
            .tx
            .scan_ids(DEPOSITS_BY_STATUS, &composite_prefix(&[status.as_str()]))?;
        let mut deposits = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(deposit) = self.get(&id)? {
                deposits.push(deposit);
            }
        }
        Ok(deposits)
    }

    pub fn list_all(&self) -> StoreResult<Vec<Deposit>> {
        Ok(self.tx.scan_all(DEPOSITS)?.into_iter().map(|(_, d)| d).collect())
    }
}

impl<'a, T: Writer> DepositRepo<'a, T> {
    /// Insert an address, enforcing (user, chain) uniqueness.
    pub fn insert_address(&self, address: &DepositAddress) -> StoreResult<()> {
        self.tx.index_insert_unique_by(
            DEPOSIT_ADDRESSES_BY_OWNER,
            &composite_key(&[&address.user_id, &address.chain_id]),
            &address.id,
        )?;
        self.tx.index_put_by(
            DEPOSIT_ADDRESSES_BY_ADDRESS,
            &composite_key(&[&address.chain_id, &address.address]),
            &address.id,
        )?;
        self.tx.insert_new(DEPOSIT_ADDRESSES, &address.id, address)
    }

    /// Insert a deposit keyed by its outpoint.
    ///
    /// Returns `Conflict` when the outpoint is already recorded; scanner
    /// callers treat that as "seen before" and move on.
    pub fn insert(&self, deposit: &Deposit) -> StoreResult<()> {
        let key = Deposit::outpoint_key(&deposit.chain_id, &deposit.tx_hash, deposit.log_index);
        self.tx.index_insert_unique_by(DEPOSITS_BY_OUTPOINT, &key, &deposit.id)?;
        self.tx.index_put_by(
            DEPOSITS_BY_USER,
            &composite_key(&[&deposit.user_id, &deposit.id]),
            &deposit.id,
        )?;
        self.tx.index_put_by(
            DEPOSITS_BY_STATUS,
            &composite_key(&[deposit.status.as_str(), &deposit.id]),
            &deposit.id,
        )?;
        self.tx.insert_new(DEPOSITS, &deposit.id, deposit)
    }

    /// Persist a deposit, moving its status index entry if needed.
    pub fn update(&self, deposit: &Deposit) -> StoreResult<()> {
        let previous: Option<Deposit> = self.tx.get(DEPOSITS, &deposit.id)?;
        if let Some(previous) = previous {
            if previous.status != deposit.status {
                self.tx.delete_by(
                    DEPOSITS_BY_STATUS,
                    &composite_key(&[previous.status.as_str(), &deposit.id]),
                )?;
                self.tx.index_put_by(
                    DEPOSITS_BY_STATUS,
                    &composite_key(&[deposit.status.as_str(), &deposit.id]),
                    &deposit.id,
                )?;
            }
        }
        self.tx.put(DEPOSITS, &deposit.id, deposit)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use std::str::FromStr;

    pub fn address(user_id: &str, chain_id: &str, addr: &str) -> DepositAddress {
        DepositAddress {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            chain_id: chain_id.to_string(),
            address: addr.to_string(),
            derivation_path: Some("m/44'/60'/0'/0/0".into()),
            derivation_index: Some(0),
            created_at: Utc::now(),
        }
    }

    pub fn confirming(user_id: &str, asset_id: &str, chain_id: &str, tx_hash: &str) -> Deposit {
        Deposit {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            asset_id: asset_id.to_string(),
            chain_id: chain_id.to_string(),
            deposit_address_id: "addr-1".into(),
            tx_hash: tx_hash.to_string(),
            log_index: Some(3),
            from_address: "0x0000000000000000000000000000000000000001".into(),
            amount: BigDecimal::from_str("1.5").unwrap(),
            confirmations: 0,
            status: DepositStatus::Confirming,
            confirmed_at: None,
            observed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::temp_store;
    use super::fixtures;
    use super::*;

    #[test]
    fn one_address_per_user_per_chain() {
        let (_dir, store) = temp_store();
        let addr = fixtures::address("u1", "c1", "0xaaa0000000000000000000000000000000000001");
        store.write(|tx| DepositRepo::new(tx).insert_address(&addr)).unwrap();

        let dup = fixtures::address("u1", "c1", "0xbbb0000000000000000000000000000000000002");
        assert!(store.write(|tx| DepositRepo::new(tx).insert_address(&dup)).is_err());

        // Same user, different chain is fine.
        let other = fixtures::address("u1", "c2", "0xccc0000000000000000000000000000000000003");
        store.write(|tx| DepositRepo::new(tx).insert_address(&other)).unwrap();
    }

    #[test]
    fn scanner_lookup_by_chain_address() {
        let (_dir, store) = temp_store();
        let addr = fixtures::address("u1", "c1", "0xaaa0000000000000000000000000000000000001");
        store.write(|tx| DepositRepo::new(tx).insert_address(&addr)).unwrap();

        let found = store
            .read(|tx| {
                DepositRepo::new(tx)
                    .address_by_chain_address("c1", "0xaaa0000000000000000000000000000000000001")
            })
            .unwrap()
            .unwrap();
        assert_eq!(found.user_id, "u1");

        let miss = store
            .read(|tx| DepositRepo::new(tx).address_by_chain_address("c2", &addr.address))
            .unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn outpoint_uniqueness_makes_rescans_safe() {
        let (_dir, store) = temp_store();
        let deposit = fixtures::confirming("u1", "a1", "c1", "0xhash1");
        store.write(|tx| DepositRepo::new(tx).insert(&deposit)).unwrap();

        // Same outpoint from a second scanner pass.
        let mut rescan = fixtures::confirming("u1", "a1", "c1", "0xhash1");
        rescan.id = uuid::Uuid::new_v4().to_string();
        let err = store.write(|tx| DepositRepo::new(tx).insert(&rescan)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let all = store.read(|tx| DepositRepo::new(tx).list_all()).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn distinct_log_indexes_are_distinct_deposits() {
        let (_dir, store) = temp_store();
        let first = fixtures::confirming("u1", "a1", "c1", "0xhash1");
        let mut second = fixtures::confirming("u1", "a1", "c1", "0xhash1");
        second.log_index = Some(4);

        store
            .write(|tx| {
                let repo = DepositRepo::new(tx);
                repo.insert(&first)?;
                repo.insert(&second)
            })
            .unwrap();

        let all = store.read(|tx| DepositRepo::new(tx).list_all()).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn status_transition_moves_index() {
        let (_dir, store) = temp_store();
        let mut deposit = fixtures::confirming("u1", "a1", "c1", "0xhash1");
        store.write(|tx| DepositRepo::new(tx).insert(&deposit)).unwrap();

        deposit.status = DepositStatus::Confirmed;
        deposit.confirmed_at = Some(Utc::now());
        store.write(|tx| DepositRepo::new(tx).update(&deposit)).unwrap();

        let (confirming, confirmed) = store
            .read(|tx| {
                let repo = DepositRepo::new(tx);
                Ok((
                    repo.list_by_status(DepositStatus::Confirming)?,
                    repo.list_by_status(DepositStatus::Confirmed)?,
                ))
            })
            .unwrap();
        assert!(confirming.is_empty());
        assert_eq!(confirmed.len(), 1);
    }
}
