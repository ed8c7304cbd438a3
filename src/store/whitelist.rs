// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Withdrawal destination whitelist.
//!
//! First use of a destination adds it with a 24 hour cooldown; fraud
//! scoring flags withdrawals to addresses still inside that window. The
//! cooldown is never refreshed on later use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{composite_key, composite_prefix, Reader, StoreResult, Writer, WHITELIST};

/// A destination address a user has withdrawn to.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WhitelistEntry {
    pub user_id: String,
    pub chain_id: String,
    /// Lowercase EVM address.
    pub address: String,
    pub label: Option<String>,
    /// Withdrawals before this instant raise the cooldown fraud flag.
    pub cooldown_ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Repository for whitelist entries.
pub struct WhitelistRepo<'a, T> {
    tx: &'a T,
}

impl<'a, T: Reader> WhitelistRepo<'a, T> {
    pub fn new(tx: &'a T) -> Self {
        Self { tx }
    }

    pub fn get(
        &self,
        user_id: &str,
        chain_id: &str,
        address: &str,
    ) -> StoreResult<Option<WhitelistEntry>> {
        self.tx
            .get_by(WHITELIST, &composite_key(&[user_id, chain_id, address]))
    }

    pub fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<WhitelistEntry>> {
        Ok(self
            .tx
            .scan_rows(WHITELIST, &composite_prefix(&[user_id]))?
            .into_iter()
            .map(|(_, e)| e)
            .collect())
    }
}

impl<'a, T: Writer> WhitelistRepo<'a, T> {
    /// Add an entry if absent. Returns whether a new row was created; an
    /// existing entry is left untouched so its cooldown is not refreshed.
    pub fn add_if_absent(&self, entry: &WhitelistEntry) -> StoreResult<bool> {
        let key = composite_key(&[&entry.user_id, &entry.chain_id, &entry.address]);
        if self.tx.get_by::<WhitelistEntry>(WHITELIST, &key)?.is_some() {
            return Ok(false);
        }
        self.tx.put_by(WHITELIST, &key, entry)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::temp_store;
    use super::*;

    fn entry(cooldown_ends_at: DateTime<Utc>) -> WhitelistEntry {
        WhitelistEntry {
            user_id: "u1".into(),
            chain_id: "c1".into(),
            address: "0x00000000000000000000000000000000000000aa".into(),
            label: None,
            cooldown_ends_at,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn second_add_does_not_refresh_cooldown() {
        let (_dir, store) = temp_store();
        let first_end = Utc::now() + chrono::Duration::hours(24);
        store
            .write(|tx| WhitelistRepo::new(tx).add_if_absent(&entry(first_end)))
            .unwrap();

        let later_end = Utc::now() + chrono::Duration::hours(48);
        let created = store
            .write(|tx| WhitelistRepo::new(tx).add_if_absent(&entry(later_end)))
            .unwrap();
        assert!(!created);

        let stored = store
            .read(|tx| {
                WhitelistRepo::new(tx).get(
                    "u1",
                    "c1",
                    "0x00000000000000000000000000000000000000aa",
                )
            })
            .unwrap()
            .unwrap();
        assert_eq!(stored.cooldown_ends_at, first_end);
    }

    #[test]
    fn listing_is_scoped_to_user() {
        let (_dir, store) = temp_store();
        store
            .write(|tx| {
                let repo = WhitelistRepo::new(tx);
                repo.add_if_absent(&entry(Utc::now()))?;
                let mut other = entry(Utc::now());
                other.user_id = "u2".into();
                repo.add_if_absent(&other)
            })
            .unwrap();

        let mine = store.read(|tx| WhitelistRepo::new(tx).list_for_user("u1")).unwrap();
        assert_eq!(mine.len(), 1);
    }
}
