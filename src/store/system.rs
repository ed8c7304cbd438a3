// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key/value system configuration, e.g. per-chain scanner checkpoints.

use serde::{de::DeserializeOwned, Serialize};

use super::{Reader, StoreResult, Writer, SYSTEM_CONFIG};

/// Repository for system configuration values.
pub struct SystemConfigRepo<'a, T> {
    tx: &'a T,
}

impl<'a, T: Reader> SystemConfigRepo<'a, T> {
    pub fn new(tx: &'a T) -> Self {
        Self { tx }
    }

    pub fn get<V: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<V>> {
        self.tx.get(SYSTEM_CONFIG, key)
    }

    /// The scanner checkpoint for a chain, 0 when never scanned.
    pub fn last_scanned_block(&self, chain_id: &str) -> StoreResult<u64> {
        Ok(self
            .get::<u64>(&format!("last_scanned_block_{chain_id}"))?
            .unwrap_or(0))
    }
}

impl<'a, T: Writer> SystemConfigRepo<'a, T> {
    pub fn set<V: Serialize>(&self, key: &str, value: &V) -> StoreResult<()> {
        self.tx.put(SYSTEM_CONFIG, key, value)
    }

    pub fn set_last_scanned_block(&self, chain_id: &str, block: u64) -> StoreResult<()> {
        self.set(&format!("last_scanned_block_{chain_id}"), &block)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::temp_store;
    use super::*;

    #[test]
    fn checkpoint_defaults_to_zero_and_persists() {
        let (_dir, store) = temp_store();
        let initial = store
            .read(|tx| SystemConfigRepo::new(tx).last_scanned_block("c1"))
            .unwrap();
        assert_eq!(initial, 0);

        store
            .write(|tx| SystemConfigRepo::new(tx).set_last_scanned_block("c1", 1234))
            .unwrap();

        let after = store
            .read(|tx| SystemConfigRepo::new(tx).last_scanned_block("c1"))
            .unwrap();
        assert_eq!(after, 1234);

        // Other chains are independent.
        let other = store
            .read(|tx| SystemConfigRepo::new(tx).last_scanned_block("c2"))
            .unwrap();
        assert_eq!(other, 0);
    }
}
