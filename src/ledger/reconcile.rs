// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger replay and projection reconciliation.
//!
//! The journal is the system of record; the balance cache is a projection.
//! This module rebuilds any (user, asset, chain) projection purely from its
//! journal tail and compares it against the cache. A discrepancy means a
//! code bug, not bad data: the fix overwrites the cache from the replay.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{all_balances, all_entries, fold_entry, BalanceCache, LedgerError};
use crate::store::{Reader, Store, Writer, BALANCES};

/// One projection field that disagrees with its replayed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Discrepancy {
    pub user_id: String,
    pub asset_id: String,
    pub chain_id: String,
    pub field: &'static str,
    pub cached: String,
    pub replayed: String,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Tuples examined (union of cached and journaled tuples).
    pub tuples_checked: usize,
    pub discrepancies: Vec<Discrepancy>,
    /// Tuples rewritten (only in fix mode).
    pub tuples_fixed: usize,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// Replay every tuple's journal from empty.
fn replay_all(
    tx: &impl Reader,
    now: DateTime<Utc>,
) -> Result<BTreeMap<(String, String, String), BalanceCache>, LedgerError> {
    let mut rebuilt: BTreeMap<(String, String, String), BalanceCache> = BTreeMap::new();

    for entry in all_entries(tx)? {
        let key = (
            entry.user_id.clone(),
            entry.asset_id.clone(),
            entry.chain_id.clone(),
        );
        let balance = rebuilt.entry(key).or_insert_with(|| {
            BalanceCache::empty(&entry.user_id, &entry.asset_id, &entry.chain_id, now)
        });
        fold_entry(balance, &entry)?;
    }

    Ok(rebuilt)
}

fn diff_tuple(cached: &BalanceCache, replayed: &BalanceCache, out: &mut Vec<Discrepancy>) {
    let fields = [
        ("available", &cached.available, &replayed.available),
        ("staked", &cached.staked, &replayed.staked),
        ("rewards_accrued", &cached.rewards_accrued, &replayed.rewards_accrued),
        (
            "withdrawals_pending",
            &cached.withdrawals_pending,
            &replayed.withdrawals_pending,
        ),
    ];
    for (field, cached_value, replayed_value) in fields {
        if cached_value != replayed_value {
            out.push(Discrepancy {
                user_id: cached.user_id.clone(),
                asset_id: cached.asset_id.clone(),
                chain_id: cached.chain_id.clone(),
                field,
                cached: cached_value.to_string(),
                replayed: replayed_value.to_string(),
            });
        }
    }
}

/// Compare every cached projection against its replayed value.
pub fn check(store: &Store, now: DateTime<Utc>) -> Result<ReconcileReport, LedgerError> {
    store.read(|tx| {
        let replayed = replay_all(tx, now)?;
        let cached: BTreeMap<(String, String, String), BalanceCache> = all_balances(tx)?
            .into_iter()
            .map(|b| ((b.user_id.clone(), b.asset_id.clone(), b.chain_id.clone()), b))
            .collect();

        let mut report = ReconcileReport::default();
        let mut keys: Vec<_> = replayed.keys().cloned().collect();
        for key in cached.keys() {
            if !replayed.contains_key(key) {
                keys.push(key.clone());
            }
        }
        report.tuples_checked = keys.len();

        for key in keys {
            let empty = BalanceCache::empty(&key.0, &key.1, &key.2, now);
            let cached_balance = cached.get(&key).unwrap_or(&empty);
            let replayed_balance = replayed.get(&key).unwrap_or(&empty);
            diff_tuple(cached_balance, replayed_balance, &mut report.discrepancies);
        }

        for discrepancy in &report.discrepancies {
            warn!(
                user_id = %discrepancy.user_id,
                asset_id = %discrepancy.asset_id,
                chain_id = %discrepancy.chain_id,
                field = discrepancy.field,
                cached = %discrepancy.cached,
                replayed = %discrepancy.replayed,
                "Projection disagrees with ledger replay"
            );
        }

        Ok(report)
    })
}

/// Replay and overwrite every divergent cache row. Running twice is a
/// no-op after the first successful fix.
pub fn fix(store: &Store, now: DateTime<Utc>) -> Result<ReconcileReport, LedgerError> {
    let mut report = check(store, now)?;
    if report.is_clean() {
        return Ok(report);
    }

    let fixed = store.write(|tx| {
        let replayed = replay_all(tx, now)?;
        let mut fixed = 0usize;
        for ((user_id, asset_id, chain_id), balance) in &replayed {
            let key = super::balance_key(user_id, asset_id, chain_id);
            let cached: Option<BalanceCache> = tx.get_by(BALANCES, &key)?;
            if cached.as_ref() != Some(balance) {
                tx.put_by(BALANCES, &key, balance)?;
                fixed += 1;
            }
        }
        Ok::<usize, LedgerError>(fixed)
    })?;

    report.tuples_fixed = fixed;
    info!(fixed, "Reconciler rewrote divergent projections");
    Ok(report)
}
