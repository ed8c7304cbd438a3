// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Staking pool catalog and APR schedules.
//!
//! A pool's effective APR at any instant comes from the schedule table; at
//! most one schedule row is active per pool at a time. `current_apr` on the
//! pool row is a display cache refreshed when schedules are applied.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{
    composite_prefix, seq_bytes, Reader, StoreError, StoreResult, Writer, APR_SCHEDULES, POOLS,
};

/// Pool lock behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolType {
    /// No lock period; principal is withdrawable (after any cooldown).
    Flexible,
    /// Principal locked for `lock_days` after staking.
    Fixed,
}

/// An interest-bearing staking pool.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Pool {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub asset_id: String,
    pub pool_type: PoolType,
    /// Days principal stays locked after staking; 0 for flexible pools.
    pub lock_days: u32,
    /// Display APR cache as a decimal percentage (4.5 means 4.5%/yr).
    #[schema(value_type = String)]
    pub current_apr: BigDecimal,
    #[schema(value_type = String)]
    pub min_stake: BigDecimal,
    #[schema(value_type = Option<String>)]
    pub max_stake: Option<BigDecimal>,
    /// Ceiling on `total_staked`; `None` means uncapped.
    #[schema(value_type = Option<String>)]
    pub total_capacity: Option<BigDecimal>,
    #[schema(value_type = String)]
    pub total_staked: BigDecimal,
    /// Hours between unstake request and principal release.
    pub cooldown_hours: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// One APR regime for a pool, effective over a half-open interval.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AprSchedule {
    pub id: String,
    pub pool_id: String,
    #[schema(value_type = String)]
    pub apr: BigDecimal,
    pub effective_from: DateTime<Utc>,
    /// `None` while this row is the open-ended current regime.
    pub effective_to: Option<DateTime<Utc>>,
}

impl AprSchedule {
    /// True when this row covers `at`.
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.effective_from <= at && self.effective_to.map(|to| at < to).unwrap_or(true)
    }
}

/// Repository for pool rows and their schedules.
pub struct PoolRepo<'a, T> {
    tx: &'a T,
}

impl<'a, T: Reader> PoolRepo<'a, T> {
    pub fn new(tx: &'a T) -> Self {
        Self { tx }
    }

    pub fn get(&self, pool_id: &str) -> StoreResult<Option<Pool>> {
        self.tx.get(POOLS, pool_id)
    }

    pub fn require(&self, pool_id: &str) -> StoreResult<Pool> {
        self.get(pool_id)?
            .ok_or_else(|| StoreError::NotFound(format!("pool {pool_id}")))
    }

    pub fn list(&self) -> StoreResult<Vec<Pool>> {
        Ok(self.tx.scan_all(POOLS)?.into_iter().map(|(_, p)| p).collect())
    }

    /// Schedules for one pool, ordered by effective date.
    pub fn schedules(&self, pool_id: &str) -> StoreResult<Vec<AprSchedule>> {
        Ok(self
            .tx
            .scan_rows(APR_SCHEDULES, &composite_prefix(&[pool_id]))?
            .into_iter()
            .map(|(_, s)| s)
            .collect())
    }

    /// The APR governing accrual at `at`: the covering schedule row, or the
    /// pool's display cache when no schedule applies.
    pub fn effective_apr(&self, pool: &Pool, at: DateTime<Utc>) -> StoreResult<BigDecimal> {
        let schedules = self.schedules(&pool.id)?;
        for schedule in schedules.iter().rev() {
            if schedule.covers(at) {
                return Ok(schedule.apr.clone());
            }
        }
        Ok(pool.current_apr.clone())
    }
}

impl<'a, T: Writer> PoolRepo<'a, T> {
    pub fn insert(&self, pool: &Pool) -> StoreResult<()> {
        self.tx.insert_new(POOLS, &pool.id, pool)
    }

    pub fn update(&self, pool: &Pool) -> StoreResult<()> {
        self.tx.put(POOLS, &pool.id, pool)
    }

    /// Append a schedule row under its effective timestamp.
    ///
    /// Callers close the previous open-ended row first so that at most one
    /// row covers any instant; `PoolRepo::apply_schedule` does both.
    pub fn insert_schedule(&self, schedule: &AprSchedule) -> StoreResult<()> {
        let mut key = composite_prefix(&[&schedule.pool_id]);
        key.extend_from_slice(&seq_bytes(schedule.effective_from.timestamp().max(0) as u64));
        key.push(b'|');
        key.extend_from_slice(schedule.id.as_bytes());
        self.tx.put_by(APR_SCHEDULES, &key, schedule)
    }

    /// Install a new APR regime starting at `effective_from`: closes the
    /// currently open schedule, appends the new row, and refreshes the
    /// pool's display cache.
    pub fn apply_schedule(
        &self,
        pool: &mut Pool,
        apr: BigDecimal,
        effective_from: DateTime<Utc>,
    ) -> StoreResult<AprSchedule> {
        let schedules = self.schedules(&pool.id)?;
        for existing in schedules {
            if existing.effective_to.is_none() {
                let mut closed = existing;
                closed.effective_to = Some(effective_from);
                self.insert_schedule(&closed)?;
            }
        }

        let schedule = AprSchedule {
            id: uuid::Uuid::new_v4().to_string(),
            pool_id: pool.id.clone(),
            apr: apr.clone(),
            effective_from,
            effective_to: None,
        };
        self.insert_schedule(&schedule)?;

        pool.current_apr = apr;
        self.update(pool)?;
        Ok(schedule)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use std::str::FromStr;

    /// Flexible pool, 10% APR, no cooldown, no lock.
    pub fn flexible(asset_id: &str) -> Pool {
        Pool {
            id: uuid::Uuid::new_v4().to_string(),
            name: "Flexible".into(),
            slug: format!("flex-{}", &uuid::Uuid::new_v4().to_string()[..8]),
            asset_id: asset_id.to_string(),
            pool_type: PoolType::Flexible,
            lock_days: 0,
            current_apr: BigDecimal::from_str("10").unwrap(),
            min_stake: BigDecimal::from_str("0.01").unwrap(),
            max_stake: None,
            total_capacity: None,
            total_staked: BigDecimal::from(0u32),
            cooldown_hours: 0,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::temp_store;
    use super::fixtures;
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn effective_apr_falls_back_to_display_cache() {
        let (_dir, store) = temp_store();
        let pool = fixtures::flexible("asset-1");
        store.write(|tx| PoolRepo::new(tx).insert(&pool)).unwrap();

        let apr = store
            .read(|tx| PoolRepo::new(tx).effective_apr(&pool, Utc::now()))
            .unwrap();
        assert_eq!(apr, dec("10"));
    }

    #[test]
    fn apply_schedule_closes_previous_regime() {
        let (_dir, store) = temp_store();
        let mut pool = fixtures::flexible("asset-1");
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();

        store
            .write(|tx| {
                let repo = PoolRepo::new(tx);
                repo.insert(&pool)?;
                repo.apply_schedule(&mut pool, dec("8"), t0)?;
                repo.apply_schedule(&mut pool, dec("12"), t1)?;
                Ok(())
            })
            .unwrap();

        // Before the switchover the old regime applies; after, the new one.
        let (before, after, cache) = store
            .read(|tx| {
                let repo = PoolRepo::new(tx);
                let pool = repo.require(&pool.id)?;
                Ok((
                    repo.effective_apr(&pool, t1 - chrono::Duration::days(1))?,
                    repo.effective_apr(&pool, t1 + chrono::Duration::days(1))?,
                    pool.current_apr.clone(),
                ))
            })
            .unwrap();
        assert_eq!(before, dec("8"));
        assert_eq!(after, dec("12"));
        assert_eq!(cache, dec("12"));
    }

    #[test]
    fn at_most_one_schedule_covers_any_instant() {
        let (_dir, store) = temp_store();
        let mut pool = fixtures::flexible("asset-1");
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();

        store
            .write(|tx| {
                let repo = PoolRepo::new(tx);
                repo.insert(&pool)?;
                repo.apply_schedule(&mut pool, dec("5"), t0)?;
                repo.apply_schedule(&mut pool, dec("6"), t1)?;
                Ok(())
            })
            .unwrap();

        let schedules = store.read(|tx| PoolRepo::new(tx).schedules(&pool.id)).unwrap();
        for probe in [t0, t1, t1 + chrono::Duration::days(30)] {
            let covering = schedules.iter().filter(|s| s.covers(probe)).count();
            assert_eq!(covering, 1, "instant {probe} covered by {covering} rows");
        }
    }
}
