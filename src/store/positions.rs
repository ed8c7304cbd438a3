// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Stake positions.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{
    composite_key, composite_prefix, Reader, StoreError, StoreResult, Writer, POSITIONS_BY_STATUS,
    POSITIONS_BY_USER, STAKE_POSITIONS,
};

/// Lifecycle of a stake position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    /// Earning rewards.
    Active,
    /// Unstake requested, cooldown running; still earning rewards.
    Unstaking,
    /// Principal and rewards released.
    Completed,
    /// Voided by an admin adjustment.
    Cancelled,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Active => "ACTIVE",
            PositionStatus::Unstaking => "UNSTAKING",
            PositionStatus::Completed => "COMPLETED",
            PositionStatus::Cancelled => "CANCELLED",
        }
    }
}

/// A user's stake in a pool.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StakePosition {
    pub id: String,
    pub user_id: String,
    pub pool_id: String,
    /// Staked principal.
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    /// Earned but unclaimed rewards.
    #[schema(value_type = String)]
    pub rewards_accrued: BigDecimal,
    /// Lifetime claimed rewards.
    #[schema(value_type = String)]
    pub rewards_claimed: BigDecimal,
    /// Accrual high-water mark; advanced in the same transaction as every
    /// reward posting, which makes accrual idempotent.
    pub last_reward_calculation: DateTime<Utc>,
    pub status: PositionStatus,
    /// Unstake refused before this instant (fixed pools).
    pub locked_until: Option<DateTime<Utc>>,
    /// Set when cooldown starts; the sweep finalizes at or after it.
    pub cooldown_ends_at: Option<DateTime<Utc>>,
    pub unstaked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Repository for stake positions.
pub struct PositionRepo<'a, T> {
    tx: &'a T,
}

impl<'a, T: Reader> PositionRepo<'a, T> {
    pub fn new(tx: &'a T) -> Self {
        Self { tx }
    }

    pub fn get(&self, position_id: &str) -> StoreResult<Option<StakePosition>> {
        self.tx.get(STAKE_POSITIONS, position_id)
    }

    pub fn require(&self, position_id: &str) -> StoreResult<StakePosition> {
        self.get(position_id)?
            .ok_or_else(|| StoreError::NotFound(format!("stake position {position_id}")))
    }

    pub fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<StakePosition>> {
        let ids = self
            .tx
            .scan_ids(POSITIONS_BY_USER, &composite_prefix(&[user_id]))?;
        let mut positions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(position) = self.get(&id)? {
                positions.push(position);
            }
        }
        Ok(positions)
    }

    /// Every position in one status; drives the accrual and cooldown sweeps.
    pub fn list_by_status(&self, status: PositionStatus) -> StoreResult<Vec<StakePosition>> {
        let ids = self
            .tx
            .scan_ids(POSITIONS_BY_STATUS, &composite_prefix(&[status.as_str()]))?;
        let mut positions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(position) = self.get(&id)? {
                positions.push(position);
            }
        }
        Ok(positions)
    }
}

impl<'a, T: Writer> PositionRepo<'a, T> {
    pub fn insert(&self, position: &StakePosition) -> StoreResult<()> {
        self.tx.index_put_by(
            POSITIONS_BY_USER,
            &composite_key(&[&position.user_id, &position.id]),
            &position.id,
        )?;
        self.tx.index_put_by(
            POSITIONS_BY_STATUS,
            &composite_key(&[position.status.as_str(), &position.id]),
            &position.id,
        )?;
        self.tx.insert_new(STAKE_POSITIONS, &position.id, position)
    }

    /// Persist a position, moving its status index entry if needed.
    pub fn update(&self, position: &StakePosition) -> StoreResult<()> {
        let previous: Option<StakePosition> = self.tx.get(STAKE_POSITIONS, &position.id)?;
        if let Some(previous) = previous {
            if previous.status != position.status {
                self.tx.delete_by(
                    POSITIONS_BY_STATUS,
                    &composite_key(&[previous.status.as_str(), &position.id]),
                )?;
                self.tx.index_put_by(
                    POSITIONS_BY_STATUS,
                    &composite_key(&[position.status.as_str(), &position.id]),
                    &position.id,
                )?;
            }
        }
        self.tx.put(STAKE_POSITIONS, &position.id, position)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use bigdecimal::Zero;

    pub fn active(user_id: &str, pool_id: &str, amount: BigDecimal, now: DateTime<Utc>) -> StakePosition {
        StakePosition {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            pool_id: pool_id.to_string(),
            amount,
            rewards_accrued: BigDecimal::zero(),
            rewards_claimed: BigDecimal::zero(),
            last_reward_calculation: now,
            status: PositionStatus::Active,
            locked_until: None,
            cooldown_ends_at: None,
            unstaked_at: None,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::temp_store;
    use super::fixtures;
    use super::*;

    #[test]
    fn status_index_follows_transitions() {
        let (_dir, store) = temp_store();
        let mut position =
            fixtures::active("u1", "p1", BigDecimal::from(5u32), Utc::now());
        store.write(|tx| PositionRepo::new(tx).insert(&position)).unwrap();

        let active = store
            .read(|tx| PositionRepo::new(tx).list_by_status(PositionStatus::Active))
            .unwrap();
        assert_eq!(active.len(), 1);

        position.status = PositionStatus::Unstaking;
        store.write(|tx| PositionRepo::new(tx).update(&position)).unwrap();

        let (active, unstaking) = store
            .read(|tx| {
                let repo = PositionRepo::new(tx);
                Ok((
                    repo.list_by_status(PositionStatus::Active)?,
                    repo.list_by_status(PositionStatus::Unstaking)?,
                ))
            })
            .unwrap();
        assert!(active.is_empty());
        assert_eq!(unstaking.len(), 1);
    }

    #[test]
    fn user_listing_isolates_owners() {
        let (_dir, store) = temp_store();
        store
            .write(|tx| {
                let repo = PositionRepo::new(tx);
                repo.insert(&fixtures::active("u1", "p1", BigDecimal::from(1u32), Utc::now()))?;
                repo.insert(&fixtures::active("u2", "p1", BigDecimal::from(2u32), Utc::now()))
            })
            .unwrap();

        let mine = store.read(|tx| PositionRepo::new(tx).list_for_user("u1")).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].user_id, "u1");
    }
}
