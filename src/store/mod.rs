// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Embedded Transactional Store
//!
//! Persistence for the whole platform, backed by redb (pure Rust, ACID).
//! Rows are JSON documents keyed by opaque ids; secondary indexes are
//! composite byte keys (`part|part|part`) resolved with prefix range scans.
//!
//! ## Transaction discipline
//!
//! redb has a single writer, so every write transaction is serializable by
//! construction. [`Store::write`] is the one entry point for multi-row
//! mutations: the closure either commits atomically or the transaction is
//! aborted and nothing applies. Ledger appends, balance projection updates,
//! and state-machine transitions always share one `write` closure.
//!
//! Read-only queries use [`Store::read`], which runs on an MVCC snapshot
//! and never blocks the writer.
//!
//! ## Table Layout
//!
//! Primary tables map `id → JSON row`. Index tables map a composite key to
//! the primary id. The `counters` table holds monotonic sequences (ledger
//! order, audit order, derivation indexes).

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{de::DeserializeOwned, Serialize};

pub mod audit;
pub mod catalog;
pub mod deposits;
pub mod notifications;
pub mod pools;
pub mod positions;
pub mod sessions;
pub mod system;
pub mod treasury;
pub mod twofactor;
pub mod users;
pub mod whitelist;
pub mod withdrawals;

pub use audit::{AuditLogEntry, AuditRepo};
pub use catalog::{Asset, AssetRepo, Chain, ChainRepo};
pub use deposits::{Deposit, DepositAddress, DepositRepo, DepositStatus};
pub use notifications::{Notification, NotificationRepo};
pub use pools::{AprSchedule, Pool, PoolRepo, PoolType};
pub use positions::{PositionRepo, PositionStatus, StakePosition};
pub use sessions::{Session, SessionRepo};
pub use system::SystemConfigRepo;
pub use treasury::{TreasuryRepo, TreasuryWallet};
pub use twofactor::{RecoveryCode, TwoFactorRepo, TwoFactorSecret};
pub use users::{KycStatus, User, UserRepo};
pub use whitelist::{WhitelistEntry, WhitelistRepo};
pub use withdrawals::{
    PayoutStatus, PayoutTx, WithdrawalRepo, WithdrawalRequest, WithdrawalStatus,
};

/// Primary tables: `&str` id → JSON bytes.
pub type StrTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Index tables: composite byte key → primary id bytes.
pub type BytesTable = TableDefinition<'static, &'static [u8], &'static [u8]>;

// =============================================================================
// Table Definitions
// =============================================================================

pub const USERS: StrTable = TableDefinition::new("users");
pub const USERS_BY_EMAIL: StrTable = TableDefinition::new("users_by_email");

pub const SESSIONS: StrTable = TableDefinition::new("sessions");
pub const SESSIONS_BY_TOKEN: StrTable = TableDefinition::new("sessions_by_token");
/// Key: `user_id|session_id`.
pub const SESSIONS_BY_USER: BytesTable = TableDefinition::new("sessions_by_user");

pub const TWO_FACTOR: StrTable = TableDefinition::new("two_factor");
/// Key: `user_id|code_hash`.
pub const RECOVERY_CODES: BytesTable = TableDefinition::new("recovery_codes");

pub const CHAINS: StrTable = TableDefinition::new("chains");
pub const CHAINS_BY_SLUG: StrTable = TableDefinition::new("chains_by_slug");
pub const ASSETS: StrTable = TableDefinition::new("assets");

pub const POOLS: StrTable = TableDefinition::new("pools");
/// Key: `pool_id|effective_from_be|schedule_id`, ordered by effective date.
pub const APR_SCHEDULES: BytesTable = TableDefinition::new("apr_schedules");

pub const DEPOSIT_ADDRESSES: StrTable = TableDefinition::new("deposit_addresses");
/// Key: `user_id|chain_id`. Unique per (user, chain).
pub const DEPOSIT_ADDRESSES_BY_OWNER: BytesTable =
    TableDefinition::new("deposit_addresses_by_owner");
/// Key: `chain_id|address` (lowercase). Resolves scanner hits to owners.
pub const DEPOSIT_ADDRESSES_BY_ADDRESS: BytesTable =
    TableDefinition::new("deposit_addresses_by_address");

pub const DEPOSITS: StrTable = TableDefinition::new("deposits");
/// Key: `chain_id|tx_hash|log_index`. The on-chain outpoint, unique.
pub const DEPOSITS_BY_OUTPOINT: BytesTable = TableDefinition::new("deposits_by_outpoint");
/// Key: `user_id|deposit_id`.
pub const DEPOSITS_BY_USER: BytesTable = TableDefinition::new("deposits_by_user");
/// Key: `status|deposit_id`. Maintained on every status change.
pub const DEPOSITS_BY_STATUS: BytesTable = TableDefinition::new("deposits_by_status");

pub const STAKE_POSITIONS: StrTable = TableDefinition::new("stake_positions");
/// Key: `user_id|position_id`.
pub const POSITIONS_BY_USER: BytesTable = TableDefinition::new("positions_by_user");
/// Key: `status|position_id`. Drives the accrual and cooldown sweeps.
pub const POSITIONS_BY_STATUS: BytesTable = TableDefinition::new("positions_by_status");

pub const WITHDRAWALS: StrTable = TableDefinition::new("withdrawals");
pub const WITHDRAWALS_BY_KEY: StrTable = TableDefinition::new("withdrawals_by_key");
/// Key: `user_id|inverted_ts|withdrawal_id`, newest first.
pub const WITHDRAWALS_BY_USER: BytesTable = TableDefinition::new("withdrawals_by_user");
/// Key: `status|withdrawal_id`.
pub const WITHDRAWALS_BY_STATUS: BytesTable = TableDefinition::new("withdrawals_by_status");

/// Keyed by withdrawal request id (one payout attempt record per request).
pub const PAYOUTS: StrTable = TableDefinition::new("payouts");

/// Key: `user_id|asset_id|chain_id|seq_be`. Append-only journal.
pub const LEDGER: BytesTable = TableDefinition::new("ledger");
/// Key: `entry_type|reference_type|reference_id`. Enforces one-shot
/// transitions (a confirmed deposit credits exactly once, ...).
pub const LEDGER_ONESHOT: BytesTable = TableDefinition::new("ledger_oneshot");
/// Key: `user_id|asset_id|chain_id`. Materialized balance projection.
pub const BALANCES: BytesTable = TableDefinition::new("balances");

/// Key: `user_id|chain_id|address` (lowercase).
pub const WHITELIST: BytesTable = TableDefinition::new("whitelist");

pub const TREASURY: StrTable = TableDefinition::new("treasury_wallets");
/// Key: `chain_id|wallet_id`.
pub const TREASURY_BY_CHAIN: BytesTable = TableDefinition::new("treasury_by_chain");

/// Key: `seq_be`. Append-only admin action log.
pub const AUDIT_LOG: BytesTable = TableDefinition::new("audit_log");

/// Key: `user_id|inverted_ts|notification_id`, newest first.
pub const NOTIFICATIONS: BytesTable = TableDefinition::new("notifications");

pub const SYSTEM_CONFIG: StrTable = TableDefinition::new("system_config");

/// Monotonic sequences, value = u64 big-endian.
pub const COUNTERS: StrTable = TableDefinition::new("counters");

const ALL_STR_TABLES: [StrTable; 14] = [
    USERS,
    USERS_BY_EMAIL,
    SESSIONS,
    SESSIONS_BY_TOKEN,
    TWO_FACTOR,
    CHAINS,
    CHAINS_BY_SLUG,
    ASSETS,
    POOLS,
    DEPOSIT_ADDRESSES,
    DEPOSITS,
    STAKE_POSITIONS,
    WITHDRAWALS,
    WITHDRAWALS_BY_KEY,
];

const ALL_STR_TABLES_B: [StrTable; 4] = [PAYOUTS, TREASURY, SYSTEM_CONFIG, COUNTERS];

const ALL_BYTES_TABLES: [BytesTable; 16] = [
    SESSIONS_BY_USER,
    RECOVERY_CODES,
    APR_SCHEDULES,
    DEPOSIT_ADDRESSES_BY_OWNER,
    DEPOSIT_ADDRESSES_BY_ADDRESS,
    DEPOSITS_BY_OUTPOINT,
    DEPOSITS_BY_USER,
    DEPOSITS_BY_STATUS,
    POSITIONS_BY_USER,
    POSITIONS_BY_STATUS,
    WITHDRAWALS_BY_USER,
    WITHDRAWALS_BY_STATUS,
    LEDGER,
    LEDGER_ONESHOT,
    BALANCES,
    WHITELIST,
];

const ALL_BYTES_TABLES_B: [BytesTable; 3] = [TREASURY_BY_CHAIN, AUDIT_LOG, NOTIFICATIONS];

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Composite Key Helpers
// =============================================================================

/// Join key parts with `|`. Parts must not themselves contain `|`; ids are
/// UUIDs and addresses are hex, so this holds everywhere keys are built.
pub fn composite_key(parts: &[&str]) -> Vec<u8> {
    let mut key = Vec::with_capacity(parts.iter().map(|p| p.len() + 1).sum());
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(b'|');
        }
        key.extend_from_slice(part.as_bytes());
    }
    key
}

/// Prefix for scanning all keys starting with `parts` (trailing `|`).
pub fn composite_prefix(parts: &[&str]) -> Vec<u8> {
    let mut prefix = composite_key(parts);
    prefix.push(b'|');
    prefix
}

/// Upper bound for a prefix range scan.
fn prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    end.extend_from_slice(&[0xFF; 24]);
    end
}

/// Big-endian timestamp bytes inverted for newest-first ordering.
pub fn inverted_ts(timestamp: i64) -> [u8; 8] {
    (!(timestamp as u64)).to_be_bytes()
}

/// Big-endian sequence bytes for oldest-first ordering.
pub fn seq_bytes(seq: u64) -> [u8; 8] {
    seq.to_be_bytes()
}

// =============================================================================
// Transaction Contexts
// =============================================================================

/// Read operations shared by snapshots and write transactions.
pub trait Reader {
    /// Fetch and deserialize a row by id.
    fn get<T: DeserializeOwned>(&self, table: StrTable, key: &str) -> StoreResult<Option<T>>;

    /// Fetch a row stored under a composite byte key.
    fn get_by<T: DeserializeOwned>(&self, table: BytesTable, key: &[u8]) -> StoreResult<Option<T>>;

    /// Resolve an index entry (`&str` key) to the primary id it points at.
    fn index_get(&self, table: StrTable, key: &str) -> StoreResult<Option<String>>;

    /// Resolve an index entry (composite key) to the primary id.
    fn index_get_by(&self, table: BytesTable, key: &[u8]) -> StoreResult<Option<String>>;

    /// Scan an index table for every id under `prefix`, in key order.
    fn scan_ids(&self, table: BytesTable, prefix: &[u8]) -> StoreResult<Vec<String>>;

    /// Scan rows stored under composite keys with the given prefix.
    fn scan_rows<T: DeserializeOwned>(
        &self,
        table: BytesTable,
        prefix: &[u8],
    ) -> StoreResult<Vec<(Vec<u8>, T)>>;

    /// All rows of a primary table, in key order.
    fn scan_all<T: DeserializeOwned>(&self, table: StrTable) -> StoreResult<Vec<(String, T)>>;

    /// Current value of a counter without advancing it.
    fn peek_counter(&self, name: &str) -> StoreResult<u64>;
}

/// Mutating operations, only available inside [`Store::write`].
pub trait Writer: Reader {
    /// Insert or replace a row.
    fn put<T: Serialize>(&self, table: StrTable, key: &str, value: &T) -> StoreResult<()>;

    /// Insert or replace a row under a composite key.
    fn put_by<T: Serialize>(&self, table: BytesTable, key: &[u8], value: &T) -> StoreResult<()>;

    /// Insert a row, failing with [`StoreError::Conflict`] if the key exists.
    fn insert_new<T: Serialize>(&self, table: StrTable, key: &str, value: &T) -> StoreResult<()>;

    /// Point an index entry at a primary id.
    fn index_put(&self, table: StrTable, key: &str, id: &str) -> StoreResult<()>;

    /// Point a composite index entry at a primary id.
    fn index_put_by(&self, table: BytesTable, key: &[u8], id: &str) -> StoreResult<()>;

    /// Create an index entry, failing with [`StoreError::Conflict`] if the
    /// key is already mapped. The uniqueness backbone for idempotency keys,
    /// deposit outpoints, and one-shot ledger transitions.
    fn index_insert_unique(&self, table: StrTable, key: &str, id: &str) -> StoreResult<()>;

    /// Composite-key variant of [`Writer::index_insert_unique`].
    fn index_insert_unique_by(&self, table: BytesTable, key: &[u8], id: &str) -> StoreResult<()>;

    /// Remove a row or index entry.
    fn delete(&self, table: StrTable, key: &str) -> StoreResult<()>;

    /// Remove a composite-keyed row or index entry.
    fn delete_by(&self, table: BytesTable, key: &[u8]) -> StoreResult<()>;

    /// Advance a named counter and return the new value (first call yields 1).
    fn next_counter(&self, name: &str) -> StoreResult<u64>;
}

/// MVCC read snapshot.
pub struct Snapshot {
    txn: redb::ReadTransaction,
}

/// Serializable write transaction.
pub struct WriteCtx {
    txn: redb::WriteTransaction,
}

fn read_value<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

macro_rules! impl_reader {
    ($ctx:ty) => {
        impl Reader for $ctx {
            fn get<T: DeserializeOwned>(
                &self,
                table: StrTable,
                key: &str,
            ) -> StoreResult<Option<T>> {
                let table = self.txn.open_table(table)?;
                let result = match table.get(key)? {
                    Some(guard) => Ok(Some(read_value(guard.value())?)),
                    None => Ok(None),
                };
                result
            }

            fn get_by<T: DeserializeOwned>(
                &self,
                table: BytesTable,
                key: &[u8],
            ) -> StoreResult<Option<T>> {
                let table = self.txn.open_table(table)?;
                let result = match table.get(key)? {
                    Some(guard) => Ok(Some(read_value(guard.value())?)),
                    None => Ok(None),
                };
                result
            }

            fn index_get(&self, table: StrTable, key: &str) -> StoreResult<Option<String>> {
                let table = self.txn.open_table(table)?;
                let result = table
                    .get(key)?
                    .map(|guard| String::from_utf8_lossy(guard.value()).into_owned());
                Ok(result)
            }

            fn index_get_by(&self, table: BytesTable, key: &[u8]) -> StoreResult<Option<String>> {
                let table = self.txn.open_table(table)?;
                let result = table
                    .get(key)?
                    .map(|guard| String::from_utf8_lossy(guard.value()).into_owned());
                Ok(result)
            }

            fn scan_ids(&self, table: BytesTable, prefix: &[u8]) -> StoreResult<Vec<String>> {
                let table = self.txn.open_table(table)?;
                let end = prefix_end(prefix);
                let mut ids = Vec::new();
                for item in table.range::<&[u8]>(prefix..end.as_slice())? {
                    let (_, value) = item?;
                    ids.push(String::from_utf8_lossy(value.value()).into_owned());
                }
                Ok(ids)
            }

            fn scan_rows<T: DeserializeOwned>(
                &self,
                table: BytesTable,
                prefix: &[u8],
            ) -> StoreResult<Vec<(Vec<u8>, T)>> {
                let table = self.txn.open_table(table)?;
                let end = prefix_end(prefix);
                let mut rows = Vec::new();
                for item in table.range::<&[u8]>(prefix..end.as_slice())? {
                    let (key, value) = item?;
                    rows.push((key.value().to_vec(), read_value(value.value())?));
                }
                Ok(rows)
            }

            fn scan_all<T: DeserializeOwned>(
                &self,
                table: StrTable,
            ) -> StoreResult<Vec<(String, T)>> {
                let table = self.txn.open_table(table)?;
                let mut rows = Vec::new();
                for item in table.iter()? {
                    let (key, value) = item?;
                    rows.push((key.value().to_string(), read_value(value.value())?));
                }
                Ok(rows)
            }

            fn peek_counter(&self, name: &str) -> StoreResult<u64> {
                let table = self.txn.open_table(COUNTERS)?;
                let result = table
                    .get(name)?
                    .map(|guard| {
                        let mut buf = [0u8; 8];
                        buf.copy_from_slice(guard.value());
                        u64::from_be_bytes(buf)
                    })
                    .unwrap_or(0);
                Ok(result)
            }
        }
    };
}

impl_reader!(Snapshot);
impl_reader!(WriteCtx);

impl Writer for WriteCtx {
    fn put<T: Serialize>(&self, table: StrTable, key: &str, value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec(value)?;
        let mut table = self.txn.open_table(table)?;
        table.insert(key, bytes.as_slice())?;
        Ok(())
    }

    fn put_by<T: Serialize>(&self, table: BytesTable, key: &[u8], value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec(value)?;
        let mut table = self.txn.open_table(table)?;
        table.insert(key, bytes.as_slice())?;
        Ok(())
    }

    fn insert_new<T: Serialize>(&self, table: StrTable, key: &str, value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec(value)?;
        let mut table = self.txn.open_table(table)?;
        if table.get(key)?.is_some() {
            return Err(StoreError::Conflict(format!("row {key} already exists")));
        }
        table.insert(key, bytes.as_slice())?;
        Ok(())
    }

    fn index_put(&self, table: StrTable, key: &str, id: &str) -> StoreResult<()> {
        let mut table = self.txn.open_table(table)?;
        table.insert(key, id.as_bytes())?;
        Ok(())
    }

    fn index_put_by(&self, table: BytesTable, key: &[u8], id: &str) -> StoreResult<()> {
        let mut table = self.txn.open_table(table)?;
        table.insert(key, id.as_bytes())?;
        Ok(())
    }

    fn index_insert_unique(&self, table: StrTable, key: &str, id: &str) -> StoreResult<()> {
        let mut table = self.txn.open_table(table)?;
        if table.get(key)?.is_some() {
            return Err(StoreError::Conflict(format!("index key {key} already mapped")));
        }
        table.insert(key, id.as_bytes())?;
        Ok(())
    }

    fn index_insert_unique_by(&self, table: BytesTable, key: &[u8], id: &str) -> StoreResult<()> {
        let mut table = self.txn.open_table(table)?;
        if table.get(key)?.is_some() {
            return Err(StoreError::Conflict(format!(
                "index key {} already mapped",
                String::from_utf8_lossy(key)
            )));
        }
        table.insert(key, id.as_bytes())?;
        Ok(())
    }

    fn delete(&self, table: StrTable, key: &str) -> StoreResult<()> {
        let mut table = self.txn.open_table(table)?;
        table.remove(key)?;
        Ok(())
    }

    fn delete_by(&self, table: BytesTable, key: &[u8]) -> StoreResult<()> {
        let mut table = self.txn.open_table(table)?;
        table.remove(key)?;
        Ok(())
    }

    fn next_counter(&self, name: &str) -> StoreResult<u64> {
        let mut table = self.txn.open_table(COUNTERS)?;
        let current = table
            .get(name)?
            .map(|guard| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(guard.value());
                u64::from_be_bytes(buf)
            })
            .unwrap_or(0);
        let next = current + 1;
        table.insert(name, next.to_be_bytes().as_slice())?;
        Ok(next)
    }
}

// =============================================================================
// Store
// =============================================================================

/// Embedded ACID store shared by the API and background workers.
pub struct Store {
    db: Database,
}

impl Store {
    /// Open (or create) the database at the given path and pre-create all
    /// tables so read snapshots never observe a missing table.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            for table in ALL_STR_TABLES.iter().chain(ALL_STR_TABLES_B.iter()) {
                let _ = write_txn.open_table(*table)?;
            }
            for table in ALL_BYTES_TABLES.iter().chain(ALL_BYTES_TABLES_B.iter()) {
                let _ = write_txn.open_table(*table)?;
            }
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Run a read-only closure over an MVCC snapshot.
    ///
    /// Generic over the caller's error type so services can thread their
    /// own domain errors through without wrapping.
    pub fn read<T, E>(&self, f: impl FnOnce(&Snapshot) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let snapshot = Snapshot {
            txn: self.db.begin_read().map_err(StoreError::from)?,
        };
        f(&snapshot)
    }

    /// Run a closure inside one serializable write transaction.
    ///
    /// Commits iff the closure returns `Ok`; any error aborts the whole
    /// transaction, so partial mutations never persist.
    pub fn write<T, E>(&self, f: impl FnOnce(&WriteCtx) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let ctx = WriteCtx {
            txn: self.db.begin_write().map_err(StoreError::from)?,
        };
        match f(&ctx) {
            Ok(value) => {
                ctx.txn.commit().map_err(StoreError::from)?;
                Ok(value)
            }
            Err(err) => {
                ctx.txn.abort().map_err(StoreError::from).ok();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::Store;
    use tempfile::TempDir;

    /// Open a throwaway store in a temp directory.
    pub fn temp_store() -> (TempDir, Store) {
        let dir = TempDir::new().expect("temp dir");
        let store = Store::open(&dir.path().join("test.redb")).expect("open store");
        (dir, store)
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::temp_store;
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        name: String,
        value: u32,
    }

    #[test]
    fn put_get_round_trip() {
        let (_dir, store) = temp_store();
        store
            .write(|tx| {
                tx.put(USERS, "u1", &Row { name: "a".into(), value: 1 })
            })
            .unwrap();

        let row: Option<Row> = store.read(|tx| tx.get(USERS, "u1")).unwrap();
        assert_eq!(row, Some(Row { name: "a".into(), value: 1 }));
    }

    #[test]
    fn failed_write_rolls_back_everything() {
        let (_dir, store) = temp_store();
        let result: StoreResult<()> = store.write(|tx| {
            tx.put(USERS, "u1", &Row { name: "a".into(), value: 1 })?;
            Err(StoreError::Conflict("boom".into()))
        });
        assert!(result.is_err());

        let row: Option<Row> = store.read(|tx| tx.get(USERS, "u1")).unwrap();
        assert_eq!(row, None);
    }

    #[test]
    fn unique_index_rejects_second_mapping() {
        let (_dir, store) = temp_store();
        store
            .write(|tx| tx.index_insert_unique(WITHDRAWALS_BY_KEY, "key-1", "w1"))
            .unwrap();

        let err = store
            .write(|tx| tx.index_insert_unique(WITHDRAWALS_BY_KEY, "key-1", "w2"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // The original mapping survives.
        let id = store.read(|tx| tx.index_get(WITHDRAWALS_BY_KEY, "key-1")).unwrap();
        assert_eq!(id.as_deref(), Some("w1"));
    }

    #[test]
    fn prefix_scan_is_isolated_per_prefix() {
        let (_dir, store) = temp_store();
        store
            .write(|tx| {
                tx.index_put_by(DEPOSITS_BY_USER, &composite_key(&["alice", "d1"]), "d1")?;
                tx.index_put_by(DEPOSITS_BY_USER, &composite_key(&["alice", "d2"]), "d2")?;
                tx.index_put_by(DEPOSITS_BY_USER, &composite_key(&["bob", "d3"]), "d3")
            })
            .unwrap();

        let alice = store
            .read(|tx| tx.scan_ids(DEPOSITS_BY_USER, &composite_prefix(&["alice"])))
            .unwrap();
        assert_eq!(alice, vec!["d1".to_string(), "d2".to_string()]);

        let bob = store
            .read(|tx| tx.scan_ids(DEPOSITS_BY_USER, &composite_prefix(&["bob"])))
            .unwrap();
        assert_eq!(bob, vec!["d3".to_string()]);
    }

    #[test]
    fn counters_advance_monotonically() {
        let (_dir, store) = temp_store();
        let first = store.write(|tx| tx.next_counter("seq")).unwrap();
        let second = store.write(|tx| tx.next_counter("seq")).unwrap();
        assert_eq!((first, second), (1, 2));
        assert_eq!(store.read(|tx| tx.peek_counter("seq")).unwrap(), 2);
        assert_eq!(store.read(|tx| tx.peek_counter("other")).unwrap(), 0);
    }

    #[test]
    fn inverted_timestamps_sort_newest_first() {
        let older = inverted_ts(100);
        let newer = inverted_ts(200);
        assert!(newer < older);
    }
}
