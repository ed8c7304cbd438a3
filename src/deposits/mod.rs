// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Deposit Pipeline
//!
//! Address allocation, the per-chain scanner, and the confirmation tracker
//! that turns finalized transfers into ledger credits.

use crate::error::ApiError;
use crate::state::AppState;
use crate::store::{ChainRepo, DepositAddress, DepositRepo, Writer};

pub mod confirm;
pub mod scanner;

/// Return the caller's deposit address on a chain, allocating one on first
/// use.
///
/// The derivation index advances inside the same transaction that inserts
/// the row, so concurrent first calls cannot double-allocate an index; the
/// loser of the (user, chain) uniqueness race re-reads the winner's row.
pub fn get_or_create_address(
    state: &AppState,
    user_id: &str,
    chain_id: &str,
) -> Result<DepositAddress, ApiError> {
    // Fast path outside the writer.
    let existing = state
        .store
        .read(|tx| DepositRepo::new(tx).address_for_owner(user_id, chain_id))?;
    if let Some(address) = existing {
        return Ok(address);
    }

    state.store.write(|tx| {
        let repo = DepositRepo::new(tx);
        if let Some(address) = repo.address_for_owner(user_id, chain_id)? {
            return Ok(address);
        }

        let chain = ChainRepo::new(tx).require(chain_id)?;
        if !chain.is_active {
            return Err(ApiError::domain("CHAIN_INACTIVE", "Chain is not accepting deposits"));
        }

        // Counter is 1-based; derivation indexes are 0-based.
        let index = tx.next_counter(&format!("derivation_index_{chain_id}"))? - 1;
        let (address, path) = state
            .signer
            .derive_address(chain_id, index)
            .map_err(|e| ApiError::internal(format!("address derivation failed: {e}")))?;

        let row = DepositAddress {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            chain_id: chain_id.to_string(),
            address,
            derivation_path: Some(path),
            derivation_index: Some(index),
            created_at: state.clock.now(),
        };
        repo.insert_address(&row)?;
        Ok(row)
    })
}
