// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ERC-20 constants, calldata encoding, and base-unit conversion.

use alloy::primitives::{Address, FixedBytes, U256};
use bigdecimal::BigDecimal;
use std::str::FromStr;

use super::ChainError;
use crate::money::quantize;

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: FixedBytes<32> = FixedBytes::new([
    0xdd, 0xf2, 0x52, 0xad, 0x1b, 0xe2, 0xc8, 0x9b, 0x69, 0xc2, 0xb0, 0x68, 0xfc, 0x37, 0x8d, 0xaa,
    0x95, 0x2b, 0xa7, 0xf1, 0x63, 0xc4, 0xa1, 0x16, 0x28, 0xf5, 0x5a, 0x4d, 0xf5, 0x23, 0xb3, 0xef,
]);

/// Selector for `transfer(address,uint256)`.
const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Build `transfer(to, value)` calldata.
pub fn encode_transfer(to: &str, value_raw: &str) -> Result<Vec<u8>, ChainError> {
    let to = Address::from_str(to).map_err(|e| ChainError::InvalidAddress(e.to_string()))?;
    let value = U256::from_str(value_raw)
        .map_err(|_| ChainError::InvalidAmount(value_raw.to_string()))?;

    let mut data = Vec::with_capacity(4 + 32 + 32);
    data.extend_from_slice(&TRANSFER_SELECTOR);
    let mut addr_word = [0u8; 32];
    addr_word[12..].copy_from_slice(to.as_slice());
    data.extend_from_slice(&addr_word);
    data.extend_from_slice(&value.to_be_bytes::<32>());
    Ok(data)
}

/// Convert a decimal token amount to base units (`amount * 10^decimals`).
///
/// Fails when the amount has more fractional digits than the token carries,
/// because truncating a payout silently would move real money.
pub fn to_base_units(amount: &BigDecimal, decimals: u8) -> Result<String, ChainError> {
    let scale = BigDecimal::from_str(&format!("1e{decimals}"))
        .map_err(|e| ChainError::InvalidAmount(e.to_string()))?;
    let scaled = amount * scale;
    if !scaled.is_integer() {
        return Err(ChainError::InvalidAmount(format!(
            "{amount} has more than {decimals} fractional digits"
        )));
    }
    Ok(scaled.with_scale(0).to_string())
}

/// Convert base units back to a decimal token amount.
pub fn from_base_units(value_raw: &str, decimals: u8) -> Result<BigDecimal, ChainError> {
    let value = BigDecimal::from_str(value_raw)
        .map_err(|_| ChainError::InvalidAmount(value_raw.to_string()))?;
    let scale = BigDecimal::from_str(&format!("1e{decimals}"))
        .map_err(|e| ChainError::InvalidAmount(e.to_string()))?;
    Ok(quantize(&(value / scale)))
}
