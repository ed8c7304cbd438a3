// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Monetary decimal helpers.
//!
//! All ledger amounts are arbitrary-precision [`BigDecimal`] values. No
//! floating point touches the ledger path. Amounts are normalized to at
//! most [`AMOUNT_SCALE`] fractional digits before persistence so that
//! repeated accrual arithmetic cannot grow digits without bound.

use bigdecimal::{BigDecimal, Zero};
use std::str::FromStr;

/// Maximum fractional digits carried by a persisted amount.
///
/// Matches the largest token precision the platform supports (18-decimal
/// EVM assets).
pub const AMOUNT_SCALE: i64 = 18;

/// Seconds in a non-leap year, the accrual denominator.
pub const SECONDS_PER_YEAR: u64 = 365 * 86_400;

/// Normalize an amount to the persisted scale, rounding half-up.
pub fn quantize(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(AMOUNT_SCALE, bigdecimal::RoundingMode::HalfUp)
}

/// True when `value` is strictly positive.
pub fn is_positive(value: &BigDecimal) -> bool {
    value > &BigDecimal::zero()
}

/// Parse a decimal amount string.
///
/// Accepts only `^\d+(\.\d+)?$`: no sign, no exponent, no leading dot.
/// This is deliberately stricter than [`BigDecimal::from_str`], which
/// accepts scientific notation and signs.
pub fn parse_amount(input: &str) -> Option<BigDecimal> {
    let mut parts = input.splitn(2, '.');
    let whole = parts.next()?;
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Some(frac) = parts.next() {
        if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }
    BigDecimal::from_str(input).ok()
}

/// Simple-interest reward for a principal over `elapsed_secs` at `apr`
/// (a decimal percentage, e.g. `10` means 10%/year).
///
/// `reward = principal * apr / 100 / SECONDS_PER_YEAR * elapsed`
pub fn accrued_reward(principal: &BigDecimal, apr: &BigDecimal, elapsed_secs: u64) -> BigDecimal {
    if elapsed_secs == 0 || !is_positive(principal) || !is_positive(apr) {
        return BigDecimal::zero();
    }
    let numerator = principal * apr * BigDecimal::from(elapsed_secs);
    let denominator = BigDecimal::from(100u64 * SECONDS_PER_YEAR);
    quantize(&(numerator / denominator))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn parse_accepts_plain_decimals() {
        assert_eq!(parse_amount("1.5"), Some(dec("1.5")));
        assert_eq!(parse_amount("0.000000000000000001"), Some(dec("0.000000000000000001")));
        assert_eq!(parse_amount("42"), Some(dec("42")));
    }

    #[test]
    fn parse_rejects_signs_exponents_and_fragments() {
        for bad in ["-1", "+1", "1e5", ".5", "1.", "", "1.2.3", "abc", "1,5"] {
            assert!(parse_amount(bad).is_none(), "accepted {bad:?}");
        }
    }

    #[test]
    fn one_year_at_ten_percent_yields_ten_percent() {
        let reward = accrued_reward(&dec("1.0"), &dec("10"), SECONDS_PER_YEAR);
        assert_eq!(reward, quantize(&dec("0.1")));
    }

    #[test]
    fn one_minute_accrual_is_tiny_but_nonzero() {
        let reward = accrued_reward(&dec("1000"), &dec("4.5"), 60);
        assert!(is_positive(&reward));
        assert!(reward < dec("0.0001"));
    }

    #[test]
    fn zero_elapsed_accrues_nothing() {
        assert_eq!(accrued_reward(&dec("5"), &dec("10"), 0), BigDecimal::zero());
    }

    #[test]
    fn quantize_bounds_fraction_digits() {
        let raw = dec("1") / dec("3");
        let q = quantize(&raw);
        let s = q.to_string();
        let frac = s.split('.').nth(1).unwrap();
        assert!(frac.len() as i64 <= AMOUNT_SCALE);
    }
}
