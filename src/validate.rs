// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Server-side request validation.
//!
//! Every externally supplied field passes through one of these routines
//! before it reaches a service. Each returns the normalized value or a
//! field-scoped message suitable for a 400 response.

use crate::error::ApiError;

/// A rejected field with a human-readable reason.
#[derive(Debug, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::bad_request(format!("{}: {}", err.field, err.message))
    }
}

/// Validate and normalize an email address. Returns it lowercased.
///
/// The check is the practical subset of RFC 5322: one `@`, non-empty local
/// part, domain with at least one dot and no whitespace.
pub fn email(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.len() > 254 {
        return Err(ValidationError::new("email", "too long"));
    }
    let (local, domain) = trimmed
        .split_once('@')
        .ok_or_else(|| ValidationError::new("email", "missing @"))?;
    if local.is_empty()
        || domain.is_empty()
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || trimmed.chars().any(char::is_whitespace)
        || trimmed.matches('@').count() != 1
    {
        return Err(ValidationError::new("email", "not a valid address"));
    }
    Ok(trimmed.to_lowercase())
}

/// Validate password strength: min 8 chars, at least one uppercase,
/// lowercase, digit, and special character.
pub fn password(input: &str) -> Result<(), ValidationError> {
    if input.len() < 8 {
        return Err(ValidationError::new("password", "must be at least 8 characters"));
    }
    let has_upper = input.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = input.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = input.chars().any(|c| c.is_ascii_digit());
    let has_special = input.chars().any(|c| !c.is_ascii_alphanumeric());
    if !(has_upper && has_lower && has_digit && has_special) {
        return Err(ValidationError::new(
            "password",
            "must contain upper case, lower case, digit, and special character",
        ));
    }
    Ok(())
}

/// Validate an Ethereum-style address (`0x` + 40 hex chars). Returns it
/// lowercased; all stored addresses are lowercase.
pub fn evm_address(input: &str) -> Result<String, ValidationError> {
    let rest = input
        .strip_prefix("0x")
        .ok_or_else(|| ValidationError::new("address", "must start with 0x"))?;
    if rest.len() != 40 || !rest.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ValidationError::new("address", "must be 0x followed by 40 hex characters"));
    }
    Ok(input.to_lowercase())
}

/// Validate a positive decimal amount string (`^\d+(\.\d+)?$`, > 0).
pub fn amount(input: &str) -> Result<bigdecimal::BigDecimal, ValidationError> {
    let value = crate::money::parse_amount(input)
        .ok_or_else(|| ValidationError::new("amount", "must be a plain decimal number"))?;
    if !crate::money::is_positive(&value) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }
    Ok(value)
}

/// Validate a 6-digit TOTP code.
pub fn totp_code(input: &str) -> Result<(), ValidationError> {
    if input.len() != 6 || !input.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::new("totpCode", "must be exactly 6 digits"));
    }
    Ok(())
}

/// Clamp pagination parameters: `page >= 1`, `1 <= limit <= 100`.
pub fn pagination(page: Option<u32>, limit: Option<u32>) -> Result<(u32, u32), ValidationError> {
    let page = page.unwrap_or(1);
    let limit = limit.unwrap_or(20);
    if page < 1 {
        return Err(ValidationError::new("page", "must be at least 1"));
    }
    if !(1..=100).contains(&limit) {
        return Err(ValidationError::new("limit", "must be between 1 and 100"));
    }
    Ok((page, limit))
}
