// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! TOTP two-factor codes and recovery codes.
//!
//! Codes follow RFC 6238: SHA-1, 6 digits, 30 second step, one step of
//! skew in each direction. Verification time comes from the injected
//! clock, never the system time.

use chrono::{DateTime, Utc};
use rand::RngCore;
use totp_rs::{Algorithm, TOTP};

use super::AuthError;
use crate::crypto::sha256_hex;

/// Secret length in bytes (160 bits, the RFC 4226 recommendation).
const SECRET_LEN: usize = 20;

/// Digits per code.
const DIGITS: usize = 6;

/// Step seconds.
const STEP: u64 = 30;

/// Steps of clock skew tolerated on either side.
const SKEW: u8 = 1;

/// Number of recovery codes issued when 2FA is enabled.
pub const RECOVERY_CODE_COUNT: usize = 10;

/// Characters of one recovery code.
const RECOVERY_CODE_LEN: usize = 8;

/// Base32 alphabet (RFC 4648, no padding) used for secrets and codes.
const BASE32_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Generate a fresh base32-encoded TOTP secret.
pub fn generate_secret() -> String {
    let mut raw = [0u8; SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut raw);
    base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &raw)
}

/// Provisioning URL for authenticator apps.
pub fn provisioning_url(secret: &str, account_email: &str, issuer: &str) -> String {
    format!(
        "otpauth://totp/{issuer}:{account_email}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits={DIGITS}&period={STEP}"
    )
}

fn totp_for(secret: &str) -> Result<TOTP, AuthError> {
    let raw = base32::decode(base32::Alphabet::Rfc4648 { padding: false }, secret)
        .ok_or_else(|| AuthError::Internal("stored TOTP secret is not base32".into()))?;
    TOTP::new(Algorithm::SHA1, DIGITS, SKEW, STEP, raw)
        .map_err(|e| AuthError::Internal(format!("totp init: {e}")))
}

/// Check a 6-digit code against a base32 secret at `now`.
pub fn verify_code(secret: &str, code: &str, now: DateTime<Utc>) -> Result<bool, AuthError> {
    let totp = totp_for(secret)?;
    Ok(totp.check(code, now.timestamp().max(0) as u64))
}

/// Current code for a secret; test and provisioning helper.
pub fn current_code(secret: &str, now: DateTime<Utc>) -> Result<String, AuthError> {
    let totp = totp_for(secret)?;
    Ok(totp.generate(now.timestamp().max(0) as u64))
}

/// Mint the plaintext recovery codes handed to the user exactly once.
pub fn generate_recovery_codes() -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..RECOVERY_CODE_COUNT)
        .map(|_| {
            (0..RECOVERY_CODE_LEN)
                .map(|_| {
                    let idx = (rng.next_u32() as usize) % BASE32_ALPHABET.len();
                    BASE32_ALPHABET[idx] as char
                })
                .collect()
        })
        .collect()
}

/// Digest stored in place of a recovery code.
pub fn hash_recovery_code(code: &str) -> String {
    sha256_hex(code.to_uppercase().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn generated_secret_is_base32() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 32);
        assert!(secret.bytes().all(|b| BASE32_ALPHABET.contains(&b)));
    }

    #[test]
    fn code_verifies_at_same_instant() {
        let secret = generate_secret();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 15).unwrap();
        let code = current_code(&secret, now).unwrap();
        assert!(verify_code(&secret, &code, now).unwrap());
    }

    #[test]
    fn one_step_of_skew_is_tolerated() {
        let secret = generate_secret();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 15).unwrap();
        let code = current_code(&secret, now).unwrap();

        assert!(verify_code(&secret, &code, now + chrono::Duration::seconds(30)).unwrap());
        assert!(verify_code(&secret, &code, now - chrono::Duration::seconds(30)).unwrap());
        // Two steps away is outside the window.
        assert!(!verify_code(&secret, &code, now + chrono::Duration::seconds(90)).unwrap());
    }

    #[test]
    fn wrong_code_fails() {
        let secret = generate_secret();
        let now = Utc::now();
        assert!(!verify_code(&secret, "000000", now).unwrap()
            || current_code(&secret, now).unwrap() == "000000");
    }

    #[test]
    fn recovery_codes_have_expected_shape() {
        let codes = generate_recovery_codes();
        assert_eq!(codes.len(), RECOVERY_CODE_COUNT);
        for code in &codes {
            assert_eq!(code.len(), 8);
            assert!(code.bytes().all(|b| BASE32_ALPHABET.contains(&b)));
        }
        // Overwhelmingly likely to be distinct.
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn recovery_hash_is_case_insensitive() {
        assert_eq!(hash_recovery_code("abcd2345"), hash_recovery_code("ABCD2345"));
    }

    #[test]
    fn provisioning_url_embeds_secret_and_issuer() {
        let url = provisioning_url("SECRETBASE32", "a@b.com", "StakeVault");
        assert!(url.starts_with("otpauth://totp/StakeVault:a@b.com?"));
        assert!(url.contains("secret=SECRETBASE32"));
        assert!(url.contains("period=30"));
    }
}
