// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! TOTP secrets and one-shot recovery codes.

use serde::{Deserialize, Serialize};

use super::{
    composite_key, composite_prefix, Reader, StoreResult, Writer, RECOVERY_CODES, TWO_FACTOR,
};

/// Encrypted TOTP secret, one per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoFactorSecret {
    pub user_id: String,
    /// AES-256-GCM ciphertext of the base32 secret.
    pub encrypted_secret: String,
    /// Set by the first successful code verification.
    pub is_verified: bool,
}

/// A recovery code usable once in place of a TOTP code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryCode {
    pub user_id: String,
    /// SHA-256 hex of the code; the plaintext is shown once at creation.
    pub code_hash: String,
    pub used: bool,
}

/// Repository for 2FA rows.
pub struct TwoFactorRepo<'a, T> {
    tx: &'a T,
}

impl<'a, T: Reader> TwoFactorRepo<'a, T> {
    pub fn new(tx: &'a T) -> Self {
        Self { tx }
    }

    pub fn secret(&self, user_id: &str) -> StoreResult<Option<TwoFactorSecret>> {
        self.tx.get(TWO_FACTOR, user_id)
    }

    pub fn recovery_code(&self, user_id: &str, code_hash: &str) -> StoreResult<Option<RecoveryCode>> {
        self.tx
            .get_by(RECOVERY_CODES, &composite_key(&[user_id, code_hash]))
    }
}

impl<'a, T: Writer> TwoFactorRepo<'a, T> {
    pub fn put_secret(&self, secret: &TwoFactorSecret) -> StoreResult<()> {
        self.tx.put(TWO_FACTOR, &secret.user_id, secret)
    }

    pub fn delete_secret(&self, user_id: &str) -> StoreResult<()> {
        self.tx.delete(TWO_FACTOR, user_id)
    }

    pub fn put_recovery_code(&self, code: &RecoveryCode) -> StoreResult<()> {
        self.tx.put_by(
            RECOVERY_CODES,
            &composite_key(&[&code.user_id, &code.code_hash]),
            code,
        )
    }

    /// Drop every recovery code for a user (2FA disable or re-setup).
    pub fn clear_recovery_codes(&self, user_id: &str) -> StoreResult<()> {
        let rows: Vec<(Vec<u8>, RecoveryCode)> = self
            .tx
            .scan_rows(RECOVERY_CODES, &composite_prefix(&[user_id]))?;
        for (key, _) in rows {
            self.tx.delete_by(RECOVERY_CODES, &key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::temp_store;
    use super::*;

    #[test]
    fn secret_round_trip_and_verify_flag() {
        let (_dir, store) = temp_store();
        let mut secret = TwoFactorSecret {
            user_id: "u1".into(),
            encrypted_secret: "ciphertext".into(),
            is_verified: false,
        };
        store.write(|tx| TwoFactorRepo::new(tx).put_secret(&secret)).unwrap();

        secret.is_verified = true;
        store.write(|tx| TwoFactorRepo::new(tx).put_secret(&secret)).unwrap();

        let found = store.read(|tx| TwoFactorRepo::new(tx).secret("u1")).unwrap().unwrap();
        assert!(found.is_verified);
    }

    #[test]
    fn recovery_codes_are_per_user_and_clearable() {
        let (_dir, store) = temp_store();
        store
            .write(|tx| {
                let repo = TwoFactorRepo::new(tx);
                for hash in ["h1", "h2"] {
                    repo.put_recovery_code(&RecoveryCode {
                        user_id: "u1".into(),
                        code_hash: hash.into(),
                        used: false,
                    })?;
                }
                repo.put_recovery_code(&RecoveryCode {
                    user_id: "u2".into(),
                    code_hash: "h1".into(),
                    used: false,
                })
            })
            .unwrap();

        let found = store
            .read(|tx| TwoFactorRepo::new(tx).recovery_code("u1", "h1"))
            .unwrap();
        assert!(found.is_some());

        store.write(|tx| TwoFactorRepo::new(tx).clear_recovery_codes("u1")).unwrap();

        let gone = store
            .read(|tx| TwoFactorRepo::new(tx).recovery_code("u1", "h1"))
            .unwrap();
        assert!(gone.is_none());

        // Other users' codes are untouched.
        let other = store
            .read(|tx| TwoFactorRepo::new(tx).recovery_code("u2", "h1"))
            .unwrap();
        assert!(other.is_some());
    }
}
