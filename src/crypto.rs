// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Secret encryption and hashing primitives.
//!
//! [`SecretBox`] wraps AES-256-GCM under a key derived from the operator's
//! `MASTER_KEY` via scrypt with a fixed domain salt. It protects the
//! secrets the platform must be able to read back: TOTP secrets and
//! treasury wallet private keys. Ciphertexts are authenticated; tampering
//! fails decryption.
//!
//! Refresh tokens and recovery codes never need to be read back, so they
//! are stored as SHA-256 digests only.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Domain salt for the scrypt master-key derivation.
///
/// Fixed by design: the master key is high-entropy operator input, and the
/// salt only separates this derivation domain from any other use of the key.
const MASTER_KEY_SALT: &[u8] = b"stakevault-secret-box-v1";

/// scrypt cost parameters (N=2^15, r=8, p=1).
const SCRYPT_LOG_N: u8 = 15;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Errors from the secret box.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key derivation failed")]
    KeyDerivation,

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed (wrong key or corrupted ciphertext)")]
    Decrypt,

    #[error("ciphertext is malformed")]
    Malformed,
}

/// Authenticated encryption for stored secrets.
#[derive(Clone)]
pub struct SecretBox {
    key: [u8; 32],
}

impl SecretBox {
    /// Derive the AEAD key from the master key material.
    pub fn from_master_key(master_key: &str) -> Result<Self, CryptoError> {
        let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, 32)
            .map_err(|_| CryptoError::KeyDerivation)?;
        let mut key = [0u8; 32];
        scrypt::scrypt(master_key.as_bytes(), MASTER_KEY_SALT, &params, &mut key)
            .map_err(|_| CryptoError::KeyDerivation)?;
        Ok(Self { key })
    }

    /// Encrypt a secret. Output is base64 of `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|_| CryptoError::Encrypt)?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher.encrypt(nonce, plaintext).map_err(|_| CryptoError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    /// Decrypt a value produced by [`SecretBox::encrypt`].
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, CryptoError> {
        let raw = BASE64.decode(encoded).map_err(|_| CryptoError::Malformed)?;
        if raw.len() <= NONCE_LEN {
            return Err(CryptoError::Malformed);
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);

        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|_| CryptoError::Decrypt)?;
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::Decrypt)
    }

    /// Decrypt into a UTF-8 string.
    pub fn decrypt_string(&self, encoded: &str) -> Result<String, CryptoError> {
        String::from_utf8(self.decrypt(encoded)?).map_err(|_| CryptoError::Malformed)
    }
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("SecretBox").finish_non_exhaustive()
    }
}

/// SHA-256 digest, hex-encoded. Used for refresh tokens and recovery codes.
pub fn sha256_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex_encode(&hasher.finalize())
}

/// Generate a random opaque token of `bytes` entropy bytes, hex-encoded.
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex_encode(&buf)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_encrypt_decrypt() {
        let sb = SecretBox::from_master_key("test-master-key").unwrap();
        let secret = b"JBSWY3DPEHPK3PXP";
        let encrypted = sb.encrypt(secret).unwrap();
        assert_ne!(encrypted.as_bytes(), secret);
        assert_eq!(sb.decrypt(&encrypted).unwrap(), secret);
    }

    #[test]
    fn nonces_differ_between_encryptions() {
        let sb = SecretBox::from_master_key("test-master-key").unwrap();
        let a = sb.encrypt(b"same").unwrap();
        let b = sb.encrypt(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let sb1 = SecretBox::from_master_key("key-one").unwrap();
        let sb2 = SecretBox::from_master_key("key-two").unwrap();
        let encrypted = sb1.encrypt(b"secret").unwrap();
        assert!(matches!(sb2.decrypt(&encrypted), Err(CryptoError::Decrypt)));
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let sb = SecretBox::from_master_key("key").unwrap();
        let encrypted = sb.encrypt(b"secret").unwrap();
        let mut raw = BASE64.decode(&encrypted).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = BASE64.encode(raw);
        assert!(sb.decrypt(&tampered).is_err());
    }

    #[test]
    fn sha256_is_stable() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn random_tokens_are_unique_and_hex() {
        let a = random_token(32);
        let b = random_token(32);
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
    }
}
