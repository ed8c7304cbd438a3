// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deposit address derivation.
//!
//! The platform allocates one receiving address per (user, chain) from a
//! signer holding the master seed. The seed never leaves this module;
//! production deployments are expected to substitute an HSM/KMS-backed
//! implementation of [`HdSigner`].

use alloy::primitives::keccak256;
use hmac::{Hmac, Mac};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::Sha512;

/// Errors from address derivation.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("derived key material is invalid")]
    InvalidKeyMaterial,

    #[error("signer has no seed configured")]
    NoSeed,
}

/// Derives platform-controlled deposit addresses.
pub trait HdSigner: Send + Sync {
    /// Derive the address at `index` on the standard EVM account path.
    ///
    /// Returns the lowercase address and the derivation path recorded with
    /// the deposit address row.
    fn derive_address(&self, chain_id: &str, index: u64) -> Result<(String, String), SignerError>;
}

/// Seed-backed signer deriving keys with HMAC-SHA512 over the path.
///
/// Deterministic per (seed, path): restoring the same seed reproduces every
/// allocated address.
pub struct LocalHdSigner {
    master_seed: Vec<u8>,
}

impl LocalHdSigner {
    pub fn new(master_seed: impl Into<Vec<u8>>) -> Self {
        Self {
            master_seed: master_seed.into(),
        }
    }

    fn derive_signing_key(&self, path: &str) -> Result<SigningKey, SignerError> {
        if self.master_seed.is_empty() {
            return Err(SignerError::NoSeed);
        }
        let mut mac = Hmac::<Sha512>::new_from_slice(&self.master_seed)
            .map_err(|_| SignerError::InvalidKeyMaterial)?;
        mac.update(path.as_bytes());
        let digest = mac.finalize().into_bytes();
        SigningKey::from_slice(&digest[..32]).map_err(|_| SignerError::InvalidKeyMaterial)
    }
}

/// Standard EVM account path for a derivation index.
pub fn derivation_path(index: u64) -> String {
    format!("m/44'/60'/0'/0/{index}")
}

/// Lowercase EVM address for a secp256k1 signing key.
fn address_of(key: &SigningKey) -> String {
    let public = key.verifying_key().to_encoded_point(false);
    // Uncompressed point: 0x04 prefix then 64 bytes of coordinates.
    let hash = keccak256(&public.as_bytes()[1..]);
    format!("0x{}", alloy::hex::encode(&hash[12..]))
}

impl HdSigner for LocalHdSigner {
    fn derive_address(&self, _chain_id: &str, index: u64) -> Result<(String, String), SignerError> {
        let path = derivation_path(index);
        let key = self.derive_signing_key(&path)?;
        Ok((address_of(&key), path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let signer = LocalHdSigner::new(b"test seed".to_vec());
        let (addr_a, path_a) = signer.derive_address("c1", 0).unwrap();
        let (addr_b, path_b) = signer.derive_address("c1", 0).unwrap();
        assert_eq!(addr_a, addr_b);
        assert_eq!(path_a, "m/44'/60'/0'/0/0");
        assert_eq!(path_b, path_a);
    }

    #[test]
    fn indexes_give_distinct_addresses() {
        let signer = LocalHdSigner::new(b"test seed".to_vec());
        let (addr_0, _) = signer.derive_address("c1", 0).unwrap();
        let (addr_1, _) = signer.derive_address("c1", 1).unwrap();
        assert_ne!(addr_0, addr_1);
    }

    #[test]
    fn different_seeds_give_different_addresses() {
        let a = LocalHdSigner::new(b"seed a".to_vec());
        let b = LocalHdSigner::new(b"seed b".to_vec());
        assert_ne!(
            a.derive_address("c1", 0).unwrap().0,
            b.derive_address("c1", 0).unwrap().0
        );
    }

    #[test]
    fn addresses_are_lowercase_evm_shaped() {
        let signer = LocalHdSigner::new(b"test seed".to_vec());
        let (addr, _) = signer.derive_address("c1", 7).unwrap();
        assert_eq!(addr.len(), 42);
        assert!(addr.starts_with("0x"));
        assert_eq!(addr, addr.to_lowercase());
    }

    #[test]
    fn empty_seed_is_refused() {
        let signer = LocalHdSigner::new(Vec::new());
        assert!(matches!(
            signer.derive_address("c1", 0),
            Err(SignerError::NoSeed)
        ));
    }
}
