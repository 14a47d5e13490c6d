//! Cryptographic primitives (C1): AES-256/GCM, SHA-256, and CSPRNG bytes.
//!
//! # Reference
//! Mirrors the AEAD framing used elsewhere in this workspace's file
//! header/content encryption: ciphertext immediately followed by the
//! 128-bit GCM authentication tag, produced by a single `encrypt` call.

use aead::Payload;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::VaultError;

/// Length in bytes of the AES-256 master key.
pub const KEY_LEN: usize = 32;
/// Length in bytes of a GCM nonce (96 bits).
pub const NONCE_LEN: usize = 12;

/// The 256-bit master key shared by all vaults in a repository.
///
/// Held as `Zeroizing` so the backing buffer is wiped on drop, matching
/// the process-scoped, never-persisted key lifecycle in the spec (§4.1,
/// §9).
pub struct MasterKey(Zeroizing<[u8; KEY_LEN]>);

impl MasterKey {
    /// Parse a master key from 64 lowercase hexadecimal characters.
    ///
    /// # Errors
    /// Returns [`VaultError::InvalidKey`] if `hex_str` is not exactly 64
    /// lowercase hex characters.
    pub fn from_hex(hex_str: &str) -> Result<Self, VaultError> {
        if hex_str.len() != 64 || !hex_str.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(VaultError::InvalidKey);
        }
        if hex_str.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(VaultError::InvalidKey);
        }
        let mut bytes = [0u8; KEY_LEN];
        hex::decode_to_slice(hex_str, &mut bytes).map_err(|_| VaultError::InvalidKey)?;
        Ok(MasterKey(Zeroizing::new(bytes)))
    }

    fn cipher(&self) -> Aes256Gcm {
        let key = Key::<Aes256Gcm>::from_slice(self.0.as_slice());
        Aes256Gcm::new(key)
    }
}

/// A freshly sampled 96-bit GCM nonce.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct NonceBytes(pub [u8; NONCE_LEN]);

impl NonceBytes {
    #[must_use]
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    /// Parse exactly 24 lowercase hex characters into a nonce.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 24 || !s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return None;
        }
        let mut bytes = [0u8; NONCE_LEN];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(NonceBytes(bytes))
    }
}

/// Sample `n` cryptographically secure random bytes.
#[must_use]
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::rng().fill_bytes(&mut buf);
    buf
}

/// Sample a fresh 96-bit nonce. Callers must use each nonce for exactly
/// one encryption under the single master key (invariant I2).
#[must_use]
pub fn random_nonce() -> NonceBytes {
    let mut bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut bytes);
    NonceBytes(bytes)
}

/// Encrypt `plaintext` under `key`/`nonce` with AES-256-GCM, with no
/// additional authenticated data. Output is ciphertext immediately
/// followed by the 128-bit tag.
#[must_use]
pub fn encrypt(key: &MasterKey, nonce: NonceBytes, plaintext: &[u8]) -> Vec<u8> {
    let cipher = key.cipher();
    let payload = Payload {
        msg: plaintext,
        aad: &[],
    };
    // A fresh random nonce is used for every call (I2); AES-256-GCM
    // encryption with a correctly sized key/nonce cannot fail.
    cipher
        .encrypt(Nonce::from_slice(&nonce.0), payload)
        .expect("AES-256-GCM encryption with valid key/nonce never fails")
}

/// Decrypt `ciphertext` (ciphertext‖tag) under `key`/`nonce`.
///
/// # Errors
/// Returns [`VaultError::Auth`] if the authentication tag does not
/// verify. No plaintext bytes are returned on failure.
pub fn decrypt(
    key: &MasterKey,
    nonce: NonceBytes,
    ciphertext: &[u8],
    what: &str,
) -> Result<Vec<u8>, VaultError> {
    let cipher = key.cipher();
    let payload = Payload {
        msg: ciphertext,
        aad: &[],
    };
    cipher
        .decrypt(Nonce::from_slice(&nonce.0), payload)
        .map_err(|_| VaultError::Auth {
            what: what.to_string(),
        })
}

/// SHA-256 of a byte stream.
#[must_use]
pub fn hash_sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
