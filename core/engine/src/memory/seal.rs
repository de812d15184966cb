//! Payload sealing for the reference engine.
//!
//! XChaCha20-Poly1305 with a random 24-byte nonce, framed as
//! nonce || ciphertext || tag. This stands in for the opaque engine's
//! encryption so that only ciphertext ever reaches a persistent store.

use chacha20poly1305::{
    aead::{generic_array::GenericArray, rand_core::RngCore, Aead, AeadCore, KeyInit, OsRng},
    XChaCha20Poly1305,
};
use zeroize::Zeroize;

use sable_common::{Error, Result};

/// Key length (32 bytes).
pub const KEY_LEN: usize = 32;

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_LEN: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_LEN: usize = 16;

/// A share payload key, zeroized on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SealKey([u8; KEY_LEN]);

impl SealKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let key: [u8; KEY_LEN] = XChaCha20Poly1305::generate_key(&mut OsRng).into();
        Self(key)
    }

    /// Wrap existing key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SealKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SealKey([REDACTED])")
    }
}

/// Fill a buffer of `n` random bytes.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Seal plaintext under a key.
///
/// # Postconditions
/// - Returns nonce || ciphertext || tag with a freshly random nonce
pub fn seal(key: &SealKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| Error::Permission(format!("Sealing failed: {}", e)))?;

    let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    result.extend_from_slice(&nonce);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Open a sealed blob under a key.
///
/// # Errors
/// - `InvalidInput` if the blob is too short to carry nonce and tag
/// - `Permission` if authentication fails (wrong or rotated key,
///   tampered data)
pub fn open(key: &SealKey, blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(Error::InvalidInput("Sealed blob too short".to_string()));
    }

    let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));

    cipher
        .decrypt(GenericArray::from_slice(nonce), ciphertext)
        .map_err(|_| Error::Permission("Payload authentication failed".to_string()))
}
