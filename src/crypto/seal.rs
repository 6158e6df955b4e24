//! Sealed unlock record
//!
//! AES-256-GCM with the 12-byte nonce prepended, so the whole record
//! travels as one opaque blob inside the archive: `nonce || ciphertext ||
//! tag`. Opening authenticates before anything is returned; a flipped bit
//! or a wrong key surfaces as a rejection, never as garbled plaintext.

use std::io;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::crypto::kdf::DerivedKey;
use crate::error::ProctorError;

/// GCM nonce length in bytes.
pub const SEAL_NONCE_LEN: usize = 12;

/// GCM authentication tag length in bytes.
pub const SEAL_TAG_LEN: usize = 16;

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn seal(key: &DerivedKey, plaintext: &[u8]) -> Result<Vec<u8>, ProctorError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let mut nonce = [0u8; SEAL_NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| ProctorError::Io(io::Error::other("sealing the unlock record failed")))?;

    let mut blob = Vec::with_capacity(SEAL_NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Authenticate and decrypt a blob produced by [`seal`].
///
/// Any modification of the blob, or a key derived from a different
/// passphrase, fails authentication; a garbled plaintext is never
/// returned.
pub fn open_sealed(key: &DerivedKey, blob: &[u8]) -> Result<Vec<u8>, ProctorError> {
    if blob.len() < SEAL_NONCE_LEN + SEAL_TAG_LEN {
        return Err(ProctorError::CryptoAuth);
    }
    let (nonce, ciphertext) = blob.split_at(SEAL_NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| ProctorError::CryptoAuth)
}
