//! Cryptographic primitives for the archive format
//!
//! Three small pieces:
//! - [`kdf`]: passphrase + salt -> 32-byte key, slow on purpose
//! - [`seal`]: authenticated encryption for the unlock record
//! - [`stream`]: positional CTR cipher wrapping the bulk tar stream

pub mod kdf;
pub mod seal;
pub mod stream;

pub use kdf::{derive_key, DerivedKey, KEY_LEN};
pub use seal::{open_sealed, seal, SEAL_NONCE_LEN, SEAL_TAG_LEN};
pub use stream::{DecryptReader, EncryptWriter, STREAM_IV_LEN};
