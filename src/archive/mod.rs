//! Time-locked archive container
//!
//! Envelope layout, all offsets fixed:
//!
//! ```text
//! salt(16) || stream iv(16) || AES-256-CTR( tar( ".ut", payload entries... ) )
//! ```
//!
//! Salt and IV are public derivation parameters, not secrets. The leading
//! `.ut` entry carries the sealed unlock timestamp; everything after it is
//! the challenge payload. One salt derives both the content key and the
//! time-lock key (from two different passphrases), binding both to this
//! envelope instance.

mod build;
mod extract;

pub use build::build_archive;
pub use extract::{load_archive, peek_unlock_time, UnlockGate};

use std::io::{self, Read};

use crate::crypto::STREAM_IV_LEN;

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Plaintext header length: salt followed by the stream IV.
pub const HEADER_LEN: usize = SALT_LEN + STREAM_IV_LEN;

/// Reserved tar entry carrying the sealed unlock timestamp.
pub const UNLOCK_ENTRY: &str = ".ut";

/// Wall-clock format of the sealed timestamp, local time.
pub const UNLOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Plaintext envelope header.
#[derive(Debug, Clone, Copy)]
pub struct Envelope {
    pub salt: [u8; SALT_LEN],
    pub iv: [u8; STREAM_IV_LEN],
}

impl Envelope {
    /// Read the fixed header from the start of an archive.
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; STREAM_IV_LEN];
        reader.read_exact(&mut salt)?;
        reader.read_exact(&mut iv)?;
        Ok(Self { salt, iv })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&[1u8; SALT_LEN]);
        raw.extend_from_slice(&[2u8; STREAM_IV_LEN]);
        raw.extend_from_slice(b"ciphertext follows");

        let envelope = Envelope::read_from(&mut raw.as_slice()).unwrap();
        assert_eq!(envelope.salt, [1u8; SALT_LEN]);
        assert_eq!(envelope.iv, [2u8; STREAM_IV_LEN]);
    }

    #[test]
    fn test_truncated_header_is_io_error() {
        let raw = [0u8; HEADER_LEN - 1];
        let err = Envelope::read_from(&mut raw.as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
