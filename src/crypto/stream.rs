//! Bulk stream cipher
//!
//! AES-256-CTR applied transparently around ordinary readers and writers,
//! the way the envelope wraps its tar stream. The keystream position only
//! moves forward: a context can never be rewound, so re-reading an archive
//! means seeking the underlying file back and constructing a fresh context
//! from the same key and IV.

use std::io::{self, Read, Write};

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;

use crate::crypto::kdf::DerivedKey;

/// Stream IV length in bytes (one AES block).
pub const STREAM_IV_LEN: usize = 16;

type Aes256Ctr = Ctr128BE<Aes256>;

/// Writer adapter encrypting everything passed through it.
pub struct EncryptWriter<W: Write> {
    inner: W,
    cipher: Aes256Ctr,
    scratch: Vec<u8>,
}

impl<W: Write> EncryptWriter<W> {
    pub fn new(key: &DerivedKey, iv: &[u8; STREAM_IV_LEN], inner: W) -> Self {
        Self {
            inner,
            cipher: Aes256Ctr::new(key.as_bytes().into(), iv.into()),
            scratch: Vec::new(),
        }
    }
}

impl<W: Write> Write for EncryptWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.scratch.clear();
        self.scratch.extend_from_slice(data);
        self.cipher.apply_keystream(&mut self.scratch);
        self.inner.write_all(&self.scratch)?;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader adapter decrypting everything read through it.
pub struct DecryptReader<R: Read> {
    inner: R,
    cipher: Aes256Ctr,
}

impl<R: Read> DecryptReader<R> {
    pub fn new(key: &DerivedKey, iv: &[u8; STREAM_IV_LEN], inner: R) -> Self {
        Self {
            inner,
            cipher: Aes256Ctr::new(key.as_bytes().into(), iv.into()),
        }
    }
}

impl<R: Read> Read for DecryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cipher.apply_keystream(&mut buf[..n]);
        Ok(n)
    }
}
