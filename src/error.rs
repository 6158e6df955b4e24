//! Error taxonomy for the build and start pipelines
//!
//! Every fatal condition maps to one variant here and surfaces at the
//! top-level command as a single human-readable message. A still-locked
//! archive is deliberately absent: that outcome is a normal negative
//! result, reported as [`crate::archive::UnlockGate::LockedUntil`] and
//! never routed through an error channel.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProctorError {
    /// Challenge folder violates the required layout. Raised before any
    /// cryptographic work touches the folder.
    #[error("invalid challenge layout at {}: {reason}", .path.display())]
    Structure { path: PathBuf, reason: String },

    /// Authentication failure on the sealed unlock record: wrong starter
    /// key or a tampered archive.
    #[error("unlock record rejected: wrong starter key or tampered archive")]
    CryptoAuth,

    /// The decrypted stream does not parse as an archive, typically a
    /// wrong content passphrase or a corrupted file.
    #[error("archive payload unreadable: {0}")]
    ArchiveFormat(String),

    /// A second `start` raced a session that is still holding the
    /// staging path.
    #[error("session already active on {}", .path.display())]
    SessionActive { path: PathBuf },

    /// Missing elevated rights, or the sandbox account could not be
    /// resolved or assumed.
    #[error("privilege error: {0}")]
    Privilege(String),

    /// The kernel rejected namespace or process setup.
    #[error("namespace error: {0}")]
    Namespace(String),

    /// Mount, unmount, or root-change failure around the sandbox.
    #[error("mount error: {0}")]
    Mount(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
