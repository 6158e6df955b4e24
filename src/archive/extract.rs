//! Archive loader (student side)
//!
//! Two passes over the same file. Pass one decrypts just far enough to
//! find and authenticate the sealed unlock record, then applies the time
//! gate. Pass two seeks back past the header and rebuilds a fresh cipher
//! context to walk the payload, because the CTR keystream is positional
//! and cannot be rewound in place. No payload byte touches the filesystem
//! before the record has authenticated and the gate is open.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use tar::Archive as TarArchive;
use tracing::{info, warn};

use crate::crypto::{derive_key, open_sealed, DecryptReader};
use crate::error::ProctorError;

use super::{Envelope, HEADER_LEN, UNLOCK_ENTRY, UNLOCK_TIME_FORMAT};

/// Outcome of the time gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockGate {
    /// The unlock time has been reached; extraction may proceed.
    Open { unlock_at: DateTime<Local> },
    /// Too early. A normal negative outcome, not an error.
    LockedUntil { unlock_at: DateTime<Local> },
}

impl UnlockGate {
    pub fn unlock_at(&self) -> DateTime<Local> {
        match self {
            UnlockGate::Open { unlock_at } | UnlockGate::LockedUntil { unlock_at } => *unlock_at,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, UnlockGate::Open { .. })
    }
}

/// Pass one: authenticate the unlock record and compare it against `now`.
///
/// Needs both passphrases: the content key decrypts the stream far enough
/// to reach the record, the time-lock key opens the record itself.
pub fn peek_unlock_time(
    archive: &Path,
    content_passphrase: &str,
    starter_passphrase: &str,
    now: DateTime<Local>,
) -> Result<UnlockGate, ProctorError> {
    let mut file = BufReader::new(File::open(archive)?);
    let envelope = Envelope::read_from(&mut file)?;

    let content_key = derive_key(content_passphrase, &envelope.salt);
    let timelock_key = derive_key(starter_passphrase, &envelope.salt);

    let reader = DecryptReader::new(&content_key, &envelope.iv, file);
    let record = read_unlock_record(reader)?;
    let stamp = open_sealed(&timelock_key, &record)?;
    let unlock_at = parse_unlock_time(&stamp)?;

    Ok(if now >= unlock_at {
        UnlockGate::Open { unlock_at }
    } else {
        UnlockGate::LockedUntil { unlock_at }
    })
}

/// Loader entry point: gate first, then extract the payload under `dest`.
///
/// Returns the gate outcome; when the archive is still locked, `dest` is
/// left untouched.
pub fn load_archive(
    archive: &Path,
    content_passphrase: &str,
    starter_passphrase: &str,
    now: DateTime<Local>,
    dest: &Path,
) -> Result<UnlockGate, ProctorError> {
    let gate = peek_unlock_time(archive, content_passphrase, starter_passphrase, now)?;
    let UnlockGate::Open { unlock_at } = gate else {
        return Ok(gate);
    };

    info!(
        "Time gate open (unlocked {}), extracting payload",
        unlock_at.format(UNLOCK_TIME_FORMAT)
    );
    extract_payload(archive, content_passphrase, dest)?;
    Ok(gate)
}

/// Pass two: fresh cipher context from the header offset, then walk every
/// entry except the unlock record.
fn extract_payload(
    archive: &Path,
    content_passphrase: &str,
    dest: &Path,
) -> Result<(), ProctorError> {
    let mut file = File::open(archive)?;
    let envelope = Envelope::read_from(&mut file)?;
    let content_key = derive_key(content_passphrase, &envelope.salt);

    // the ciphertext starts right after the plaintext header
    file.seek(SeekFrom::Start(HEADER_LEN as u64))?;
    let reader = DecryptReader::new(&content_key, &envelope.iv, BufReader::new(file));

    fs::create_dir_all(dest)?;
    let mut extracted = 0usize;
    let mut tar = TarArchive::new(reader);
    for entry in tar.entries().map_err(archive_format)? {
        let mut entry = entry.map_err(archive_format)?;
        let path = entry.path().map_err(archive_format)?.into_owned();
        if path.as_path() == Path::new(UNLOCK_ENTRY) {
            continue;
        }

        let target = contain(dest, &path)?;
        let kind = entry.header().entry_type();
        if kind.is_dir() {
            fs::create_dir_all(&target)?;
            set_mode(&target, entry.header().mode().map_err(archive_format)?)?;
        } else if kind.is_symlink() {
            let link = entry
                .link_name()
                .map_err(archive_format)?
                .ok_or_else(|| {
                    ProctorError::ArchiveFormat(format!(
                        "symlink entry {} has no target",
                        path.display()
                    ))
                })?
                .into_owned();
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            std::os::unix::fs::symlink(&link, &target)?;
        } else if kind.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
            set_mode(&target, entry.header().mode().map_err(archive_format)?)?;
        } else {
            warn!("Skipping unsupported entry {} ({:?})", path.display(), kind);
            continue;
        }
        extracted += 1;
    }

    info!("Extracted {} entries under {}", extracted, dest.display());
    Ok(())
}

fn read_unlock_record<R: Read>(reader: R) -> Result<Vec<u8>, ProctorError> {
    let mut tar = TarArchive::new(reader);
    for entry in tar.entries().map_err(archive_format)? {
        let mut entry = entry.map_err(archive_format)?;
        let path = entry.path().map_err(archive_format)?;
        if path.as_ref() == Path::new(UNLOCK_ENTRY) {
            let mut record = Vec::new();
            entry.read_to_end(&mut record).map_err(archive_format)?;
            return Ok(record);
        }
    }
    Err(ProctorError::ArchiveFormat(
        "unlock record missing from archive".into(),
    ))
}

fn parse_unlock_time(stamp: &[u8]) -> Result<DateTime<Local>, ProctorError> {
    let text = std::str::from_utf8(stamp)
        .map_err(|_| ProctorError::ArchiveFormat("unlock timestamp is not UTF-8".into()))?;
    let naive = NaiveDateTime::parse_from_str(text, UNLOCK_TIME_FORMAT).map_err(|err| {
        ProctorError::ArchiveFormat(format!("unlock timestamp {text:?}: {err}"))
    })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| {
            ProctorError::ArchiveFormat(format!(
                "unlock timestamp {text:?} does not exist in this time zone"
            ))
        })
}

/// Join `rel` under `dest`, refusing absolute paths and parent escapes.
fn contain(dest: &Path, rel: &Path) -> Result<PathBuf, ProctorError> {
    let mut out = dest.to_path_buf();
    for component in rel.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => {
                return Err(ProctorError::ArchiveFormat(format!(
                    "entry path {} escapes the extraction root",
                    rel.display()
                )))
            }
        }
    }
    Ok(out)
}

fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

/// Tar-level failure; with a wrong content passphrase the stream decodes
/// to keystream garbage and lands here.
fn archive_format(err: io::Error) -> ProctorError {
    ProctorError::ArchiveFormat(err.to_string())
}
