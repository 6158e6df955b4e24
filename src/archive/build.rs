//! Archive builder (instructor side)
//!
//! Validates the challenge layout, then writes the envelope in one pass:
//! header in the clear, everything after it through the content-keyed
//! stream cipher. The sealed unlock record goes in first so the loader can
//! gate on it without touching any payload entry.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Local};
use rand::rngs::OsRng;
use rand::RngCore;
use tar::{Builder as TarBuilder, EntryType, Header};
use tracing::{debug, info};

use crate::crypto::{derive_key, seal, EncryptWriter, STREAM_IV_LEN};
use crate::error::ProctorError;
use crate::layout::validate_challenge_folder;

use super::{SALT_LEN, UNLOCK_ENTRY, UNLOCK_TIME_FORMAT};

/// Package `folder` into a time-locked encrypted archive at `output`.
///
/// The folder layout is checked first; when it is rejected, `output` is
/// never created.
pub fn build_archive(
    folder: &Path,
    content_passphrase: &str,
    starter_passphrase: &str,
    unlock_at: DateTime<Local>,
    output: &Path,
) -> Result<(), ProctorError> {
    let folder = folder.canonicalize()?;
    validate_challenge_folder(&folder)?;
    let root_name = folder
        .file_name()
        .ok_or_else(|| ProctorError::Structure {
            path: folder.clone(),
            reason: "cannot package the filesystem root".into(),
        })?
        .to_os_string();

    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; STREAM_IV_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);

    let content_key = derive_key(content_passphrase, &salt);
    let timelock_key = derive_key(starter_passphrase, &salt);
    let stamp = unlock_at.format(UNLOCK_TIME_FORMAT).to_string();
    let record = seal(&timelock_key, stamp.as_bytes())?;

    let mut file = BufWriter::new(File::create(output)?);
    file.write_all(&salt)?;
    file.write_all(&iv)?;

    let mut tar = TarBuilder::new(EncryptWriter::new(&content_key, &iv, file));
    append_unlock_record(&mut tar, &record)?;
    append_tree(&mut tar, &folder, Path::new(&root_name))?;

    let mut encrypted = tar.into_inner()?;
    encrypted.flush()?;

    info!(
        "Archive written to {} (unlocks {})",
        output.display(),
        stamp
    );
    Ok(())
}

fn append_unlock_record<W: Write>(
    tar: &mut TarBuilder<W>,
    record: &[u8],
) -> Result<(), ProctorError> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_mode(0o600);
    header.set_size(record.len() as u64);
    tar.append_data(&mut header, UNLOCK_ENTRY, record)?;
    Ok(())
}

/// Append `dir` and everything under it in sorted order, entry paths
/// rooted at `rel` (the folder's own name, so extraction recreates it).
fn append_tree<W: Write>(
    tar: &mut TarBuilder<W>,
    dir: &Path,
    rel: &Path,
) -> Result<(), ProctorError> {
    tar.append_dir(rel, dir)?;

    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let child = rel.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            let target = fs::read_link(&path)?;
            let mut header = Header::new_gnu();
            header.set_metadata(&fs::symlink_metadata(&path)?);
            tar.append_link(&mut header, &child, &target)?;
            debug!("Added symlink {} -> {}", child.display(), target.display());
        } else if file_type.is_dir() {
            append_tree(tar, &path, &child)?;
        } else {
            tar.append_path_with_name(&path, &child)?;
            debug!("Added file {}", child.display());
        }
    }
    Ok(())
}
