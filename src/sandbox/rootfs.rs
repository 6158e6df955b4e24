//! Staging root filesystem
//!
//! The base image is a small tar.gz bundled into the binary. Installation
//! always starts from a clean slate: a tree left behind by a crashed
//! session may still carry a proc mount that `remove_dir_all` cannot take
//! down, so the heal step force-unmounts before deleting.

use std::fs;
use std::path::Path;

use flate2::read::GzDecoder;
use nix::mount::{umount2, MntFlags};
use tar::Archive as TarArchive;
use tracing::{debug, info, warn};

use crate::error::ProctorError;

/// Base image bundled at compile time.
const BASE_IMAGE: &[u8] =
    include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/rootfs.tar.gz"));

/// Remove every trace of a session at `staging_root`. Runs proactively
/// before install and again as post-session teardown.
///
/// Safe to call repeatedly and when nothing is mounted; each step skips
/// cleanly when there is nothing left for it to do.
pub fn heal_staging_root(staging_root: &Path) -> Result<(), ProctorError> {
    let proc_mount = staging_root.join("proc");
    if is_mounted(&proc_mount) {
        match umount2(&proc_mount, MntFlags::MNT_FORCE) {
            Ok(()) => debug!("Unmounted stale {}", proc_mount.display()),
            Err(err) => warn!("Could not unmount {}: {}", proc_mount.display(), err),
        }
    }
    if staging_root.exists() {
        fs::remove_dir_all(staging_root)?;
        debug!("Removed stale staging tree {}", staging_root.display());
    }
    Ok(())
}

/// Heal `staging_root`, then extract the embedded base image into it.
pub fn install_base_image(staging_root: &Path) -> Result<(), ProctorError> {
    heal_staging_root(staging_root)?;
    fs::create_dir_all(staging_root)?;

    let mut tar = TarArchive::new(GzDecoder::new(BASE_IMAGE));
    tar.set_preserve_permissions(true);
    tar.unpack(staging_root)?;

    info!("Base image installed at {}", staging_root.display());
    Ok(())
}

/// Check /proc/mounts for a mount point at `path`.
fn is_mounted(path: &Path) -> bool {
    let Ok(mounts) = fs::read_to_string("/proc/mounts") else {
        return false;
    };
    let needle = path.to_string_lossy();
    mounts
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|mount_point| mount_point == needle)
}
