//! Challenge folder lint
//!
//! A challenge folder is a directory of sub-challenges. Every top-level
//! entry must itself be a directory carrying an executable `check.sh`;
//! anything else aborts the build before any cryptographic work starts.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::ProctorError;

/// Grading script every sub-challenge must carry.
pub const CHECK_SCRIPT: &str = "check.sh";

/// Validate the layout of `folder` before it gets packaged.
pub fn validate_challenge_folder(folder: &Path) -> Result<(), ProctorError> {
    if !folder.is_dir() {
        return Err(ProctorError::Structure {
            path: folder.to_path_buf(),
            reason: "not a directory".into(),
        });
    }

    let mut entries = fs::read_dir(folder)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        if !entry.file_type()?.is_dir() {
            return Err(ProctorError::Structure {
                path,
                reason: "only sub-challenge directories may sit at the top level".into(),
            });
        }

        let script = path.join(CHECK_SCRIPT);
        let metadata = match fs::metadata(&script) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => {
                return Err(ProctorError::Structure {
                    path,
                    reason: format!("missing {CHECK_SCRIPT}"),
                })
            }
        };
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(ProctorError::Structure {
                path: script,
                reason: format!("{CHECK_SCRIPT} is not executable"),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn add_challenge(root: &Path, name: &str, script_mode: u32) {
        let dir = root.join(name);
        fs::create_dir(&dir).unwrap();
        let script = dir.join(CHECK_SCRIPT);
        fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(script_mode)).unwrap();
    }

    #[test]
    fn test_valid_folder_passes() {
        let tmp = TempDir::new().unwrap();
        add_challenge(tmp.path(), "alpha", 0o755);
        add_challenge(tmp.path(), "bravo", 0o700);
        assert!(validate_challenge_folder(tmp.path()).is_ok());
    }

    #[test]
    fn test_stray_top_level_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        add_challenge(tmp.path(), "alpha", 0o755);
        fs::write(tmp.path().join("notes.txt"), "stray").unwrap();

        let err = validate_challenge_folder(tmp.path()).unwrap_err();
        match err {
            ProctorError::Structure { path, .. } => {
                assert_eq!(path, tmp.path().join("notes.txt"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_check_script_names_the_directory() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("empty-one")).unwrap();

        let err = validate_challenge_folder(tmp.path()).unwrap_err();
        match err {
            ProctorError::Structure { path, reason } => {
                assert_eq!(path, tmp.path().join("empty-one"));
                assert!(reason.contains(CHECK_SCRIPT));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_executable_check_script_is_rejected() {
        let tmp = TempDir::new().unwrap();
        add_challenge(tmp.path(), "alpha", 0o644);

        let err = validate_challenge_folder(tmp.path()).unwrap_err();
        match err {
            ProctorError::Structure { path, reason } => {
                assert_eq!(path, tmp.path().join("alpha").join(CHECK_SCRIPT));
                assert!(reason.contains("not executable"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_folder_is_rejected() {
        let err = validate_challenge_folder(Path::new("/no/such/folder")).unwrap_err();
        assert!(matches!(err, ProctorError::Structure { .. }));
    }
}
