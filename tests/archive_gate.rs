//! End-to-end behavior of the time-locked archive: build, gate, extract.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use chrono::{Duration, Local, TimeZone};
use proctor::archive::{build_archive, load_archive, peek_unlock_time, UnlockGate};
use proctor::error::ProctorError;
use tempfile::TempDir;

const CONTENT: &str = "content passphrase";
const STARTER: &str = "starter key";

/// Two sub-challenges, nested content, a symlink, and mixed modes.
fn write_challenge_folder(root: &Path) {
    for name in ["web-basics", "shell-forensics"] {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        let script = dir.join("check.sh");
        fs::write(&script, format!("#!/bin/sh\n# {name}\nexit 0\n")).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    }
    let web = root.join("web-basics");
    fs::write(web.join("README.md"), "# web basics\nfind the flag\n").unwrap();
    fs::create_dir_all(web.join("assets")).unwrap();
    fs::write(web.join("assets/flag.txt"), "flag{not-before-nine}").unwrap();
    fs::set_permissions(
        &web.join("assets/flag.txt"),
        fs::Permissions::from_mode(0o640),
    )
    .unwrap();
    std::os::unix::fs::symlink("check.sh", web.join("run")).unwrap();
}

fn build_to(tmp: &TempDir, unlock_at: chrono::DateTime<Local>) -> std::path::PathBuf {
    let folder = tmp.path().join("challenges");
    write_challenge_folder(&folder);
    let archive = tmp.path().join("exam-archive.enc");
    build_archive(&folder, CONTENT, STARTER, unlock_at, &archive).unwrap();
    archive
}

#[test]
fn test_round_trip_reproduces_tree() {
    let tmp = TempDir::new().unwrap();
    let archive = build_to(&tmp, Local::now() - Duration::hours(2));
    let dest = tmp.path().join("staged");

    let gate = load_archive(&archive, CONTENT, STARTER, Local::now(), &dest).unwrap();
    assert!(gate.is_open());

    let root = dest.join("challenges");
    let script = root.join("web-basics/check.sh");
    assert_eq!(
        fs::read(&script).unwrap(),
        b"#!/bin/sh\n# web-basics\nexit 0\n"
    );
    assert_ne!(
        fs::metadata(&script).unwrap().permissions().mode() & 0o111,
        0,
        "check.sh lost its executable bit"
    );
    assert_eq!(
        fs::read_to_string(root.join("web-basics/assets/flag.txt")).unwrap(),
        "flag{not-before-nine}"
    );
    assert_eq!(
        fs::metadata(root.join("web-basics/assets/flag.txt"))
            .unwrap()
            .permissions()
            .mode()
            & 0o777,
        0o640
    );
    assert_eq!(
        fs::read_link(root.join("web-basics/run")).unwrap(),
        Path::new("check.sh")
    );
    assert!(root.join("shell-forensics/check.sh").is_file());
    // the reserved unlock entry never materializes
    assert!(!dest.join(".ut").exists());
    assert!(!root.join(".ut").exists());
}

#[test]
fn test_locked_archive_extracts_nothing() {
    let tmp = TempDir::new().unwrap();
    let archive = build_to(&tmp, Local::now() + Duration::minutes(2));
    let dest = tmp.path().join("staged");

    let gate = load_archive(&archive, CONTENT, STARTER, Local::now(), &dest).unwrap();
    assert!(matches!(gate, UnlockGate::LockedUntil { .. }));
    assert!(!dest.exists(), "locked archive must not create {dest:?}");
}

#[test]
fn test_gate_boundary_equal_to_now_opens() {
    let tmp = TempDir::new().unwrap();
    let unlock_at = Local.with_ymd_and_hms(2031, 6, 1, 9, 0, 0).unwrap();
    let archive = build_to(&tmp, unlock_at);

    let just_early = peek_unlock_time(&archive, CONTENT, STARTER, unlock_at - Duration::minutes(1))
        .unwrap();
    assert_eq!(just_early, UnlockGate::LockedUntil { unlock_at });

    let on_time = peek_unlock_time(&archive, CONTENT, STARTER, unlock_at).unwrap();
    assert_eq!(on_time, UnlockGate::Open { unlock_at });
}

#[test]
fn test_wrong_starter_key_is_crypto_auth() {
    let tmp = TempDir::new().unwrap();
    let archive = build_to(&tmp, Local::now() - Duration::hours(2));
    let dest = tmp.path().join("staged");

    let err =
        load_archive(&archive, CONTENT, "not the starter key", Local::now(), &dest).unwrap_err();
    assert!(
        matches!(err, ProctorError::CryptoAuth),
        "wrong starter key must fail authentication, got: {err}"
    );
    assert!(!dest.exists());
}

#[test]
fn test_wrong_content_passphrase_is_format_error() {
    let tmp = TempDir::new().unwrap();
    let archive = build_to(&tmp, Local::now() - Duration::hours(2));
    let dest = tmp.path().join("staged");

    let err =
        load_archive(&archive, "not the content", STARTER, Local::now(), &dest).unwrap_err();
    assert!(
        matches!(err, ProctorError::ArchiveFormat(_)),
        "wrong content passphrase must fail as a format error, got: {err}"
    );
    assert!(!dest.exists());
}

#[test]
fn test_tampered_unlock_record_fails_authentication() {
    let tmp = TempDir::new().unwrap();
    let archive = build_to(&tmp, Local::now() - Duration::hours(2));
    let original = fs::read(&archive).unwrap();

    // envelope header (32) plus the tar header block (512) puts the
    // sealed record's bytes here: nonce(12) || ciphertext(16) || tag(16)
    let record_start = 32 + 512;
    for offset in [0, 11, 12, 27, 28, 43] {
        let mut tampered = original.clone();
        tampered[record_start + offset] ^= 0x01;
        fs::write(&archive, &tampered).unwrap();

        let err = peek_unlock_time(&archive, CONTENT, STARTER, Local::now()).unwrap_err();
        assert!(
            matches!(err, ProctorError::CryptoAuth),
            "flip at record offset {offset} must fail authentication, got: {err}"
        );
    }
}

#[test]
fn test_truncated_archive_is_io_error() {
    let tmp = TempDir::new().unwrap();
    let archive = tmp.path().join("stub.enc");
    fs::write(&archive, [0u8; 10]).unwrap();

    let err = peek_unlock_time(&archive, CONTENT, STARTER, Local::now()).unwrap_err();
    assert!(matches!(err, ProctorError::Io(_)));
}

#[test]
fn test_invalid_layout_rejected_before_any_output() {
    let tmp = TempDir::new().unwrap();
    let folder = tmp.path().join("challenges");
    write_challenge_folder(&folder);
    fs::write(folder.join("stray-notes.txt"), "does not belong here").unwrap();
    let output = tmp.path().join("exam-archive.enc");

    let err = build_archive(
        &folder,
        CONTENT,
        STARTER,
        Local::now() - Duration::hours(2),
        &output,
    )
    .unwrap_err();
    assert!(matches!(err, ProctorError::Structure { .. }));
    assert!(!output.exists(), "rejected build must not write {output:?}");
}

#[test]
fn test_two_challenge_scenario() {
    let tmp = TempDir::new().unwrap();
    let unlock_at = Local.with_ymd_and_hms(2031, 6, 1, 9, 0, 0).unwrap();
    let archive = build_to(&tmp, unlock_at);
    let dest = tmp.path().join("staged");

    // before the unlock time: a clean negative outcome, nothing on disk
    let early = load_archive(
        &archive,
        CONTENT,
        STARTER,
        unlock_at - Duration::minutes(30),
        &dest,
    )
    .unwrap();
    assert!(!early.is_open());
    assert!(!dest.exists());

    // once the clock reaches the unlock time: both sub-challenges land
    let on_time = load_archive(&archive, CONTENT, STARTER, unlock_at, &dest).unwrap();
    assert!(on_time.is_open());
    for name in ["web-basics", "shell-forensics"] {
        let script = dest.join("challenges").join(name).join("check.sh");
        assert!(script.is_file(), "missing {script:?}");
        assert_ne!(
            fs::metadata(&script).unwrap().permissions().mode() & 0o111,
            0
        );
    }
}
