//! Sandbox account resolution
//!
//! After the chroot, the only account database that exists is the jailed
//! `/etc/passwd`, so the lookup parses it directly. Entries are the
//! classic seven-field lines: `name:password:uid:gid:gecos:home:shell`.

use std::fs;
use std::path::Path;

use nix::unistd::{Gid, Uid};

use crate::error::ProctorError;

/// Numeric identity and home of the unprivileged session account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxAccount {
    pub name: String,
    pub uid: Uid,
    pub gid: Gid,
    pub home: String,
}

impl SandboxAccount {
    /// Look up `name` in the passwd file at `passwd_path`.
    pub fn lookup(passwd_path: &Path, name: &str) -> Result<Self, ProctorError> {
        let passwd = fs::read_to_string(passwd_path).map_err(|err| {
            ProctorError::Privilege(format!("cannot read {}: {err}", passwd_path.display()))
        })?;
        Self::parse(&passwd, name).ok_or_else(|| {
            ProctorError::Privilege(format!(
                "account {name:?} not found in {}",
                passwd_path.display()
            ))
        })
    }

    fn parse(passwd: &str, name: &str) -> Option<Self> {
        for line in passwd.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split(':').collect();
            if fields.len() < 7 || fields[0] != name {
                continue;
            }
            let uid: u32 = fields[2].parse().ok()?;
            let gid: u32 = fields[3].parse().ok()?;
            return Some(Self {
                name: name.to_string(),
                uid: Uid::from_raw(uid),
                gid: Gid::from_raw(gid),
                home: fields[5].to_string(),
            });
        }
        None
    }
}
