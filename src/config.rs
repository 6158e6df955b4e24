//! Runtime configuration
//!
//! One immutable value, built in `main` from the environment and threaded
//! into everything that needs it. The re-exec'd init role does not read
//! the environment again; the orchestrator forwards these values on its
//! command line.

use std::env;
use std::path::PathBuf;

/// Working directory inside the jail where the challenge payload lands.
pub const PAYLOAD_DIR_IN_JAIL: &str = "/tmp";

const DEFAULT_STAGING_ROOT: &str = "/tmp/proctor/rootfs";
const DEFAULT_LOCK_FILE: &str = "/tmp/proctor/session.lock";
const DEFAULT_SANDBOX_USER: &str = "student";
const DEFAULT_SANDBOX_HOSTNAME: &str = "exambox";
const DEFAULT_SANDBOX_SHELL: &str = "/bin/sh";

/// Paths and identities for one proctor run.
#[derive(Debug, Clone)]
pub struct ProctorConfig {
    /// Staging tree that becomes the sandbox root filesystem
    pub staging_root: PathBuf,
    /// Lock file guarding the staging tree against a concurrent session
    pub lock_file: PathBuf,
    /// Unprivileged account the session runs as, resolved inside the jail
    pub sandbox_user: String,
    /// Hostname visible inside the UTS namespace
    pub sandbox_hostname: String,
    /// Interactive shell handed to the student
    pub sandbox_shell: String,
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            staging_root: DEFAULT_STAGING_ROOT.into(),
            lock_file: DEFAULT_LOCK_FILE.into(),
            sandbox_user: DEFAULT_SANDBOX_USER.into(),
            sandbox_hostname: DEFAULT_SANDBOX_HOSTNAME.into(),
            sandbox_shell: DEFAULT_SANDBOX_SHELL.into(),
        }
    }
}

impl ProctorConfig {
    /// Load from `PROCTOR_*` environment variables, falling back to the
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            staging_root: env::var("PROCTOR_STAGING_ROOT")
                .unwrap_or_else(|_| DEFAULT_STAGING_ROOT.into())
                .into(),
            lock_file: env::var("PROCTOR_LOCK_FILE")
                .unwrap_or_else(|_| DEFAULT_LOCK_FILE.into())
                .into(),
            sandbox_user: env::var("PROCTOR_SANDBOX_USER")
                .unwrap_or_else(|_| DEFAULT_SANDBOX_USER.into()),
            sandbox_hostname: env::var("PROCTOR_SANDBOX_HOSTNAME")
                .unwrap_or_else(|_| DEFAULT_SANDBOX_HOSTNAME.into()),
            sandbox_shell: env::var("PROCTOR_SANDBOX_SHELL")
                .unwrap_or_else(|_| DEFAULT_SANDBOX_SHELL.into()),
        }
    }

    /// Host-side path of the payload directory inside the staging tree.
    pub fn payload_dir(&self) -> PathBuf {
        self.staging_root
            .join(PAYLOAD_DIR_IN_JAIL.trim_start_matches('/'))
    }
}
