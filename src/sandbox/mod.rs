//! Sandbox module - namespace isolation engine
//!
//! This module provides the disposable execution environment for one exam
//! session. It handles:
//! - Staging-tree lifecycle: install the embedded base image, heal stale
//!   state left by a crashed session, tear down afterwards
//! - Exclusive session locking on the staging path
//! - Namespace creation (UTS, PID, mount) and the init-role jail setup:
//!   chroot, fresh proc, privilege drop, interactive shell
//!
//! The sandbox module does NOT:
//! - Enforce resource quotas (no cgroups)
//! - Isolate the network
//! - Run more than one session per host

mod account;
mod engine;
mod lock;
mod rootfs;

pub use account::SandboxAccount;
pub use engine::{
    ensure_elevated, run_init, run_session, InitParams, SessionOutcome, INIT_FAILURE_CODE,
};
pub use lock::SessionLock;
pub use rootfs::{heal_staging_root, install_base_image};
