//! Session engine
//!
//! Two roles, one binary. The orchestrator prepares the staging tree and
//! clones itself into fresh UTS, PID, and mount namespaces; the cloned
//! child immediately re-execs this binary through the hidden
//! `sandbox-init` subcommand and finishes the jail from the inside as
//! PID 1. Namespace membership is fixed at clone time; a process that
//! already exists cannot join a new PID or mount namespace.

use std::fs;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use nix::mount::{mount, MsFlags};
use nix::sched::{clone, CloneFlags};
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{chdir, chroot, geteuid, setgid, setgroups, sethostname, setuid, Uid};
use tracing::{info, warn};

use crate::config::{ProctorConfig, PAYLOAD_DIR_IN_JAIL};
use crate::error::ProctorError;
use crate::sandbox::account::SandboxAccount;
use crate::sandbox::rootfs::heal_staging_root;

const INIT_STACK_SIZE: usize = 1024 * 1024;

/// Exit code the init role reports when jail setup fails before the
/// shell is reached. Reserved: an exit with this code is never treated
/// as a shell result.
pub const INIT_FAILURE_CODE: i32 = 111;

/// Exit code of the cloned child when the re-exec into `sandbox-init`
/// itself fails. Follows the shell convention for a command that could
/// not be run, and is reserved the same way.
const REEXEC_FAILURE_CODE: i32 = 127;

/// How the sandboxed shell ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Shell exited on its own with this code.
    Exited(i32),
    /// Session was torn down by a signal.
    Signaled(Signal),
}

/// Everything the init role needs, passed explicitly over the re-exec
/// boundary on the child's command line.
#[derive(Debug, Clone)]
pub struct InitParams {
    pub staging_root: PathBuf,
    pub user: String,
    pub hostname: String,
    pub shell: String,
}

impl InitParams {
    pub fn from_config(config: &ProctorConfig) -> Self {
        Self {
            staging_root: config.staging_root.clone(),
            user: config.sandbox_user.clone(),
            hostname: config.sandbox_hostname.clone(),
            shell: config.sandbox_shell.clone(),
        }
    }
}

/// `start` needs euid 0 for namespaces, mounts, and the chroot.
pub fn ensure_elevated() -> Result<(), ProctorError> {
    if !geteuid().is_root() {
        return Err(ProctorError::Privilege(
            "start requires elevated privileges (run with sudo)".into(),
        ));
    }
    Ok(())
}

/// Orchestrator role: spawn the init process in fresh namespaces and
/// block until the session ends.
pub fn run_session(config: &ProctorConfig) -> Result<SessionOutcome, ProctorError> {
    let params = InitParams::from_config(config);
    let mut stack = vec![0u8; INIT_STACK_SIZE];
    let flags = CloneFlags::CLONE_NEWUTS | CloneFlags::CLONE_NEWPID | CloneFlags::CLONE_NEWNS;

    // The child execs straight into `sandbox-init`; the closure only runs
    // between clone and exec.
    let child = unsafe {
        clone(
            Box::new(|| exec_init_role(&params)),
            &mut stack,
            flags,
            Some(nix::libc::SIGCHLD),
        )
    }
    .map_err(|err| ProctorError::Namespace(format!("clone: {err}")))?;

    info!("Sandbox init spawned (pid {})", child);
    let wait_result = waitpid(child, None);

    // teardown runs before the wait result is inspected
    cleanup_after_session(&config.staging_root);

    let status =
        wait_result.map_err(|err| ProctorError::Namespace(format!("waitpid: {err}")))?;
    let outcome = interpret_wait_status(status)?;
    match outcome {
        SessionOutcome::Exited(code) => info!("Session ended, shell exit code {}", code),
        SessionOutcome::Signaled(signal) => warn!("Session ended by signal {}", signal),
    }
    Ok(outcome)
}

/// Maps the init process's wait status onto the session outcome. The
/// reserved exit codes mean the shell was never reached; they come back
/// as errors, never as a shell result.
fn interpret_wait_status(status: WaitStatus) -> Result<SessionOutcome, ProctorError> {
    match status {
        WaitStatus::Exited(_, INIT_FAILURE_CODE) => Err(ProctorError::Namespace(
            "sandbox init failed before the shell started".into(),
        )),
        WaitStatus::Exited(_, REEXEC_FAILURE_CODE) => Err(ProctorError::Namespace(
            "sandbox init could not be re-executed".into(),
        )),
        WaitStatus::Exited(_, code) => Ok(SessionOutcome::Exited(code)),
        WaitStatus::Signaled(_, signal, _) => Ok(SessionOutcome::Signaled(signal)),
        other => Err(ProctorError::Namespace(format!(
            "unexpected wait status for init: {other:?}"
        ))),
    }
}

/// Runs inside the freshly cloned child. Exec never returns on success;
/// the exit code below is only reached when the re-exec itself failed.
fn exec_init_role(params: &InitParams) -> isize {
    let err = Command::new("/proc/self/exe")
        .arg("sandbox-init")
        .arg("--staging-root")
        .arg(&params.staging_root)
        .arg("--user")
        .arg(&params.user)
        .arg("--hostname")
        .arg(&params.hostname)
        .arg("--shell")
        .arg(&params.shell)
        .exec();
    eprintln!("sandbox-init: re-exec failed: {err}");
    REEXEC_FAILURE_CODE as isize
}

/// Init role: finish the jail from inside the namespaces, then hand the
/// terminal to the student's shell.
///
/// Runs as PID 1 of the new PID namespace, still privileged. The group
/// drops before the user: after setuid the process can no longer change
/// its groups.
pub fn run_init(params: &InitParams) -> Result<(), ProctorError> {
    sethostname(&params.hostname)
        .map_err(|err| ProctorError::Namespace(format!("sethostname: {err}")))?;

    // mounts made in here must stay invisible to the parent namespace
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|err| ProctorError::Mount(format!("remounting / private: {err}")))?;

    chroot(&params.staging_root).map_err(|err| {
        ProctorError::Mount(format!("chroot {}: {err}", params.staging_root.display()))
    })?;
    chdir(Path::new(PAYLOAD_DIR_IN_JAIL))
        .map_err(|err| ProctorError::Mount(format!("chdir {PAYLOAD_DIR_IN_JAIL}: {err}")))?;

    // the inherited proc describes the outer PID namespace
    fs::create_dir_all("/proc")?;
    mount(
        Some("proc"),
        "/proc",
        Some("proc"),
        MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC,
        None::<&str>,
    )
    .map_err(|err| ProctorError::Mount(format!("mounting /proc: {err}")))?;

    let account = SandboxAccount::lookup(Path::new("/etc/passwd"), &params.user)?;
    drop_privileges(&account)?;
    info!(
        "Running as {} (uid {}, gid {}), starting {}",
        account.name, account.uid, account.gid, params.shell
    );

    let err = Command::new(&params.shell)
        .env("HOME", &account.home)
        .env("USER", &account.name)
        .env("LOGNAME", &account.name)
        .exec();
    Err(ProctorError::Io(io::Error::new(
        err.kind(),
        format!("exec {}: {err}", params.shell),
    )))
}

/// Supplementary groups, then gid, then uid. Verified afterwards: the
/// drop must not be reversible.
fn drop_privileges(account: &SandboxAccount) -> Result<(), ProctorError> {
    setgroups(&[account.gid])
        .map_err(|err| ProctorError::Privilege(format!("setgroups: {err}")))?;
    setgid(account.gid)
        .map_err(|err| ProctorError::Privilege(format!("setgid {}: {err}", account.gid)))?;
    setuid(account.uid)
        .map_err(|err| ProctorError::Privilege(format!("setuid {}: {err}", account.uid)))?;

    if setuid(Uid::from_raw(0)).is_ok() {
        return Err(ProctorError::Privilege(
            "privilege drop did not stick".into(),
        ));
    }
    Ok(())
}

/// Best-effort teardown once the init process is gone: unmount whatever
/// is left under the staging tree and remove it. No session state
/// outlives the session; an unclean exit is healed again on the next
/// start.
fn cleanup_after_session(staging_root: &Path) {
    if let Err(err) = heal_staging_root(staging_root) {
        warn!(
            "Session teardown incomplete at {}: {}",
            staging_root.display(),
            err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::Pid;

    #[test]
    fn test_shell_exit_code_passes_through() {
        let status = WaitStatus::Exited(Pid::from_raw(2), 7);
        assert_eq!(
            interpret_wait_status(status).unwrap(),
            SessionOutcome::Exited(7)
        );
    }

    #[test]
    fn test_shell_signal_passes_through() {
        let status = WaitStatus::Signaled(Pid::from_raw(2), Signal::SIGKILL, false);
        assert_eq!(
            interpret_wait_status(status).unwrap(),
            SessionOutcome::Signaled(Signal::SIGKILL)
        );
    }

    #[test]
    fn test_init_setup_failure_is_not_a_shell_exit() {
        let status = WaitStatus::Exited(Pid::from_raw(2), INIT_FAILURE_CODE);
        assert!(matches!(
            interpret_wait_status(status),
            Err(ProctorError::Namespace(_))
        ));
    }

    #[test]
    fn test_failed_reexec_is_not_a_shell_exit() {
        let status = WaitStatus::Exited(Pid::from_raw(2), REEXEC_FAILURE_CODE);
        assert!(matches!(
            interpret_wait_status(status),
            Err(ProctorError::Namespace(_))
        ));
    }

    #[test]
    fn test_stopped_init_is_an_error() {
        let status = WaitStatus::Stopped(Pid::from_raw(2), Signal::SIGSTOP);
        assert!(interpret_wait_status(status).is_err());
    }
}
