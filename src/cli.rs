//! Command-line surface
//!
//! Three subcommands. `build` and `start` are the public pair; the hidden
//! `sandbox-init` is the landing point for the re-exec'd init role. The
//! role always travels through this dedicated subcommand, never through
//! argv[0] inspection.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

use crate::archive::{build_archive, load_archive, UnlockGate, UNLOCK_TIME_FORMAT};
use crate::config::ProctorConfig;
use crate::report::SessionReport;
use crate::sandbox::{self, InitParams, SessionLock};

/// Proctored command-line exams: time-locked archives, sandboxed sessions.
#[derive(Debug, Parser)]
#[command(name = "proctor", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Package a challenge folder into a time-locked encrypted archive
    Build(BuildArgs),
    /// Unlock an archive and run a proctored sandbox session
    Start(StartArgs),
    /// Internal: init role inside the sandbox namespaces
    #[command(hide = true)]
    SandboxInit(InitArgs),
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Challenge folder to package
    #[arg(short, long)]
    pub folder: PathBuf,

    /// Content passphrase protecting the payload
    #[arg(short, long)]
    pub passphrase: String,

    /// Starter key sealing the unlock time
    #[arg(short = 'k', long)]
    pub starter_key: String,

    /// Unlock time, local, "YYYY-MM-DD HH:MM"
    #[arg(short, long, value_parser = parse_unlock_time_arg)]
    pub unlock_at: DateTime<Local>,

    /// Output archive path
    #[arg(short, long, default_value = "exam-archive.enc")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct StartArgs {
    /// Student identifier, used for logs and the session report
    #[arg(short = 'i', long)]
    pub student: String,

    /// Archive produced by `build`
    #[arg(short, long)]
    pub archive: PathBuf,

    /// Content passphrase
    #[arg(short, long)]
    pub passphrase: String,

    /// Starter key
    #[arg(short = 'k', long)]
    pub starter_key: String,

    /// Allotted session duration, e.g. "1h30m"
    #[arg(short, long, value_parser = humantime::parse_duration)]
    pub duration: Duration,

    /// Directory for the end-of-session report
    #[arg(short, long, default_value = "exam-results")]
    pub output_dir: PathBuf,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    #[arg(long)]
    pub staging_root: PathBuf,
    #[arg(long)]
    pub user: String,
    #[arg(long)]
    pub hostname: String,
    #[arg(long)]
    pub shell: String,
}

/// Top-level dispatch.
pub fn run(cli: Cli, config: ProctorConfig) -> Result<()> {
    match cli.command {
        Command::Build(args) => run_build(args),
        Command::Start(args) => run_start(args, config),
        Command::SandboxInit(args) => run_sandbox_init(args),
    }
}

fn run_build(args: BuildArgs) -> Result<()> {
    info!("Building archive from {}", args.folder.display());
    build_archive(
        &args.folder,
        &args.passphrase,
        &args.starter_key,
        args.unlock_at,
        &args.output,
    )
    .with_context(|| format!("Failed to build archive from {}", args.folder.display()))?;
    Ok(())
}

fn run_start(args: StartArgs, config: ProctorConfig) -> Result<()> {
    sandbox::ensure_elevated()?;
    info!(
        "Proctored session for {} from archive {}",
        args.student,
        args.archive.display()
    );

    let _lock = SessionLock::acquire(&config.lock_file)?;
    sandbox::install_base_image(&config.staging_root)
        .context("Failed to install the base filesystem image")?;

    let started_at = Local::now();
    let gate = load_archive(
        &args.archive,
        &args.passphrase,
        &args.starter_key,
        started_at,
        &config.payload_dir(),
    );
    let gate = match gate {
        Ok(gate) => gate,
        Err(err) => {
            // no session happened; do not leave the staging tree behind
            heal_best_effort(&config);
            return Err(err).with_context(|| {
                format!("Failed to load archive {}", args.archive.display())
            });
        }
    };

    let UnlockGate::Open { unlock_at } = gate else {
        warn!(
            "Exam is not yet unlocked (opens {}); nothing was extracted",
            gate.unlock_at().format(UNLOCK_TIME_FORMAT)
        );
        heal_best_effort(&config);
        return Ok(());
    };

    let outcome = sandbox::run_session(&config)?;
    let ended_at = Local::now();

    let report = SessionReport {
        student: args.student.clone(),
        archive: args.archive.clone(),
        unlock_at,
        started_at,
        ended_at,
        allotted: humantime::format_duration(args.duration).to_string(),
        shell_exit_code: None,
        shell_signal: None,
    }
    .with_outcome(outcome);
    let report_path = report
        .write_to(&args.output_dir)
        .context("Failed to write the session report")?;

    info!(
        "Session for {} complete, report at {}",
        args.student,
        report_path.display()
    );
    Ok(())
}

/// Init-role entry point. A setup failure exits with the reserved
/// `INIT_FAILURE_CODE`; an ordinary exit code from this process always
/// belongs to the shell.
fn run_sandbox_init(args: InitArgs) -> Result<()> {
    let params = InitParams {
        staging_root: args.staging_root,
        user: args.user,
        hostname: args.hostname,
        shell: args.shell,
    };
    if let Err(err) = sandbox::run_init(&params) {
        error!("{err}");
        std::process::exit(sandbox::INIT_FAILURE_CODE);
    }
    Ok(())
}

fn heal_best_effort(config: &ProctorConfig) {
    if let Err(err) = sandbox::heal_staging_root(&config.staging_root) {
        warn!(
            "Staging cleanup incomplete at {}: {}",
            config.staging_root.display(),
            err
        );
    }
}

fn parse_unlock_time_arg(raw: &str) -> Result<DateTime<Local>, String> {
    let naive = NaiveDateTime::parse_from_str(raw, UNLOCK_TIME_FORMAT)
        .map_err(|err| format!("expected \"YYYY-MM-DD HH:MM\" (24-hour, local time): {err}"))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| format!("{raw:?} does not exist in the local time zone"))
}
