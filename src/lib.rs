//! Proctored command-line examinations
//!
//! Two core pieces: a time-locked encrypted archive format for challenge
//! folders, and a namespace sandbox that runs the unlocked exam in a
//! disposable root filesystem. Everything else (CLI, logging, the session
//! report) is thin glue around those two.

pub mod archive;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod layout;
pub mod report;
pub mod sandbox;

pub use config::ProctorConfig;
pub use error::ProctorError;
