//! End-of-session report
//!
//! A small JSON summary dropped into the results directory after the
//! sandbox session ends. The student identifier is a labeling field only;
//! it never participates in key derivation or the time gate.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::ProctorError;
use crate::sandbox::SessionOutcome;

/// Summary of one proctored session.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionReport {
    pub student: String,
    pub archive: PathBuf,
    pub unlock_at: DateTime<Local>,
    pub started_at: DateTime<Local>,
    pub ended_at: DateTime<Local>,
    /// Allotted wall-clock time in humantime notation
    pub allotted: String,
    /// Exit code of the sandboxed shell, when it exited on its own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_exit_code: Option<i32>,
    /// Signal that ended the session, when there was one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_signal: Option<String>,
}

impl SessionReport {
    /// Fold the session outcome into the report.
    pub fn with_outcome(mut self, outcome: SessionOutcome) -> Self {
        match outcome {
            SessionOutcome::Exited(code) => self.shell_exit_code = Some(code),
            SessionOutcome::Signaled(signal) => self.shell_signal = Some(signal.to_string()),
        }
        self
    }

    /// Write the report as pretty JSON, returning the file path.
    pub fn write_to(&self, output_dir: &Path) -> Result<PathBuf, ProctorError> {
        fs::create_dir_all(output_dir)?;
        let name = format!(
            "report-{}-{}.json",
            sanitize_label(&self.student),
            self.ended_at.format("%Y%m%d-%H%M%S")
        );
        let path = output_dir.join(name);
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(&path, json)?;
        Ok(path)
    }
}

/// Keep the student identifier filename-safe.
fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
