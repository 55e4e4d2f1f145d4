//! Orchestrator configuration parsing and validation.

use std::path::PathBuf;

use serde::Deserialize;

use crate::{AppError, Result};

fn default_cli_program() -> String {
    "claude".into()
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent_sessions() -> u32 {
    4
}

fn default_resume_probe_seconds() -> u64 {
    2
}

fn default_retention_days() -> u32 {
    30
}

fn default_pty_rows() -> u16 {
    24
}

fn default_pty_cols() -> u16 {
    80
}

/// Global configuration parsed from `config.toml`.
///
/// Every knob has a serde default so a minimal file only needs `data_dir`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HelmConfig {
    /// Directory holding the session database and the pid side-channel.
    pub data_dir: PathBuf,
    /// External CLI binary launched inside each session's pseudo-terminal.
    #[serde(default = "default_cli_program")]
    pub cli_program: String,
    /// Baseline arguments always passed to the external CLI.
    #[serde(default)]
    pub cli_args: Vec<String>,
    /// Whether to pass the CLI's permission-skip flag.
    #[serde(default = "default_true")]
    pub skip_permissions: bool,
    /// Maximum concurrently open sessions.
    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: u32,
    /// Observation window for stale-resume detection.
    #[serde(default = "default_resume_probe_seconds")]
    pub resume_probe_seconds: u64,
    /// Persisted records older than this are eligible for cleanup.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Pseudo-terminal rows at spawn.
    #[serde(default = "default_pty_rows")]
    pub pty_rows: u16,
    /// Pseudo-terminal columns at spawn.
    #[serde(default = "default_pty_cols")]
    pub pty_cols: u16,
}

impl HelmConfig {
    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing fails or a value is out of range.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.cli_program.trim().is_empty() {
            return Err(AppError::Config("cli_program must not be empty".into()));
        }
        if self.max_concurrent_sessions == 0 {
            return Err(AppError::Config(
                "max_concurrent_sessions must be at least 1".into(),
            ));
        }
        if self.resume_probe_seconds == 0 {
            return Err(AppError::Config(
                "resume_probe_seconds must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Path of the `SQLite` session database.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("sessions.db")
    }

    /// Path of the durable pid side-channel.
    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("live_pids.json")
    }

    /// Retention window derived from `retention_days`.
    #[must_use]
    pub fn retention_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}
