//! External CLI launcher.
//!
//! Spawns the coding-assistant CLI inside a pseudo-terminal with the
//! working directory, permission-skip flag, and — when resuming — the
//! resume-token argument.

use std::io::{Read, Write};
use std::sync::Arc;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tracing::info;

use crate::config::HelmConfig;
use crate::{AppError, Result};

/// A freshly spawned CLI process and its pseudo-terminal endpoints.
pub struct LaunchedProcess {
    /// Child process handle.
    pub child: Box<dyn Child + Send>,
    /// Master side of the pseudo-terminal; kept for resizing.
    pub master: Box<dyn MasterPty + Send>,
    /// Input stream of the process.
    pub writer: Box<dyn Write + Send>,
    /// Raw output stream of the process.
    pub reader: Box<dyn Read + Send>,
}

/// Builds and starts the external CLI with the correct argument set.
#[derive(Clone)]
pub struct SessionLauncher {
    config: Arc<HelmConfig>,
}

impl SessionLauncher {
    /// Create a launcher using the given configuration.
    #[must_use]
    pub fn new(config: Arc<HelmConfig>) -> Self {
        Self { config }
    }

    /// Spawn the CLI, fresh or resuming.
    ///
    /// Passing a `resume_token` only requests restoration; whether the CLI
    /// accepted it is decided later by scanning its output.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the pseudo-terminal cannot be opened or
    /// the process fails to start.
    pub fn launch(
        &self,
        working_directory: Option<&str>,
        resume_token: Option<&str>,
    ) -> Result<LaunchedProcess> {
        let mut cmd = CommandBuilder::new(&self.config.cli_program);
        cmd.args(&self.config.cli_args);
        if self.config.skip_permissions {
            cmd.arg("--dangerously-skip-permissions");
        }
        if let Some(token) = resume_token {
            cmd.arg("--resume");
            cmd.arg(token);
        }
        if let Some(dir) = working_directory {
            cmd.cwd(dir);
        }
        cmd.env("TERM", "xterm-256color");

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: self.config.pty_rows,
                cols: self.config.pty_cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| AppError::Spawn(format!("openpty failed: {err}")))?;

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|err| AppError::Spawn(format!("failed to spawn {}: {err}", self.config.cli_program)))?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|err| AppError::Spawn(format!("clone reader failed: {err}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|err| AppError::Spawn(format!("take writer failed: {err}")))?;

        info!(
            program = %self.config.cli_program,
            pid = child.process_id().unwrap_or(0),
            resuming = resume_token.is_some(),
            "external CLI spawned"
        );

        Ok(LaunchedProcess {
            child,
            master: pair.master,
            writer,
            reader,
        })
    }
}
