//! Durable side-channel of spawned process ids.
//!
//! Kept in a JSON file separate from the session store so a whole-process
//! crash can still be cleaned up on the next launch. Writes go through a
//! temp file and rename so a crash mid-write never truncates the registry.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// One spawned process noted for crash recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryEntry {
    pid: u32,
    launched_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    entries: Vec<RegistryEntry>,
}

/// Tracks every spawned pid independently of in-memory binding state.
#[derive(Debug, Clone)]
pub struct ProcessRegistry {
    path: PathBuf,
}

impl ProcessRegistry {
    /// Create a registry backed by the given file path.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Record a freshly spawned pid.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the registry file cannot be written.
    pub fn register(&self, pid: u32) -> Result<()> {
        let mut file = self.load();
        file.entries.retain(|e| e.pid != pid);
        file.entries.push(RegistryEntry {
            pid,
            launched_at: Utc::now(),
        });
        self.store(&file)
    }

    /// Remove a pid after its process was terminated by this run.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the registry file cannot be written.
    pub fn unregister(&self, pid: u32) -> Result<()> {
        let mut file = self.load();
        file.entries.retain(|e| e.pid != pid);
        self.store(&file)
    }

    /// Signal-terminate every recorded pid not claimed by a binding created
    /// in this run, then drop the unclaimed entries from the file.
    ///
    /// Per-pid failures (already-dead processes) are ignored; only the
    /// aggregate count is logged. Returns the number of termination
    /// attempts made.
    #[must_use]
    pub fn cleanup_orphans(&self, claimed: &[u32]) -> u32 {
        let mut file = self.load();
        let mut attempted: u32 = 0;

        file.entries.retain(|entry| {
            if claimed.contains(&entry.pid) {
                return true;
            }
            terminate_pid(entry.pid);
            attempted += 1;
            false
        });

        if attempted > 0 {
            if let Err(err) = self.store(&file) {
                warn!(%err, "failed to rewrite pid registry after orphan sweep");
            }
            info!(count = attempted, "terminated orphaned processes");
        }
        attempted
    }

    fn load(&self) -> RegistryFile {
        match fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|err| {
                warn!(%err, "pid registry unreadable, starting empty");
                RegistryFile::default()
            }),
            Err(_) => RegistryFile::default(),
        }
    }

    fn store(&self, file: &RegistryFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| AppError::Io(format!("failed to create registry dir: {err}")))?;
        }
        let json = serde_json::to_string_pretty(file)
            .map_err(|err| AppError::Io(format!("failed to serialize pid registry: {err}")))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .map_err(|err| AppError::Io(format!("failed to write pid registry: {err}")))?;
        fs::rename(&tmp, &self.path)
            .map_err(|err| AppError::Io(format!("failed to replace pid registry: {err}")))?;
        Ok(())
    }
}

#[cfg(unix)]
fn terminate_pid(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        debug!(pid, %err, "orphan termination attempt failed");
    }
}

#[cfg(not(unix))]
fn terminate_pid(pid: u32) {
    debug!(pid, "orphan termination not supported on this platform");
}
