//! Shared helpers for manager-level integration tests.
//!
//! The external coding-assistant CLI is stood in for by `sh` running a
//! scripted command, so tests exercise the real PTY spawn path without
//! depending on the actual tool being installed.

use std::sync::Arc;

use agent_helm::config::HelmConfig;
use agent_helm::models::session::SessionRecord;
use agent_helm::orchestrator::manager::SessionManager;
use agent_helm::persistence::db;
use agent_helm::persistence::session_repo::SessionRepo;

/// A CLI stand-in that starts and stays idle until terminated.
pub const IDLE_CLI: &str = "sleep 30";

/// Manager plus the handles tests need to assert against its durable state.
pub struct Harness {
    pub manager: Arc<SessionManager>,
    pub repo: SessionRepo,
    data_dir: tempfile::TempDir,
}

impl Harness {
    /// Directory holding the pid side-channel for this manager.
    #[allow(dead_code)]
    pub fn data_path(&self) -> &std::path::Path {
        self.data_dir.path()
    }
}

/// Build a config whose "CLI" is `sh -c <script>`.
pub fn test_config(
    data_dir: &std::path::Path,
    script: &str,
    max_sessions: u32,
    probe_seconds: u64,
) -> HelmConfig {
    let toml = format!(
        r#"
data_dir = '{dir}'
cli_program = "sh"
cli_args = ["-c", {script:?}]
skip_permissions = false
max_concurrent_sessions = {max_sessions}
resume_probe_seconds = {probe_seconds}
retention_days = 30
"#,
        dir = data_dir.display(),
    );
    HelmConfig::from_toml_str(&toml).expect("valid test config")
}

/// Build a manager over in-memory `SQLite` running the given shell script
/// as its external CLI.
pub async fn harness(script: &str, max_sessions: u32, probe_seconds: u64) -> Harness {
    let data_dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(data_dir.path(), script, max_sessions, probe_seconds);
    let pool = Arc::new(db::connect_memory().await.expect("db connect"));
    let manager = Arc::new(SessionManager::new(Arc::new(config), Arc::clone(&pool)));
    Harness {
        manager,
        repo: SessionRepo::new(pool),
        data_dir,
    }
}

/// Persist a record carrying a resume token, as a previous run would have
/// left it.
#[allow(dead_code)]
pub async fn persist_resumable(harness: &Harness, name: &str, token: &str) -> SessionRecord {
    let mut record = SessionRecord::new(name.into(), None);
    record.resume_token = Some(token.into());
    harness.repo.create(&record).await.expect("create record");
    record
}
