//! Session manager: single source of truth for session-id → {record,
//! binding}.
//!
//! All map mutations and record persistence go through one `Mutex`; spawn
//! and output-scanning work runs in the background and re-locks before
//! touching shared state. Bindings are owned exclusively by this map — no
//! other component holds an owning reference.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn};

use crate::config::HelmConfig;
use crate::models::project::ProjectRef;
use crate::models::session::SessionRecord;
use crate::persistence::db::Database;
use crate::persistence::session_repo::SessionRepo;
use crate::process_registry::ProcessRegistry;
use crate::runtime::binding::TerminalBinding;
use crate::runtime::launcher::{LaunchedProcess, SessionLauncher};
use crate::{AppError, Result};

use super::resume;

/// One open session: its durable record plus, while a process is live,
/// the binding and any in-flight resume probe.
struct SessionEntry {
    record: SessionRecord,
    binding: Option<TerminalBinding>,
    probe: Option<CancellationToken>,
}

#[derive(Default)]
struct ManagerState {
    sessions: HashMap<String, SessionEntry>,
    active: Option<String>,
    pending_resume: Vec<SessionRecord>,
    next_generation: u64,
}

/// Central orchestrator for concurrent CLI terminal sessions.
///
/// Construct one per application (dependency-injected, never global) and
/// share it as an `Arc`.
pub struct SessionManager {
    config: Arc<HelmConfig>,
    repo: SessionRepo,
    registry: ProcessRegistry,
    launcher: SessionLauncher,
    state: Mutex<ManagerState>,
}

impl SessionManager {
    /// Build a manager over an already-connected database.
    #[must_use]
    pub fn new(config: Arc<HelmConfig>, db: Arc<Database>) -> Self {
        let registry = ProcessRegistry::new(config.registry_path());
        let launcher = SessionLauncher::new(Arc::clone(&config));
        Self {
            config,
            repo: SessionRepo::new(db),
            registry,
            launcher,
            state: Mutex::new(ManagerState::default()),
        }
    }

    /// Launch-time reconciliation: sweep orphaned processes from previous
    /// runs, purge expired records, and load the resumption candidates.
    ///
    /// Spawns nothing; the returned records feed the resume picker.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the persisted store cannot be read.
    pub async fn startup(&self) -> Result<Vec<SessionRecord>> {
        let span = info_span!("session_startup");
        let _guard = span.enter();

        // No bindings exist yet this run, so every recorded pid is an orphan.
        let orphans = self.registry.cleanup_orphans(&[]);

        let purged = self
            .cleanup_stale_sessions(self.config.retention_window())
            .await?;

        let cutoff = Utc::now() - self.config.retention_window();
        let pending = self.repo.list_recent(cutoff).await?;

        let mut state = self.state.lock().await;
        state.pending_resume.clone_from(&pending);
        drop(state);

        info!(
            orphans,
            purged,
            resumable = pending.len(),
            "session manager started"
        );
        Ok(pending)
    }

    /// Open a fresh session.
    ///
    /// Atomic: on any failure after the spawn, the process is terminated
    /// and nothing is registered or persisted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CapacityExceeded` when the concurrent-session
    /// limit is reached, `AppError::Spawn` if the CLI fails to start, or
    /// `AppError::Db` if persisting the record fails.
    pub async fn create_session(
        &self,
        working_directory: Option<String>,
        project: Option<&ProjectRef>,
    ) -> Result<String> {
        let span = info_span!("create_session");
        let _guard = span.enter();

        let mut state = self.state.lock().await;
        self.ensure_capacity(&state)?;

        let mut record = SessionRecord::new(
            session_name(working_directory.as_deref()),
            working_directory,
        );
        record.project_id = project.map(|p| p.id.clone());

        let launched = self
            .launcher
            .launch(record.working_directory.as_deref(), None)?;
        let binding = self.bind(&record.id, &mut state, launched)?;

        if let Err(err) = self.repo.create(&record).await {
            self.release_binding(binding);
            return Err(err);
        }

        let id = record.id.clone();
        info!(session_id = %id, "session created");
        insert_entry(&mut state, record, binding, None);
        Ok(id)
    }

    /// Close a session: terminate its process, drop the binding, delete
    /// the persisted record, and reassign the active pointer. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if deleting the persisted record fails.
    pub async fn close_session(&self, id: &str) -> Result<()> {
        let span = info_span!("close_session", session_id = id);
        let _guard = span.enter();

        let mut state = self.state.lock().await;
        if let Some(mut entry) = state.sessions.remove(id) {
            if let Some(probe) = entry.probe.take() {
                probe.cancel();
            }
            if let Some(binding) = entry.binding.take() {
                self.release_binding(binding);
            }
        }
        state.pending_resume.retain(|r| r.id != id);
        self.repo.delete(id).await?;

        if state.active.as_deref() == Some(id) {
            state.active = most_recently_active(&state.sessions);
        }
        info!(session_id = id, "session closed");
        Ok(())
    }

    /// Rotate the active pointer through the open sessions in creation
    /// order. No-op with one or zero sessions open.
    pub async fn cycle_active(&self, forward: bool) {
        let mut state = self.state.lock().await;
        let mut ids: Vec<(chrono::DateTime<Utc>, String)> = state
            .sessions
            .values()
            .map(|e| (e.record.created_at, e.record.id.clone()))
            .collect();
        if ids.len() <= 1 {
            return;
        }
        ids.sort();

        let current = state
            .active
            .as_ref()
            .and_then(|active| ids.iter().position(|(_, id)| id == active))
            .unwrap_or(0);
        let next = if forward {
            (current + 1) % ids.len()
        } else {
            (current + ids.len() - 1) % ids.len()
        };
        state.active = Some(ids[next].1.clone());
    }

    /// Records last active inside `window`, most recent first. Spawns no
    /// bindings.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn load_persisted_sessions(
        &self,
        window: chrono::Duration,
    ) -> Result<Vec<SessionRecord>> {
        self.repo.list_recent(Utc::now() - window).await
    }

    /// Reopen a persisted session, resuming the external CLI's own session
    /// when the record carries a token.
    ///
    /// The spawned process is kept regardless of the token's validity: a
    /// stale token is detected by a bounded background probe that merely
    /// downgrades the record to fresh-only. Resuming an already-open
    /// session is a no-op returning its id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CapacityExceeded` when the concurrent-session
    /// limit is reached or `AppError::Spawn` if the CLI fails to start.
    pub async fn resume_session(self: &Arc<Self>, record: SessionRecord) -> Result<String> {
        let span = info_span!("resume_session", session_id = %record.id);
        let _guard = span.enter();

        let mut state = self.state.lock().await;
        if state.sessions.contains_key(&record.id) {
            return Ok(record.id);
        }
        self.ensure_capacity(&state)?;

        let token = record.resume_token.clone();
        let launched = self
            .launcher
            .launch(record.working_directory.as_deref(), token.as_deref())?;
        let binding = self.bind(&record.id, &mut state, launched)?;

        let id = record.id.clone();
        state.pending_resume.retain(|r| r.id != id);

        let probe = if token.is_some() {
            let cancel = CancellationToken::new();
            resume::spawn_resume_probe(
                Arc::clone(self),
                id.clone(),
                binding.generation(),
                binding.subscribe(),
                cancel.clone(),
                Duration::from_secs(self.config.resume_probe_seconds),
            );
            Some(cancel)
        } else {
            None
        };

        info!(session_id = %id, resuming = token.is_some(), "session reopened");
        insert_entry(&mut state, record, binding, probe);
        Ok(id)
    }

    /// Best-effort match of the session's working directory against known
    /// project roots. No-op when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if persisting a successful match fails.
    pub async fn associate_with_project(&self, id: &str, projects: &[ProjectRef]) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(entry) = state.sessions.get_mut(id) else {
            return Ok(());
        };
        let Some(dir) = entry.record.working_directory.as_deref() else {
            return Ok(());
        };
        let Some(project) = projects.iter().find(|p| Path::new(dir).starts_with(&p.root)) else {
            return Ok(());
        };

        entry.record.project_id = Some(project.id.clone());
        self.repo.set_project(id, &project.id).await?;
        debug!(session_id = id, project_id = %project.id, "session associated with project");
        Ok(())
    }

    /// Mark the session as active now; called after every successful
    /// dispatch.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session is not open, or
    /// `AppError::Db` if the persisted update fails.
    pub async fn update_activity(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let entry = state
            .sessions
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("session {id} not open")))?;
        entry.record.touch();
        let at = entry.record.last_activity_at;
        self.repo.touch(id, at).await
    }

    /// Delete records older than `window` that have no live binding.
    /// Records of open sessions are never removed, regardless of age.
    ///
    /// Returns the number of records deleted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn cleanup_stale_sessions(&self, window: chrono::Duration) -> Result<u64> {
        let state = self.state.lock().await;
        let open: Vec<String> = state.sessions.keys().cloned().collect();
        drop(state);

        let cutoff = Utc::now() - window;
        let deleted = self.repo.delete_older_than(cutoff, &open).await?;
        if deleted > 0 {
            info!(deleted, "stale session records purged");
        }
        Ok(deleted)
    }

    /// Push text into a session's input stream.
    ///
    /// Returns `false` — never an error — when the session has no live
    /// binding; callers treat that as "unavailable, pick another target".
    pub async fn dispatch(&self, text: &str, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(entry) = state.sessions.get_mut(id) else {
            return false;
        };
        let Some(binding) = entry.binding.as_mut() else {
            return false;
        };
        if !binding.send(text) {
            return false;
        }

        entry.record.touch();
        let at = entry.record.last_activity_at;
        if let Err(err) = self.repo.touch(id, at).await {
            // The text is already delivered; a failed activity write must
            // not turn a successful dispatch into a failure.
            warn!(session_id = id, %err, "failed to persist activity timestamp");
        }
        true
    }

    /// Store the resume token the external CLI reported for this session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session is not open, or
    /// `AppError::Db` if the persisted update fails.
    pub async fn note_resume_token(&self, id: &str, token: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let entry = state
            .sessions
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("session {id} not open")))?;
        entry.record.resume_token = Some(token.to_owned());
        self.repo.set_resume_token(id, token).await
    }

    /// Rename a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session is not open, or
    /// `AppError::Db` if the persisted update fails.
    pub async fn rename_session(&self, id: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let entry = state
            .sessions
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("session {id} not open")))?;
        entry.record.name = name.to_owned();
        self.repo.rename(id, name).await
    }

    /// Identifier of the currently active session, if any.
    pub async fn active_session_id(&self) -> Option<String> {
        self.state.lock().await.active.clone()
    }

    /// Records still awaiting a resume decision from the user.
    pub async fn pending_resume(&self) -> Vec<SessionRecord> {
        self.state.lock().await.pending_resume.clone()
    }

    /// In-memory snapshot of an open session's record.
    pub async fn session_record(&self, id: &str) -> Option<SessionRecord> {
        self.state
            .lock()
            .await
            .sessions
            .get(id)
            .map(|e| e.record.clone())
    }

    /// Ids of all open sessions, in no particular order.
    pub async fn open_session_ids(&self) -> Vec<String> {
        self.state.lock().await.sessions.keys().cloned().collect()
    }

    /// Whether the session has a live, dispatch-usable binding.
    pub async fn is_session_alive(&self, id: &str) -> bool {
        self.state
            .lock()
            .await
            .sessions
            .get(id)
            .and_then(|e| e.binding.as_ref())
            .is_some_and(TerminalBinding::is_active)
    }

    /// Subscribe to a session's raw output stream, if it is open.
    pub async fn subscribe_output(
        &self,
        id: &str,
    ) -> Option<tokio::sync::broadcast::Receiver<String>> {
        self.state
            .lock()
            .await
            .sessions
            .get(id)
            .and_then(|e| e.binding.as_ref())
            .map(TerminalBinding::subscribe)
    }

    /// Terminate every open session's process but keep all records, so
    /// the next launch can offer resumption.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        let count = state.sessions.len();
        for (_, mut entry) in state.sessions.drain() {
            if let Some(probe) = entry.probe.take() {
                probe.cancel();
            }
            if let Some(binding) = entry.binding.take() {
                self.release_binding(binding);
            }
        }
        state.active = None;
        info!(sessions = count, "session manager shut down");
    }

    /// Resume-probe callback: clear the record's token after a stale
    /// marker was seen.
    ///
    /// Re-checks binding liveness first — if the session was closed or the
    /// binding replaced while the probe was in flight, this is a no-op.
    pub(crate) async fn apply_stale_verdict(&self, id: &str, generation: u64) {
        let mut state = self.state.lock().await;
        let Some(entry) = state.sessions.get_mut(id) else {
            return;
        };
        if entry.binding.as_ref().map(TerminalBinding::generation) != Some(generation) {
            return;
        }

        entry.record.resume_token = None;
        entry.probe = None;
        debug!(
            session_id = id,
            "stale resume token cleared; continuing as fresh session"
        );
        if let Err(err) = self.repo.clear_resume_token(id).await {
            warn!(session_id = id, %err, "failed to persist resume-token reset");
        }
    }

    /// Resume-probe callback: the observation window ended without a
    /// stale marker.
    pub(crate) async fn finish_probe(&self, id: &str) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.sessions.get_mut(id) {
            entry.probe = None;
        }
    }

    fn ensure_capacity(&self, state: &ManagerState) -> Result<()> {
        let limit = self.config.max_concurrent_sessions;
        if state.sessions.len() >= limit as usize {
            return Err(AppError::CapacityExceeded { limit });
        }
        Ok(())
    }

    /// Wrap a launched process in a binding and note its pid in the
    /// durable registry.
    fn bind(
        &self,
        session_id: &str,
        state: &mut ManagerState,
        launched: LaunchedProcess,
    ) -> Result<TerminalBinding> {
        state.next_generation += 1;
        let binding = TerminalBinding::new(session_id, state.next_generation, launched);
        if let Some(pid) = binding.pid() {
            if let Err(err) = self.registry.register(pid) {
                self.release_binding(binding);
                return Err(err);
            }
        }
        Ok(binding)
    }

    /// Terminate a binding and remove its pid from the registry.
    fn release_binding(&self, mut binding: TerminalBinding) {
        let pid = binding.pid();
        binding.terminate();
        if let Some(pid) = pid {
            if let Err(err) = self.registry.unregister(pid) {
                warn!(pid, %err, "failed to drop pid from registry");
            }
        }
    }

}

fn insert_entry(
    state: &mut ManagerState,
    record: SessionRecord,
    binding: TerminalBinding,
    probe: Option<CancellationToken>,
) {
    let id = record.id.clone();
    // Entries are only inserted for ids absent from the map; a live
    // binding is never silently replaced.
    debug_assert!(!state.sessions.contains_key(&id));
    state.sessions.insert(
        id.clone(),
        SessionEntry {
            record,
            binding: Some(binding),
            probe,
        },
    );
    if state.active.is_none() {
        state.active = Some(id);
    }
}

/// Derive a display name from the working directory's last component.
fn session_name(working_directory: Option<&str>) -> String {
    working_directory
        .and_then(|dir| Path::new(dir).file_name())
        .map_or_else(|| "agent".to_owned(), |n| n.to_string_lossy().into_owned())
}

/// Most recently active open session, for active-pointer reassignment.
fn most_recently_active(sessions: &HashMap<String, SessionEntry>) -> Option<String> {
    sessions
        .values()
        .max_by_key(|e| e.record.last_activity_at)
        .map(|e| e.record.id.clone())
}
