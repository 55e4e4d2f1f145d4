//! Dispatch facade.
//!
//! The only entry point other subsystems (prompt sender, screenshot
//! annotator, queue runner) use to push text into a session.

use std::sync::Arc;

use super::manager::SessionManager;

/// Thin handle exposing only text dispatch.
#[derive(Clone)]
pub struct Dispatcher {
    manager: Arc<SessionManager>,
}

impl Dispatcher {
    /// Create a facade over the shared manager.
    #[must_use]
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    /// Push text into the given session.
    ///
    /// Returns `false` — never an error — when the session is closed or
    /// its process has exited; callers branch on the result and prompt
    /// for another target. A successful dispatch updates the session's
    /// activity timestamp.
    pub async fn dispatch(&self, text: &str, session_id: &str) -> bool {
        self.manager.dispatch(text, session_id).await
    }
}
