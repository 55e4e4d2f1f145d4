//! Bounded stale-resume detection.
//!
//! After a resume launch, the CLI's output is watched for a fixed window.
//! Only an explicit stale marker has any effect; an expired or ambiguous
//! window means "assume still resuming" and changes nothing. The probe is
//! cancellable and re-checks binding liveness (via the generation counter)
//! before applying its verdict, so a session closed mid-probe is left
//! alone.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::runtime::classifier::{classify, ResumeVerdict};

use super::manager::SessionManager;

/// Watch a resumed session's output for stale-session markers until the
/// window closes, the verdict is decided, or the probe is cancelled.
pub(crate) fn spawn_resume_probe(
    manager: Arc<SessionManager>,
    session_id: String,
    generation: u64,
    mut output: broadcast::Receiver<String>,
    cancel: CancellationToken,
    window: Duration,
) {
    drop(tokio::spawn(async move {
        let deadline = Instant::now() + window;
        let mut seen = String::new();

        let verdict = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break ResumeVerdict::Unknown;
            }

            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(session_id, "resume probe cancelled");
                    return;
                }
                chunk = tokio::time::timeout(remaining, output.recv()) => match chunk {
                    Ok(Ok(text)) => {
                        seen.push_str(&text);
                        match classify(&seen) {
                            ResumeVerdict::Unknown => {}
                            decided => break decided,
                        }
                    }
                    // Dropped chunks cannot un-print a marker already seen;
                    // keep scanning what arrives next.
                    Ok(Err(broadcast::error::RecvError::Lagged(_))) => {}
                    Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => {
                        break ResumeVerdict::Unknown;
                    }
                }
            }
        };

        match verdict {
            ResumeVerdict::StaleSession => {
                manager.apply_stale_verdict(&session_id, generation).await;
            }
            ResumeVerdict::Ok | ResumeVerdict::Unknown => {
                debug!(session_id, ?verdict, "resume window closed");
                manager.finish_probe(&session_id).await;
            }
        }
    }));
}
