//! Terminal runtime binding.
//!
//! Couples one live process and its pseudo-terminal to one output surface.
//! The binding owns the process handle; surfaces only hold broadcast
//! receivers. Teardown always requests termination before any internal
//! reference is released, so no output callback can fire against a
//! half-released binding.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use portable_pty::{Child, MasterPty, PtySize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::launcher::LaunchedProcess;
use crate::{AppError, Result};

const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// Live pairing of a session's process with its output channel.
///
/// State machine: alive on construction; `terminate` (explicit close or
/// drop) moves it to terminated; a terminated binding is inert — `send`
/// returns `false` and output has stopped.
pub struct TerminalBinding {
    session_id: String,
    generation: u64,
    pid: Option<u32>,
    child: Option<Box<dyn Child + Send>>,
    writer: Option<Box<dyn Write + Send>>,
    master: Box<dyn MasterPty + Send>,
    output: broadcast::Sender<String>,
    alive: Arc<AtomicBool>,
}

impl TerminalBinding {
    /// Take ownership of a launched process and start forwarding its
    /// output to subscribers.
    #[must_use]
    pub fn new(session_id: &str, generation: u64, launched: LaunchedProcess) -> Self {
        let (output, _) = broadcast::channel(OUTPUT_CHANNEL_CAPACITY);
        let alive = Arc::new(AtomicBool::new(true));

        spawn_reader(
            launched.reader,
            output.clone(),
            Arc::clone(&alive),
            session_id.to_owned(),
        );

        Self {
            session_id: session_id.to_owned(),
            generation,
            pid: launched.child.process_id(),
            child: Some(launched.child),
            writer: Some(launched.writer),
            master: launched.master,
            output,
            alive,
        }
    }

    /// Session this binding belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Monotonic counter distinguishing successive bindings of one session.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// OS process id of the child, if known.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Cheap liveness flag; never queries the OS process table.
    ///
    /// Flips to `false` when the process closes its terminal (exit or
    /// crash) or after `terminate`.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.child.is_some() && self.alive.load(Ordering::SeqCst)
    }

    /// Write text into the process's input stream.
    ///
    /// Returns `false` — never an error — if the binding is no longer
    /// alive or the write fails.
    pub fn send(&mut self, text: &str) -> bool {
        if !self.is_active() {
            return false;
        }
        let Some(writer) = self.writer.as_mut() else {
            return false;
        };
        if writer
            .write_all(text.as_bytes())
            .and_then(|()| writer.flush())
            .is_err()
        {
            self.alive.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Subscribe to the process's output stream.
    ///
    /// Receivers are non-owning: dropping one never affects the process.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.output.subscribe()
    }

    /// Resize the pseudo-terminal to match the rendering surface.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the resize ioctl fails.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| AppError::Io(format!("pty resize failed: {err}")))
    }

    /// Synchronously request process termination, then clear internal
    /// references. Safe to call more than once.
    pub fn terminate(&mut self) {
        // Order matters: the process must be asked to stop before the
        // writer and handle are released.
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.kill() {
                debug!(session_id = %self.session_id, %err, "kill on terminate failed");
            }
            if let Err(err) = child.wait() {
                warn!(session_id = %self.session_id, %err, "failed to reap terminated child");
            }
        }
        self.alive.store(false, Ordering::SeqCst);
        self.writer = None;
    }
}

impl Drop for TerminalBinding {
    fn drop(&mut self) {
        // The hosting UI may discard a surface (and with it this binding)
        // at any time; the termination hook must run before release.
        if self.child.is_some() {
            self.terminate();
        }
    }
}

impl std::fmt::Debug for TerminalBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalBinding")
            .field("session_id", &self.session_id)
            .field("generation", &self.generation)
            .field("pid", &self.pid)
            .field("alive", &self.alive.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Forward raw PTY output to the broadcast channel on a dedicated thread,
/// flipping the liveness flag on end-of-stream.
fn spawn_reader(
    mut reader: Box<dyn Read + Send>,
    output: broadcast::Sender<String>,
    alive: Arc<AtomicBool>,
    session_id: String,
) {
    std::thread::spawn(move || {
        let mut buf = [0u8; 8192];
        let mut carry: Vec<u8> = Vec::new();
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let chunk = decode_utf8_chunk(&mut carry, &buf[..n]);
                    if !chunk.is_empty() {
                        // No subscribers is fine; the send only fans out.
                        let _ = output.send(chunk);
                    }
                }
            }
        }
        if !carry.is_empty() {
            let _ = output.send(String::from_utf8_lossy(&carry).into_owned());
        }
        alive.store(false, Ordering::SeqCst);
        debug!(session_id, "pty output stream closed");
    });
}

/// Decode a byte chunk, carrying incomplete UTF-8 sequences over to the
/// next read instead of emitting replacement characters mid-codepoint.
fn decode_utf8_chunk(carry: &mut Vec<u8>, chunk: &[u8]) -> String {
    carry.extend_from_slice(chunk);
    match std::str::from_utf8(carry) {
        Ok(text) => {
            let out = text.to_owned();
            carry.clear();
            out
        }
        Err(err) => {
            let valid = err.valid_up_to();
            if err.error_len().is_some() {
                // Truly invalid bytes; decode lossily and move on.
                let out = String::from_utf8_lossy(carry).into_owned();
                carry.clear();
                return out;
            }
            let out = String::from_utf8_lossy(&carry[..valid]).into_owned();
            carry.drain(..valid);
            out
        }
    }
}
