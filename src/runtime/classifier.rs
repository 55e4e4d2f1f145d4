//! Resume-output classification.
//!
//! The external CLI reports a rejected resume token only as free text in
//! its first seconds of output. All marker knowledge lives here, behind a
//! versioned interface, so the strings can track CLI releases without
//! touching the session state machine.

/// Version of the marker set below. Bump when the external CLI's wording
/// changes.
pub const CLASSIFIER_VERSION: u32 = 1;

/// Substrings the CLI prints when it does not recognize a resume token.
const STALE_MARKERS: &[&str] = &[
    "No conversation found",
    "Session not found",
    "not a valid session",
];

/// Substrings indicating the interactive UI came up normally.
const READY_MARKERS: &[&str] = &["? for shortcuts"];

/// Outcome of scanning resume-window output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeVerdict {
    /// The interactive UI is up and no stale marker was seen.
    Ok,
    /// The CLI rejected the resume token.
    StaleSession,
    /// Not enough output to decide.
    Unknown,
}

/// Classify the accumulated raw output of a resume attempt.
///
/// Stale markers win over ready markers: the rejection line is printed
/// before the CLI falls back to its fresh-session UI.
#[must_use]
pub fn classify(output: &str) -> ResumeVerdict {
    if STALE_MARKERS.iter().any(|m| output.contains(m)) {
        return ResumeVerdict::StaleSession;
    }
    if READY_MARKERS.iter().any(|m| output.contains(m)) {
        return ResumeVerdict::Ok;
    }
    ResumeVerdict::Unknown
}
