use agent_helm::runtime::classifier::{classify, ResumeVerdict, CLASSIFIER_VERSION};

#[test]
fn marker_set_version_is_current() {
    assert_eq!(CLASSIFIER_VERSION, 1);
}

#[test]
fn empty_output_is_unknown() {
    assert_eq!(classify(""), ResumeVerdict::Unknown);
}

#[test]
fn unrelated_output_is_unknown() {
    let output = "Loading workspace...\nIndexing files\n";
    assert_eq!(classify(output), ResumeVerdict::Unknown);
}

#[test]
fn each_stale_marker_is_detected() {
    let samples = [
        "Error: No conversation found with session ID abc123",
        "Session not found: abc123",
        "'abc123' is not a valid session",
    ];
    for sample in samples {
        assert_eq!(
            classify(sample),
            ResumeVerdict::StaleSession,
            "should flag: {sample}"
        );
    }
}

#[test]
fn marker_split_across_chunks_is_detected_once_accumulated() {
    // The probe accumulates chunks before classifying; a marker that
    // arrives in two reads must still be found in the joined text.
    let first = "Error: No conversa";
    let second = "tion found with that ID";
    assert_eq!(classify(first), ResumeVerdict::Unknown);
    let mut joined = String::from(first);
    joined.push_str(second);
    assert_eq!(classify(&joined), ResumeVerdict::StaleSession);
}

#[test]
fn ready_footer_means_ok() {
    let output = "Welcome back!\n? for shortcuts\n";
    assert_eq!(classify(output), ResumeVerdict::Ok);
}

#[test]
fn stale_marker_wins_over_ready_footer() {
    let output = "Session not found: abc123\nStarting fresh...\n? for shortcuts\n";
    assert_eq!(classify(output), ResumeVerdict::StaleSession);
}
