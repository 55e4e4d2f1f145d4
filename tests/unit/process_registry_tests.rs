use agent_helm::process_registry::ProcessRegistry;

fn registry_in(temp: &tempfile::TempDir) -> ProcessRegistry {
    ProcessRegistry::new(temp.path().join("live_pids.json"))
}

/// Read the pids currently recorded in the side-channel file.
fn recorded_pids(temp: &tempfile::TempDir) -> Vec<u64> {
    let text = std::fs::read_to_string(temp.path().join("live_pids.json"))
        .expect("registry file exists");
    let parsed: serde_json::Value = serde_json::from_str(&text).expect("valid json");
    parsed["entries"]
        .as_array()
        .expect("entries array")
        .iter()
        .map(|e| e["pid"].as_u64().expect("pid field"))
        .collect()
}

#[test]
fn register_writes_durable_entry() {
    let temp = tempfile::tempdir().expect("tempdir");
    let registry = registry_in(&temp);

    registry.register(12345).expect("register");

    assert_eq!(recorded_pids(&temp), vec![12345]);
}

#[test]
fn register_same_pid_twice_keeps_one_entry() {
    let temp = tempfile::tempdir().expect("tempdir");
    let registry = registry_in(&temp);

    registry.register(12345).expect("register");
    registry.register(12345).expect("re-register");

    assert_eq!(recorded_pids(&temp), vec![12345]);
}

#[test]
fn unregister_removes_entry() {
    let temp = tempfile::tempdir().expect("tempdir");
    let registry = registry_in(&temp);

    registry.register(111).expect("register");
    registry.register(222).expect("register");
    registry.unregister(111).expect("unregister");

    assert_eq!(recorded_pids(&temp), vec![222]);
}

#[test]
fn cleanup_with_no_file_is_a_noop() {
    let temp = tempfile::tempdir().expect("tempdir");
    let registry = registry_in(&temp);

    assert_eq!(registry.cleanup_orphans(&[]), 0);
}

#[test]
fn corrupt_registry_file_starts_empty() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("live_pids.json"), "{not json").expect("write");
    let registry = registry_in(&temp);

    assert_eq!(registry.cleanup_orphans(&[]), 0);
    registry.register(333).expect("register after corruption");
    assert_eq!(recorded_pids(&temp), vec![333]);
}

#[cfg(unix)]
#[test]
fn cleanup_terminates_unclaimed_orphan() {
    let temp = tempfile::tempdir().expect("tempdir");
    let registry = registry_in(&temp);

    let mut child = std::process::Command::new("sleep")
        .arg("30")
        .spawn()
        .expect("spawn sleep");
    registry.register(child.id()).expect("register");

    let attempted = registry.cleanup_orphans(&[]);
    assert_eq!(attempted, 1);

    // SIGTERM ends the sleep; wait reaps it.
    let status = child.wait().expect("wait");
    assert!(!status.success(), "orphan should have been signalled");

    // The swept entry is gone from the file.
    assert!(recorded_pids(&temp).is_empty());
}

#[cfg(unix)]
#[test]
fn cleanup_spares_claimed_pids() {
    let temp = tempfile::tempdir().expect("tempdir");
    let registry = registry_in(&temp);

    let mut child = std::process::Command::new("sleep")
        .arg("30")
        .spawn()
        .expect("spawn sleep");
    let pid = child.id();
    registry.register(pid).expect("register");

    let attempted = registry.cleanup_orphans(&[pid]);
    assert_eq!(attempted, 0);
    assert_eq!(recorded_pids(&temp), vec![u64::from(pid)]);

    child.kill().expect("kill");
    child.wait().expect("wait");
}

#[cfg(unix)]
#[test]
fn cleanup_of_dead_pid_is_counted_not_fatal() {
    let temp = tempfile::tempdir().expect("tempdir");
    let registry = registry_in(&temp);

    // A child that has already exited and been reaped: its pid is dead.
    let mut child = std::process::Command::new("true").spawn().expect("spawn");
    let pid = child.id();
    child.wait().expect("wait");

    registry.register(pid).expect("register");
    let attempted = registry.cleanup_orphans(&[]);

    assert_eq!(attempted, 1, "dead pid still gets a termination attempt");
}
