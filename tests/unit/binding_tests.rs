#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use agent_helm::config::HelmConfig;
use agent_helm::runtime::binding::TerminalBinding;
use agent_helm::runtime::launcher::SessionLauncher;

/// Launcher configured to run an arbitrary shell command instead of the
/// real coding-assistant CLI.
fn sh_launcher(temp: &tempfile::TempDir, script: &str) -> SessionLauncher {
    let toml = format!(
        r#"
data_dir = '{dir}'
cli_program = "sh"
cli_args = ["-c", {script:?}]
skip_permissions = false
"#,
        dir = temp.path().display(),
    );
    let config = HelmConfig::from_toml_str(&toml).expect("valid test config");
    SessionLauncher::new(Arc::new(config))
}

/// Collect broadcast output until `needle` shows up or the deadline hits.
async fn wait_for_output(
    rx: &mut tokio::sync::broadcast::Receiver<String>,
    needle: &str,
) -> String {
    let mut seen = String::new();
    while !seen.contains(needle) {
        let chunk = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {needle:?}, saw: {seen:?}"))
            .expect("output stream open");
        seen.push_str(&chunk);
    }
    seen
}

#[tokio::test]
async fn send_reaches_the_process_input() {
    let temp = tempfile::tempdir().expect("tempdir");
    let launcher = sh_launcher(&temp, "cat");
    let launched = launcher.launch(None, None).expect("launch cat");

    let mut binding = TerminalBinding::new("sess-echo", 1, launched);
    let mut rx = binding.subscribe();

    assert!(binding.is_active());
    assert!(binding.pid().is_some());
    assert!(binding.send("ping\n"));

    wait_for_output(&mut rx, "ping").await;
    binding.terminate();
}

#[tokio::test]
async fn terminate_then_send_returns_false() {
    let temp = tempfile::tempdir().expect("tempdir");
    let launcher = sh_launcher(&temp, "cat");
    let launched = launcher.launch(None, None).expect("launch cat");

    let mut binding = TerminalBinding::new("sess-term", 1, launched);
    assert!(binding.is_active());

    binding.terminate();

    assert!(!binding.is_active());
    assert!(!binding.send("after\n"), "send after terminate must be false");

    // Repeat termination is safe.
    binding.terminate();
}

#[tokio::test]
async fn process_exit_flips_liveness_without_os_polling() {
    let temp = tempfile::tempdir().expect("tempdir");
    let launcher = sh_launcher(&temp, "exit 0");
    let launched = launcher.launch(None, None).expect("launch");

    let mut binding = TerminalBinding::new("sess-exit", 1, launched);

    let mut exited = false;
    for _ in 0..50 {
        if !binding.is_active() {
            exited = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(exited, "liveness flag should flip after the process exits");
    assert!(!binding.send("too late\n"));
}

#[tokio::test]
async fn launch_honors_working_directory() {
    let temp = tempfile::tempdir().expect("tempdir");
    let workdir = tempfile::tempdir().expect("workdir");
    let launcher = sh_launcher(&temp, "pwd; sleep 30");
    let launched = launcher
        .launch(Some(workdir.path().to_str().expect("utf8 path")), None)
        .expect("launch");

    let mut binding = TerminalBinding::new("sess-cwd", 1, launched);
    let mut rx = binding.subscribe();

    let dir_name = workdir
        .path()
        .file_name()
        .expect("dir name")
        .to_string_lossy()
        .into_owned();
    wait_for_output(&mut rx, &dir_name).await;
    binding.terminate();
}

#[tokio::test]
async fn resize_succeeds_on_live_binding() {
    let temp = tempfile::tempdir().expect("tempdir");
    let launcher = sh_launcher(&temp, "sleep 30");
    let launched = launcher.launch(None, None).expect("launch");

    let mut binding = TerminalBinding::new("sess-resize", 7, launched);
    assert_eq!(binding.session_id(), "sess-resize");
    assert_eq!(binding.generation(), 7);

    binding.resize(40, 120).expect("resize");
    binding.terminate();
}
