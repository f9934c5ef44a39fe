#[path = "common/mod.rs"]
mod common;

use std::fs;

#[cfg(target_os = "linux")]
use common::wait_for_process_exit;
use common::{dead_pid, is_process_alive};
use tempfile::tempdir;
use wamp::{
    error::StackError,
    process::{ServiceManager, ServiceState},
};

fn sleeper(dir: &std::path::Path) -> ServiceManager {
    ServiceManager::new("apache", "/bin/sleep", ["30"], dir)
}

#[test]
fn start_records_pid_and_stop_removes_it() {
    let temp = tempdir().expect("failed to create tempdir");
    let manager = sleeper(temp.path());

    let process = manager.start().expect("start failed");
    let recorded = fs::read_to_string(manager.registry_file()).expect("registry file missing");
    assert_eq!(recorded, process.pid.to_string());
    assert!(is_process_alive(process.pid));

    let status = manager.status().expect("status failed");
    assert_eq!(status.state, ServiceState::Running);
    assert_eq!(status.pid, Some(process.pid));

    manager.stop().expect("stop failed");
    assert!(!manager.registry_file().exists());
    #[cfg(target_os = "linux")]
    wait_for_process_exit(process.pid);
}

#[test]
fn second_start_is_rejected_without_touching_registry() {
    let temp = tempdir().expect("failed to create tempdir");
    let manager = sleeper(temp.path());

    let process = manager.start().expect("start failed");
    let before = fs::read_to_string(manager.registry_file()).expect("registry file missing");

    let err = manager.start().expect_err("second start should fail");
    assert!(
        matches!(err, StackError::AlreadyRunning { pid: Some(pid), .. } if pid == process.pid),
        "unexpected error: {err}"
    );
    let after = fs::read_to_string(manager.registry_file()).expect("registry file missing");
    assert_eq!(before, after);

    manager.stop().expect("stop failed");
}

#[test]
fn stop_then_start_again_succeeds() {
    let temp = tempdir().expect("failed to create tempdir");
    let manager = sleeper(temp.path());

    let first = manager.start().expect("first start failed");
    manager.stop().expect("first stop failed");
    let second = manager.start().expect("restart failed");
    assert_ne!(first.pid, second.pid);
    manager.stop().expect("second stop failed");
}

#[test]
fn stop_without_entry_changes_nothing() {
    let temp = tempdir().expect("failed to create tempdir");
    let manager = sleeper(temp.path());
    fs::write(temp.path().join("mysql_pid"), "4242").expect("failed to seed registry");

    let err = manager.stop().expect_err("stop should fail");
    assert!(matches!(err, StackError::NotRunning { .. }));
    assert_eq!(
        fs::read_to_string(temp.path().join("mysql_pid")).expect("other entry missing"),
        "4242"
    );
    assert!(!manager.registry_file().exists());
}

#[test]
fn start_replaces_entry_of_dead_process() {
    let temp = tempdir().expect("failed to create tempdir");
    let manager = sleeper(temp.path());
    let stale = dead_pid();
    fs::write(manager.registry_file(), stale.to_string()).expect("failed to seed registry");

    assert_eq!(
        manager.status().expect("status failed").state,
        ServiceState::Stale
    );

    let process = manager.start().expect("start over stale entry failed");
    assert_ne!(process.pid, stale);
    assert_eq!(
        fs::read_to_string(manager.registry_file()).expect("registry file missing"),
        process.pid.to_string()
    );
    manager.stop().expect("stop failed");
}

#[test]
fn stop_cleans_up_entry_of_dead_process() {
    let temp = tempdir().expect("failed to create tempdir");
    let manager = sleeper(temp.path());
    fs::write(manager.registry_file(), dead_pid().to_string()).expect("failed to seed registry");

    manager.stop().expect("stop of exited process should succeed");
    assert!(!manager.registry_file().exists());
}

#[test]
fn start_heals_entry_naming_process_group() {
    let temp = tempdir().expect("failed to create tempdir");
    let manager = sleeper(temp.path());
    fs::write(manager.registry_file(), "0").expect("failed to seed registry");

    let status = manager.status().expect("status failed");
    assert_eq!(status.state, ServiceState::Stale);
    assert_eq!(status.pid, None);

    let process = manager.start().expect("start over pid 0 entry failed");
    assert_ne!(process.pid, 0);
    assert_eq!(
        fs::read_to_string(manager.registry_file()).expect("registry file missing"),
        process.pid.to_string()
    );
    manager.stop().expect("stop failed");
}

#[test]
fn stop_never_signals_process_group() {
    let temp = tempdir().expect("failed to create tempdir");
    let manager = sleeper(temp.path());
    let mut bystander = std::process::Command::new("/bin/sleep")
        .arg("30")
        .spawn()
        .expect("failed to spawn bystander");

    fs::write(manager.registry_file(), "0").expect("failed to seed registry");
    manager.stop().expect("stop of unreadable entry should succeed");

    assert!(!manager.registry_file().exists());
    assert!(is_process_alive(std::process::id()));
    assert!(is_process_alive(bystander.id()));

    bystander.kill().expect("failed to kill bystander");
    bystander.wait().expect("failed to reap bystander");
}

#[test]
fn failed_launch_releases_claim() {
    let temp = tempdir().expect("failed to create tempdir");
    let manager = ServiceManager::new(
        "mysql",
        temp.path().join("bin/mariadbd"),
        ["--console"],
        temp.path(),
    );

    let err = manager.start().expect_err("missing binary should fail");
    assert!(matches!(err, StackError::ServiceStartError { ref service, .. } if service == "mysql"));
    assert!(!manager.registry_file().exists());
}

#[test]
fn service_output_goes_to_log_file() {
    let temp = tempdir().expect("failed to create tempdir");
    let script = temp.path().join("bin/httpd");
    common::write_script(&script, "echo listening on 80\nexec sleep 30");
    let manager = ServiceManager::new("apache", &script, Vec::<String>::new(), temp.path());

    manager.start().expect("start failed");
    common::wait_for_path(&manager.log_file());
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    let mut contents = String::new();
    while std::time::Instant::now() < deadline {
        contents = fs::read_to_string(manager.log_file()).unwrap_or_default();
        if contents.contains("listening") {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
    }
    manager.stop().expect("stop failed");
    assert!(contents.contains("listening on 80"), "log was: {contents}");
}
