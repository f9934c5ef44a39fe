#[path = "common/mod.rs"]
mod common;

use std::fs;

use assert_cmd::Command;
use common::stack_layout;
use predicates::str::contains;
use tempfile::tempdir;
use wamp::{constants::ServiceKind, runtime::StackLayout};

fn wamp() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("wamp"));
    cmd.env_remove("WAMP_HOME").env_remove("RUST_LOG");
    cmd
}

#[test]
fn init_creates_layout_under_root() {
    let temp = tempdir().expect("failed to create tempdir");
    let root = temp.path().join("stack");

    wamp()
        .arg("init")
        .arg("--root")
        .arg(&root)
        .assert()
        .success();

    let layout = StackLayout::new(&root);
    for dir in layout.skeleton() {
        assert!(dir.is_dir(), "{dir:?} missing");
    }
}

#[test]
fn root_can_come_from_environment() {
    let temp = tempdir().expect("failed to create tempdir");
    let root = temp.path().join("from-env");

    wamp().env("WAMP_HOME", &root).arg("init").assert().success();
    assert!(StackLayout::new(&root).www_dir().is_dir());
}

#[test]
fn unknown_subcommand_fails() {
    wamp().arg("clean").assert().failure().code(2);
    wamp().args(["apache", "restart"]).assert().failure().code(2);
}

#[test]
fn stop_of_uninstalled_service_fails() {
    let temp = tempdir().expect("failed to create tempdir");
    let root = temp.path().join("stack");
    fs::create_dir_all(&root).expect("failed to create root");
    fs::write(
        root.join("wamp.ini"),
        "[apache]\nactive=httpd-2.4\n[mysql]\nactive=mariadb-11\n",
    )
    .expect("failed to write wamp.ini");

    wamp()
        .args(["apache", "stop", "--root"])
        .arg(&root)
        .assert()
        .failure()
        .code(1)
        .stderr(contains("not installed"));
}

#[test]
fn stop_of_stopped_service_fails() {
    let temp = tempdir().expect("failed to create tempdir");
    let layout = stack_layout(&temp.path().join("stack"), "httpd-2.4", "mariadb-11");

    wamp()
        .args(["mysql", "stop", "--root"])
        .arg(layout.root())
        .assert()
        .failure()
        .stderr(contains("not running"));
}

#[test]
fn status_json_reports_stopped_service() {
    let temp = tempdir().expect("failed to create tempdir");
    let layout = stack_layout(&temp.path().join("stack"), "httpd-2.4", "mariadb-11");

    let output = wamp()
        .args(["apache", "status", "--json", "--root"])
        .arg(layout.root())
        .output()
        .expect("failed to run wamp");
    assert!(output.status.success());

    let status: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("status output is not JSON");
    assert_eq!(status["service"], "apache");
    assert_eq!(status["state"], "stopped");
    assert!(status["pid"].is_null());
}

#[test]
fn site_add_and_rm_round_trip() {
    let temp = tempdir().expect("failed to create tempdir");
    let layout = stack_layout(&temp.path().join("stack"), "httpd-2.4", "mariadb-11");
    fs::create_dir_all(layout.install_dir(ServiceKind::Php, "php-8.3.8-nts"))
        .expect("failed to create php dir");
    let fragment = layout
        .install_dir(ServiceKind::Apache, "httpd-2.4")
        .join("conf/sites-enabled/blog.test.conf");

    wamp()
        .args(["site", "add", "--php", "8.3", "blog.test", "--root"])
        .arg(layout.root())
        .assert()
        .success()
        .stderr(contains("http://blog.test"));
    assert!(fragment.is_file());
    assert!(layout.www_dir().join("blog.test").is_dir());

    wamp()
        .args(["site", "rm", "blog.test", "--root"])
        .arg(layout.root())
        .assert()
        .success();
    assert!(!fragment.exists());

    wamp()
        .args(["site", "rm", "blog.test", "--root"])
        .arg(layout.root())
        .assert()
        .success();
}

#[test]
fn uninstall_clears_stack() {
    let temp = tempdir().expect("failed to create tempdir");
    let layout = stack_layout(&temp.path().join("stack"), "httpd-2.4", "mariadb-11");

    wamp()
        .arg("uninstall")
        .arg("--root")
        .arg(layout.root())
        .assert()
        .success();
    assert!(!layout.bin_dir().exists());
    assert!(!layout.config_path().exists());
}
