#[path = "common/mod.rs"]
mod common;

use std::{fs, net::TcpListener};

use assert_cmd::Command;
use common::{unused_port, write_config};
use predicates::prelude::*;
use tempfile::tempdir;

fn svcw() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("svcw"))
}

#[test]
fn check_prints_resolved_services() {
    let temp = tempdir().expect("failed to create tempdir");
    let config = write_config(
        temp.path(),
        r#"version: "1"
services:
  web:
    command: ["python3", "-m", "http.server", "8000"]
    restart_policy: always
    readiness: { port: 8000 }
  worker:
    command: "sleep 60"
"#,
    );

    svcw()
        .arg("check")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK: 2 services"))
        .stdout(predicate::str::contains("web: `python3 -m http.server 8000`"))
        .stdout(predicate::str::contains("ready on 127.0.0.1:8000"))
        .stdout(predicate::str::contains("worker:"));
}

#[test]
fn check_reports_missing_env_var() {
    let temp = tempdir().expect("failed to create tempdir");
    let config = write_config(
        temp.path(),
        r#"version: "1"
services:
  web:
    command: "serve --token ${SVCW_TEST_UNSET_TOKEN}"
"#,
    );

    svcw()
        .arg("check")
        .arg("--config")
        .arg(&config)
        .env_remove("SVCW_TEST_UNSET_TOKEN")
        .assert()
        .failure()
        .stderr(predicate::str::contains("SVCW_TEST_UNSET_TOKEN"));
}

#[test]
fn probe_port_reflects_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
    let port = listener.local_addr().unwrap().port();

    svcw()
        .args(["probe", "port", "--port", &port.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("healthy"));

    drop(listener);
    svcw()
        .args(["probe", "port", "--port", &unused_port().to_string(), "--timeout", "300ms"])
        .assert()
        .code(1)
        .stdout(predicate::str::starts_with("unhealthy"));
}

#[test]
fn probe_process_by_pid() {
    let own_pid = std::process::id().to_string();
    svcw()
        .args(["probe", "process", "--pid", &own_pid])
        .assert()
        .success();

    svcw()
        .args(["probe", "process", "--pid", "4194000"])
        .assert()
        .code(1);
}

#[test]
fn run_supervises_then_status_and_logs_report() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let config = write_config(
        dir,
        r#"version: "1"
supervisor:
  interval: 200ms
  log_dir: logs
  status_file: status.json
services:
  greeter:
    command: "echo hello from greeter; exec sleep 30"
    restart_policy: always
"#,
    );

    svcw()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .args(["--max-ticks", "3"])
        .assert()
        .success();

    let snapshot = fs::read_to_string(dir.join("status.json")).expect("status file written");
    assert!(snapshot.contains("\"greeter\""), "{snapshot}");

    svcw()
        .arg("status")
        .arg("--config")
        .arg(&config)
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("status.v1"))
        .stdout(predicate::str::contains("\"greeter\""));

    svcw()
        .arg("status")
        .arg("--config")
        .arg(&config)
        .arg("--no-color")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Overall:"))
        .stdout(predicate::str::contains("greeter"));

    svcw()
        .arg("logs")
        .arg("--config")
        .arg(&config)
        .args(["-s", "greeter", "-n", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello from greeter"));
}

#[test]
fn run_rejects_unknown_service_filter() {
    let temp = tempdir().expect("failed to create tempdir");
    let config = write_config(
        temp.path(),
        "version: \"1\"\nservices:\n  web:\n    command: \"sleep 5\"\n",
    );

    svcw()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .args(["--service", "ghost", "--max-ticks", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn status_without_status_file_fails() {
    let temp = tempdir().expect("failed to create tempdir");
    let config = write_config(
        temp.path(),
        "version: \"1\"\nservices:\n  web:\n    command: \"sleep 5\"\n",
    );

    svcw()
        .arg("status")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("status_file"));
}
