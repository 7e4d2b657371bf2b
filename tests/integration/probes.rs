#[path = "common/mod.rs"]
mod common;

use std::{
    net::TcpListener,
    process::Command,
    thread,
    time::{Duration, Instant},
};

use common::unused_port;
use svcwarden::probe::{
    PortProbe, ProbeHealth, ProcessMatcher, ProcessProbe, SysinfoProcessProbe, TcpPortProbe,
    check_liveness,
};

#[test]
fn port_without_listener_fails_within_timeout() {
    let timeout = Duration::from_millis(500);
    let started = Instant::now();
    let result = TcpPortProbe.is_ready("127.0.0.1", unused_port(), timeout);

    assert_eq!(result.health, ProbeHealth::Unhealthy);
    assert!(started.elapsed() < timeout + Duration::from_millis(250));
}

#[test]
fn port_probe_follows_listener_lifetime() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    assert!(
        TcpPortProbe
            .is_ready("localhost", port, Duration::from_millis(500))
            .is_healthy()
    );

    drop(listener);
    assert!(
        !TcpPortProbe
            .is_ready("127.0.0.1", port, Duration::from_millis(300))
            .is_healthy()
    );
}

#[cfg(target_os = "linux")]
#[test]
fn exact_path_matches_running_executable() {
    let mut child = Command::new("sleep").arg("9.75").spawn().unwrap();
    thread::sleep(Duration::from_millis(100));
    let exe = std::fs::read_link(format!("/proc/{}/exe", child.id())).unwrap();

    let probe = SysinfoProcessProbe::new();
    assert!(probe.is_alive(&ProcessMatcher::ExactPath(exe.clone())).unwrap());

    child.kill().unwrap();
    child.wait().unwrap();

    let other = ProcessMatcher::ExactPath("/nonexistent/bin/svcw-test".into());
    assert!(!probe.is_alive(&other).unwrap());
}

#[test]
fn liveness_of_missing_pid_is_unhealthy() {
    let probe = SysinfoProcessProbe::new();
    let result = check_liveness(&probe, &ProcessMatcher::Pid(4_194_000));
    assert_eq!(result.health, ProbeHealth::Unhealthy);
    assert!(result.detail.contains("4194000"), "{}", result.detail);
}
