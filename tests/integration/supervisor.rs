#[path = "common/mod.rs"]
mod common;

use std::{thread, time::Duration};

use common::{is_process_alive, unused_port, wait_until};
use nix::{
    sys::signal::{self, Signal},
    unistd::Pid,
};
use svcwarden::{
    backoff::BackoffPolicy,
    error::SupervisorError,
    probe::ProbeHealth,
    spec::{RestartPolicy, ServiceSpec},
    status::OverallHealth,
    supervisor::{ServiceLifecycle, ServiceSupervisor, SupervisorSettings},
};

fn settings(base_ms: u64) -> SupervisorSettings {
    SupervisorSettings {
        backoff: BackoffPolicy::new(Duration::from_millis(base_ms), Duration::from_secs(2), 5),
        ..Default::default()
    }
}

#[test]
fn always_service_that_exits_is_throttled() {
    let supervisor = ServiceSupervisor::new(settings(100));
    supervisor
        .register(ServiceSpec::shell("flappy", "exit 1").with_restart_policy(RestartPolicy::Always))
        .unwrap();

    supervisor
        .run_ticks(Duration::from_millis(60), Some(3))
        .unwrap();

    let status = supervisor.status("flappy").unwrap();
    assert!(status.spawn_attempts >= 1 && status.spawn_attempts <= 3, "{status:?}");
    assert_eq!(status.consecutive_failures, status.spawn_attempts);
    assert_eq!(status.last_exit.unwrap().code, Some(1));
}

#[test]
fn killed_service_is_restarted_with_new_pid() {
    let supervisor = ServiceSupervisor::new(settings(50));
    supervisor
        .register(ServiceSpec::new("sleeper", ["sleep", "30"]).with_restart_policy(RestartPolicy::Always))
        .unwrap();

    supervisor.reconcile_once().unwrap();
    let first_pid = supervisor.status("sleeper").unwrap().pid.expect("started");

    signal::kill(Pid::from_raw(first_pid as i32), Signal::SIGKILL).unwrap();

    let mut restarted = None;
    wait_until("restart after SIGKILL", || {
        supervisor.reconcile_once().unwrap();
        let status = supervisor.status("sleeper").unwrap();
        restarted = status.pid.filter(|pid| *pid != first_pid);
        restarted.is_some() && status.state == ServiceLifecycle::Running
    });

    let status = supervisor.status("sleeper").unwrap();
    assert_eq!(status.spawn_attempts, 2);
    assert_eq!(status.consecutive_failures, 0);
    assert_eq!(status.last_exit.unwrap().signal, Some(libc::SIGKILL));

    supervisor.stop_all().unwrap();
}

#[test]
fn never_service_that_fails_readiness_stays_down() {
    let supervisor = ServiceSupervisor::new(settings(50));
    supervisor
        .register(
            ServiceSpec::new("silent", ["sleep", "30"])
                .with_restart_policy(RestartPolicy::Never)
                .with_grace_period(Duration::from_millis(300))
                .with_readiness("127.0.0.1", unused_port(), Duration::from_millis(100)),
        )
        .unwrap();

    let first = supervisor.reconcile_once().unwrap();
    assert_eq!(first[0].1.health, ProbeHealth::Unhealthy);
    let pid = supervisor.status("silent").unwrap().pid.expect("spawned");

    thread::sleep(Duration::from_millis(350));
    for _ in 0..4 {
        supervisor.reconcile_once().unwrap();
        thread::sleep(Duration::from_millis(100));
    }

    let status = supervisor.status("silent").unwrap();
    assert_eq!(status.spawn_attempts, 1);
    assert_eq!(status.state, ServiceLifecycle::Stopped);
    assert!(status.pid.is_none());
    assert!(!is_process_alive(pid));
    assert_eq!(supervisor.snapshot().overall_health, OverallHealth::Failing);
}

#[test]
fn restart_replaces_the_process() {
    let supervisor = ServiceSupervisor::new(settings(50));
    supervisor
        .register(ServiceSpec::new("sleeper", ["sleep", "30"]))
        .unwrap();

    let first = supervisor.start("sleeper").unwrap();
    let second = supervisor.restart("sleeper").unwrap();
    assert_ne!(first, second);
    wait_until("old process to exit", || !is_process_alive(first));
    assert!(is_process_alive(second));

    supervisor.stop("sleeper").unwrap();
    wait_until("stopped process to exit", || !is_process_alive(second));
}

#[test]
fn deregister_stops_process_and_forgets_service() {
    let supervisor = ServiceSupervisor::new(settings(50));
    supervisor
        .register(ServiceSpec::new("sleeper", ["sleep", "30"]))
        .unwrap();
    let pid = supervisor.start("sleeper").unwrap();

    supervisor.deregister("sleeper").unwrap();

    assert!(!is_process_alive(pid));
    assert!(supervisor.status("sleeper").is_none());
    assert!(matches!(
        supervisor.stop("sleeper"),
        Err(SupervisorError::UnknownService(_))
    ));
    assert!(supervisor.reconcile_once().unwrap().is_empty());
}

#[test]
fn dropping_supervisor_terminates_children() {
    let pid = {
        let supervisor = ServiceSupervisor::new(settings(50));
        supervisor
            .register(ServiceSpec::new("sleeper", ["sleep", "30"]))
            .unwrap();
        supervisor.start("sleeper").unwrap()
    };

    wait_until("child to be terminated on drop", || !is_process_alive(pid));
}
