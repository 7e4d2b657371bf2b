//! Spawning and terminating service processes.
use std::{
    fs::{self, File, OpenOptions},
    os::unix::process::{CommandExt, ExitStatusExt},
    path::Path,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::{error::SupervisorError, logs::log_path, spec::ServiceSpec};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
}

impl ExitInfo {
    /// Exited on its own with status 0.
    pub fn is_clean(&self) -> bool {
        self.code == Some(0)
    }

    pub fn describe(&self) -> String {
        match (self.code, self.signal) {
            (Some(code), _) => format!("exited with status {code}"),
            (None, Some(signal)) => format!("terminated by signal {signal}"),
            (None, None) => "exited".to_string(),
        }
    }
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            signal: status.signal(),
        }
    }
}

/// Result of the post-spawn startup check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupCheck {
    /// Observed alive on two consecutive polls.
    Running,
    Exited(ExitInfo),
}

/// How a stop request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process had already exited.
    AlreadyExited(ExitInfo),
    /// Exited after SIGTERM within the grace period.
    Terminated(ExitInfo),
    /// Needed SIGKILL after the grace period elapsed.
    Killed(ExitInfo),
}

impl StopOutcome {
    pub fn exit(&self) -> ExitInfo {
        match self {
            StopOutcome::AlreadyExited(info)
            | StopOutcome::Terminated(info)
            | StopOutcome::Killed(info) => *info,
        }
    }
}

fn open_log(log_dir: &Path, service: &str, stream: &str) -> std::io::Result<File> {
    fs::create_dir_all(log_dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path(log_dir, service, stream))
}

/// Spawns the service in its own process group.
///
/// Output goes to `<log_dir>/<name>.{stdout,stderr}.log` when a log directory
/// is configured and is discarded otherwise.
pub fn spawn_service(
    spec: &ServiceSpec,
    log_dir: Option<&Path>,
) -> Result<Child, SupervisorError> {
    let spawn_error = |source: std::io::Error| SupervisorError::SpawnError {
        service: spec.name.clone(),
        source,
    };

    let (program, args) = spec.command.split_first().ok_or_else(|| {
        spawn_error(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "empty command",
        ))
    })?;

    debug!(
        "Launching service: '{}' with command: `{}`",
        spec.name,
        spec.display_command()
    );

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(&spec.working_directory)
        .envs(&spec.env)
        .stdin(Stdio::null());

    match log_dir {
        Some(dir) => {
            let stdout = open_log(dir, &spec.name, "stdout").map_err(spawn_error)?;
            let stderr = open_log(dir, &spec.name, "stderr").map_err(spawn_error)?;
            cmd.stdout(Stdio::from(stdout)).stderr(Stdio::from(stderr));
        }
        None => {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
    }

    unsafe {
        cmd.pre_exec(|| {
            // Own process group so the whole tree can be signalled without
            // touching the supervisor's group.
            if libc::setpgid(0, 0) < 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    match cmd.spawn() {
        Ok(child) => {
            debug!("Service '{}' started with PID: {}", spec.name, child.id());
            Ok(child)
        }
        Err(err) => {
            error!("Failed to start service '{}': {err}", spec.name);
            Err(spawn_error(err))
        }
    }
}

/// Non-blocking exit check that reaps the child when it has exited.
pub fn poll_exit(child: &mut Child) -> std::io::Result<Option<ExitInfo>> {
    Ok(child.try_wait()?.map(ExitInfo::from))
}

/// Waits until the child has been seen alive on two consecutive polls, or exits.
///
/// The check never waits longer than `limit`; a child still alive at the limit
/// counts as running.
pub fn wait_for_startup(child: &mut Child, limit: Duration) -> std::io::Result<StartupCheck> {
    let deadline = Instant::now() + limit;
    let mut seen_running_once = false;

    loop {
        if let Some(exit) = poll_exit(child)? {
            return Ok(StartupCheck::Exited(exit));
        }

        if seen_running_once || Instant::now() >= deadline {
            return Ok(StartupCheck::Running);
        }

        seen_running_once = true;
        thread::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitInfo>> {
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(exit) = poll_exit(child)? {
            return Ok(Some(exit));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn io_error(service: &str, err: std::io::Error) -> SupervisorError {
    SupervisorError::SpawnError {
        service: service.to_string(),
        source: err,
    }
}

fn send(service: &str, pid: Pid, sig: Signal) -> Result<(), SupervisorError> {
    let group = Pid::from_raw(-pid.as_raw());
    match signal::kill(group, sig) {
        Ok(()) => debug!("Sent {sig} to process group {pid} for service '{service}'"),
        Err(Errno::ESRCH) => debug!("Process group {pid} for '{service}' is gone"),
        Err(Errno::EPERM) => {
            warn!("Insufficient permissions to signal process group {pid} for '{service}'")
        }
        Err(err) => {
            return Err(SupervisorError::Signal {
                service: service.to_string(),
                source: err,
            });
        }
    }

    match signal::kill(pid, sig) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(SupervisorError::Signal {
            service: service.to_string(),
            source: err,
        }),
    }
}

/// Stops a child: SIGTERM to its group, wait up to `grace`, then SIGKILL.
pub fn terminate(
    service: &str,
    child: &mut Child,
    grace: Duration,
) -> Result<StopOutcome, SupervisorError> {
    if let Some(exit) = poll_exit(child).map_err(|err| io_error(service, err))? {
        debug!("Service '{service}' had already {}", exit.describe());
        return Ok(StopOutcome::AlreadyExited(exit));
    }

    let pid = Pid::from_raw(child.id() as i32);
    debug!("Stopping service '{service}' (PID {pid})");
    send(service, pid, Signal::SIGTERM)?;

    if let Some(exit) = wait_with_timeout(child, grace).map_err(|err| io_error(service, err))? {
        return Ok(StopOutcome::Terminated(exit));
    }

    warn!("Service '{service}' did not exit within {grace:?} after SIGTERM; sending SIGKILL");
    send(service, pid, Signal::SIGKILL)?;

    match wait_with_timeout(child, KILL_REAP_TIMEOUT).map_err(|err| io_error(service, err))? {
        Some(exit) => Ok(StopOutcome::Killed(exit)),
        None => {
            error!("Service '{service}' survived SIGKILL");
            Err(SupervisorError::TerminationTimeout {
                service: service.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn exit_info_describes_codes_and_signals() {
        let clean = ExitInfo {
            code: Some(0),
            signal: None,
        };
        assert!(clean.is_clean());
        assert_eq!(clean.describe(), "exited with status 0");

        let killed = ExitInfo {
            code: None,
            signal: Some(9),
        };
        assert!(!killed.is_clean());
        assert_eq!(killed.describe(), "terminated by signal 9");
    }

    #[test]
    fn startup_check_detects_immediate_exit() {
        let spec = ServiceSpec::shell("quick", "exit 3");
        let mut child = spawn_service(&spec, None).unwrap();

        let exit = match wait_for_startup(&mut child, Duration::from_secs(1)).unwrap() {
            StartupCheck::Exited(exit) => exit,
            // A heavily loaded host may not schedule the shell within two polls.
            StartupCheck::Running => ExitInfo::from(child.wait().unwrap()),
        };
        assert_eq!(exit.code, Some(3));
    }

    #[test]
    fn terminate_escalates_to_sigkill() {
        let spec = ServiceSpec::shell("stubborn", "trap '' TERM; while true; do sleep 0.1; done");
        let mut child = spawn_service(&spec, None).unwrap();
        thread::sleep(Duration::from_millis(200));

        let outcome = terminate("stubborn", &mut child, Duration::from_millis(300)).unwrap();
        assert!(matches!(outcome, StopOutcome::Killed(_)), "{outcome:?}");
    }

    #[test]
    fn terminate_reports_graceful_exit() {
        let spec = ServiceSpec::new("sleeper", ["sleep", "30"]);
        let mut child = spawn_service(&spec, None).unwrap();

        let outcome = terminate("sleeper", &mut child, Duration::from_secs(2)).unwrap();
        match outcome {
            StopOutcome::Terminated(exit) => assert_eq!(exit.signal, Some(libc::SIGTERM)),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn output_is_written_to_log_dir() {
        let dir = tempdir().unwrap();
        let spec = ServiceSpec::shell("echoer", "echo hello; echo oops >&2");
        let mut child = spawn_service(&spec, Some(dir.path())).unwrap();
        child.wait().unwrap();

        let stdout = fs::read_to_string(log_path(dir.path(), "echoer", "stdout")).unwrap();
        let stderr = fs::read_to_string(log_path(dir.path(), "echoer", "stderr")).unwrap();
        assert_eq!(stdout.trim(), "hello");
        assert_eq!(stderr.trim(), "oops");
    }

    #[test]
    fn empty_command_is_a_spawn_error() {
        let spec = ServiceSpec::new("empty", Vec::<String>::new());
        assert!(matches!(
            spawn_service(&spec, None),
            Err(SupervisorError::SpawnError { .. })
        ));
    }
}
