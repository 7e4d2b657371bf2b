//! Service supervisor: owns every service's state and reconciles it against the
//! processes actually running.
//!
//! Each registered service lives behind its own mutex. Manual operations
//! (`start`, `stop`, `restart`) block on that mutex; the reconciliation loop
//! only `try_lock`s it, so a tick never races or waits behind a manual stop.
//! Within a tick every service is handled on its own scoped thread and the tick
//! finishes when the slowest one does.
use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
    process::Child,
    sync::{
        Arc, Mutex, RwLock, TryLockError,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};
use tracing::{debug, error, info, warn};

use crate::{
    backoff::BackoffPolicy,
    error::SupervisorError,
    launch::{self, ExitInfo, StartupCheck, StopOutcome},
    probe::{
        PortProbe, ProbeHealth, ProbeResult, ProcessMatcher, ProcessProbe,
        SysinfoProcessProbe, TcpPortProbe, check_liveness,
    },
    spec::ServiceSpec,
    status::{HealthReporter, HealthSnapshot, ServiceStatus, StatusBoard},
};

/// Position of a service in its lifecycle state machine.
///
/// `Stopped → Starting → Running ⇄ Unhealthy → Stopped`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServiceLifecycle {
    Stopped,
    /// Spawned, not yet observed healthy.
    Starting,
    /// Alive and, if declared, ready.
    Running,
    /// Alive but failing its readiness check.
    Unhealthy,
}

/// What the operator asked for, independent of what is actually running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredState {
    Running,
    Stopped,
}

/// Supervisor-wide settings.
#[derive(Debug, Clone, Default)]
pub struct SupervisorSettings {
    pub backoff: BackoffPolicy,
    /// Directory receiving `<name>.stdout.log` / `<name>.stderr.log`.
    pub log_dir: Option<PathBuf>,
    /// Where the health snapshot is written after every tick.
    pub status_file: Option<PathBuf>,
}

/// Mutable per-service record. Only the supervisor touches it.
struct ServiceState {
    spec: Arc<ServiceSpec>,
    child: Option<Child>,
    lifecycle: ServiceLifecycle,
    desired: DesiredState,
    ever_started: bool,
    /// Whether the last run ended in a way the restart policy allows restarting.
    restart_eligible: bool,
    last_start_time: Option<Instant>,
    started_at: Option<DateTime<Utc>>,
    next_start_at: Option<Instant>,
    consecutive_failures: u32,
    spawn_attempts: u32,
    last_probe: Option<ProbeResult>,
    last_exit: Option<ExitInfo>,
    removed: bool,
}

impl ServiceState {
    fn new(spec: Arc<ServiceSpec>) -> Self {
        Self {
            spec,
            child: None,
            lifecycle: ServiceLifecycle::Stopped,
            desired: DesiredState::Running,
            ever_started: false,
            restart_eligible: true,
            last_start_time: None,
            started_at: None,
            next_start_at: None,
            consecutive_failures: 0,
            spawn_attempts: 0,
            last_probe: None,
            last_exit: None,
            removed: false,
        }
    }

    fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    fn status(&self) -> ServiceStatus {
        ServiceStatus {
            name: self.spec.name.clone(),
            command: self.spec.display_command(),
            restart_policy: self.spec.restart_policy,
            state: self.lifecycle,
            desired: self.desired,
            pid: self.pid(),
            consecutive_failures: self.consecutive_failures,
            spawn_attempts: self.spawn_attempts,
            last_probe: self.last_probe.clone(),
            started_at: self.started_at,
            last_exit: self.last_exit,
        }
    }
}

type ServiceHandle = Arc<Mutex<ServiceState>>;

/// Cooperative cancellation flag for [`ServiceSupervisor::run_forever`].
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Clears the tick flag even if a tick unwinds.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Starts, stops and watches a set of services.
pub struct ServiceSupervisor {
    services: RwLock<BTreeMap<String, ServiceHandle>>,
    settings: SupervisorSettings,
    process_probe: Arc<dyn ProcessProbe>,
    port_probe: Arc<dyn PortProbe>,
    board: StatusBoard,
    ticking: AtomicBool,
    shutdown: ShutdownHandle,
}

impl ServiceSupervisor {
    /// Creates a supervisor using the `sysinfo` process probe and TCP port probe.
    pub fn new(settings: SupervisorSettings) -> Self {
        Self::with_probes(
            settings,
            Arc::new(SysinfoProcessProbe::new()),
            Arc::new(TcpPortProbe),
        )
    }

    pub fn with_probes(
        settings: SupervisorSettings,
        process_probe: Arc<dyn ProcessProbe>,
        port_probe: Arc<dyn PortProbe>,
    ) -> Self {
        debug!("Initializing supervisor...");
        Self {
            services: RwLock::new(BTreeMap::new()),
            settings,
            process_probe,
            port_probe,
            board: StatusBoard::new(),
            ticking: AtomicBool::new(false),
            shutdown: ShutdownHandle::default(),
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Handle that stops [`run_forever`](Self::run_forever) after the current tick.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn reporter(&self) -> HealthReporter {
        HealthReporter::new(self.board.clone())
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.reporter().snapshot()
    }

    /// Latest published status for one service.
    pub fn status(&self, name: &str) -> Option<ServiceStatus> {
        self.board.get(name)
    }

    pub fn names(&self) -> Result<Vec<String>, SupervisorError> {
        Ok(self.services.read()?.keys().cloned().collect())
    }

    fn handle(&self, name: &str) -> Result<ServiceHandle, SupervisorError> {
        self.services
            .read()?
            .get(name)
            .cloned()
            .ok_or_else(|| SupervisorError::UnknownService(name.to_string()))
    }

    fn publish(&self, state: &ServiceState) {
        if !state.removed {
            self.board.publish(state.status());
        }
    }

    /// Adds a service. It is started by the next reconciliation tick or by [`start`](Self::start).
    pub fn register(&self, spec: ServiceSpec) -> Result<(), SupervisorError> {
        let mut services = self.services.write()?;
        if services.contains_key(&spec.name) {
            return Err(SupervisorError::DuplicateName(spec.name));
        }

        info!("Registered service '{}': `{}`", spec.name, spec.display_command());
        let state = ServiceState::new(Arc::new(spec));
        self.board.publish(state.status());
        services.insert(state.spec.name.clone(), Arc::new(Mutex::new(state)));
        Ok(())
    }

    /// Stops a service and drops its state.
    pub fn deregister(&self, name: &str) -> Result<(), SupervisorError> {
        let handle = self
            .services
            .write()?
            .remove(name)
            .ok_or_else(|| SupervisorError::UnknownService(name.to_string()))?;

        let mut state = handle.lock()?;
        state.removed = true;
        self.board.remove(name);
        self.stop_locked(&mut state)?;
        info!("Deregistered service '{name}'");
        Ok(())
    }

    /// Replaces the registered set wholesale.
    ///
    /// Unchanged specs keep their running process and counters; changed specs
    /// are stopped and re-registered with fresh state.
    pub fn apply(&self, specs: Vec<ServiceSpec>) -> Result<(), SupervisorError> {
        let mut seen = BTreeSet::new();
        for spec in &specs {
            if !seen.insert(spec.name.clone()) {
                return Err(SupervisorError::DuplicateName(spec.name.clone()));
            }
        }

        let current: BTreeMap<String, Arc<ServiceSpec>> = {
            let services = self.services.read()?;
            let mut current = BTreeMap::new();
            for (name, handle) in services.iter() {
                current.insert(name.clone(), Arc::clone(&handle.lock()?.spec));
            }
            current
        };

        for name in current.keys() {
            if !seen.contains(name) {
                self.deregister(name)?;
            }
        }

        for spec in specs {
            match current.get(&spec.name) {
                Some(existing) if **existing == spec => {
                    debug!("Service '{}' unchanged", spec.name);
                }
                Some(_) => {
                    info!("Service '{}' changed; replacing", spec.name);
                    self.deregister(&spec.name)?;
                    self.register(spec)?;
                }
                None => self.register(spec)?,
            }
        }

        Ok(())
    }

    /// Spawns the service and returns its PID once the startup check passes.
    pub fn start(&self, name: &str) -> Result<u32, SupervisorError> {
        let handle = self.handle(name)?;
        let mut state = handle.lock()?;
        let result = self.start_locked(&mut state);
        self.publish(&state);
        result
    }

    /// Sends SIGTERM, escalating to SIGKILL after the grace period. Stopping a
    /// stopped service is a no-op.
    pub fn stop(&self, name: &str) -> Result<(), SupervisorError> {
        let handle = self.handle(name)?;
        let mut state = handle.lock()?;
        let result = self.stop_locked(&mut state);
        self.publish(&state);
        result
    }

    /// Stop followed by start, holding the service lock throughout.
    pub fn restart(&self, name: &str) -> Result<u32, SupervisorError> {
        let handle = self.handle(name)?;
        let mut state = handle.lock()?;
        info!("Restarting service '{name}'");
        let result = self
            .stop_locked(&mut state)
            .and_then(|_| self.start_locked(&mut state));
        self.publish(&state);
        result
    }

    /// Stops every registered service, continuing past individual failures.
    pub fn stop_all(&self) -> Result<(), SupervisorError> {
        let mut first_error = None;
        for name in self.names()? {
            if let Err(err) = self.stop(&name) {
                error!("Failed to stop service '{name}': {err}");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn start_locked(&self, state: &mut ServiceState) -> Result<u32, SupervisorError> {
        let name = state.spec.name.clone();

        if let Some(child) = state.child.as_mut() {
            match launch::poll_exit(child) {
                Ok(Some(exit)) => {
                    debug!("Previous instance of '{name}' had {}", exit.describe());
                    state.child = None;
                    state.last_exit = Some(exit);
                    state.lifecycle = ServiceLifecycle::Stopped;
                }
                Ok(None) | Err(_) => {
                    let pid = child.id();
                    let matcher = Self::matcher_for(&state.spec, pid);
                    if let Ok(true) = self.process_probe.is_alive(&matcher) {
                        return Err(SupervisorError::AlreadyRunning { service: name, pid });
                    }
                    // A tracked child we cannot confirm: never run two copies.
                    warn!("Service '{name}' has an unconfirmed process {pid}; stopping it first");
                    self.stop_child(state)?;
                }
            }
        }

        state.desired = DesiredState::Running;
        self.launch(state)
    }

    fn stop_locked(&self, state: &mut ServiceState) -> Result<(), SupervisorError> {
        state.desired = DesiredState::Stopped;
        state.next_start_at = None;

        if state.child.is_some() {
            info!("Stopping service '{}'", state.spec.name);
            self.stop_child(state)?;
        } else {
            debug!("Service '{}' is not running", state.spec.name);
        }

        state.lifecycle = ServiceLifecycle::Stopped;
        state.started_at = None;
        Ok(())
    }

    /// Terminates the tracked child, if any, and records how it ended.
    fn stop_child(&self, state: &mut ServiceState) -> Result<(), SupervisorError> {
        let Some(mut child) = state.child.take() else {
            return Ok(());
        };

        let name = state.spec.name.clone();
        match launch::terminate(&name, &mut child, state.spec.startup_grace_period) {
            Ok(outcome) => {
                if let StopOutcome::Killed(_) = outcome {
                    warn!(
                        "Service '{name}' exceeded its {:?} grace period and was killed",
                        state.spec.startup_grace_period
                    );
                }
                state.last_exit = Some(outcome.exit());
                state.lifecycle = ServiceLifecycle::Stopped;
                state.started_at = None;
                debug!("Service '{name}' stopped: {}", outcome.exit().describe());
                Ok(())
            }
            Err(err) => {
                state.child = Some(child);
                Err(err)
            }
        }
    }

    fn matcher_for(spec: &ServiceSpec, pid: u32) -> ProcessMatcher {
        spec.liveness.clone().unwrap_or(ProcessMatcher::Pid(pid))
    }

    /// Spawns and runs the startup check. Start failures are recorded toward backoff.
    fn launch(&self, state: &mut ServiceState) -> Result<u32, SupervisorError> {
        let spec = Arc::clone(&state.spec);
        info!("Starting service: {}", spec.name);

        state.spawn_attempts = state.spawn_attempts.saturating_add(1);
        state.ever_started = true;
        state.last_start_time = Some(Instant::now());
        state.next_start_at = None;

        let mut child = match launch::spawn_service(&spec, self.settings.log_dir.as_deref()) {
            Ok(child) => child,
            Err(err) => {
                self.record_failure(state, false);
                return Err(err);
            }
        };

        let pid = child.id();
        state.started_at = Some(Utc::now());
        state.lifecycle = ServiceLifecycle::Starting;

        match launch::wait_for_startup(&mut child, spec.startup_grace_period) {
            Ok(StartupCheck::Running) => {
                state.child = Some(child);
                Ok(pid)
            }
            Ok(StartupCheck::Exited(exit)) => {
                warn!("Service '{}' {} during startup", spec.name, exit.describe());
                state.last_exit = Some(exit);
                self.record_failure(state, exit.is_clean());
                Err(SupervisorError::ExitedDuringStartup {
                    service: spec.name.clone(),
                    detail: exit.describe(),
                })
            }
            Err(err) => {
                warn!("Could not verify startup of '{}': {err}", spec.name);
                state.child = Some(child);
                Ok(pid)
            }
        }
    }

    /// Counts a failed run and schedules the next permitted start.
    fn record_failure(&self, state: &mut ServiceState, clean_exit: bool) {
        let delay = self.settings.backoff.delay(state.consecutive_failures);
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.lifecycle = ServiceLifecycle::Stopped;
        state.started_at = None;
        state.restart_eligible = state.desired == DesiredState::Running
            && state.spec.restart_policy.permits_restart(clean_exit);
        state.next_start_at = Some(Instant::now() + delay);

        if state.restart_eligible {
            warn!(
                "Service '{}' failed ({} consecutive); next start in {delay:?}",
                state.spec.name, state.consecutive_failures
            );
        } else {
            warn!(
                "Service '{}' failed ({} consecutive); restart policy '{}' does not restart it",
                state.spec.name, state.consecutive_failures, state.spec.restart_policy
            );
        }
    }

    /// Runs one reconciliation pass over every registered service.
    ///
    /// Returns `(name, result)` pairs in name order. Fails with
    /// [`SupervisorError::TickInProgress`] instead of overlapping a running tick.
    pub fn reconcile_once(&self) -> Result<Vec<(String, ProbeResult)>, SupervisorError> {
        if self
            .ticking
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SupervisorError::TickInProgress);
        }
        let _guard = TickGuard(&self.ticking);

        let handles: Vec<(String, ServiceHandle)> = self
            .services
            .read()?
            .iter()
            .map(|(name, handle)| (name.clone(), Arc::clone(handle)))
            .collect();

        let results = thread::scope(|scope| {
            let tasks: Vec<_> = handles
                .iter()
                .map(|(name, handle)| {
                    let task = scope.spawn(move || self.reconcile_service(handle));
                    (name, task)
                })
                .collect();

            tasks
                .into_iter()
                .map(|(name, task)| {
                    let result = task.join().unwrap_or_else(|_| {
                        error!("Reconciliation of '{name}' panicked");
                        ProbeResult::unknown("reconciliation panicked")
                    });
                    (name.clone(), result)
                })
                .collect::<Vec<_>>()
        });

        if let Some(path) = &self.settings.status_file
            && let Err(err) = self.snapshot().write_to(path)
        {
            warn!("Failed to write status file {}: {err}", path.display());
        }

        Ok(results)
    }

    fn reconcile_service(&self, handle: &ServiceHandle) -> ProbeResult {
        let mut state = match handle.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                return ProbeResult::unknown("busy with a manual operation");
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                warn!("Service state lock poisoned; recovering");
                poisoned.into_inner()
            }
        };

        if state.removed {
            return ProbeResult::unknown("deregistered");
        }

        let result = self.reconcile_locked(&mut state);
        debug!(
            "Service '{}' -> {} ({})",
            state.spec.name, result.health, result.detail
        );
        state.last_probe = Some(result.clone());
        self.publish(&state);
        result
    }

    fn reconcile_locked(&self, state: &mut ServiceState) -> ProbeResult {
        if let Some(result) = self.reap_exited(state) {
            return result;
        }

        if state.child.is_none() {
            return self.start_if_due(state);
        }

        self.probe_running(state)
    }

    /// Collects an exited child and counts the exit toward backoff.
    fn reap_exited(&self, state: &mut ServiceState) -> Option<ProbeResult> {
        let child = state.child.as_mut()?;
        match launch::poll_exit(child) {
            Ok(Some(exit)) => {
                let detail = format!("process {}", exit.describe());
                if exit.is_clean() {
                    info!("Service '{}' exited normally.", state.spec.name);
                } else {
                    warn!("Service '{}' {detail}", state.spec.name);
                }
                state.child = None;
                state.last_exit = Some(exit);
                self.record_failure(state, exit.is_clean());
                Some(ProbeResult::unhealthy(detail))
            }
            Ok(None) => None,
            Err(err) => Some(ProbeResult::unknown(format!(
                "cannot query child process: {err}"
            ))),
        }
    }

    fn start_if_due(&self, state: &mut ServiceState) -> ProbeResult {
        if state.desired == DesiredState::Stopped {
            return ProbeResult::unknown("stopped on request");
        }

        if state.ever_started && !state.restart_eligible {
            return ProbeResult::unhealthy(format!(
                "not running; restart policy '{}'",
                state.spec.restart_policy
            ));
        }

        if let Some(at) = state.next_start_at {
            let now = Instant::now();
            if now < at {
                return ProbeResult::unhealthy(format!(
                    "waiting {:?} before restart ({} consecutive failures)",
                    at - now,
                    state.consecutive_failures
                ));
            }
        }

        match self.launch(state) {
            Ok(_) => self
                .reap_exited(state)
                .unwrap_or_else(|| self.probe_running(state)),
            Err(err) => ProbeResult::unhealthy(err.to_string()),
        }
    }

    fn probe_running(&self, state: &mut ServiceState) -> ProbeResult {
        let Some(pid) = state.pid() else {
            return ProbeResult::unhealthy("no process");
        };

        let matcher = Self::matcher_for(&state.spec, pid);
        let liveness = check_liveness(self.process_probe.as_ref(), &matcher);
        let result = match (liveness.health, &state.spec.readiness) {
            (ProbeHealth::Unknown, _) => {
                debug!(
                    "Liveness of '{}' unknown: {}",
                    state.spec.name, liveness.detail
                );
                return liveness;
            }
            (ProbeHealth::Healthy, Some(check)) => {
                self.port_probe.is_ready(&check.host, check.port, check.timeout)
            }
            _ => liveness,
        };

        if result.is_healthy() {
            if state.consecutive_failures > 0 {
                info!(
                    "Service '{}' healthy again after {} failures",
                    state.spec.name, state.consecutive_failures
                );
            }
            if state.lifecycle != ServiceLifecycle::Running {
                info!("Service '{}' is running (PID {pid})", state.spec.name);
            }
            state.consecutive_failures = 0;
            state.next_start_at = None;
            state.lifecycle = ServiceLifecycle::Running;
            return result;
        }

        self.handle_unhealthy(state, result)
    }

    fn handle_unhealthy(&self, state: &mut ServiceState, result: ProbeResult) -> ProbeResult {
        let name = state.spec.name.clone();

        if state.lifecycle == ServiceLifecycle::Starting {
            let elapsed = state
                .last_start_time
                .map(|started| started.elapsed())
                .unwrap_or_default();
            if elapsed < state.spec.startup_grace_period {
                return ProbeResult {
                    detail: format!("starting: {}", result.detail),
                    ..result
                };
            }

            warn!(
                "Service '{name}' not healthy within {:?}: {}",
                state.spec.startup_grace_period, result.detail
            );
            if let Err(err) = self.stop_child(state) {
                error!("Failed to stop '{name}' after failed startup: {err}");
                return ProbeResult::unknown(err.to_string());
            }
            self.record_failure(state, false);
            return result;
        }

        state.lifecycle = ServiceLifecycle::Unhealthy;

        if state.spec.restart_policy.permits_restart(false) {
            warn!("Service '{name}' unhealthy ({}); restarting", result.detail);
            if let Err(err) = self.stop_child(state) {
                error!("Failed to stop unhealthy service '{name}': {err}");
                return ProbeResult::unknown(err.to_string());
            }
            self.record_failure(state, false);
        } else {
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            warn!(
                "Service '{name}' unhealthy ({}); restart policy '{}' leaves it running",
                result.detail, state.spec.restart_policy
            );
        }

        result
    }

    /// Reconciles on a fixed cadence until the shutdown handle is triggered.
    pub fn run_forever(&self, interval: Duration) -> Result<(), SupervisorError> {
        self.run_ticks(interval, None)
    }

    /// Like [`run_forever`](Self::run_forever) but returns after `max_ticks` ticks when set.
    ///
    /// A tick that overruns its slot causes the missed slots to be skipped.
    pub fn run_ticks(
        &self,
        interval: Duration,
        max_ticks: Option<u64>,
    ) -> Result<(), SupervisorError> {
        let interval = interval.max(Duration::from_millis(10));
        info!("Supervising {} services every {interval:?}", self.names()?.len());

        let mut ticks = 0u64;
        let mut next_tick = Instant::now();

        while !self.shutdown.is_requested() {
            match self.reconcile_once() {
                Ok(results) => {
                    let unhealthy = results.iter().filter(|(_, r)| !r.is_healthy()).count();
                    debug!("Tick {ticks}: {} services, {unhealthy} not healthy", results.len());
                }
                Err(SupervisorError::TickInProgress) => {
                    debug!("Tick {ticks} skipped; previous tick still running");
                }
                Err(err) => error!("Reconciliation tick failed: {err}"),
            }

            ticks += 1;
            if max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }

            next_tick += interval;
            let now = Instant::now();
            if next_tick <= now {
                let behind = now.duration_since(next_tick);
                let skipped = (behind.as_nanos() / interval.as_nanos()) as u32 + 1;
                warn!("Tick overran its interval; skipping {skipped} slot(s)");
                next_tick += interval * skipped;
            }

            self.sleep_until(next_tick);
        }

        info!("Supervision loop exiting after {ticks} ticks");
        Ok(())
    }

    fn sleep_until(&self, deadline: Instant) {
        const STEP: Duration = Duration::from_millis(100);
        loop {
            if self.shutdown.is_requested() {
                return;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            thread::sleep(remaining.min(STEP));
        }
    }
}

impl Drop for ServiceSupervisor {
    fn drop(&mut self) {
        let services = match self.services.get_mut() {
            Ok(services) => services,
            Err(poisoned) => poisoned.into_inner(),
        };

        for (name, handle) in services.iter() {
            let mut state = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(mut child) = state.child.take()
                && let Err(err) = launch::terminate(name, &mut child, Duration::ZERO)
            {
                error!("Failed to terminate '{name}' on shutdown: {err}");
            }
        }
    }
}
