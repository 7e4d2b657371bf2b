//! Health reporting for supervised services.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs, io,
    path::Path,
    sync::{Arc, RwLock},
};
use strum_macros::{AsRefStr, Display};

use crate::launch::ExitInfo;
use crate::probe::{ProbeHealth, ProbeResult};
use crate::spec::RestartPolicy;
use crate::supervisor::{DesiredState, ServiceLifecycle};

mod table;

pub use table::render_table;

/// Version identifier for the machine-readable snapshot payload.
pub const STATUS_SCHEMA_VERSION: &str = "status.v1";

/// Represents the overall health of the supervisor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Failing,
}

/// Health classification for a single service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UnitHealth {
    Healthy,
    Degraded,
    Failing,
    Inactive, // Stopped on request - health is not applicable
}

/// Latest published view of one service, written under that service's lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub command: String,
    pub restart_policy: RestartPolicy,
    pub state: ServiceLifecycle,
    pub desired: DesiredState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub consecutive_failures: u32,
    pub spawn_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_probe: Option<ProbeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_exit: Option<ExitInfo>,
}

/// Captures how long a process has been active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UptimeInfo {
    pub seconds: u64,
    pub human: String,
}

/// Snapshot entry for one service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceReport {
    pub state: ServiceLifecycle,
    pub health: UnitHealth,
    pub last_probe_result: ProbeHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_probe: Option<ProbeResult>,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<UptimeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub restart_policy: RestartPolicy,
    pub spawn_attempts: u32,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_exit: Option<ExitInfo>,
}

/// Immutable, machine-readable view of every registered service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub schema_version: String,
    pub captured_at: DateTime<Utc>,
    pub overall_health: OverallHealth,
    pub services: BTreeMap<String, ServiceReport>,
}

impl HealthSnapshot {
    fn new(services: BTreeMap<String, ServiceReport>) -> Self {
        let overall_health = compute_overall_health(services.values().map(|r| r.health));
        Self {
            schema_version: STATUS_SCHEMA_VERSION.to_string(),
            captured_at: Utc::now(),
            overall_health,
            services,
        }
    }

    /// Writes the snapshot as JSON, replacing any previous file atomically.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, path)
    }

    pub fn read_from(path: &Path) -> io::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Thread-safe table of the most recently published service statuses.
#[derive(Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<BTreeMap<String, ServiceStatus>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, status: ServiceStatus) {
        if let Ok(mut guard) = self.inner.write() {
            guard.insert(status.name.clone(), status);
        }
    }

    pub fn remove(&self, name: &str) {
        if let Ok(mut guard) = self.inner.write() {
            guard.remove(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<ServiceStatus> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    fn entries(&self) -> Vec<ServiceStatus> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

/// Builds health snapshots from a supervisor's status board.
///
/// Reading never takes a service lock and never probes; it reports the
/// results the reconciliation loop last recorded.
#[derive(Clone)]
pub struct HealthReporter {
    board: StatusBoard,
}

impl HealthReporter {
    pub fn new(board: StatusBoard) -> Self {
        Self { board }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let now = Utc::now();
        let services = self
            .board
            .entries()
            .into_iter()
            .map(|status| (status.name.clone(), report_for(&status, now)))
            .collect();
        HealthSnapshot::new(services)
    }
}

fn report_for(status: &ServiceStatus, now: DateTime<Utc>) -> ServiceReport {
    let uptime = match (status.state, status.started_at) {
        (ServiceLifecycle::Stopped, _) | (_, None) => None,
        (_, Some(started_at)) => {
            let seconds = now
                .signed_duration_since(started_at)
                .to_std()
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or(0);
            Some(UptimeInfo {
                seconds,
                human: format_elapsed(seconds),
            })
        }
    };

    let last_probe_result = status
        .last_probe
        .as_ref()
        .map(|probe| probe.health)
        .unwrap_or_default();

    ServiceReport {
        state: status.state,
        health: derive_unit_health(status.state, status.desired, last_probe_result),
        last_probe_result,
        last_probe: status.last_probe.clone(),
        consecutive_failures: status.consecutive_failures,
        uptime,
        pid: status.pid,
        restart_policy: status.restart_policy,
        spawn_attempts: status.spawn_attempts,
        command: status.command.clone(),
        last_exit: status.last_exit,
    }
}

fn derive_unit_health(
    state: ServiceLifecycle,
    desired: DesiredState,
    last_probe: ProbeHealth,
) -> UnitHealth {
    match state {
        ServiceLifecycle::Stopped if desired == DesiredState::Stopped => UnitHealth::Inactive,
        ServiceLifecycle::Stopped | ServiceLifecycle::Unhealthy => UnitHealth::Failing,
        ServiceLifecycle::Starting => UnitHealth::Degraded,
        ServiceLifecycle::Running => match last_probe {
            ProbeHealth::Healthy => UnitHealth::Healthy,
            ProbeHealth::Unknown => UnitHealth::Degraded,
            ProbeHealth::Unhealthy => UnitHealth::Failing,
        },
    }
}

/// Worst health across units; inactive units don't count.
pub fn compute_overall_health(units: impl IntoIterator<Item = UnitHealth>) -> OverallHealth {
    let mut overall = OverallHealth::Healthy;
    for health in units {
        match health {
            UnitHealth::Failing => return OverallHealth::Failing,
            UnitHealth::Degraded => overall = OverallHealth::Degraded,
            UnitHealth::Healthy | UnitHealth::Inactive => {}
        }
    }
    overall
}

fn format_elapsed(total_seconds: u64) -> String {
    match total_seconds {
        0..=59 => format!("{total_seconds}s"),
        60..=3_599 => format!("{}m {}s", total_seconds / 60, total_seconds % 60),
        3_600..=86_399 => format!("{}h {}m", total_seconds / 3_600, (total_seconds % 3_600) / 60),
        _ => format!("{}d {}h", total_seconds / 86_400, (total_seconds % 86_400) / 3_600),
    }
}
