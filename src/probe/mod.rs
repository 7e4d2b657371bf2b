//! Liveness and readiness probes.
//!
//! A probe answers one question about the outside world and returns a fresh
//! [`ProbeResult`]. Probes never cache: the supervisor calls them once per
//! reconciliation tick and keeps only the latest result.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, time::Duration};
use strum_macros::{AsRefStr, Display};

use crate::error::ProbeError;

mod port;
mod process;

pub use port::TcpPortProbe;
pub use process::SysinfoProcessProbe;

/// Tri-state health of a single observation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProbeHealth {
    /// The probe mechanism could not observe the service.
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

/// Outcome of one probe call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub health: ProbeHealth,
    pub detail: String,
    pub observed_at: DateTime<Utc>,
}

impl ProbeResult {
    pub fn healthy(detail: impl Into<String>) -> Self {
        Self::with_health(ProbeHealth::Healthy, detail)
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self::with_health(ProbeHealth::Unhealthy, detail)
    }

    pub fn unknown(detail: impl Into<String>) -> Self {
        Self::with_health(ProbeHealth::Unknown, detail)
    }

    fn with_health(health: ProbeHealth, detail: impl Into<String>) -> Self {
        Self {
            health,
            detail: detail.into(),
            observed_at: Utc::now(),
        }
    }

    /// True only for a positive observation; `Unknown` is not healthy.
    pub fn is_healthy(&self) -> bool {
        self.health == ProbeHealth::Healthy
    }
}

/// Identifies a process in the OS process table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessMatcher {
    /// A specific process ID.
    Pid(u32),
    /// The executable path of the process equals this path.
    ExactPath(PathBuf),
    /// This substring occurs in the process command line.
    Pattern(String),
}

impl fmt::Display for ProcessMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessMatcher::Pid(pid) => write!(f, "pid {pid}"),
            ProcessMatcher::ExactPath(path) => write!(f, "path {}", path.display()),
            ProcessMatcher::Pattern(pattern) => write!(f, "pattern '{pattern}'"),
        }
    }
}

/// Answers whether a process is currently alive.
pub trait ProcessProbe: Send + Sync {
    /// Returns `Ok(false)` when no process matches. Only failures of the probe
    /// mechanism itself are errors.
    fn is_alive(&self, matcher: &ProcessMatcher) -> Result<bool, ProbeError>;
}

/// Answers whether a TCP endpoint accepts connections.
pub trait PortProbe: Send + Sync {
    /// Must return within `timeout` once the host has been resolved.
    fn is_ready(&self, host: &str, port: u16, timeout: Duration) -> ProbeResult;
}

/// Runs a liveness probe and folds the outcome into a [`ProbeResult`].
pub fn check_liveness(probe: &dyn ProcessProbe, matcher: &ProcessMatcher) -> ProbeResult {
    match probe.is_alive(matcher) {
        Ok(true) => ProbeResult::healthy(format!("process alive ({matcher})")),
        Ok(false) => ProbeResult::unhealthy(format!("no live process ({matcher})")),
        Err(err) => ProbeResult::unknown(err.to_string()),
    }
}
