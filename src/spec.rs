//! Static description of a managed service.
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf, time::Duration};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::probe::ProcessMatcher;

/// Restart behaviour applied by the reconciliation loop.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RestartPolicy {
    /// Start once; never restart automatically.
    Never,
    /// Restart after crashes, non-zero exits and failed health checks.
    #[default]
    OnFailure,
    /// Restart after any exit, including a clean one.
    Always,
}

impl RestartPolicy {
    /// Whether a run that ended with the given outcome may be restarted.
    ///
    /// `clean_exit` is true only when the process exited on its own with status 0.
    pub fn permits_restart(&self, clean_exit: bool) -> bool {
        match self {
            RestartPolicy::Never => false,
            RestartPolicy::OnFailure => !clean_exit,
            RestartPolicy::Always => true,
        }
    }
}

/// TCP readiness check for a service listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessCheck {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

/// Immutable description of one managed service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Unique key within a supervisor.
    pub name: String,
    /// Program and arguments; `command[0]` is the program.
    pub command: Vec<String>,
    pub working_directory: PathBuf,
    pub env: BTreeMap<String, String>,
    pub restart_policy: RestartPolicy,
    /// Time allowed for a fresh process to become healthy, and for a stopping
    /// process to exit after SIGTERM.
    pub startup_grace_period: Duration,
    pub readiness: Option<ReadinessCheck>,
    /// Overrides the default liveness matcher (the spawned child's PID).
    pub liveness: Option<ProcessMatcher>,
}

impl ServiceSpec {
    /// Default grace period when a service does not configure one.
    pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

    /// Creates a spec with default policy and no probes.
    pub fn new<I, S>(name: impl Into<String>, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            command: command.into_iter().map(Into::into).collect(),
            working_directory: PathBuf::from("."),
            env: BTreeMap::new(),
            restart_policy: RestartPolicy::default(),
            startup_grace_period: Self::DEFAULT_GRACE_PERIOD,
            readiness: None,
            liveness: None,
        }
    }

    /// Wraps a shell command line as `sh -c <line>`.
    pub fn shell(name: impl Into<String>, line: impl Into<String>) -> Self {
        Self::new(name, ["sh".to_string(), "-c".to_string(), line.into()])
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.startup_grace_period = grace;
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = dir.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_readiness(
        mut self,
        host: impl Into<String>,
        port: u16,
        timeout: Duration,
    ) -> Self {
        self.readiness = Some(ReadinessCheck {
            host: host.into(),
            port,
            timeout,
        });
        self
    }

    pub fn with_liveness(mut self, matcher: ProcessMatcher) -> Self {
        self.liveness = Some(matcher);
        self
    }

    /// Human-readable command line used in logs and reports.
    pub fn display_command(&self) -> String {
        self.command.join(" ")
    }
}
