//! Error handling for svcwarden.
use thiserror::Error;

/// Errors raised while reading or validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error reading or accessing a configuration file.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Error parsing YAML configuration.
    #[error("Invalid YAML format: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// A duration field could not be parsed.
    #[error("Invalid duration value: '{0}'")]
    InvalidDuration(String),

    /// A `${VAR}` reference names a variable that is not set.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// A service definition is structurally unusable.
    #[error("Service '{service}' is invalid: {reason}")]
    InvalidService {
        /// The offending service.
        service: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Defines all possible errors that can occur while supervising services.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A service with the same name is already registered.
    #[error("Service '{0}' is already registered")]
    DuplicateName(String),

    /// The requested service has not been registered.
    #[error("Unknown service '{0}'")]
    UnknownService(String),

    /// `start` was called on a service whose process is still alive.
    #[error("Service '{service}' is already running with PID {pid}")]
    AlreadyRunning {
        /// The service name.
        service: String,
        /// PID of the live process.
        pid: u32,
    },

    /// The OS refused to spawn the service process.
    #[error("Failed to start service '{service}': {source}")]
    SpawnError {
        /// The service name that failed to start.
        service: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The process was spawned but exited before the startup check passed.
    #[error("Service '{service}' exited during startup: {detail}")]
    ExitedDuringStartup {
        /// The service name.
        service: String,
        /// Exit status description.
        detail: String,
    },

    /// The process could not be reaped even after SIGKILL.
    #[error("Service '{service}' did not terminate after SIGKILL")]
    TerminationTimeout {
        /// The service name.
        service: String,
    },

    /// Delivering a signal to the service failed for a reason other than ESRCH.
    #[error("Failed to signal service '{service}': {source}")]
    Signal {
        /// The service name.
        service: String,
        /// Errno reported by the kernel.
        #[source]
        source: nix::errno::Errno,
    },

    /// A reconciliation tick was requested while another one is still running.
    #[error("A reconciliation tick is already in progress")]
    TickInProgress,

    /// Writing the status file failed.
    #[error("Failed to write status file: {0}")]
    StatusFile(#[from] std::io::Error),

    /// Configuration failure surfaced through the supervisor.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Error for poisoned mutex.
    #[error("Mutex is poisoned: {0}")]
    MutexPoisonError(String),
}

/// Implement the `From` trait to convert a `std::sync::PoisonError` into a `SupervisorError`.
impl<T> From<std::sync::PoisonError<T>> for SupervisorError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        SupervisorError::MutexPoisonError(err.to_string())
    }
}

/// Error type for probe mechanisms.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The probe could not observe the system at all (e.g. the process table is unreadable).
    #[error("Probe unavailable: {0}")]
    Unavailable(String),
}

/// Error type for log tailing.
#[derive(Debug, Error)]
pub enum LogsError {
    /// No log directory is configured.
    #[error("No log_dir configured; service output is discarded")]
    NoLogDir,

    /// The log file for the requested stream does not exist.
    #[error("Log file {0} not found")]
    LogUnavailable(String),

    /// Error while reading the log file.
    #[error("Log read failed: {0}")]
    Io(#[from] std::io::Error),
}
