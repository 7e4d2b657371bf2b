//! Command-line interface for svcwarden.
use std::{fmt, str::FromStr};

use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;

/// Wrapper around `LevelFilter` so clap can parse log levels from either
/// string names ("info", "debug", etc.) or numeric shorthands (0-5).
#[derive(Clone, Copy, Debug)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("log level cannot be empty".into());
        }

        if let Ok(number) = trimmed.parse::<u8>() {
            let level = match number {
                0 => LevelFilter::OFF,
                1 => LevelFilter::ERROR,
                2 => LevelFilter::WARN,
                3 => LevelFilter::INFO,
                4 => LevelFilter::DEBUG,
                5 => LevelFilter::TRACE,
                _ => {
                    return Err(format!(
                        "unsupported log level number '{number}' (expected 0-5)"
                    ));
                }
            };

            return Ok(LogLevelArg(level));
        }

        let lowercase = trimmed.to_ascii_lowercase();
        let level = match lowercase.as_str() {
            "off" => Some(LevelFilter::OFF),
            "error" | "err" => Some(LevelFilter::ERROR),
            "warn" | "warning" => Some(LevelFilter::WARN),
            "info" | "information" => Some(LevelFilter::INFO),
            "debug" => Some(LevelFilter::DEBUG),
            "trace" => Some(LevelFilter::TRACE),
            _ => None,
        }
        .ok_or_else(|| format!("invalid log level '{trimmed}'"))?;

        Ok(LogLevelArg(level))
    }
}

/// Captured output stream of a service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogKind {
    #[default]
    Stdout,
    Stderr,
}

impl LogKind {
    /// Stream name used in log file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Stdout => "stdout",
            LogKind::Stderr => "stderr",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LogKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stdout" => Ok(LogKind::Stdout),
            "stderr" => Ok(LogKind::Stderr),
            _ => Err(format!(
                "invalid log kind '{s}', must be one of: stdout, stderr"
            )),
        }
    }
}

/// Command-line interface for svcwarden.
#[derive(Parser)]
#[command(name = "svcw", version, author)]
#[command(about = "Supervises local services: restarts crashes, probes readiness", long_about = None)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for svcw.
#[derive(Subcommand)]
pub enum Commands {
    /// Start every configured service and keep it healthy until interrupted.
    Run {
        /// Path to the configuration file (defaults to `svcwarden.yaml`).
        #[arg(short, long, default_value = "svcwarden.yaml")]
        config: String,

        /// Stop after this many reconciliation ticks.
        #[arg(long, value_name = "N")]
        max_ticks: Option<u64>,

        /// Supervise only the named service.
        #[arg(short, long)]
        service: Option<String>,
    },

    /// Validate the configuration and print the resolved services.
    Check {
        /// Path to the configuration file (defaults to `svcwarden.yaml`).
        #[arg(short, long, default_value = "svcwarden.yaml")]
        config: String,
    },

    /// Run a single probe and exit non-zero unless it is healthy.
    Probe {
        #[command(subcommand)]
        target: ProbeTarget,
    },

    /// Show the last status snapshot written by `run`.
    Status {
        /// Path to the configuration file (defaults to `svcwarden.yaml`).
        #[arg(short, long, default_value = "svcwarden.yaml")]
        config: String,

        /// Read this status file instead of the one named in the config.
        #[arg(long, value_name = "PATH")]
        file: Option<String>,

        /// Emit machine-readable JSON output instead of a table.
        #[arg(long)]
        json: bool,

        /// Disable ANSI colors in output.
        #[arg(long = "no-color")]
        no_color: bool,
    },

    /// Show captured output of a service.
    Logs {
        /// Path to the configuration file (defaults to `svcwarden.yaml`).
        #[arg(short, long, default_value = "svcwarden.yaml")]
        config: String,

        /// The service whose logs should be displayed.
        #[arg(short, long)]
        service: String,

        /// Number of lines to show (default: 50).
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,

        /// Stream to show: stdout or stderr (default: stdout).
        #[arg(short = 'k', long, default_value_t = LogKind::default())]
        kind: LogKind,
    },
}

/// What a one-off `probe` checks.
#[derive(Subcommand)]
pub enum ProbeTarget {
    /// Check that a TCP port accepts connections.
    Port {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long)]
        port: u16,

        /// Connect timeout (e.g., "500ms", "2s").
        #[arg(long, default_value = "1s")]
        timeout: String,
    },

    /// Check that a matching process is alive.
    Process(ProcessArgs),
}

#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct ProcessArgs {
    /// Exact process id.
    #[arg(long)]
    pub pid: Option<u32>,

    /// Executable path.
    #[arg(long)]
    pub path: Option<String>,

    /// Substring of the command line.
    #[arg(long)]
    pub pattern: Option<String>,
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
