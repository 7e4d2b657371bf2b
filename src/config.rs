//! Configuration management for svcwarden.
use regex::Regex;
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
    sync::LazyLock,
    time::Duration,
};
use tracing::debug;

use crate::{
    backoff::BackoffPolicy,
    error::ConfigError,
    probe::ProcessMatcher,
    spec::{RestartPolicy, ServiceSpec},
    supervisor::SupervisorSettings,
};

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "svcwarden.yaml";

/// Reconciliation interval when the config does not set one.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

static ENV_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env reference pattern is valid")
});

/// Represents the structure of the configuration file.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Configuration version.
    pub version: String,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// Map of service names to their respective configurations.
    pub services: BTreeMap<String, ServiceConfig>,
    /// Directory of the config file; relative paths resolve against it.
    #[serde(skip)]
    pub project_dir: PathBuf,
}

/// Supervisor-wide section.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct SupervisorConfig {
    pub interval: Option<DurationValue>,
    pub log_dir: Option<String>,
    pub status_file: Option<String>,
    pub backoff: Option<BackoffConfig>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct BackoffConfig {
    pub base: Option<DurationValue>,
    pub max: Option<DurationValue>,
    pub cap_exponent: Option<u32>,
}

/// A duration written either as bare seconds or with a `ms`/`s`/`m`/`h` suffix.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(f64),
    Text(String),
}

impl DurationValue {
    fn resolve(&self) -> Result<Duration, ConfigError> {
        match self {
            DurationValue::Seconds(secs) => Duration::try_from_secs_f64(*secs)
                .map_err(|_| ConfigError::InvalidDuration(secs.to_string())),
            DurationValue::Text(text) => parse_duration(text),
        }
    }
}

/// A command as a shell line (`sh -c`) or an explicit argv list.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum CommandConfig {
    Line(String),
    Argv(Vec<String>),
}

/// Configuration for an individual service.
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    /// Command used to start the service.
    pub command: CommandConfig,
    pub working_dir: Option<String>,
    /// Optional environment variables for the service.
    pub env: Option<EnvConfig>,
    pub restart_policy: Option<RestartPolicy>,
    pub startup_grace_period: Option<DurationValue>,
    pub readiness: Option<ReadinessConfig>,
    pub liveness: Option<LivenessConfig>,
}

/// Represents environment variables for a service.
#[derive(Debug, Deserialize, Clone)]
pub struct EnvConfig {
    /// Optional path to an environment file.
    pub file: Option<String>,
    /// Key-value pairs of environment variables.
    pub vars: Option<BTreeMap<String, String>>,
}

impl EnvConfig {
    /// Resolves the full path to the env file based on a base directory.
    pub fn path(&self, base: &Path) -> Option<PathBuf> {
        self.file.as_deref().map(|file| resolve_path(base, file))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReadinessConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    pub timeout: Option<DurationValue>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Selects which live process stands for the service.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct LivenessConfig {
    pub pattern: Option<String>,
    pub path: Option<String>,
}

/// Fully resolved configuration, ready to hand to a supervisor.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub interval: Duration,
    pub settings: SupervisorSettings,
    pub services: Vec<ServiceSpec>,
}

fn resolve_path(base: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Parses `500ms`, `2s`, `1.5m`, `1h` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(input.to_string());
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let value: f64 = number.parse().map_err(|_| invalid())?;
    let seconds = match unit.trim() {
        "ms" => value / 1000.0,
        "" | "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => return Err(invalid()),
    };

    Duration::try_from_secs_f64(seconds).map_err(|_| invalid())
}

/// Expands `${VAR}` references from the process environment.
///
/// Strict mode fails on the first unset variable; lenient mode substitutes
/// an empty string so the text can still be parsed loosely.
fn expand_env_vars(input: &str, strict: bool) -> Result<String, ConfigError> {
    let mut missing = None;
    let result = ENV_REFERENCE.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var_name) if strict => Err(ConfigError::MissingEnvVar(var_name)),
        _ => Ok(result.into_owned()),
    }
}

/// Drops YAML `#` comments: a `#` at line start or after whitespace, outside quotes.
fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for line in input.lines() {
        let mut quote = None;
        let mut previous = ' ';
        let mut end = line.len();
        for (idx, ch) in line.char_indices() {
            match (quote, ch) {
                (None, '\'' | '"') => quote = Some(ch),
                (Some(open), _) if ch == open => quote = None,
                (None, '#') if previous.is_whitespace() => {
                    end = idx;
                    break;
                }
                _ => {}
            }
            previous = ch;
        }
        out.push_str(line[..end].trim_end());
        out.push('\n');
    }
    out
}

/// Env file paths named under `services.*.env.file`, read from a loosely parsed document.
fn env_file_paths(document: &serde_yaml::Value, base: &Path) -> Vec<PathBuf> {
    let Some(services) = document.get("services").and_then(|v| v.as_mapping()) else {
        return Vec::new();
    };
    services
        .values()
        .filter_map(|service| service.get("env")?.get("file")?.as_str())
        .map(|file| resolve_path(base, file))
        .collect()
}

/// Reads `KEY=VALUE` lines, skipping blanks and `#` comments.
fn read_env_file(path: &Path) -> Result<Vec<(String, String)>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| {
        ConfigError::ReadError(std::io::Error::new(
            e.kind(),
            format!("{} ({})", e, path.display()),
        ))
    })?;

    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let mut value = value.trim();

            if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
                value = &value[1..value.len() - 1];
            }

            pairs.push((key.to_string(), value.to_string()));
        }
    }
    Ok(pairs)
}

/// Loads env file entries into the process environment so `${VAR}` can see them.
fn load_env_file(path: &Path) -> Result<(), ConfigError> {
    for (key, value) in read_env_file(path)? {
        unsafe {
            env::set_var(key, value);
        }
    }
    Ok(())
}

/// Loads and parses the configuration file, expanding environment variables.
pub fn load_config(config_path: Option<&str>) -> Result<Config, ConfigError> {
    let config_path = Path::new(config_path.unwrap_or(DEFAULT_CONFIG_FILE));

    let content = fs::read_to_string(config_path).map_err(|e| {
        ConfigError::ReadError(std::io::Error::new(
            e.kind(),
            format!("{} ({})", e, config_path.display()),
        ))
    })?;

    let base_path = match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let content = strip_comments(&content);

    // Loose pass: unset variables become empty so non-string fields still
    // parse as YAML; only the env file paths are read from it.
    let loose: serde_yaml::Value = serde_yaml::from_str(&expand_env_vars(&content, false)?)?;
    for path in env_file_paths(&loose, &base_path) {
        debug!("Loading env file {}", path.display());
        load_env_file(&path)?;
    }

    let expanded_content = expand_env_vars(&content, true)?;
    let mut config: Config = serde_yaml::from_str(&expanded_content)?;
    config.project_dir = base_path;
    Ok(config)
}

impl Config {
    /// Converts the parsed file into supervisor settings and service specs.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        let section = &self.supervisor;
        let interval = match &section.interval {
            Some(value) => value.resolve()?,
            None => DEFAULT_INTERVAL,
        };

        let mut backoff = BackoffPolicy::default();
        if let Some(config) = &section.backoff {
            if let Some(base) = &config.base {
                backoff.base = base.resolve()?;
            }
            if let Some(max) = &config.max {
                backoff.max_delay = max.resolve()?;
            }
            if let Some(cap) = config.cap_exponent {
                backoff.cap_exponent = cap;
            }
        }

        let settings = SupervisorSettings {
            backoff,
            log_dir: section
                .log_dir
                .as_deref()
                .map(|dir| resolve_path(&self.project_dir, dir)),
            status_file: section
                .status_file
                .as_deref()
                .map(|file| resolve_path(&self.project_dir, file)),
        };

        let services = self
            .services
            .iter()
            .map(|(name, service)| self.resolve_service(name, service))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ResolvedConfig {
            interval,
            settings,
            services,
        })
    }

    fn resolve_service(
        &self,
        name: &str,
        service: &ServiceConfig,
    ) -> Result<ServiceSpec, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidService {
            service: name.to_string(),
            reason: reason.to_string(),
        };

        let mut spec = match &service.command {
            CommandConfig::Line(line) if line.trim().is_empty() => {
                return Err(invalid("command is empty"));
            }
            CommandConfig::Line(line) => ServiceSpec::shell(name, line.clone()),
            CommandConfig::Argv(argv) => {
                if argv.first().is_none_or(|program| program.trim().is_empty()) {
                    return Err(invalid("command is empty"));
                }
                ServiceSpec::new(name, argv.iter().cloned())
            }
        };

        spec = spec.with_working_directory(match &service.working_dir {
            Some(dir) => resolve_path(&self.project_dir, dir),
            None => self.project_dir.clone(),
        });

        if let Some(policy) = service.restart_policy {
            spec = spec.with_restart_policy(policy);
        }
        if let Some(grace) = &service.startup_grace_period {
            spec = spec.with_grace_period(grace.resolve()?);
        }

        if let Some(env_config) = &service.env {
            if let Some(path) = env_config.path(&self.project_dir) {
                for (key, value) in read_env_file(&path)? {
                    spec = spec.with_env(key, value);
                }
            }
            for (key, value) in env_config.vars.iter().flatten() {
                spec = spec.with_env(key.clone(), value.clone());
            }
        }

        if let Some(readiness) = &service.readiness {
            if readiness.port == 0 {
                return Err(invalid("readiness port must be non-zero"));
            }
            let timeout = match &readiness.timeout {
                Some(value) => value.resolve()?,
                None => Duration::from_secs(1),
            };
            spec = spec.with_readiness(readiness.host.clone(), readiness.port, timeout);
        }

        if let Some(liveness) = &service.liveness {
            let matcher = match (&liveness.pattern, &liveness.path) {
                (Some(pattern), None) if !pattern.is_empty() => {
                    ProcessMatcher::Pattern(pattern.clone())
                }
                (None, Some(path)) => {
                    ProcessMatcher::ExactPath(resolve_path(&self.project_dir, path))
                }
                _ => return Err(invalid("liveness needs exactly one of 'pattern' or 'path'")),
            };
            spec = spec.with_liveness(matcher);
        }

        Ok(spec)
    }
}
