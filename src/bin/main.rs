use std::{
    error::Error,
    io::{self, IsTerminal},
    path::PathBuf,
    process,
    sync::Arc,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use svcwarden::{
    cli::{Cli, Commands, ProbeTarget, ProcessArgs, parse_args},
    config::{ResolvedConfig, load_config, parse_duration},
    error::{LogsError, SupervisorError},
    logs::tail_log,
    probe::{
        PortProbe, ProbeHealth, ProbeResult, ProcessMatcher, SysinfoProcessProbe,
        TcpPortProbe, check_liveness,
    },
    status::{HealthSnapshot, render_table},
    supervisor::ServiceSupervisor,
};

fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args();
    init_logging(&args);

    match args.command {
        Commands::Run {
            config,
            max_ticks,
            service,
        } => {
            let resolved = resolve_config(&config)?;
            run_foreground(resolved, max_ticks, service.as_deref())?;
        }
        Commands::Check { config } => {
            let resolved = resolve_config(&config)?;
            print_services(&resolved);
        }
        Commands::Probe { target } => {
            let result = run_probe(target)?;
            println!("{}: {}", result.health, result.detail);
            match result.health {
                ProbeHealth::Healthy => {}
                ProbeHealth::Unhealthy => process::exit(1),
                ProbeHealth::Unknown => process::exit(2),
            }
        }
        Commands::Status {
            config,
            file,
            json,
            no_color,
        } => {
            let path = match file {
                Some(file) => PathBuf::from(file),
                None => resolve_config(&config)?
                    .settings
                    .status_file
                    .ok_or("no status_file configured; pass --file")?,
            };
            let snapshot = HealthSnapshot::read_from(&path)
                .map_err(|err| format!("cannot read status file {}: {err}", path.display()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                let color = !no_color && io::stdout().is_terminal();
                print!("{}", render_table(&snapshot, color));
            }
        }
        Commands::Logs {
            config,
            service,
            lines,
            kind,
        } => {
            let resolved = resolve_config(&config)?;
            let log_dir = resolved.settings.log_dir.ok_or(LogsError::NoLogDir)?;
            info!("Fetching {kind} logs for service: {service}");
            for line in tail_log(&log_dir, &service, kind.as_str(), lines)? {
                println!("{line}");
            }
        }
    }

    Ok(())
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn resolve_config(config_path: &str) -> Result<ResolvedConfig, Box<dyn Error>> {
    let config = load_config(Some(config_path))?;
    Ok(config.resolve()?)
}

fn print_services(resolved: &ResolvedConfig) {
    println!(
        "Configuration OK: {} services, interval {:?}",
        resolved.services.len(),
        resolved.interval
    );
    for spec in &resolved.services {
        let readiness = spec
            .readiness
            .as_ref()
            .map(|check| format!(", ready on {}:{}", check.host, check.port))
            .unwrap_or_default();
        println!(
            "  {}: `{}` (restart {}, grace {:?}{readiness})",
            spec.name,
            spec.display_command(),
            spec.restart_policy,
            spec.startup_grace_period,
        );
    }
}

fn run_probe(target: ProbeTarget) -> Result<ProbeResult, Box<dyn Error>> {
    match target {
        ProbeTarget::Port {
            host,
            port,
            timeout,
        } => {
            let timeout = parse_duration(&timeout)?;
            Ok(TcpPortProbe.is_ready(&host, port, timeout))
        }
        ProbeTarget::Process(ProcessArgs { pid, path, pattern }) => {
            let matcher = match (pid, path, pattern) {
                (Some(pid), _, _) => ProcessMatcher::Pid(pid),
                (None, Some(path), _) => ProcessMatcher::ExactPath(PathBuf::from(path)),
                (None, None, Some(pattern)) => ProcessMatcher::Pattern(pattern),
                (None, None, None) => return Err("one of --pid, --path or --pattern is required".into()),
            };
            Ok(check_liveness(&SysinfoProcessProbe::new(), &matcher))
        }
    }
}

fn run_foreground(
    resolved: ResolvedConfig,
    max_ticks: Option<u64>,
    only: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let ResolvedConfig {
        interval,
        settings,
        services,
    } = resolved;

    let services: Vec<_> = match only {
        Some(name) => {
            let selected: Vec<_> = services.into_iter().filter(|s| s.name == name).collect();
            if selected.is_empty() {
                return Err(SupervisorError::UnknownService(name.to_string()).into());
            }
            selected
        }
        None => services,
    };

    let supervisor = Arc::new(ServiceSupervisor::new(settings));
    for spec in services {
        supervisor.register(spec)?;
    }

    let shutdown = supervisor.shutdown_handle();
    ctrlc::set_handler(move || {
        warn!("svcwarden is shutting down... stopping services after this tick");
        shutdown.request();
    })?;

    let outcome = supervisor.run_ticks(interval, max_ticks);

    if let Err(err) = supervisor.stop_all() {
        error!("Failed to stop all services: {err}");
    }
    info!("All services stopped");

    outcome?;
    Ok(())
}
