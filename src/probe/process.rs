use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};
use tracing::debug;

use super::{ProcessMatcher, ProcessProbe};
use crate::error::ProbeError;

/// Process probe backed by the `sysinfo` process table.
///
/// Each check reads its own table snapshot, so checks for different services
/// run in parallel.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoProcessProbe;

impl SysinfoProcessProbe {
    pub fn new() -> Self {
        Self
    }

    /// What a matcher needs: status always, plus command lines and executables.
    fn refresh_kind() -> ProcessRefreshKind {
        ProcessRefreshKind::nothing()
            .with_cmd(UpdateKind::OnlyIfNotSet)
            .with_exe(UpdateKind::OnlyIfNotSet)
    }

    fn snapshot_all() -> Result<System, ProbeError> {
        let mut system = System::new();
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, Self::refresh_kind());
        if system.processes().is_empty() {
            return Err(ProbeError::Unavailable(
                "process table could not be enumerated".into(),
            ));
        }
        Ok(system)
    }

    fn is_live(process: &Process) -> bool {
        !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
    }

    fn command_line(process: &Process) -> String {
        let parts: Vec<_> = process
            .cmd()
            .iter()
            .map(|part| part.to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            process.name().to_string_lossy().into_owned()
        } else {
            parts.join(" ")
        }
    }
}

impl ProcessProbe for SysinfoProcessProbe {
    fn is_alive(&self, matcher: &ProcessMatcher) -> Result<bool, ProbeError> {
        match matcher {
            ProcessMatcher::Pid(raw) => {
                let pid = Pid::from_u32(*raw);
                let mut system = System::new();
                system.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[pid]),
                    true,
                    ProcessRefreshKind::nothing(),
                );
                let alive = system.process(pid).is_some_and(Self::is_live);
                debug!("pid {raw} alive: {alive}");
                Ok(alive)
            }
            ProcessMatcher::ExactPath(path) => {
                let system = Self::snapshot_all()?;
                Ok(system.processes().values().any(|process| {
                    Self::is_live(process) && process.exe() == Some(path.as_path())
                }))
            }
            ProcessMatcher::Pattern(pattern) => {
                let system = Self::snapshot_all()?;
                let own = std::process::id();
                Ok(system.processes().values().any(|process| {
                    process.pid().as_u32() != own
                        && Self::is_live(process)
                        && Self::command_line(process).contains(pattern.as_str())
                }))
            }
        }
    }
}
