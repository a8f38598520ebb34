//! Process liveness and termination.
//!
//! The supervisor only ever talks to a [`Probe`]. One concrete probe is picked at startup
//! ([`ProbeKind::build`]) and injected, so the start/stop protocols never branch on the
//! platform themselves.

use std::sync::Mutex;
use sysinfo::{ProcessStatus, ProcessesToUpdate};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("process {pid} not found")]
    NoSuchProcess { pid: u32 },
    #[error("failed to signal process {pid}: {reason}")]
    Signal { pid: u32, reason: String },
}

pub trait Probe: Send + Sync {
    /// Whether `pid` currently names a running process. Never fails: unknown pids are not alive.
    fn is_alive(&self, pid: u32) -> bool;

    /// Ask `pid` to terminate. Does not wait for it to exit.
    fn terminate(&self, pid: u32) -> Result<(), ProbeError>;
}

impl<P: Probe + ?Sized> Probe for std::sync::Arc<P> {
    fn is_alive(&self, pid: u32) -> bool {
        (**self).is_alive(pid)
    }

    fn terminate(&self, pid: u32) -> Result<(), ProbeError> {
        (**self).terminate(pid)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// Signal probe on unix, process table elsewhere
    #[default]
    Auto,
    Signal,
    ProcessTable,
}

impl ProbeKind {
    pub fn build(self) -> Box<dyn Probe> {
        match self {
            #[cfg(unix)]
            ProbeKind::Auto | ProbeKind::Signal => Box::new(SignalProbe),
            #[cfg(not(unix))]
            ProbeKind::Auto => Box::new(ProcessTableProbe::new()),
            #[cfg(not(unix))]
            ProbeKind::Signal => {
                warn!("signal probe is unavailable on this platform, using the process table");
                Box::new(ProcessTableProbe::new())
            }
            ProbeKind::ProcessTable => Box::new(ProcessTableProbe::new()),
        }
    }
}

/// Probes with `kill(2)`: signal 0 for liveness, SIGTERM for termination.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalProbe;

#[cfg(unix)]
impl SignalProbe {
    /// pid 0 and negative values address process groups, never a single process
    fn target(pid: u32) -> Option<nix::unistd::Pid> {
        i32::try_from(pid)
            .ok()
            .filter(|raw| *raw > 0)
            .map(nix::unistd::Pid::from_raw)
    }
}

#[cfg(unix)]
impl Probe for SignalProbe {
    fn is_alive(&self, pid: u32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;

        let Some(target) = Self::target(pid) else {
            return false;
        };
        match kill(target, None) {
            Ok(()) => !is_zombie(pid),
            // exists, but belongs to someone else
            Err(Errno::EPERM) => !is_zombie(pid),
            Err(_) => false,
        }
    }

    fn terminate(&self, pid: u32) -> Result<(), ProbeError> {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, kill};

        let target = Self::target(pid).ok_or(ProbeError::NoSuchProcess { pid })?;
        debug!("sending SIGTERM to pid {pid}");
        match kill(target, Signal::SIGTERM) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(ProbeError::NoSuchProcess { pid }),
            Err(e) => Err(ProbeError::Signal {
                pid,
                reason: e.desc().to_string(),
            }),
        }
    }
}

/// An exited process nobody has reaped yet still answers signal 0.
#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            // the command name in parentheses may itself contain spaces
            let (_, rest) = stat.rsplit_once(')')?;
            Some(rest.trim_start().starts_with('Z'))
        })
        .unwrap_or(false)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_zombie(_pid: u32) -> bool {
    false
}

/// Probes by looking the pid up in the OS process table.
///
/// The table is owned by the probe and refreshed for the queried pid only.
pub struct ProcessTableProbe {
    system: Mutex<sysinfo::System>,
}

impl Default for ProcessTableProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTableProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(sysinfo::System::new()),
        }
    }

    fn lock_system(&self) -> std::sync::MutexGuard<'_, sysinfo::System> {
        self.system.lock().unwrap_or_else(|poisoned| {
            warn!("System mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn refreshed(&self, pid: u32) -> std::sync::MutexGuard<'_, sysinfo::System> {
        let mut system = self.lock_system();
        system.refresh_processes(ProcessesToUpdate::Some(&[sysinfo::Pid::from_u32(pid)]), true);
        system
    }
}

impl Probe for ProcessTableProbe {
    fn is_alive(&self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        self.refreshed(pid)
            .process(sysinfo::Pid::from_u32(pid))
            .is_some_and(|p| p.status() != ProcessStatus::Zombie)
    }

    fn terminate(&self, pid: u32) -> Result<(), ProbeError> {
        if pid == 0 {
            return Err(ProbeError::NoSuchProcess { pid });
        }
        let system = self.refreshed(pid);
        let process = system
            .process(sysinfo::Pid::from_u32(pid))
            .filter(|p| p.status() != ProcessStatus::Zombie)
            .ok_or(ProbeError::NoSuchProcess { pid })?;
        debug!("terminating pid {pid}");
        // graceful where the platform has it, forced otherwise
        let delivered = match process.kill_with(sysinfo::Signal::Term) {
            Some(delivered) => delivered,
            None => process.kill(),
        };
        if delivered {
            Ok(())
        } else {
            Err(ProbeError::Signal {
                pid,
                reason: "the operating system refused the request".to_string(),
            })
        }
    }
}
