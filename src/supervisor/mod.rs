//! Lifecycle of the single managed instance.
//!
//! `start`, `stop` and `status` each run once per invocation of the tool; the instance record on
//! disk is what ties separate invocations together. The protocols themselves live in
//! [`lifecycle`]; this module holds the shared types and the read-only status query.

mod lifecycle;
pub mod sentinel;

pub use sentinel::{Sentinel, SentinelStatus};

use crate::clock::{Clock, SystemClock};
use crate::error::FileError;
use crate::instance::StateStore;
use crate::instance_status::InstanceStatus;
use crate::probe::Probe;
use crate::settings::Settings;
use crate::Result;
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl From<std::process::ExitStatus> for Exit {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }
}

impl Display for Exit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "killed by signal {signal}"),
            (None, None) => write!(f, "unknown exit status"),
        }
    }
}

/// The process being started, as seen by the start protocol
pub trait ManagedChild {
    fn pid(&self) -> u32;
    /// Non-blocking: `None` while the process is still running
    fn try_wait(&mut self) -> io::Result<Option<Exit>>;
}

pub struct SpawnedChild {
    child: tokio::process::Child,
    pid: u32,
}

impl ManagedChild for SpawnedChild {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn try_wait(&mut self) -> io::Result<Option<Exit>> {
        Ok(self.child.try_wait()?.map(Exit::from))
    }
}

#[derive(Debug)]
pub enum StartFault {
    /// The process could not be created
    Spawn(io::Error),
    /// Waiting on the process failed
    Wait(io::Error),
}

/// Terminal classification of one start attempt
#[derive(Debug)]
pub enum StartupOutcome {
    Started(u32),
    /// Signalled a failure and did not exit within the stop timeout
    RejectedByApplication { pid: u32, status: SentinelStatus },
    /// No start result before the deadline; the process was asked to terminate
    TimedOut,
    /// `status` is the start result the process wrote before exiting, if any
    ProcessExitedWithCode {
        exit: Exit,
        status: Option<SentinelStatus>,
    },
    ProbeError(StartFault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub start: Duration,
    pub stop: Duration,
}

pub struct Supervisor<C: Clock = SystemClock> {
    store: StateStore,
    probe: Box<dyn Probe>,
    clock: C,
    sentinel: Sentinel,
    capture_log: PathBuf,
    start_poll: Duration,
    stop_poll: Duration,
}

impl Supervisor<SystemClock> {
    pub fn new(dir: &Path, settings: &Settings) -> Self {
        Self::with_clock(dir, settings, settings.general.probe.build(), SystemClock)
    }
}

impl<C: Clock> Supervisor<C> {
    pub fn with_clock(dir: &Path, settings: &Settings, probe: Box<dyn Probe>, clock: C) -> Self {
        Self {
            store: StateStore::new(dir, &settings.files),
            probe,
            clock,
            sentinel: Sentinel::from_settings(&settings.start),
            capture_log: dir.join(&settings.files.capture_log),
            start_poll: settings.start_poll_interval(),
            stop_poll: settings.stop_poll_interval(),
        }
    }

    /// Whether an instance is running. Never modifies the instance record.
    pub fn status(&self) -> Result<InstanceStatus> {
        let pid = match self.store.read_pid() {
            Ok(Some(pid)) => pid,
            Ok(None) => {
                debug!("no pid file in {}", self.store.dir().display());
                return Ok(InstanceStatus::NotRunning);
            }
            Err(e @ FileError::InvalidPid { .. }) => {
                warn!("{e}");
                return Ok(InstanceStatus::NotRunning);
            }
            Err(e) => return Err(e.into()),
        };
        if !self.probe.is_alive(pid) {
            warn!("pid file found but no linked process (pid {pid})");
            return Ok(InstanceStatus::NotRunning);
        }
        let profile = self.store.read_profile()?;
        if profile.is_none() {
            debug!("no active profile file");
        }
        Ok(InstanceStatus::Running { pid, profile })
    }
}

#[cfg(test)]
impl Exit {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }
}

#[cfg(test)]
impl<C: Clock> Supervisor<C> {
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn capture_log(&self) -> &Path {
        &self.capture_log
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::instance::InstanceRecord;
    use crate::probe::ProbeError;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    type Hook = Box<dyn FnOnce() + Send>;

    /// Probe over an in-memory set of live pids
    #[derive(Default)]
    pub(crate) struct FakeProbe {
        pub alive: Mutex<HashSet<u32>>,
        pub terminated: Mutex<Vec<u32>>,
        /// Processes ignore termination requests
        pub stubborn: bool,
        /// Runs once, on the first delivered termination request
        pub on_terminate: Mutex<Option<Hook>>,
    }

    impl FakeProbe {
        pub fn with_alive(pids: &[u32]) -> Arc<Self> {
            Arc::new(Self {
                alive: Mutex::new(pids.iter().copied().collect()),
                ..Default::default()
            })
        }

        pub fn stubborn(pids: &[u32]) -> Arc<Self> {
            Arc::new(Self {
                alive: Mutex::new(pids.iter().copied().collect()),
                stubborn: true,
                ..Default::default()
            })
        }

        pub fn terminated(&self) -> Vec<u32> {
            self.terminated.lock().unwrap().clone()
        }

        pub fn on_terminate(&self, hook: impl FnOnce() + Send + 'static) {
            *self.on_terminate.lock().unwrap() = Some(Box::new(hook));
        }
    }

    impl Probe for FakeProbe {
        fn is_alive(&self, pid: u32) -> bool {
            self.alive.lock().unwrap().contains(&pid)
        }

        fn terminate(&self, pid: u32) -> std::result::Result<(), ProbeError> {
            self.terminated.lock().unwrap().push(pid);
            let mut alive = self.alive.lock().unwrap();
            if !alive.contains(&pid) {
                return Err(ProbeError::NoSuchProcess { pid });
            }
            if !self.stubborn {
                alive.remove(&pid);
            }
            if let Some(hook) = self.on_terminate.lock().unwrap().take() {
                hook();
            }
            Ok(())
        }
    }

    pub(crate) fn supervisor(
        dir: &TempDir,
        probe: Arc<FakeProbe>,
    ) -> Supervisor<ManualClock> {
        Supervisor::with_clock(
            dir.path(),
            &Settings::default(),
            Box::new(probe),
            ManualClock::new(),
        )
    }

    fn snapshot(dir: &TempDir) -> Vec<(String, Vec<u8>)> {
        let mut files = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .map(|p| {
                (
                    p.file_name().unwrap().to_string_lossy().to_string(),
                    std::fs::read(&p).unwrap(),
                )
            })
            .collect::<Vec<_>>();
        files.sort();
        files
    }

    #[test]
    fn test_exit_display() {
        assert_eq!(Exit::code(0).to_string(), "exit code 0");
        assert_eq!(Exit::signal(15).to_string(), "killed by signal 15");
        assert_eq!(
            Exit {
                code: None,
                signal: None
            }
            .to_string(),
            "unknown exit status"
        );
    }

    #[test]
    fn test_status_without_record() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, FakeProbe::with_alive(&[]));
        assert_eq!(sup.status().unwrap(), InstanceStatus::NotRunning);
    }

    #[test]
    fn test_status_running() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, FakeProbe::with_alive(&[321]));
        sup.store()
            .write(&InstanceRecord {
                pid: 321,
                profile: "qa".to_string(),
            })
            .unwrap();
        assert_eq!(
            sup.status().unwrap(),
            InstanceStatus::Running {
                pid: 321,
                profile: Some("qa".to_string())
            }
        );
    }

    #[test]
    fn test_status_without_profile_file() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, FakeProbe::with_alive(&[321]));
        std::fs::write(sup.store().pid_path(), "321").unwrap();
        assert_eq!(
            sup.status().unwrap(),
            InstanceStatus::Running {
                pid: 321,
                profile: None
            }
        );
    }

    #[test]
    fn test_status_stale_record_is_not_running_and_untouched() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, FakeProbe::with_alive(&[]));
        sup.store()
            .write(&InstanceRecord {
                pid: 321,
                profile: "qa".to_string(),
            })
            .unwrap();
        let before = snapshot(&dir);
        for _ in 0..3 {
            assert_eq!(sup.status().unwrap(), InstanceStatus::NotRunning);
        }
        assert_eq!(snapshot(&dir), before);
    }

    #[test]
    fn test_status_invalid_pid_is_not_running() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, FakeProbe::with_alive(&[]));
        std::fs::write(sup.store().pid_path(), "garbage").unwrap();
        assert_eq!(sup.status().unwrap(), InstanceStatus::NotRunning);
        assert!(sup.store().has_pid());
    }

    #[test]
    fn test_status_unreadable_profile() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&dir, FakeProbe::with_alive(&[321]));
        std::fs::write(sup.store().pid_path(), "321").unwrap();
        std::fs::create_dir_all(sup.store().profile_path().join("x")).unwrap();

        let err = sup.status().unwrap_err();
        assert_eq!(
            crate::error::exit_code(&err),
            crate::error::codes::CANT_READ_PROFILE_FILE
        );
    }

    #[test]
    fn test_status_is_idempotent_while_running() {
        let dir = TempDir::new().unwrap();
        let probe = FakeProbe::with_alive(&[55]);
        let sup = supervisor(&dir, probe.clone());
        sup.store()
            .write(&InstanceRecord {
                pid: 55,
                profile: String::new(),
            })
            .unwrap();
        let before = snapshot(&dir);
        let first = sup.status().unwrap();
        for _ in 0..5 {
            assert_eq!(sup.status().unwrap(), first);
        }
        assert_eq!(snapshot(&dir), before);
        assert!(probe.terminated().is_empty());
    }
}
