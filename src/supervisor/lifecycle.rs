//! Instance lifecycle: the start and stop protocols.
//!
//! `start()` and `stop()` hold the instance lock for their whole run and own every change to the
//! instance record. `launch()`/`watch()` classify a single start attempt without touching the
//! record; `stop_process()` signals a pid and waits for it to go away.

use super::{
    ManagedChild, SentinelStatus, SpawnedChild, StartFault, StartupOutcome, Supervisor, Timeouts,
};
use crate::Result;
use crate::clock::Clock;
use crate::error::{FileError, StartError, StopError};
use crate::instance::{InstanceRecord, remove_optional};
use crate::launcher::LaunchCommand;
use crate::probe::ProbeError;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::time::Instant;

impl<C: Clock> Supervisor<C> {
    /// Start the application and record it once it signals a successful start.
    ///
    /// Returns the pid of the started process.
    pub async fn start(
        &self,
        cmd: &LaunchCommand,
        profile: &str,
        timeouts: Timeouts,
    ) -> Result<u32> {
        let _lock = self.store.lock()?;
        self.clear_previous_instance()?;

        info!("starting {} with profile '{profile}'", cmd.label);
        let outcome = self.launch(cmd, &self.capture_log, timeouts).await;
        let pid = self.accept(outcome, cmd, timeouts)?;

        let record = InstanceRecord {
            pid,
            profile: profile.to_string(),
        };
        if let Err(e) = self.store.write(&record) {
            error!("application is running with pid {pid} but its instance record was not saved");
            return Err(e.into());
        }
        Ok(pid)
    }

    /// Stop the recorded instance and delete its record. Returns the pid that was stopped.
    pub async fn stop(&self, timeout: Duration) -> Result<u32> {
        let _lock = self.store.lock()?;
        let Some(pid) = self.store.read_pid()? else {
            return Err(StopError::NoInstance {
                pid_file: self.store.pid_path().to_path_buf(),
            }
            .into());
        };

        info!("stopping process with pid {pid}");
        self.stop_process(pid, timeout).await?;

        self.store.remove_pid()?;
        if !self.store.remove_profile()? {
            debug!("no profile file to remove");
        }
        Ok(pid)
    }

    /// Refuse to start over a live instance; clean up after a dead one.
    fn clear_previous_instance(&self) -> Result<()> {
        match self.store.read_pid() {
            Ok(None) => {}
            Ok(Some(pid)) if self.probe.is_alive(pid) => {
                return Err(StartError::AlreadyRunning {
                    dir: self.store.dir().to_path_buf(),
                    pid,
                    pid_file: self.store.pid_path().to_path_buf(),
                }
                .into());
            }
            Ok(Some(pid)) => {
                warn!(
                    "removing pid file {} for not running pid {pid}",
                    self.store.pid_path().display()
                );
                self.store.remove_pid()?;
            }
            Err(e @ FileError::InvalidPid { .. }) => {
                warn!("{e}, removing it");
                self.store.remove_pid()?;
            }
            Err(e) => return Err(e.into()),
        }
        if self.store.remove_profile()? {
            debug!(
                "removed leftover profile file {}",
                self.store.profile_path().display()
            );
        }
        match remove_optional(&self.capture_log) {
            Ok(true) => debug!("removed previous capture log"),
            Ok(false) => {}
            // truncated on spawn anyway
            Err(e) => warn!(
                "could not remove previous capture log {}: {e}",
                self.capture_log.display()
            ),
        }
        Ok(())
    }

    fn accept(
        &self,
        outcome: StartupOutcome,
        cmd: &LaunchCommand,
        timeouts: Timeouts,
    ) -> Result<u32> {
        let capture_log = self.capture_log.clone();
        let err = match outcome {
            StartupOutcome::Started(pid) => return Ok(pid),
            StartupOutcome::TimedOut => StartError::Timeout {
                timeout: timeouts.start,
                capture_log,
            },
            StartupOutcome::RejectedByApplication {
                status: SentinelStatus::Unrecognized(line),
                ..
            }
            | StartupOutcome::ProcessExitedWithCode {
                status: Some(SentinelStatus::Unrecognized(line)),
                ..
            } => self.invalid_sentinel(line),
            StartupOutcome::RejectedByApplication { pid, .. } => {
                StartError::RejectedStillRunning { pid }
            }
            StartupOutcome::ProcessExitedWithCode {
                exit,
                status: Some(SentinelStatus::NotStarted),
            } => StartError::Rejected { exit, capture_log },
            StartupOutcome::ProcessExitedWithCode { exit, .. } => {
                StartError::ExitedBeforeReady { exit, capture_log }
            }
            StartupOutcome::ProbeError(StartFault::Spawn(source)) => StartError::SpawnFailed {
                program: cmd.program.to_string_lossy().to_string(),
                source,
            },
            StartupOutcome::ProbeError(StartFault::Wait(source)) => {
                StartError::WaitFailed { source }
            }
        };
        Err(err.into())
    }

    fn invalid_sentinel(&self, line: String) -> StartError {
        StartError::InvalidSentinel {
            line,
            prefix: self.sentinel.prefix().to_string(),
            success: self.sentinel.success().to_string(),
            failure: self.sentinel.failure().to_string(),
        }
    }

    /// Spawn `cmd` with its output captured to `capture_log`, then watch it until it reaches a
    /// terminal outcome.
    pub async fn launch(
        &self,
        cmd: &LaunchCommand,
        capture_log: &Path,
        timeouts: Timeouts,
    ) -> StartupOutcome {
        let (stdout, stderr) = match open_capture(capture_log) {
            Ok(handles) => handles,
            Err(e) => return StartupOutcome::ProbeError(StartFault::Spawn(e)),
        };
        let mut command = cmd.command(self.store.dir());
        command.stdin(Stdio::null()).stdout(stdout).stderr(stderr);
        // keep the application out of our terminal's process group so ^C only reaches us
        #[cfg(unix)]
        command.process_group(0);

        debug!("$ {cmd}");
        let spawned_at = self.clock.now();
        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return StartupOutcome::ProbeError(StartFault::Spawn(e)),
        };
        let Some(pid) = child.id() else {
            return StartupOutcome::ProbeError(StartFault::Spawn(io::Error::other(
                "process exited before its pid could be read",
            )));
        };
        info!("started process with pid {pid}");
        let mut child = SpawnedChild { child, pid };
        self.watch(&mut child, capture_log, spawned_at, timeouts).await
    }

    /// Poll `child` and its capture log until a start result, an exit, or the start deadline.
    ///
    /// The deadline counts from `spawned_at`.
    pub async fn watch<P: ManagedChild>(
        &self,
        child: &mut P,
        capture_log: &Path,
        spawned_at: Instant,
        timeouts: Timeouts,
    ) -> StartupOutcome {
        let pid = child.pid();
        let deadline = spawned_at.checked_add(timeouts.start);
        loop {
            match self.scan(capture_log, false) {
                Some(SentinelStatus::Started) => {
                    info!("application signalled a successful start");
                    return StartupOutcome::Started(pid);
                }
                Some(status) => {
                    warn!("application signalled it is not started: {status:?}");
                    return self.await_rejected(child, status, timeouts.stop).await;
                }
                None => {}
            }

            match child.try_wait() {
                Ok(Some(exit)) => {
                    // the start result may have landed right before the exit
                    let status = self.scan(capture_log, true);
                    warn!("application exited ({exit}) before signalling a successful start");
                    return StartupOutcome::ProcessExitedWithCode { exit, status };
                }
                Ok(None) => {}
                Err(e) => return StartupOutcome::ProbeError(StartFault::Wait(e)),
            }

            let Some(nap) = self.until(deadline, self.start_poll) else {
                warn!("no start result after {}s", timeouts.start.as_secs_f64());
                return self.await_timed_out(child, timeouts.stop).await;
            };
            self.clock.sleep(nap).await;
        }
    }

    async fn await_rejected<P: ManagedChild>(
        &self,
        child: &mut P,
        status: SentinelStatus,
        stop_timeout: Duration,
    ) -> StartupOutcome {
        info!("waiting for the application to exit");
        match self.await_exit(child, stop_timeout).await {
            Ok(Some(exit)) => {
                debug!("application exited ({exit})");
                StartupOutcome::ProcessExitedWithCode {
                    exit,
                    status: Some(status),
                }
            }
            Ok(None) => StartupOutcome::RejectedByApplication {
                pid: child.pid(),
                status,
            },
            Err(e) => StartupOutcome::ProbeError(StartFault::Wait(e)),
        }
    }

    async fn await_timed_out<P: ManagedChild>(
        &self,
        child: &mut P,
        stop_timeout: Duration,
    ) -> StartupOutcome {
        let pid = child.pid();
        if let Err(e) = self.probe.terminate(pid) {
            warn!("could not terminate pid {pid}: {e}");
        }
        match self.await_exit(child, stop_timeout).await {
            Ok(Some(exit)) => debug!("process {pid} exited ({exit})"),
            Ok(None) => warn!(
                "process {pid} is still running {}s after termination was requested",
                stop_timeout.as_secs_f64()
            ),
            Err(e) => warn!("failed waiting for pid {pid}: {e}"),
        }
        StartupOutcome::TimedOut
    }

    /// Wait up to `bound` for `child` to exit; `None` if it is still running.
    async fn await_exit<P: ManagedChild>(
        &self,
        child: &mut P,
        bound: Duration,
    ) -> io::Result<Option<crate::supervisor::Exit>> {
        let deadline = self.clock.now().checked_add(bound);
        loop {
            if let Some(exit) = child.try_wait()? {
                return Ok(Some(exit));
            }
            let Some(nap) = self.until(deadline, self.stop_poll) else {
                return Ok(None);
            };
            self.clock.sleep(nap).await;
        }
    }

    /// Next sleep of a polling loop: `poll`, cut short by `deadline`, or `None` once it has
    /// passed. A deadline too far out to represent never passes.
    fn until(&self, deadline: Option<Instant>, poll: Duration) -> Option<Duration> {
        let Some(deadline) = deadline else {
            return Some(poll);
        };
        let now = self.clock.now();
        (now < deadline).then(|| poll.min(deadline - now))
    }

    fn scan(&self, capture_log: &Path, exited: bool) -> Option<SentinelStatus> {
        let scanned = if exited {
            self.sentinel.scan_final(capture_log)
        } else {
            self.sentinel.scan(capture_log)
        };
        scanned.unwrap_or_else(|e| {
            trace!("cannot read {}: {e}", capture_log.display());
            None
        })
    }

    /// Ask `pid` to terminate and wait until it is gone.
    ///
    /// The deadline counts from the start of the call, signal delivery included.
    pub async fn stop_process(
        &self,
        pid: u32,
        timeout: Duration,
    ) -> std::result::Result<(), StopError> {
        let deadline = self.clock.now().checked_add(timeout);
        self.probe.terminate(pid).map_err(|e| match e {
            ProbeError::NoSuchProcess { pid } => StopError::NoSuchProcess {
                pid,
                pid_file: self.store.pid_path().to_path_buf(),
            },
            source => StopError::SignalFailed { pid, source },
        })?;
        loop {
            if !self.probe.is_alive(pid) {
                info!("process {pid} stopped");
                return Ok(());
            }
            let Some(nap) = self.until(deadline, self.stop_poll) else {
                return Err(StopError::StillRunning { pid, timeout });
            };
            trace!("waiting for pid {pid} to exit");
            self.clock.sleep(nap).await;
        }
    }
}

/// Truncate or create the capture log, one handle for stdout and one for stderr.
fn open_capture(path: &Path) -> io::Result<(std::fs::File, std::fs::File)> {
    let stdout = std::fs::File::create(path)?;
    let stderr = stdout.try_clone()?;
    Ok((stdout, stderr))
}
