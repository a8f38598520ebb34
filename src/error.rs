//! Custom diagnostic error types for rich error reporting via miette.
//!
//! Every failure the tool can report is one of the enums below, and every variant maps to
//! exactly one reserved process exit code (see [`codes`]). Command handlers return
//! `miette::Result`; [`exit_code`] recovers the reserved code from the final report.

// False positive: fields are used in #[error] format strings and miette derive macros
#![allow(unused_assignments)]

use crate::supervisor::Exit;
use miette::{Diagnostic, NamedSource, SourceSpan};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Reserved process exit codes. Values below 100 belong to the managed application and shell.
pub mod codes {
    pub const UNEXPECTED: i32 = 1;
    pub const BAD_ARGUMENTS: i32 = 100;
    pub const BAD_APP_FILES: i32 = 110;
    pub const CANT_KILL_APP: i32 = 120;
    pub const APP_ALREADY_STARTED: i32 = 130;
    pub const CANT_START_PROCESS: i32 = 160;
    pub const CANT_START_INVALID_OUTPUT: i32 = 161;
    pub const CANT_START_TIMEOUT: i32 = 162;
    pub const CANT_START_SIGNALLED_ERROR_STILL_RUNNING: i32 = 163;
    pub const CANT_START_INVALID_SENTINEL: i32 = 164;
    pub const CANT_START_WAIT_FAILED: i32 = 165;
    pub const CANT_STOP_NO_APP: i32 = 170;
    pub const CANT_STOP_STILL_RUNNING: i32 = 180;
    pub const CANT_DELETE_PID_FILE: i32 = 190;
    pub const CANT_DELETE_PROFILE_FILE: i32 = 191;
    pub const CANT_WRITE_RECORD: i32 = 192;
    pub const INVALID_PID_FILE: i32 = 193;
    pub const CANT_READ_PROFILE_FILE: i32 = 194;
    pub const INTERRUPTED: i32 = 199;
}

/// Malformed command line or configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ArgumentError {
    #[error("invalid value for {name}: {value}")]
    #[diagnostic(code(jsma::args::invalid_value))]
    InvalidValue {
        name: String,
        value: String,
        #[help]
        help: Option<String>,
    },

    #[error("cannot parse launch command '{command}'")]
    #[diagnostic(
        code(jsma::args::invalid_command),
        help("check quoting in app.command; it is split with POSIX shell rules")
    )]
    InvalidCommand {
        command: String,
        #[source]
        source: shell_words::ParseError,
    },

    #[error("app.command is set but empty after splitting")]
    #[diagnostic(code(jsma::args::empty_command))]
    EmptyCommand,

    #[error("failed to read settings file: {}", path.display())]
    #[diagnostic(code(jsma::config::read_error))]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Error for TOML settings parse failures with source code highlighting.
#[derive(Debug, Error, Diagnostic)]
#[error("failed to parse settings")]
#[diagnostic(code(jsma::config::parse_error))]
pub struct ConfigParseError {
    #[source_code]
    pub src: NamedSource<String>,

    #[label("{message}")]
    pub span: SourceSpan,

    pub message: String,

    #[help]
    pub help: Option<String>,
}

impl ConfigParseError {
    pub fn from_toml_error(path: &std::path::Path, contents: String, err: toml::de::Error) -> Self {
        let message = err.message().to_string();
        let span = err
            .span()
            .map(|r| SourceSpan::from(r.start..r.end))
            .unwrap_or_else(|| SourceSpan::from(0..0));

        Self {
            src: NamedSource::new(path.display().to_string(), contents),
            span,
            message,
            help: Some("check TOML syntax at https://toml.io".to_string()),
        }
    }
}

/// The application artifact could not be located.
#[derive(Debug, Error, Diagnostic)]
pub enum LaunchError {
    #[error("no application artifact matching '{pattern}' in {}", dir.display())]
    #[diagnostic(
        code(jsma::launch::artifact_missing),
        help("run jsma from the application directory, or set app.command in jsma.toml")
    )]
    ArtifactMissing { dir: PathBuf, pattern: String },

    #[error("cannot pick an application artifact, {} files match: {}", candidates.len(), candidates.iter().map(|c| c.display().to_string()).collect::<Vec<_>>().join(", "))]
    #[diagnostic(
        code(jsma::launch::artifact_ambiguous),
        help("leave exactly one artifact in the directory or narrow app.artifact")
    )]
    ArtifactAmbiguous { candidates: Vec<PathBuf> },

    #[error("invalid artifact pattern '{pattern}'")]
    #[diagnostic(code(jsma::launch::bad_pattern))]
    BadPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// Failures of the start protocol and its preconditions.
#[derive(Debug, Error, Diagnostic)]
pub enum StartError {
    #[error("application in {} is already running with pid {pid} (or delete {})", dir.display(), pid_file.display())]
    #[diagnostic(
        code(jsma::start::already_running),
        help("stop it first with `jsma stop`, or delete the pid file if the pid is not yours")
    )]
    AlreadyRunning {
        dir: PathBuf,
        pid: u32,
        pid_file: PathBuf,
    },

    #[error("could not execute {program}")]
    #[diagnostic(
        code(jsma::start::spawn_failed),
        help(
            "make sure JAVA_HOME is set properly (the java executable should reside at JAVA_HOME/bin/java) or that app.command names an existing program"
        )
    )]
    SpawnFailed {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("application exited ({exit}) without signalling a successful start, see {}", capture_log.display())]
    #[diagnostic(
        code(jsma::start::exited),
        help("inspect the capture log for the application's output")
    )]
    ExitedBeforeReady { exit: Exit, capture_log: PathBuf },

    #[error("application signalled it did not start and exited ({exit}), see {}", capture_log.display())]
    #[diagnostic(
        code(jsma::start::rejected),
        help("inspect the capture log for the application's output")
    )]
    Rejected { exit: Exit, capture_log: PathBuf },

    #[error("timed out after {}s waiting for the application to signal its start result, see {}", timeout.as_secs_f64(), capture_log.display())]
    #[diagnostic(
        code(jsma::start::timeout),
        help("raise --start-timeout, or check the capture log for a missing start signal")
    )]
    Timeout {
        timeout: std::time::Duration,
        capture_log: PathBuf,
    },

    #[error("application signalled it did not start but is still running (pid {pid})")]
    #[diagnostic(
        code(jsma::start::rejected_still_running),
        help("the process did not exit within the stop timeout; stop it manually")
    )]
    RejectedStillRunning { pid: u32 },

    #[error("invalid start result in capture output: '{line}'")]
    #[diagnostic(
        code(jsma::start::invalid_sentinel),
        help("the start signal must be '{prefix}{success}' or '{prefix}{failure}'")
    )]
    InvalidSentinel {
        line: String,
        prefix: String,
        success: String,
        failure: String,
    },

    #[error("error while waiting for the application to exit")]
    #[diagnostic(code(jsma::start::wait_failed))]
    WaitFailed {
        #[source]
        source: io::Error,
    },
}

/// Failures of the stop protocol.
#[derive(Debug, Error, Diagnostic)]
pub enum StopError {
    #[error("application is not started ({} not found)", pid_file.display())]
    #[diagnostic(code(jsma::stop::no_instance))]
    NoInstance { pid_file: PathBuf },

    #[error("application was not running (process {pid} from {} not found)", pid_file.display())]
    #[diagnostic(
        code(jsma::stop::no_such_process),
        help("the recorded pid is stale; remove the pid file if the application is gone")
    )]
    NoSuchProcess { pid: u32, pid_file: PathBuf },

    #[error("cannot signal process {pid}")]
    #[diagnostic(
        code(jsma::stop::signal_failed),
        help("the process may belong to another user")
    )]
    SignalFailed {
        pid: u32,
        #[source]
        source: crate::probe::ProbeError,
    },

    #[error("process {pid} is still running after {}s", timeout.as_secs_f64())]
    #[diagnostic(
        code(jsma::stop::still_running),
        help("the process may be stuck or require manual intervention. Try: kill -9 {pid}")
    )]
    StillRunning {
        pid: u32,
        timeout: std::time::Duration,
    },
}

/// Errors related to the instance record and other bookkeeping files.
#[derive(Debug, Error, Diagnostic)]
pub enum FileError {
    #[error("application was stopped but the pid file cannot be deleted: {}", path.display())]
    #[diagnostic(code(jsma::file::pid_not_deleted))]
    RemovePid {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("application was stopped but the profile file cannot be deleted: {}", path.display())]
    #[diagnostic(code(jsma::file::profile_not_deleted))]
    RemoveProfile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write file: {}", path.display())]
    #[diagnostic(code(jsma::file::write_error))]
    WriteError {
        path: PathBuf,
        #[help]
        details: Option<String>,
    },

    #[error("failed to read pid file: {}", path.display())]
    #[diagnostic(code(jsma::file::pid_unreadable))]
    ReadPid {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read profile file: {}", path.display())]
    #[diagnostic(code(jsma::file::profile_unreadable))]
    ReadProfile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("pid file {} does not contain a process id: '{content}'", path.display())]
    #[diagnostic(
        code(jsma::file::invalid_pid),
        help("delete the file if no application is running")
    )]
    InvalidPid { path: PathBuf, content: String },
}

impl ArgumentError {
    pub fn exit_code(&self) -> i32 {
        codes::BAD_ARGUMENTS
    }
}

impl LaunchError {
    pub fn exit_code(&self) -> i32 {
        codes::BAD_APP_FILES
    }
}

impl StartError {
    pub fn exit_code(&self) -> i32 {
        match self {
            StartError::AlreadyRunning { .. } => codes::APP_ALREADY_STARTED,
            StartError::SpawnFailed { .. } => codes::CANT_START_PROCESS,
            StartError::ExitedBeforeReady { .. } | StartError::Rejected { .. } => {
                codes::CANT_START_INVALID_OUTPUT
            }
            StartError::Timeout { .. } => codes::CANT_START_TIMEOUT,
            StartError::RejectedStillRunning { .. } => {
                codes::CANT_START_SIGNALLED_ERROR_STILL_RUNNING
            }
            StartError::InvalidSentinel { .. } => codes::CANT_START_INVALID_SENTINEL,
            StartError::WaitFailed { .. } => codes::CANT_START_WAIT_FAILED,
        }
    }
}

impl StopError {
    pub fn exit_code(&self) -> i32 {
        match self {
            StopError::NoInstance { .. } => codes::CANT_STOP_NO_APP,
            StopError::NoSuchProcess { .. } | StopError::SignalFailed { .. } => {
                codes::CANT_KILL_APP
            }
            StopError::StillRunning { .. } => codes::CANT_STOP_STILL_RUNNING,
        }
    }
}

impl FileError {
    pub fn exit_code(&self) -> i32 {
        match self {
            FileError::RemovePid { .. } => codes::CANT_DELETE_PID_FILE,
            FileError::RemoveProfile { .. } => codes::CANT_DELETE_PROFILE_FILE,
            FileError::WriteError { .. } => codes::CANT_WRITE_RECORD,
            FileError::ReadPid { .. } | FileError::InvalidPid { .. } => codes::INVALID_PID_FILE,
            FileError::ReadProfile { .. } => codes::CANT_READ_PROFILE_FILE,
        }
    }
}

/// Map a final error report to the reserved exit code of its failure class.
pub fn exit_code(report: &miette::Report) -> i32 {
    if let Some(e) = report.downcast_ref::<StartError>() {
        e.exit_code()
    } else if let Some(e) = report.downcast_ref::<StopError>() {
        e.exit_code()
    } else if let Some(e) = report.downcast_ref::<FileError>() {
        e.exit_code()
    } else if let Some(e) = report.downcast_ref::<LaunchError>() {
        e.exit_code()
    } else if let Some(e) = report.downcast_ref::<ArgumentError>() {
        e.exit_code()
    } else if report.downcast_ref::<ConfigParseError>().is_some() {
        codes::BAD_ARGUMENTS
    } else {
        codes::UNEXPECTED
    }
}
