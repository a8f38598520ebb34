//! Builds the command line for the managed application.

use crate::Result;
use crate::env;
use crate::error::{ArgumentError, LaunchError};
use crate::settings::AppSettings;
use itertools::Itertools;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
    /// Added on top of the inherited environment
    pub env: Vec<(String, String)>,
    /// Short name for messages: the artifact file name or the program
    pub label: String,
}

impl LaunchCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        let program = program.into();
        Self {
            label: program.to_string_lossy().to_string(),
            program,
            args: vec![],
            env: vec![],
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn command(&self, dir: &Path) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args).current_dir(dir);
        for (key, val) in &self.env {
            cmd.env(key, val);
        }
        cmd
    }
}

impl std::fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let words = std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|w| w.to_string_lossy().to_string())
            .collect_vec();
        write!(f, "{}", shell_words::join(words))
    }
}

/// Resolve the launch command for the instance in `dir`.
///
/// A configured `app.command` wins; otherwise exactly one artifact must match `app.artifact`
/// and it is run with java.
pub fn resolve(
    dir: &Path,
    app: &AppSettings,
    profile: &str,
    extra_args: &[String],
) -> Result<LaunchCommand> {
    let mut cmd = if app.command.trim().is_empty() {
        let artifact = detect_artifact(dir, &app.artifact)?;
        java_command(app, &artifact, profile, extra_args)
    } else {
        custom_command(&app.command, extra_args)?
    };
    cmd.env.push(("JSMA_PROFILE".to_string(), profile.to_string()));
    debug!("launch command: {cmd}");
    Ok(cmd)
}

pub fn detect_artifact(dir: &Path, pattern: &str) -> Result<PathBuf> {
    // only `pattern` is glob syntax; the directory is matched literally
    let full_pattern = Path::new(&glob::Pattern::escape(&dir.to_string_lossy())).join(pattern);
    let matches = glob::glob(&full_pattern.to_string_lossy()).map_err(|source| {
        LaunchError::BadPattern {
            pattern: pattern.to_string(),
            source,
        }
    })?;
    let mut candidates = matches
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("skipping unreadable artifact candidate: {e}");
                None
            }
        })
        .filter(|path| path.is_file())
        .collect_vec();
    match candidates.len() {
        0 => Err(LaunchError::ArtifactMissing {
            dir: dir.to_path_buf(),
            pattern: pattern.to_string(),
        }
        .into()),
        1 => Ok(candidates.remove(0)),
        _ => {
            candidates.sort();
            Err(LaunchError::ArtifactAmbiguous { candidates }.into())
        }
    }
}

pub fn java_path(app: &AppSettings) -> PathBuf {
    let home = Some(app.java_home.trim())
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .or_else(|| env::JAVA_HOME.clone());
    match home {
        Some(home) => home.join("bin").join("java"),
        None => PathBuf::from("java"),
    }
}

fn java_command(
    app: &AppSettings,
    artifact: &Path,
    profile: &str,
    extra_args: &[String],
) -> LaunchCommand {
    let mut cmd = LaunchCommand::new(java_path(app))
        .args(extra_args)
        .args(&app.jvm_options)
        .arg(format!("-D{}={profile}", app.profile_property))
        .arg("-jar")
        .arg(artifact);
    cmd.label = artifact
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| artifact.display().to_string());
    cmd
}

fn custom_command(command: &str, extra_args: &[String]) -> Result<LaunchCommand> {
    let words = shell_words::split(command).map_err(|source| ArgumentError::InvalidCommand {
        command: command.to_string(),
        source,
    })?;
    let (program, args) = words.split_first().ok_or(ArgumentError::EmptyCommand)?;
    Ok(LaunchCommand::new(program).args(args).args(extra_args))
}
