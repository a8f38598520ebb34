//! The instance record: a pid file and a profile file in the instance directory.
//!
//! Both files exist while an instance is believed to be running and neither exists otherwise.
//! The record is only a belief; callers re-check the pid with a probe before trusting it.

use crate::Result;
use crate::error::FileError;
use crate::settings::FilesSettings;
use miette::WrapErr;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub pid: u32,
    pub profile: String,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
    pid_path: PathBuf,
    profile_path: PathBuf,
    lock_path: PathBuf,
}

impl StateStore {
    pub fn new(dir: &Path, files: &FilesSettings) -> Self {
        Self {
            dir: dir.to_path_buf(),
            pid_path: dir.join(&files.pid),
            profile_path: dir.join(&files.profile),
            lock_path: dir.join(format!("{}.lock", files.pid)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn pid_path(&self) -> &Path {
        &self.pid_path
    }

    pub fn profile_path(&self) -> &Path {
        &self.profile_path
    }

    /// Advisory lock serializing record mutations across overlapping invocations.
    /// Released when the returned guard is dropped.
    pub fn lock(&self) -> Result<impl Sized> {
        xx::fslock::get(&self.lock_path, false)
            .wrap_err_with(|| format!("failed to acquire lock on {}", self.lock_path.display()))
    }

    /// `None` when there is no pid file. The pid is the first line of the file.
    pub fn read_pid(&self) -> std::result::Result<Option<u32>, FileError> {
        let raw = read_optional(&self.pid_path).map_err(|source| FileError::ReadPid {
            path: self.pid_path.clone(),
            source,
        })?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let content = raw.lines().next().unwrap_or_default().trim();
        match content.parse::<u32>() {
            Ok(pid) if pid > 0 => Ok(Some(pid)),
            _ => Err(FileError::InvalidPid {
                path: self.pid_path.clone(),
                content: content.to_string(),
            }),
        }
    }

    /// `None` when there is no profile file; the label itself may be empty.
    pub fn read_profile(&self) -> std::result::Result<Option<String>, FileError> {
        let raw = read_optional(&self.profile_path).map_err(|source| FileError::ReadProfile {
            path: self.profile_path.clone(),
            source,
        })?;
        Ok(raw.map(|raw| raw.lines().next().unwrap_or_default().trim().to_string()))
    }

    /// Writes the pid file, then the profile file. Neither is left behind if either fails.
    pub fn write(&self, record: &InstanceRecord) -> std::result::Result<(), FileError> {
        write_file(&self.pid_path, &record.pid.to_string())?;
        if let Err(e) = write_file(&self.profile_path, &record.profile) {
            if let Err(remove) = remove_optional(&self.pid_path) {
                warn!("could not remove {}: {remove}", self.pid_path.display());
            }
            return Err(e);
        }
        trace!(
            "wrote instance record pid={} profile={:?} to {}",
            record.pid,
            record.profile,
            self.dir.display()
        );
        Ok(())
    }

    /// Returns whether a file was actually removed.
    pub fn remove_pid(&self) -> std::result::Result<bool, FileError> {
        remove_optional(&self.pid_path).map_err(|source| FileError::RemovePid {
            path: self.pid_path.clone(),
            source,
        })
    }

    /// Returns whether a file was actually removed.
    pub fn remove_profile(&self) -> std::result::Result<bool, FileError> {
        remove_optional(&self.profile_path).map_err(|source| FileError::RemoveProfile {
            path: self.profile_path.clone(),
            source,
        })
    }
}

fn read_optional(path: &Path) -> io::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn write_file(path: &Path, contents: &str) -> std::result::Result<(), FileError> {
    xx::file::write(path, contents).map_err(|e| FileError::WriteError {
        path: path.to_path_buf(),
        details: Some(e.to_string()),
    })
}

pub(crate) fn remove_optional(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
impl StateStore {
    pub fn has_pid(&self) -> bool {
        self.pid_path.exists()
    }

    pub fn has_profile(&self) -> bool {
        self.profile_path.exists()
    }
}
