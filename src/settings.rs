//! User-configurable settings for jsma.
//!
//! Settings can be configured in multiple ways (in order of precedence):
//! 1. Command-line flags (highest priority)
//! 2. Environment variables (`JSMA_PROFILE`, `JSMA_START_TIMEOUT`, `JSMA_STOP_TIMEOUT`, ...)
//! 3. `jsma.toml` in the instance directory
//! 4. User-level `~/.config/jsma/config.toml`
//! 5. System-level `/etc/jsma/config.toml`
//! 6. Built-in defaults (lowest priority)
//!
//! Example jsma.toml:
//! ```toml
//! [app]
//! command = "./bin/server --port 8080"
//! default_profile = "dev"
//!
//! [start]
//! timeout = "2m"
//! ```

use crate::error::{ArgumentError, ConfigParseError};
use crate::probe::ProbeKind;
use crate::{Result, env};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub app: AppSettings,
    pub start: StartSettings,
    pub stop: StopSettings,
    pub files: FilesSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub log_level: String,
    /// Empty disables file logging
    pub log_file: String,
    pub probe: ProbeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Launch this command line instead of detecting a java artifact
    pub command: String,
    /// Glob, relative to the instance directory, that must match exactly one artifact
    pub artifact: String,
    /// Falls back to `$JAVA_HOME`, then to `java` on `PATH`
    pub java_home: String,
    pub jvm_options: Vec<String>,
    pub profile_property: String,
    pub default_profile: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartSettings {
    pub timeout: String,
    pub poll_interval: String,
    pub sentinel_prefix: String,
    pub success_token: String,
    pub failure_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopSettings {
    pub timeout: String,
    pub poll_interval: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesSettings {
    pub pid: String,
    pub profile: String,
    pub capture_log: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: String::new(),
            probe: ProbeKind::Auto,
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            command: String::new(),
            artifact: "*.jar".to_string(),
            java_home: String::new(),
            jvm_options: vec!["-server".to_string(), "-Dfile.encoding=utf-8".to_string()],
            profile_property: "spring.profiles.active".to_string(),
            default_profile: "local".to_string(),
        }
    }
}

impl Default for StartSettings {
    fn default() -> Self {
        Self {
            timeout: "30s".to_string(),
            poll_interval: "100ms".to_string(),
            sentinel_prefix: "APP_START_RESULT: ".to_string(),
            success_token: "STARTED".to_string(),
            failure_token: "NOT STARTED".to_string(),
        }
    }
}

impl Default for StopSettings {
    fn default() -> Self {
        Self {
            timeout: "15s".to_string(),
            poll_interval: "100ms".to_string(),
        }
    }
}

impl Default for FilesSettings {
    fn default() -> Self {
        Self {
            pid: "server.pid".to_string(),
            profile: "spring.profile".to_string(),
            capture_log: "system.out".to_string(),
        }
    }
}

/// Copy every field of `$other` that differs from `$defaults` into `$target`
macro_rules! merge_non_default {
    ($target:expr, $other:expr, $defaults:expr, [$($field:ident),* $(,)?]) => {
        $(
            if $other.$field != $defaults.$field {
                $target.$field = $other.$field.clone();
            }
        )*
    };
}

impl Settings {
    /// Load settings for the instance in `dir`: defaults, then config files, then environment.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut settings = Settings::default();
        let files = [
            env::JSMA_GLOBAL_CONFIG_SYSTEM.clone(),
            env::JSMA_GLOBAL_CONFIG_USER.clone(),
            dir.join(env::JSMA_PROJECT_CONFIG),
        ];
        for path in files.iter().filter(|p| p.is_file()) {
            trace!("loading settings from {}", path.display());
            settings.merge_from(&Self::read(path)?);
        }
        settings.load_from_env();
        Ok(settings)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ArgumentError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_str(&raw, path)
    }

    pub fn parse_str(raw: &str, path: &Path) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|e| ConfigParseError::from_toml_error(path, raw.to_string(), e).into())
    }

    /// Overlay values from `other` that are not at their defaults.
    pub fn merge_from(&mut self, other: &Settings) {
        let defaults = Settings::default();
        merge_non_default!(
            self.general,
            other.general,
            defaults.general,
            [log_level, log_file, probe]
        );
        merge_non_default!(
            self.app,
            other.app,
            defaults.app,
            [
                command,
                artifact,
                java_home,
                jvm_options,
                profile_property,
                default_profile
            ]
        );
        merge_non_default!(
            self.start,
            other.start,
            defaults.start,
            [
                timeout,
                poll_interval,
                sentinel_prefix,
                success_token,
                failure_token
            ]
        );
        merge_non_default!(self.stop, other.stop, defaults.stop, [timeout, poll_interval]);
        merge_non_default!(
            self.files,
            other.files,
            defaults.files,
            [pid, profile, capture_log]
        );
    }

    pub fn load_from_env(&mut self) {
        if let Some(level) = *env::JSMA_LOG {
            self.general.log_level = level.to_string().to_lowercase();
        }
        if let Some(path) = &*env::JSMA_LOG_FILE {
            self.general.log_file = path.display().to_string();
        }
        if let Some(profile) = &*env::JSMA_PROFILE {
            self.app.default_profile = profile.clone();
        }
        if let Some(java_home) = &*env::JSMA_JAVA_HOME {
            self.app.java_home = java_home.display().to_string();
        }
        if let Some(timeout) = *env::JSMA_START_TIMEOUT {
            self.start.timeout = humantime::format_duration(timeout).to_string();
        }
        if let Some(timeout) = *env::JSMA_STOP_TIMEOUT {
            self.stop.timeout = humantime::format_duration(timeout).to_string();
        }
    }

    pub fn parse_duration(s: &str) -> Option<Duration> {
        humantime::parse_duration(s.trim()).ok()
    }

    fn duration_or_default(value: &str, default: &str, name: &str) -> Duration {
        Self::parse_duration(value).unwrap_or_else(|| {
            warn!("invalid duration for {name}: '{value}', using {default}");
            Self::parse_duration(default).unwrap_or_default()
        })
    }

    pub fn start_timeout(&self) -> Duration {
        Self::duration_or_default(
            &self.start.timeout,
            &StartSettings::default().timeout,
            "start.timeout",
        )
    }

    pub fn start_poll_interval(&self) -> Duration {
        Self::duration_or_default(
            &self.start.poll_interval,
            &StartSettings::default().poll_interval,
            "start.poll_interval",
        )
    }

    pub fn stop_timeout(&self) -> Duration {
        Self::duration_or_default(
            &self.stop.timeout,
            &StopSettings::default().timeout,
            "stop.timeout",
        )
    }

    pub fn stop_poll_interval(&self) -> Duration {
        Self::duration_or_default(
            &self.stop.poll_interval,
            &StopSettings::default().poll_interval,
            "stop.poll_interval",
        )
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.general.log_level.parse().unwrap_or_else(|_| {
            warn!("invalid log level '{}', using info", self.general.log_level);
            log::LevelFilter::Info
        })
    }
}
