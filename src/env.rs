use once_cell::sync::Lazy;
pub use std::env::*;
use std::path::PathBuf;
use std::time::Duration;

pub static CWD: Lazy<PathBuf> = Lazy::new(|| current_dir().unwrap_or_else(|_| PathBuf::from(".")));

pub static HOME_DIR: Lazy<PathBuf> = Lazy::new(|| {
    dirs::home_dir().unwrap_or_else(|| {
        eprintln!("Warning: Could not determine home directory");
        PathBuf::from("/tmp")
    })
});
pub static JSMA_CONFIG_DIR: Lazy<PathBuf> = Lazy::new(|| {
    var_path("JSMA_CONFIG_DIR").unwrap_or(HOME_DIR.join(".config").join("jsma"))
});
pub static JSMA_GLOBAL_CONFIG_USER: Lazy<PathBuf> =
    Lazy::new(|| JSMA_CONFIG_DIR.join("config.toml"));
pub static JSMA_GLOBAL_CONFIG_SYSTEM: Lazy<PathBuf> =
    Lazy::new(|| PathBuf::from("/etc/jsma/config.toml"));
/// File name of the per-instance settings file, looked up in the instance directory
pub const JSMA_PROJECT_CONFIG: &str = "jsma.toml";

pub static JSMA_LOG: Lazy<Option<log::LevelFilter>> = Lazy::new(|| var_log_level("JSMA_LOG"));
pub static JSMA_LOG_FILE: Lazy<Option<PathBuf>> = Lazy::new(|| var_path("JSMA_LOG_FILE"));
pub static JSMA_LOG_FILE_LEVEL: Lazy<Option<log::LevelFilter>> =
    Lazy::new(|| var_log_level("JSMA_LOG_FILE_LEVEL"));

pub static JSMA_PROFILE: Lazy<Option<String>> =
    Lazy::new(|| var("JSMA_PROFILE").ok().filter(|p| !p.is_empty()));
pub static JSMA_START_TIMEOUT: Lazy<Option<Duration>> =
    Lazy::new(|| var_duration("JSMA_START_TIMEOUT"));
pub static JSMA_STOP_TIMEOUT: Lazy<Option<Duration>> =
    Lazy::new(|| var_duration("JSMA_STOP_TIMEOUT"));
pub static JSMA_JAVA_HOME: Lazy<Option<PathBuf>> = Lazy::new(|| var_path("JSMA_JAVA_HOME"));

pub static JAVA_HOME: Lazy<Option<PathBuf>> = Lazy::new(|| var_path("JAVA_HOME"));

fn var_path(name: &str) -> Option<PathBuf> {
    var(name)
        .ok()
        .filter(|val| !val.is_empty())
        .map(PathBuf::from)
}

/// Accepts either a bare number of seconds or a humantime string ("500ms", "2m")
fn var_duration(name: &str) -> Option<Duration> {
    let val = var(name).ok()?;
    match val.trim().parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => humantime::parse_duration(val.trim()).ok(),
    }
}

fn var_log_level(name: &str) -> Option<log::LevelFilter> {
    var(name).ok().and_then(|level| level.parse().ok())
}
