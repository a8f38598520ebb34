//! Log sink: human-readable lines on stderr, plus an optional timestamped log file.
//!
//! stdout is reserved for command results, so every log line goes to stderr.

use crate::env;
use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::Lazy;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

struct Logger {
    term_level: Mutex<LevelFilter>,
    file: Mutex<Option<LogFile>>,
}

struct LogFile {
    file: File,
    level: LevelFilter,
}

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger {
    term_level: Mutex::new(env::JSMA_LOG.unwrap_or(LevelFilter::Info)),
    file: Mutex::new(None),
});

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Logger {
    fn term_level(&self) -> LevelFilter {
        *lock(&self.term_level)
    }

    fn file_level(&self) -> LevelFilter {
        lock(&self.file)
            .as_ref()
            .map(|f| f.level)
            .unwrap_or(LevelFilter::Off)
    }

    fn max_level(&self) -> LevelFilter {
        self.term_level().max(self.file_level())
    }

    fn render_term(record: &Record) -> String {
        let level = match record.level() {
            Level::Error => console::style("ERROR").red().bold(),
            Level::Warn => console::style("WARN").yellow().bold(),
            Level::Info => console::style("INFO").cyan(),
            Level::Debug => console::style("DEBUG").magenta(),
            Level::Trace => console::style("TRACE").dim(),
        };
        format!("{} {level} {}", console::style("jsma").dim(), record.args())
    }

    fn render_file(record: &Record) -> String {
        format!(
            "{} {:<5} {} {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level()
    }

    fn log(&self, record: &Record) {
        if record.level() <= self.term_level() {
            eprintln!("{}", Self::render_term(record));
        }
        let mut file = lock(&self.file);
        if let Some(f) = file.as_mut()
            && record.level() <= f.level
        {
            let _ = writeln!(f.file, "{}", Self::render_file(record));
        }
    }

    fn flush(&self) {
        if let Some(f) = lock(&self.file).as_mut() {
            let _ = f.file.flush();
        }
    }
}

/// Install the logger. Levels come from `JSMA_LOG` / `JSMA_LOG_FILE` until [`configure`] runs.
pub fn init() {
    if let Err(err) = log::set_logger(&*LOGGER) {
        eprintln!("jsma: could not initialize logger: {err}");
        return;
    }
    if let Some(path) = &*env::JSMA_LOG_FILE {
        open_file(path);
    }
    log::set_max_level(LOGGER.max_level());
}

/// Apply the terminal level and log file from loaded settings.
pub fn configure(level: LevelFilter, log_file: Option<&Path>) {
    *lock(&LOGGER.term_level) = level;
    if let Some(path) = log_file
        && lock(&LOGGER.file).is_none()
    {
        open_file(path);
    }
    log::set_max_level(LOGGER.max_level());
}

fn open_file(path: &Path) {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(err) = std::fs::create_dir_all(parent)
    {
        eprintln!("jsma: could not create log directory {}: {err}", parent.display());
        return;
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            let level = env::JSMA_LOG_FILE_LEVEL.unwrap_or(LevelFilter::Debug);
            *lock(&LOGGER.file) = Some(LogFile { file, level });
        }
        Err(err) => eprintln!("jsma: could not open log file {}: {err}", path.display()),
    }
}
