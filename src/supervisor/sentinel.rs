//! Start-result line written by the managed application to its captured output.

use crate::settings::StartSettings;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentinelStatus {
    Started,
    NotStarted,
    /// A start-result line whose status is neither token; holds the text after the prefix
    Unrecognized(String),
}

#[derive(Debug, Clone)]
pub struct Sentinel {
    prefix: String,
    success: String,
    failure: String,
}

impl Sentinel {
    pub fn new(
        prefix: impl Into<String>,
        success: impl Into<String>,
        failure: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            success: success.into(),
            failure: failure.into(),
        }
    }

    pub fn from_settings(start: &StartSettings) -> Self {
        Self::new(
            &start.sentinel_prefix,
            &start.success_token,
            &start.failure_token,
        )
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn success(&self) -> &str {
        &self.success
    }

    pub fn failure(&self) -> &str {
        &self.failure
    }

    /// Classify a single line; `None` unless it starts with the prefix.
    pub fn classify(&self, line: &str) -> Option<SentinelStatus> {
        let rest = line.strip_prefix(&self.prefix)?;
        let rest = rest.trim_end_matches(['\r', '\n']);
        Some(if rest.starts_with(&self.success) {
            SentinelStatus::Started
        } else if rest.starts_with(&self.failure) {
            SentinelStatus::NotStarted
        } else {
            SentinelStatus::Unrecognized(rest.to_string())
        })
    }

    /// Re-open `path` and scan its complete lines from the top. A missing file reads as
    /// "nothing yet", and so does a last line still missing its newline: the application may be
    /// halfway through writing it.
    pub fn scan(&self, path: &Path) -> io::Result<Option<SentinelStatus>> {
        self.scan_lines(path, false)
    }

    /// Like [`Sentinel::scan`], for output that is final because the application has exited:
    /// an unterminated last line is classified too.
    pub fn scan_final(&self, path: &Path) -> io::Result<Option<SentinelStatus>> {
        self.scan_lines(path, true)
    }

    fn scan_lines(&self, path: &Path, unterminated: bool) -> io::Result<Option<SentinelStatus>> {
        let file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(None);
            }
            if !unterminated && !buf.ends_with(b"\n") {
                return Ok(None);
            }
            // the application may write non-utf8 output around the start-result line
            let line = String::from_utf8_lossy(&buf);
            if let Some(status) = self.classify(&line) {
                return Ok(Some(status));
            }
        }
    }
}

impl Default for Sentinel {
    fn default() -> Self {
        Self::from_settings(&StartSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_classify() {
        let s = Sentinel::default();
        assert_eq!(s.classify("hello"), None);
        assert_eq!(
            s.classify("APP_START_RESULT: STARTED"),
            Some(SentinelStatus::Started)
        );
        assert_eq!(
            s.classify("APP_START_RESULT: STARTED in 3.2s\r\n"),
            Some(SentinelStatus::Started)
        );
        assert_eq!(
            s.classify("APP_START_RESULT: NOT STARTED: port in use"),
            Some(SentinelStatus::NotStarted)
        );
        assert_eq!(
            s.classify("APP_START_RESULT: MAYBE"),
            Some(SentinelStatus::Unrecognized("MAYBE".to_string()))
        );
        // prefix must open the line
        assert_eq!(s.classify("  APP_START_RESULT: STARTED"), None);
        assert_eq!(s.classify("app_start_result: STARTED"), None);
    }

    #[test]
    fn test_first_matching_line_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("system.out");
        let s = Sentinel::default();

        std::fs::write(&path, "booting\nstill booting\n").unwrap();
        assert_eq!(s.scan(&path).unwrap(), None);

        std::fs::write(
            &path,
            "booting\nAPP_START_RESULT: NOT STARTED\nAPP_START_RESULT: STARTED\n",
        )
        .unwrap();
        assert_eq!(s.scan(&path).unwrap(), Some(SentinelStatus::NotStarted));
    }

    #[test]
    fn test_custom_tokens() {
        let s = Sentinel::new(">>> ", "READY", "FAILED");
        assert_eq!(s.classify(">>> READY"), Some(SentinelStatus::Started));
        assert_eq!(s.classify(">>> FAILED"), Some(SentinelStatus::NotStarted));
        assert_eq!(s.classify("APP_START_RESULT: STARTED"), None);
    }

    #[test]
    fn test_scan_missing_file() {
        let dir = TempDir::new().unwrap();
        let s = Sentinel::default();
        assert_eq!(s.scan(&dir.path().join("system.out")).unwrap(), None);
    }

    #[test]
    fn test_scan_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("system.out");
        let s = Sentinel::default();

        std::fs::write(&path, b"starting\n\xff\xfe garbage\n").unwrap();
        assert_eq!(s.scan(&path).unwrap(), None);

        let mut content = std::fs::read(&path).unwrap();
        content.extend_from_slice(b"APP_START_RESULT: STARTED\n");
        std::fs::write(&path, content).unwrap();
        assert_eq!(s.scan(&path).unwrap(), Some(SentinelStatus::Started));
    }

    #[test]
    fn test_scan_waits_for_unterminated_last_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("system.out");
        let s = Sentinel::default();

        std::fs::write(&path, "booting\nAPP_START_RESULT: STAR").unwrap();
        assert_eq!(s.scan(&path).unwrap(), None);

        std::fs::write(&path, "booting\nAPP_START_RESULT: STARTED\n").unwrap();
        assert_eq!(s.scan(&path).unwrap(), Some(SentinelStatus::Started));
    }

    #[test]
    fn test_scan_final_sees_unterminated_last_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("system.out");
        std::fs::write(&path, "APP_START_RESULT: NOT STARTED").unwrap();
        let s = Sentinel::default();
        assert_eq!(s.scan(&path).unwrap(), None);
        assert_eq!(s.scan_final(&path).unwrap(), Some(SentinelStatus::NotStarted));
    }
}
