#![allow(dead_code)]

use jsma::probe::{Probe, SignalProbe};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Helper struct for E2E test environment
pub struct TestEnv {
    temp_dir: TempDir,
    jsma_bin: PathBuf,
    home_dir: PathBuf,
}

impl TestEnv {
    /// Create a new test environment with isolated directories
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let home_dir = temp_dir.path().join("home");
        fs::create_dir_all(&home_dir).unwrap();
        fs::create_dir_all(temp_dir.path().join("app")).unwrap();

        Self {
            temp_dir,
            jsma_bin: PathBuf::from(env!("CARGO_BIN_EXE_jsma")),
            home_dir,
        }
    }

    /// The instance directory
    pub fn app_dir(&self) -> PathBuf {
        self.temp_dir.path().join("app")
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.app_dir().join(file)
    }

    /// Create a jsma.toml file with the given content
    pub fn create_toml(&self, content: &str) -> PathBuf {
        let toml_path = self.path("jsma.toml");
        fs::write(&toml_path, content).unwrap();
        toml_path
    }

    /// Configure the application as an `sh -c` one-liner.
    /// The script must not contain quotes.
    pub fn create_app(&self, script: &str) -> PathBuf {
        self.create_toml(&format!("[app]\ncommand = \"sh -c '{script}'\"\n"))
    }

    /// Run a jsma command in the instance directory and return the output
    pub fn run_command(&self, args: &[&str]) -> std::process::Output {
        self.run_command_with_env(args, &[])
    }

    /// Run a jsma command with additional environment variables
    pub fn run_command_with_env(
        &self,
        args: &[&str],
        extra_env: &[(&str, &str)],
    ) -> std::process::Output {
        let mut cmd = Command::new(&self.jsma_bin);
        cmd.args(args)
            .current_dir(self.app_dir())
            .env("HOME", &self.home_dir)
            .env("JSMA_CONFIG_DIR", self.home_dir.join(".config").join("jsma"))
            .env("JSMA_LOG", "debug")
            .env_remove("JSMA_PROFILE")
            .env_remove("JSMA_START_TIMEOUT")
            .env_remove("JSMA_STOP_TIMEOUT")
            .env_remove("JSMA_LOG_FILE")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        for (key, val) in extra_env {
            cmd.env(key, val);
        }

        let output = cmd.output().expect("Failed to execute jsma command");
        println!("$ jsma {}", args.join(" "));
        println!("stdout: {}", String::from_utf8_lossy(&output.stdout));
        println!("stderr: {}", String::from_utf8_lossy(&output.stderr));
        println!("exit code: {:?}", output.status.code());
        output
    }

    /// Read a file from the instance directory, empty if it does not exist
    pub fn read(&self, file: &str) -> String {
        fs::read_to_string(self.path(file)).unwrap_or_default()
    }

    pub fn recorded_pid(&self) -> Option<u32> {
        pid_from(&self.path("server.pid"))
    }

    /// Pid an app script wrote to `child.pid` with `echo $$ > child.pid`
    pub fn child_pid(&self) -> Option<u32> {
        pid_from(&self.path("child.pid"))
    }

    pub fn is_alive(&self, pid: u32) -> bool {
        SignalProbe.is_alive(pid)
    }

    /// Wait until `pid` is gone, up to `timeout`
    pub fn wait_for_exit(&self, pid: u32, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if !self.is_alive(pid) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        !self.is_alive(pid)
    }

    /// Pid of a process that has already exited
    pub fn dead_pid(&self) -> u32 {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    /// Names of the files in the instance directory, with their contents
    pub fn snapshot(&self) -> Vec<(String, Vec<u8>)> {
        let mut files: Vec<_> = fs::read_dir(self.app_dir())
            .unwrap()
            .map(|e| e.unwrap().path())
            .map(|p| {
                let name = p.file_name().unwrap().to_string_lossy().to_string();
                (name, fs::read(&p).unwrap_or_default())
            })
            .collect();
        files.sort();
        files
    }
}

impl Drop for TestEnv {
    /// Never leave an application process behind
    fn drop(&mut self) {
        for pid in [self.recorded_pid(), self.child_pid()].into_iter().flatten() {
            let _ = SignalProbe.terminate(pid);
        }
    }
}

fn pid_from(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}
