use crate::Result;
use crate::launcher;
use crate::settings::Settings;
use crate::supervisor::{Supervisor, Timeouts};
use std::path::Path;
use std::time::Duration;

/// Starts the application and waits for its start result
#[derive(Debug, clap::Args)]
#[clap(
    visible_alias = "s",
    verbatim_doc_comment,
    long_about = "\
Starts the application and waits for its start result

The application's stdout and stderr are captured to system.out. jsma waits until
the application prints a line starting with 'APP_START_RESULT: ' followed by
STARTED (success) or NOT STARTED (failure). Without such a line before the start
timeout, the process is terminated.

Arguments after the options are passed to the launch command: for a java
artifact they go before the JVM options, for app.command they are appended.

Examples:
  jsma start                       Start with the default profile
  jsma start -p prod               Start with the 'prod' profile
  jsma start --%prod -Xmx2g        Same, legacy profile syntax plus a JVM option
  jsma start --start-timeout 120   Wait up to two minutes for the start result"
)]
pub struct Start {
    /// Profile passed to the application [default: local]
    #[clap(short, long)]
    profile: Option<String>,
    /// Seconds to wait for the start result
    #[clap(long, value_name = "SECONDS")]
    start_timeout: Option<u64>,
    /// Seconds to wait for the process to exit once it failed or was terminated
    #[clap(long, value_name = "SECONDS")]
    stop_timeout: Option<u64>,
    /// Extra arguments for the launch command
    #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl Start {
    pub async fn run(&self, dir: &Path, settings: &Settings) -> Result<()> {
        let (legacy_profile, args) = split_legacy_profile(&self.args);
        let profile = self
            .profile
            .clone()
            .or(legacy_profile)
            .unwrap_or_else(|| settings.app.default_profile.clone());
        let timeouts = Timeouts {
            start: self
                .start_timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| settings.start_timeout()),
            stop: self
                .stop_timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| settings.stop_timeout()),
        };

        let cmd = launcher::resolve(dir, &settings.app, &profile, &args)?;
        let supervisor = Supervisor::new(dir, settings);
        let pid = supervisor.start(&cmd, &profile, timeouts).await?;

        println!("OK, application: {}", cmd.label);
        println!("Profile: {profile}");
        println!("PID: {pid}");
        Ok(())
    }
}

/// Pull `--%<profile>` out of the launch arguments; the last one wins.
fn split_legacy_profile(args: &[String]) -> (Option<String>, Vec<String>) {
    let mut profile = None;
    let mut rest = vec![];
    for arg in args {
        match arg.strip_prefix("--%") {
            Some(p) => profile = Some(p.to_string()),
            None => rest.push(arg.clone()),
        }
    }
    (profile, rest)
}
