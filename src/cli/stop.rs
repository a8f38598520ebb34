use crate::Result;
use crate::settings::Settings;
use crate::supervisor::Supervisor;
use std::path::Path;
use std::time::Duration;

/// Sends a stop signal to the application and waits for it to exit
#[derive(Debug, clap::Args)]
#[clap(
    visible_alias = "kill",
    verbatim_doc_comment,
    long_about = "\
Sends a stop signal to the application and waits for it to exit

Sends SIGTERM to the recorded process and waits up to the stop timeout for it
to exit. The pid and profile files are removed once the process is gone; if it
is still running after the timeout they are kept.

Examples:
  jsma stop                       Stop the application in this directory
  jsma stop --stop-timeout 60     Give it a minute to shut down
  jsma -C /srv/app stop           Stop the application in /srv/app"
)]
pub struct Stop {
    /// Seconds to wait for the process to exit
    #[clap(long, value_name = "SECONDS")]
    stop_timeout: Option<u64>,
}

impl Stop {
    pub async fn run(&self, dir: &Path, settings: &Settings) -> Result<()> {
        let timeout = self
            .stop_timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| settings.stop_timeout());
        let pid = Supervisor::new(dir, settings).stop(timeout).await?;
        println!("OK, stopped (pid {pid})");
        Ok(())
    }
}
