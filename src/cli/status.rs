use crate::Result;
use crate::instance_status::InstanceStatus;
use crate::settings::Settings;
use crate::supervisor::Supervisor;
use std::path::Path;

/// Display the status of the application
#[derive(Debug, clap::Args)]
#[clap(
    visible_alias = "stat",
    verbatim_doc_comment,
    long_about = "\
Display the status of the application

Checks the pid file in the instance directory and whether that process is
alive. Never modifies any file.

Example:
  jsma status

Output:
  PID: 12345
  Profile: prod
  Status: running"
)]
pub struct Status {}

impl Status {
    pub async fn run(&self, dir: &Path, settings: &Settings) -> Result<()> {
        let status = Supervisor::new(dir, settings).status()?;
        if let InstanceStatus::Running { pid, profile } = &status {
            println!("PID: {pid}");
            match profile {
                Some(profile) => println!("Profile: {profile}"),
                None => println!("Profile: (no profile file)"),
            }
        }
        println!("Status: {}", status.style());
        Ok(())
    }
}
