use crate::error::{ArgumentError, codes};
use crate::settings::Settings;
use crate::{Result, env, logger};
use clap::Parser;
use std::path::{Path, PathBuf};

mod start;
mod status;
mod stop;

#[derive(Debug, clap::Parser)]
#[clap(
    name = "jsma",
    version,
    about = "Start, stop and inspect a single application instance",
    long_about = "\
Start, stop and inspect a single application instance

jsma manages one instance per directory. `start` launches the application with its
output captured to system.out and waits for it to print a start result line;
`stop` terminates the recorded process; `status` reports whether it is running."
)]
struct Cli {
    /// Instance directory [default: current directory]
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    dir: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    Start(start::Start),
    Status(status::Status),
    Stop(stop::Stop),
}

pub async fn run() -> Result<()> {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(err) if err.use_stderr() => {
            let _ = err.print();
            std::process::exit(codes::BAD_ARGUMENTS);
        }
        // --help and --version
        Err(err) => err.exit(),
    };
    let dir = instance_dir(args.dir.as_deref())?;
    let settings = Settings::load(&dir)?;
    let log_file = Some(settings.general.log_file.trim())
        .filter(|f| !f.is_empty())
        .map(PathBuf::from);
    logger::configure(settings.log_level(), log_file.as_deref());
    trace!("instance directory: {}", dir.display());

    match args.command {
        Command::Start(start) => start.run(&dir, &settings).await,
        Command::Status(status) => status.run(&dir, &settings).await,
        Command::Stop(stop) => stop.run(&dir, &settings).await,
    }
}

fn instance_dir(dir: Option<&Path>) -> Result<PathBuf> {
    let Some(dir) = dir else {
        return Ok(env::CWD.clone());
    };
    match dir.canonicalize() {
        Ok(dir) if dir.is_dir() => Ok(dir),
        _ => Err(ArgumentError::InvalidValue {
            name: "--dir".to_string(),
            value: dir.display().to_string(),
            help: Some("the instance directory must exist".to_string()),
        }
        .into()),
    }
}
