#[macro_use]
extern crate log;

mod cli;
mod clock;
mod env;
mod error;
mod instance;
mod instance_status;
mod launcher;
mod logger;
mod probe;
mod settings;
mod supervisor;

pub use miette::Result;
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::SignalKind;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    logger::init();
    #[cfg(unix)]
    handle_epipe();
    let result = tokio::select! {
        result = cli::run() => result,
        Ok(()) = signal::ctrl_c() => {
            eprintln!("~ ...");
            std::process::exit(error::codes::INTERRUPTED);
        }
    };
    if let Err(err) = result {
        eprintln!("{err:?}");
        std::process::exit(error::exit_code(&err));
    }
}

#[cfg(unix)]
fn handle_epipe() {
    match signal::unix::signal(SignalKind::pipe()) {
        Ok(mut pipe_stream) => {
            tokio::spawn(async move {
                pipe_stream.recv().await;
                debug!("received SIGPIPE");
            });
        }
        Err(e) => {
            warn!("Could not set up SIGPIPE handler: {e}");
        }
    }
}
