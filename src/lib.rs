#[macro_use]
extern crate log;

pub mod cli;
pub mod clock;
pub mod env;
pub mod error;
pub mod instance;
pub mod instance_status;
pub mod launcher;
pub mod logger;
pub mod probe;
pub mod settings;
pub mod supervisor;

pub use miette::Result;
