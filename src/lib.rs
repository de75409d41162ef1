#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use
)]

pub mod cli;
pub mod config;
pub mod cron;
pub mod daemon;
pub mod error;
pub mod routing;

pub use cli::{Cli, Commands, CronCommands};
pub use config::Config;
pub use error::{ConfigError, CronError, StarlingError};
