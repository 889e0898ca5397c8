//! Sonda CLI library
//!
//! Command-line front end for the Sonda probe harness: argument parsing,
//! settings loading, log setup and verdict printing.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod logging;
mod output;
mod runner;

pub use commands::{Cli, ColorArg, Commands, LogFormatArg, RunArgs, SettingsArgs};
pub use config::{CliConfig, ColorChoice, LogFormat, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, ProgressReporter};
pub use runner::{browser_config, evidence_config, load_settings, ProbeRunner};
