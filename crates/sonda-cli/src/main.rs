//! Sonda CLI: rendering probes from the command line
//!
//! ## Usage
//!
//! ```bash
//! sonda list                                             # Built-in probes
//! sonda run --base-url http://localhost:5173             # Run all probes
//! sonda run --base-url http://localhost:5173 -p mobile-fit --json
//! sonda settings --settings probe.yaml                   # Effective settings
//! ```
//!
//! Exit status: 0 when every probe passed, 1 when a check failed or a probe
//! was indeterminate, 2 when the harness itself could not run.

use clap::Parser;
use sonda::{ExitStatus, Scenario};
use sonda_cli::{
    load_settings, logging, Cli, CliConfig, CliResult, ColorChoice, Commands, LogFormat,
    ProbeRunner, SettingsArgs, Verbosity,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = build_config(&cli);
    logging::init(&config);

    match run(cli.command, config) {
        Ok(status) => ExitCode::from(status.code()),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(ExitStatus::HarnessError.code())
        }
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let color: ColorChoice = cli.color.clone().into();
    let log_format: LogFormat = cli.log_format.clone().into();
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(color)
        .with_log_format(log_format)
}

fn run(command: Commands, config: CliConfig) -> CliResult<ExitStatus> {
    match command {
        Commands::Run(args) => {
            let config = config.with_parallel_jobs(args.jobs);
            ProbeRunner::new(config).run(&args)
        }
        Commands::List => {
            run_list();
            Ok(ExitStatus::Success)
        }
        Commands::Settings(args) => run_settings(&args),
    }
}

fn run_list() {
    for scenario in Scenario::ALL {
        println!("{:<16} {}", scenario.name(), scenario.description());
    }
}

fn run_settings(args: &SettingsArgs) -> CliResult<ExitStatus> {
    let settings = load_settings(args.settings.as_deref())?;
    print!("{}", settings.to_yaml()?);
    Ok(ExitStatus::Success)
}
