//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use sonda::Scenario;
use std::path::PathBuf;

/// Sonda: run rendering probes against a web application in a headless browser
#[derive(Parser, Debug)]
#[command(name = "sonda")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (failures only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Log format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormatArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run probes against a base URL
    Run(RunArgs),

    /// List the built-in probes
    List,

    /// Print the effective probe settings as YAML
    Settings(SettingsArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunArgs {
    /// Base URL of the application under test
    #[arg(long, env = "SONDA_BASE_URL")]
    pub base_url: String,

    /// Probes to run (default: all)
    #[arg(short, long = "probe", value_parser = parse_scenario)]
    pub probes: Vec<Scenario>,

    /// Root directory for screenshots
    #[arg(short, long, default_value = "sonda-evidence")]
    pub output: PathBuf,

    /// Write into the output root directly instead of a per-run directory
    #[arg(long)]
    pub shared_output: bool,

    /// YAML file overriding the expected values and selectors
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Chromium executable
    #[arg(long, env = "SONDA_CHROMIUM")]
    pub chromium: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Disable the chromium sandbox (containers, CI)
    #[arg(long)]
    pub no_sandbox: bool,

    /// Navigation timeout in milliseconds
    #[arg(long, default_value = "30000")]
    pub timeout: u64,

    /// Probes to run at once (0 = one per CPU)
    #[arg(short = 'j', long, default_value = "0")]
    pub jobs: usize,

    /// Print checks as JSON lines on stdout
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the settings command
#[derive(Parser, Debug)]
pub struct SettingsArgs {
    /// YAML file to validate and merge over the defaults
    #[arg(long)]
    pub settings: Option<PathBuf>,
}

fn parse_scenario(s: &str) -> Result<Scenario, String> {
    s.parse()
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Log format argument for CLI
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormatArg {
    /// Human-readable lines
    #[default]
    Text,
    /// JSON objects
    Json,
}

impl From<LogFormatArg> for crate::config::LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    mod cli_tests {
        use super::*;

        #[test]
        fn test_parse_run_defaults() {
            let cli = Cli::parse_from(["sonda", "run", "--base-url", "http://localhost:5173"]);
            let Commands::Run(args) = cli.command else {
                panic!("expected run");
            };
            assert_eq!(args.base_url, "http://localhost:5173");
            assert!(args.probes.is_empty());
            assert_eq!(args.output, PathBuf::from("sonda-evidence"));
            assert_eq!(args.timeout, 30_000);
            assert!(!args.headed && !args.no_sandbox && !args.json && !args.shared_output);
        }

        #[test]
        fn test_parse_probe_selection() {
            let cli = Cli::parse_from([
                "sonda",
                "run",
                "--base-url",
                "http://app.test",
                "-p",
                "mobile-fit",
                "--probe",
                "paper-contrast",
            ]);
            let Commands::Run(args) = cli.command else {
                panic!("expected run");
            };
            assert_eq!(args.probes, vec![Scenario::MobileFit, Scenario::PaperContrast]);
        }

        #[test]
        fn test_unknown_probe_rejected() {
            let err = Cli::try_parse_from([
                "sonda",
                "run",
                "--base-url",
                "http://app.test",
                "-p",
                "dark-mode",
            ])
            .unwrap_err();
            assert!(err.to_string().contains("paper-contrast"));
        }

        #[test]
        fn test_global_flags() {
            let cli = Cli::parse_from(["sonda", "-vv", "--log-format", "json", "list"]);
            assert_eq!(cli.verbose, 2);
            assert!(matches!(cli.log_format, LogFormatArg::Json));
            assert!(matches!(cli.command, Commands::List));
        }

        #[test]
        fn test_parse_settings() {
            let cli = Cli::parse_from(["sonda", "settings", "--settings", "probe.yaml"]);
            let Commands::Settings(args) = cli.command else {
                panic!("expected settings");
            };
            assert_eq!(args.settings, Some(PathBuf::from("probe.yaml")));
        }
    }
}
