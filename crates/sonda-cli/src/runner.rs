//! Probe runner: turns `run` arguments into sessions and verdicts

use crate::commands::RunArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, ProgressReporter};
use sonda::{
    run_all, BrowserConfig, EvidenceConfig, ExitStatus, Launcher, ProbeSettings, ProbeSteps,
    Scenario, ScenarioProbe, Verdict,
};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Load settings from `path`, or the defaults, and validate them
pub fn load_settings(path: Option<&Path>) -> CliResult<ProbeSettings> {
    let settings = match path {
        Some(path) => ProbeSettings::load(path)?,
        None => ProbeSettings::default(),
    };
    settings.validate()?;
    Ok(settings)
}

/// Browser configuration for a run
#[must_use]
pub fn browser_config(args: &RunArgs) -> BrowserConfig {
    let mut config = BrowserConfig::new()
        .with_headless(!args.headed)
        .with_navigation_timeout(args.timeout);
    if args.no_sandbox {
        config = config.with_no_sandbox();
    }
    if let Some(path) = &args.chromium {
        config = config.with_chromium_path(path.display().to_string());
    }
    config
}

/// Evidence layout for a run
#[must_use]
pub fn evidence_config(args: &RunArgs) -> EvidenceConfig {
    let config = EvidenceConfig::new(&args.output);
    if args.shared_output {
        config.shared()
    } else {
        config
    }
}

fn check_base_url(base_url: &str) -> CliResult<()> {
    if base_url.starts_with("http://") || base_url.starts_with("https://") {
        Ok(())
    } else {
        Err(CliError::invalid_argument(format!(
            "--base-url must start with http:// or https:// (got '{base_url}')"
        )))
    }
}

#[cfg(feature = "browser")]
fn launcher() -> CliResult<Box<dyn Launcher>> {
    Ok(Box::new(sonda::ChromiumLauncher::new()))
}

#[cfg(not(feature = "browser"))]
fn launcher() -> CliResult<Box<dyn Launcher>> {
    Err(CliError::config(
        "built without browser support; rebuild with --features browser",
    ))
}

/// Runs the selected probes and reports their verdicts
#[derive(Debug)]
pub struct ProbeRunner {
    config: CliConfig,
    reporter: ProgressReporter,
}

impl ProbeRunner {
    /// Create a runner
    #[must_use]
    pub fn new(config: CliConfig) -> Self {
        let reporter =
            ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
        Self { config, reporter }
    }

    /// Run the probes named in `args` and return the worst exit status.
    ///
    /// # Errors
    ///
    /// Returns error when the arguments or settings are invalid, or the
    /// runtime cannot be started. Probe failures are verdicts, not errors.
    pub fn run(&mut self, args: &RunArgs) -> CliResult<ExitStatus> {
        check_base_url(&args.base_url)?;
        let settings = load_settings(args.settings.as_deref())?;
        let launcher = launcher()?;
        let browser = browser_config(args);
        let evidence = evidence_config(args);

        let scenarios: Vec<Scenario> = if args.probes.is_empty() {
            Scenario::ALL.to_vec()
        } else {
            args.probes.clone()
        };
        let probes: Vec<ScenarioProbe<'_>> = scenarios
            .iter()
            .flat_map(|scenario| scenario.probes(&args.base_url, &settings))
            .collect();
        let steps: Vec<&dyn ProbeSteps> = probes.iter().map(|p| p as &dyn ProbeSteps).collect();

        let jobs = self.config.effective_jobs();
        info!(base_url = %args.base_url, probes = steps.len(), jobs, "starting run");
        self.reporter.info(&format!(
            "probing {} with {} probe(s), evidence under {}",
            args.base_url,
            steps.len(),
            evidence.run_dir().display()
        ));

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let started = Instant::now();
        self.reporter.start_progress(steps.len() as u64, "running probes");
        let mut verdicts: Vec<Verdict> = Vec::with_capacity(steps.len());
        for batch in steps.chunks(jobs.max(1)) {
            let names: Vec<String> = batch.iter().map(|s| s.name()).collect();
            self.reporter.set_message(&names.join(", "));
            let batch_verdicts =
                runtime.block_on(run_all(launcher.as_ref(), &browser, &evidence, batch));
            self.reporter.increment(batch_verdicts.len() as u64);
            verdicts.extend(batch_verdicts);
        }
        self.reporter.finish();

        let format = if args.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        };
        for verdict in &verdicts {
            self.reporter.verdict(verdict, format)?;
        }
        if format == OutputFormat::Text {
            self.reporter.summary(&verdicts, started.elapsed());
        }
        for verdict in verdicts.iter().filter(|v| v.harness_error.is_some()) {
            self.reporter.failure(&format!(
                "{}: {}",
                verdict.probe,
                verdict.harness_error.as_deref().unwrap_or_default()
            ));
        }

        Ok(ExitStatus::worst(verdicts.iter().map(Verdict::exit_status)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands};
    use clap::Parser;
    use sonda::{ColorScheme, RunScope};
    use std::io::Write;

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["sonda", "run", "--base-url", "http://app.test"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Run(args) => args,
            _ => panic!("expected run"),
        }
    }

    mod settings_tests {
        use super::*;

        #[test]
        fn test_defaults_without_file() {
            let settings = load_settings(None).unwrap();
            assert_eq!(settings, ProbeSettings::default());
        }

        #[test]
        fn test_file_overrides() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "query: mercy\nmax_line_height_ratio: 1.4").unwrap();
            let settings = load_settings(Some(file.path())).unwrap();
            assert_eq!(settings.query, "mercy");
            assert!((settings.max_line_height_ratio - 1.4).abs() < f64::EPSILON);
        }

        #[test]
        fn test_invalid_file_rejected() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "no_such_key: 1").unwrap();
            let err = load_settings(Some(file.path())).unwrap_err();
            assert!(matches!(err, CliError::Sonda(_)));
        }
    }

    mod config_tests {
        use super::*;

        #[test]
        fn test_browser_config_from_flags() {
            let args = run_args(&[
                "--headed",
                "--no-sandbox",
                "--timeout",
                "5000",
                "--chromium",
                "/opt/chrome",
            ]);
            let config = browser_config(&args);
            assert!(!config.headless);
            assert!(!config.sandbox);
            assert_eq!(config.navigation_timeout_ms, 5000);
            assert_eq!(config.chromium_path.as_deref(), Some("/opt/chrome"));
            assert_eq!(config.color_scheme, ColorScheme::NoPreference);
        }

        #[test]
        fn test_evidence_scope() {
            let shared = evidence_config(&run_args(&["--shared-output", "-o", "out"]));
            assert_eq!(shared.scope, RunScope::Shared);
            assert_eq!(shared.run_dir(), Path::new("out"));
            let stamped = evidence_config(&run_args(&[]));
            assert!(matches!(stamped.scope, RunScope::Timestamped(_)));
        }

        #[test]
        fn test_base_url_scheme() {
            assert!(check_base_url("https://example.org").is_ok());
            assert!(check_base_url("localhost:5173").is_err());
        }
    }
}
