//! Verdict printing and progress reporting

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use sonda::{CheckResult, Verdict};
use std::time::Duration;

/// Output format for verdicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One JSON object per check, then one per verdict
    Json,
}

/// Progress and verdict reporter.
///
/// Progress, notes and failures go to stderr; verdicts go to stdout so that
/// `--json` output stays machine-readable.
#[derive(Debug)]
pub struct ProgressReporter {
    out: Term,
    err: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            out: Term::stdout(),
            err: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar over `total` probes
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Increment progress
    pub fn increment(&self, delta: u64) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(delta);
        }
    }

    /// Update progress message
    pub fn set_message(&self, message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(message.to_string());
        }
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("ℹ").blue().bold().to_string()
        } else {
            "INFO".to_string()
        };

        let _ = self.err.write_line(&format!("{prefix} {message}"));
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Always print failures, even in quiet mode
        let prefix = if self.use_color {
            style("✗").red().bold().to_string()
        } else {
            "FAIL".to_string()
        };

        let _ = self.err.write_line(&format!("{prefix} {message}"));
    }

    /// Print one verdict
    pub fn verdict(&self, verdict: &Verdict, format: OutputFormat) -> serde_json::Result<()> {
        match format {
            OutputFormat::Json => {
                let _ = self.out.write_str(&verdict.json_lines()?);
                let _ = self.out.write_line(&serde_json::to_string(&verdict_line(verdict))?);
            }
            OutputFormat::Text => self.verdict_text(verdict),
        }
        Ok(())
    }

    fn verdict_text(&self, verdict: &Verdict) {
        let passed = verdict.passed();
        if self.quiet && passed {
            return;
        }

        let status = verdict.outcome.to_string();
        let header = if !self.use_color {
            format!("{} {status}", verdict.probe)
        } else if passed {
            format!("{} {}", style(&verdict.probe).bold(), style(status).green().bold())
        } else {
            format!("{} {}", style(&verdict.probe).bold(), style(status).red().bold())
        };
        let _ = self.out.write_line(&header);

        if let Some(error) = &verdict.harness_error {
            let line = format!("  harness error: {error}");
            let _ = self.out.write_line(&self.paint(&line, &Style::new().red()));
        }
        for check in &verdict.checks {
            if self.quiet && !check.is_failure() {
                continue;
            }
            let _ = self.out.write_line(&format!("  {}", self.check_line(check)));
        }
        if !self.quiet {
            for artifact in &verdict.evidence {
                let line = format!("  evidence: {}", artifact.path.display());
                let _ = self.out.write_line(&self.paint(&line, &Style::new().dim()));
            }
        }
    }

    fn check_line(&self, check: &CheckResult) -> String {
        let line = check.to_string();
        let style = if check.passed {
            Style::new().green()
        } else if check.advisory {
            Style::new().yellow()
        } else {
            Style::new().red().bold()
        };
        self.paint(&line, &style)
    }

    fn paint(&self, text: &str, style: &Style) -> String {
        if self.use_color {
            style.apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    /// Print the run summary
    pub fn summary(&self, verdicts: &[Verdict], duration: Duration) {
        let failed = verdicts.iter().filter(|v| !v.passed()).count();
        if self.quiet && failed == 0 {
            return;
        }

        let passed = verdicts.len() - failed;
        let errors = verdicts.iter().filter(|v| v.harness_error.is_some()).count();
        let status = if failed > 0 { "FAILED" } else { "PASSED" };
        let line = format!(
            "{status} {} probes in {:.2}s \
             ({passed} passed, {failed} failed, {errors} harness errors)",
            verdicts.len(),
            duration.as_secs_f64()
        );
        let style = if failed > 0 {
            Style::new().red().bold()
        } else {
            Style::new().green().bold()
        };
        let _ = self.err.write_line("");
        let _ = self.err.write_line(&self.paint(&line, &style));
    }
}

fn verdict_line(verdict: &Verdict) -> serde_json::Value {
    serde_json::json!({
        "probe": verdict.probe,
        "outcome": verdict.outcome,
        "exit_status": verdict.exit_status(),
        "harness_error": verdict.harness_error,
        "evidence": verdict.evidence.iter().map(|a| &a.path).collect::<Vec<_>>(),
    })
}
