//! Verdict Reporter: named checks folded into one outcome.
//!
//! Checks never stop a probe. Each one is recorded with the value that was
//! actually observed and a description of what was expected, so a single
//! run reports every discrepancy instead of the first.

use crate::evidence::EvidenceArtifact;
use crate::inspect::Rgba;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Observed values
// =============================================================================

/// What a check actually saw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum Observed {
    /// Boolean observation
    Bool(bool),
    /// Numeric observation
    Number(f64),
    /// Textual observation
    Text(String),
    /// Nothing could be observed (element absent, property unset)
    Missing,
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Text(t) => f.write_str(t),
            Self::Missing => f.write_str("missing"),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n:.2}")
    }
}

// =============================================================================
// CheckResult
// =============================================================================

/// One named check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Check name
    pub name: String,
    /// Observed value
    pub observed: Observed,
    /// Expected predicate, as text
    pub expected: String,
    /// Whether the predicate held
    pub passed: bool,
    /// Informational only; excluded from the verdict
    pub advisory: bool,
    /// Extra context (e.g. a failure reason)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckResult {
    /// Create a check from its parts
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        observed: Observed,
        expected: impl Into<String>,
        passed: bool,
    ) -> Self {
        Self {
            name: name.into(),
            observed,
            expected: expected.into(),
            passed,
            advisory: false,
            detail: None,
        }
    }

    /// Expect a condition to hold
    #[must_use]
    pub fn is_true(name: impl Into<String>, value: bool) -> Self {
        Self::new(name, Observed::Bool(value), "true", value)
    }

    /// Expect `value >= min`
    #[must_use]
    pub fn at_least(name: impl Into<String>, value: f64, min: f64) -> Self {
        Self::new(
            name,
            Observed::Number(value),
            format!(">= {}", format_number(min)),
            value >= min,
        )
    }

    /// Expect `value <= max`
    #[must_use]
    pub fn at_most(name: impl Into<String>, value: f64, max: f64) -> Self {
        Self::new(
            name,
            Observed::Number(value),
            format!("<= {}", format_number(max)),
            value <= max,
        )
    }

    /// Expect exact text
    #[must_use]
    pub fn equals_text(name: impl Into<String>, value: &str, expected: &str) -> Self {
        Self::new(name, Observed::Text(value.to_string()), expected, value == expected)
    }

    /// Expect a colour whose RGB channels match `expected`
    #[must_use]
    pub fn color_matches(name: impl Into<String>, value: Option<Rgba>, expected: Rgba) -> Self {
        match value {
            Some(color) => Self::new(
                name,
                Observed::Text(color.to_string()),
                expected.to_string(),
                color.same_rgb(&expected),
            ),
            None => Self::missing(name, expected.to_string()),
        }
    }

    /// A check whose subject could not be observed at all
    #[must_use]
    pub fn missing(name: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::new(name, Observed::Missing, expected, false)
    }

    /// Mark as advisory
    #[must_use]
    pub fn advisory(mut self) -> Self {
        self.advisory = true;
        self
    }

    /// Attach extra context
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Whether this check fails the verdict
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !self.passed && !self.advisory
    }

    fn status_tag(&self) -> &'static str {
        match (self.passed, self.advisory) {
            (true, _) => "PASS",
            (false, true) => "NOTE",
            (false, false) => "FAIL",
        }
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: observed {}, expected {}",
            self.status_tag(),
            self.name,
            self.observed,
            self.expected
        )?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

// =============================================================================
// Verdict
// =============================================================================

/// Overall outcome of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerdictOutcome {
    /// Every non-advisory check passed
    Passed,
    /// At least one non-advisory check failed
    Failed,
    /// No non-advisory check was recorded
    Indeterminate,
}

impl fmt::Display for VerdictOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Indeterminate => "INDETERMINATE",
        })
    }
}

/// Process exit status for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitStatus {
    /// All probes passed
    Success = 0,
    /// A check failed or a probe was indeterminate
    Failure = 1,
    /// The harness itself could not run (e.g. browser launch)
    HarnessError = 2,
}

impl ExitStatus {
    /// Numeric exit code
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Worst status across several runs
    #[must_use]
    pub fn worst(statuses: impl IntoIterator<Item = Self>) -> Self {
        statuses.into_iter().max().unwrap_or(Self::Success)
    }
}

/// The finalized result of one probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Probe name
    pub probe: String,
    /// Aggregate outcome
    pub outcome: VerdictOutcome,
    /// Checks in the order they were recorded
    pub checks: Vec<CheckResult>,
    /// Screenshots captured during the probe
    pub evidence: Vec<EvidenceArtifact>,
    /// Set when the harness could not run the probe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub harness_error: Option<String>,
}

impl Verdict {
    /// A verdict for a probe the harness could not run
    #[must_use]
    pub fn harness_failure(probe: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            probe: probe.into(),
            outcome: VerdictOutcome::Indeterminate,
            checks: Vec::new(),
            evidence: Vec::new(),
            harness_error: Some(error.into()),
        }
    }

    /// Mark the verdict as cut short by the harness. The recorded checks
    /// stay, but no longer decide the outcome.
    #[must_use]
    pub fn with_harness_error(mut self, error: impl Into<String>) -> Self {
        self.outcome = VerdictOutcome::Indeterminate;
        self.harness_error = Some(error.into());
        self
    }

    /// Whether the probe passed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.harness_error.is_none() && self.outcome == VerdictOutcome::Passed
    }

    /// Exit status this verdict maps to
    #[must_use]
    pub fn exit_status(&self) -> ExitStatus {
        if self.harness_error.is_some() {
            ExitStatus::HarnessError
        } else if self.outcome == VerdictOutcome::Passed {
            ExitStatus::Success
        } else {
            ExitStatus::Failure
        }
    }

    /// Checks that failed the verdict
    #[must_use]
    pub fn failures(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| c.is_failure()).collect()
    }

    /// Number of passing checks
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    /// Human-readable summary: one line per check, then evidence paths
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{}: {} ({}/{} checks passed)\n",
            self.probe,
            self.outcome,
            self.passed_count(),
            self.checks.len()
        );
        if let Some(error) = &self.harness_error {
            out.push_str(&format!("  harness error: {error}\n"));
        }
        if self.checks.is_empty() && self.harness_error.is_none() {
            out.push_str("  no checks recorded\n");
        }
        for check in &self.checks {
            out.push_str(&format!("  {check}\n"));
        }
        for artifact in &self.evidence {
            out.push_str(&format!("  evidence: {}\n", artifact.path.display()));
        }
        out
    }

    /// One JSON object per check, newline separated
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn json_lines(&self) -> serde_json::Result<String> {
        let mut out = String::new();
        for check in &self.checks {
            let line = serde_json::json!({ "probe": self.probe, "check": check });
            out.push_str(&serde_json::to_string(&line)?);
            out.push('\n');
        }
        Ok(out)
    }
}

// =============================================================================
// Reporter
// =============================================================================

/// Collects checks and evidence for one probe
#[derive(Debug, Clone)]
pub struct VerdictReporter {
    probe: String,
    checks: Vec<CheckResult>,
    evidence: Vec<EvidenceArtifact>,
}

impl VerdictReporter {
    /// Create a reporter for `probe`
    #[must_use]
    pub fn new(probe: impl Into<String>) -> Self {
        Self {
            probe: probe.into(),
            checks: Vec::new(),
            evidence: Vec::new(),
        }
    }

    /// Record a check
    pub fn record(&mut self, check: CheckResult) {
        tracing::debug!(probe = %self.probe, %check, "check");
        self.checks.push(check);
    }

    /// Attach a captured screenshot
    pub fn attach(&mut self, artifact: EvidenceArtifact) {
        self.evidence.push(artifact);
    }

    /// Checks recorded so far
    #[must_use]
    pub fn checks(&self) -> &[CheckResult] {
        &self.checks
    }

    /// Fold the checks into a verdict
    #[must_use]
    pub fn finalize(self) -> Verdict {
        let outcome = aggregate(&self.checks);
        Verdict {
            probe: self.probe,
            outcome,
            checks: self.checks,
            evidence: self.evidence,
            harness_error: None,
        }
    }
}

/// AND of the non-advisory checks; indeterminate when there are none
#[must_use]
pub fn aggregate(checks: &[CheckResult]) -> VerdictOutcome {
    let mut binding = checks.iter().filter(|c| !c.advisory).peekable();
    if binding.peek().is_none() {
        return VerdictOutcome::Indeterminate;
    }
    if binding.all(|c| c.passed) {
        VerdictOutcome::Passed
    } else {
        VerdictOutcome::Failed
    }
}
