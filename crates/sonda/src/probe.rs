//! Probe: one session, one evidence directory, one verdict.
//!
//! [`run_probe`] opens the session, hands a [`Probe`] to the steps, and
//! always closes the session before finalizing. A launch failure or a dead
//! session becomes a harness-error verdict (exit status 2). Any other error
//! from the steps, an explicit abort or a timeout included, keeps every
//! check recorded so far and fails the verdict.

use crate::config::BrowserConfig;
use crate::driver::{CaptureMode, Launcher};
use crate::evidence::{EvidenceArtifact, EvidenceConfig, EvidenceRecorder};
use crate::reporter::{CheckResult, Observed, Verdict, VerdictReporter};
use crate::result::{SondaError, SondaResult};
use crate::session::Session;
use crate::wait::{ReadinessOutcome, ReadinessPolicy};
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, info_span, warn, Instrument};

/// The scripted part of a probe
#[async_trait]
pub trait ProbeSteps: Send + Sync {
    /// Probe name; also names the evidence directory
    fn name(&self) -> String;

    /// Browser configuration derived from the run's base configuration
    fn browser_config(&self, base: &BrowserConfig) -> BrowserConfig {
        base.clone()
    }

    /// Drive the page and record checks
    async fn run(&self, probe: &mut Probe) -> SondaResult<()>;
}

/// Components of a running probe
#[derive(Debug)]
pub struct Probe {
    session: Session,
    recorder: EvidenceRecorder,
    reporter: VerdictReporter,
}

impl Probe {
    /// The probe's session
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Record a check
    pub fn check(&mut self, check: CheckResult) {
        self.reporter.record(check);
    }

    /// Checks recorded so far
    #[must_use]
    pub fn checks(&self) -> &[CheckResult] {
        self.reporter.checks()
    }

    /// Navigate with the configured timeout and record the outcome as a
    /// check. Returns whether the document loaded.
    pub async fn navigate(&mut self, url: &str) -> SondaResult<bool> {
        let outcome = self.session.goto(url).await?;
        let loaded = outcome.is_loaded();
        self.check(CheckResult::new(
            format!("navigate {url}"),
            Observed::Text(outcome.to_string()),
            "loaded",
            loaded,
        ));
        Ok(loaded)
    }

    /// Wait for readiness and record it as an advisory check
    pub async fn await_ready(&mut self, policy: &ReadinessPolicy) -> SondaResult<ReadinessOutcome> {
        let outcome = self.session.await_ready(policy).await?;
        self.check(
            CheckResult::is_true("content ready", outcome.satisfied)
                .advisory()
                .with_detail(outcome.to_string()),
        );
        Ok(outcome)
    }

    /// Capture a screenshot. A capture that fails for reasons other than a
    /// dead session is recorded as an advisory check.
    pub async fn capture(
        &mut self,
        mode: CaptureMode,
        label: &str,
    ) -> SondaResult<Option<EvidenceArtifact>> {
        match self.recorder.capture(&self.session, mode, label).await {
            Ok(artifact) => {
                self.reporter.attach(artifact.clone());
                Ok(Some(artifact))
            }
            Err(e) if e.is_harness_failure() => Err(e),
            Err(e) => {
                warn!(label, error = %e, "evidence capture failed");
                self.check(
                    CheckResult::missing(format!("evidence {label}"), "screenshot saved")
                        .advisory()
                        .with_detail(e.to_string()),
                );
                Ok(None)
            }
        }
    }

    /// Unwrap a page query, or record `unanswered` (with the error as
    /// detail) and yield `None` when the page did not answer in time.
    /// Harness failures still propagate.
    pub fn tolerate<T>(
        &mut self,
        result: SondaResult<T>,
        unanswered: CheckResult,
    ) -> SondaResult<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_harness_failure() => Err(e),
            Err(e) => {
                warn!(check = %unanswered.name, error = %e, "page query failed");
                self.check(unanswered.with_detail(e.to_string()));
                Ok(None)
            }
        }
    }

    /// Record console errors and failed requests as advisory checks
    pub fn record_page_errors(&mut self) -> SondaResult<()> {
        let errors: Vec<String> = self
            .session
            .console_messages()?
            .into_iter()
            .filter(|m| m.is_error())
            .map(|m| m.text)
            .collect();
        let failed: Vec<String> = self
            .session
            .failed_requests()?
            .into_iter()
            .map(|r| format!("{} ({})", r.url, r.reason))
            .collect();
        self.check(with_list(
            CheckResult::at_most("console errors", errors.len() as f64, 0.0).advisory(),
            &errors,
        ));
        self.check(with_list(
            CheckResult::at_most("failed requests", failed.len() as f64, 0.0).advisory(),
            &failed,
        ));
        Ok(())
    }
}

fn with_list(check: CheckResult, items: &[String]) -> CheckResult {
    if items.is_empty() {
        check
    } else {
        check.with_detail(items.join("; "))
    }
}

/// Run one probe to a verdict
pub async fn run_probe(
    launcher: &dyn Launcher,
    base: &BrowserConfig,
    evidence: &EvidenceConfig,
    steps: &dyn ProbeSteps,
) -> Verdict {
    let name = steps.name();
    let span = info_span!("probe", name = %name);
    execute(launcher, steps.browser_config(base), evidence, &name, steps)
        .instrument(span)
        .await
}

async fn execute(
    launcher: &dyn Launcher,
    config: BrowserConfig,
    evidence: &EvidenceConfig,
    name: &str,
    steps: &dyn ProbeSteps,
) -> Verdict {
    let session = match Session::open(config, launcher).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "probe could not start");
            return Verdict::harness_failure(name, e.to_string());
        }
    };
    let mut probe = Probe {
        session,
        recorder: EvidenceRecorder::new(evidence, name),
        reporter: VerdictReporter::new(name),
    };

    let result = steps.run(&mut probe).await;
    let closed = probe.session.close().await;

    let mut harness_error = None;
    match result {
        Ok(()) => {}
        Err(e) if e.is_harness_failure() => harness_error = Some(e.to_string()),
        Err(e) => {
            let detail = match e {
                SondaError::Aborted { reason } => reason,
                other => other.to_string(),
            };
            warn!(%detail, "probe stopped early");
            probe.check(CheckResult::is_true("probe completed", false).with_detail(detail));
        }
    }
    if let Err(e) = closed {
        warn!(error = %e, "session close failed");
        harness_error.get_or_insert_with(|| e.to_string());
    }

    let verdict = probe.reporter.finalize();
    let verdict = match harness_error {
        Some(error) => verdict.with_harness_error(error),
        None => verdict,
    };
    info!(outcome = %verdict.outcome, checks = verdict.checks.len(), "probe finished");
    verdict
}

/// Run independent probes concurrently, each in its own session
pub async fn run_all(
    launcher: &dyn Launcher,
    base: &BrowserConfig,
    evidence: &EvidenceConfig,
    probes: &[&dyn ProbeSteps],
) -> Vec<Verdict> {
    join_all(
        probes
            .iter()
            .map(|steps| run_probe(launcher, base, evidence, *steps)),
    )
    .await
}
