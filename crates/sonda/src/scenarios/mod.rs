//! Built-in rendering probes.
//!
//! - `paper-contrast`: the reading paper stays light under a dark scheme
//! - `search-results`: a search yields result cards and highlighted passages
//! - `reader-modal`: Read More opens the full-screen reader and Escape closes it
//! - `line-height`: translation-column paragraphs keep a tight line-height
//! - `library-headers`: the library sidebar drives religion and collection headers
//! - `mobile-fit`: the statistics card fits narrow phone viewports
//! - `print-view`: the printable study view renders its document
//!
//! A page query that does not answer in time fails its check and the probe
//! moves on. Only navigation failures abort a probe.

mod document;
mod library;
mod mobile;
mod reader;
mod search;
mod settings;

pub use settings::{ProbePaths, ProbeSelectors, ProbeSettings};

use crate::config::{BrowserConfig, ColorScheme, Viewport};
use crate::inspect::ElementSnapshot;
use crate::interaction::ActionOutcome;
use crate::locator::LocatorQuery;
use crate::probe::{Probe, ProbeSteps};
use crate::reporter::CheckResult;
use crate::result::{SondaError, SondaResult};
use crate::wait::{ReadinessPolicy, StrategyKind, WaitStrategy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A built-in probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Paper background under a dark colour scheme
    PaperContrast,
    /// Search result cards and highlighting
    SearchResults,
    /// Full-screen reader opened from a result card
    ReaderModal,
    /// Translation-column line-height
    LineHeight,
    /// Library sidebar and its headers
    LibraryHeaders,
    /// Statistics card fit on phone viewports
    MobileFit,
    /// Printable study view
    PrintView,
}

impl Scenario {
    /// Every built-in probe, in run order
    pub const ALL: [Self; 7] = [
        Self::PaperContrast,
        Self::SearchResults,
        Self::ReaderModal,
        Self::LineHeight,
        Self::LibraryHeaders,
        Self::MobileFit,
        Self::PrintView,
    ];

    /// Kebab-case name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PaperContrast => "paper-contrast",
            Self::SearchResults => "search-results",
            Self::ReaderModal => "reader-modal",
            Self::LineHeight => "line-height",
            Self::LibraryHeaders => "library-headers",
            Self::MobileFit => "mobile-fit",
            Self::PrintView => "print-view",
        }
    }

    /// One-line description
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::PaperContrast => "reading paper stays light in dark mode",
            Self::SearchResults => "search yields result cards with highlighted passages",
            Self::ReaderModal => "read more opens the reader and escape closes it",
            Self::LineHeight => "translation column line-height stays tight",
            Self::LibraryHeaders => "library sidebar shows religion and collection headers",
            Self::MobileFit => "statistics card fits phone viewports",
            Self::PrintView => "printable study view renders the document",
        }
    }

    /// Runnable probes for this scenario; mobile fit yields one per viewport
    #[must_use]
    pub fn probes<'a>(
        self,
        base_url: &'a str,
        settings: &'a ProbeSettings,
    ) -> Vec<ScenarioProbe<'a>> {
        let probe = |viewport: Option<Viewport>| ScenarioProbe {
            scenario: self,
            base_url,
            settings,
            viewport,
        };
        match self {
            Self::MobileFit => settings
                .mobile_viewports
                .iter()
                .map(|v| probe(Some(*v)))
                .collect(),
            _ => vec![probe(None)],
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|s| s.name()).collect();
                format!("unknown probe '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

/// A scenario bound to a target and settings
#[derive(Debug, Clone, Copy)]
pub struct ScenarioProbe<'a> {
    /// Which scenario
    pub scenario: Scenario,
    /// Base URL of the application
    pub base_url: &'a str,
    /// Contract values
    pub settings: &'a ProbeSettings,
    /// Viewport override
    pub viewport: Option<Viewport>,
}

impl ScenarioProbe<'_> {
    fn url(&self, path: &str) -> String {
        ProbeSettings::url(self.base_url, path)
    }
}

#[async_trait]
impl<'a> ProbeSteps for ScenarioProbe<'a> {
    fn name(&self) -> String {
        match self.viewport {
            Some(viewport) => format!("{}-{viewport}", self.scenario),
            None => self.scenario.to_string(),
        }
    }

    fn browser_config(&self, base: &BrowserConfig) -> BrowserConfig {
        let mut config = base.clone();
        if self.scenario == Scenario::PaperContrast {
            config.color_scheme = ColorScheme::Dark;
        }
        if let Some(viewport) = self.viewport {
            config.viewport = viewport;
        }
        config
    }

    async fn run(&self, probe: &mut Probe) -> SondaResult<()> {
        match self.scenario {
            Scenario::PaperContrast => search::paper_contrast(self, probe).await,
            Scenario::SearchResults => search::search_results(self, probe).await,
            Scenario::ReaderModal => reader::reader_modal(self, probe).await,
            Scenario::LineHeight => document::line_height(self, probe).await,
            Scenario::LibraryHeaders => library::library_headers(self, probe).await,
            Scenario::MobileFit => mobile::mobile_fit(self, probe).await,
            Scenario::PrintView => document::print_view(self, probe).await,
        }
    }
}

/// Navigate and wait for the network to settle; abort if nothing loaded
async fn open_page(probe: &mut Probe, url: &str, settings: &ProbeSettings) -> SondaResult<()> {
    if !probe.navigate(url).await? {
        return Err(SondaError::aborted(format!("{url} did not load")));
    }
    let policy = ReadinessPolicy::new().then(WaitStrategy::network_idle(settings.ready_timeout_ms));
    probe.await_ready(&policy).await?;
    Ok(())
}

/// Wait for `selector`, degrading to the settle delay
async fn wait_for(
    probe: &mut Probe,
    selector: &str,
    timeout_ms: u64,
    settle_ms: u64,
) -> SondaResult<bool> {
    let policy = ReadinessPolicy::selector_or_delay(selector, timeout_ms, settle_ms);
    let outcome = probe.await_ready(&policy).await?;
    Ok(outcome.strategy_used == Some(StrategyKind::Selector))
}

/// Count matches and record them against a minimum
async fn expect_count(
    probe: &mut Probe,
    name: &str,
    selector: &str,
    min: usize,
) -> SondaResult<usize> {
    let counted = probe.session().count(&LocatorQuery::new(selector)).await;
    let unanswered = CheckResult::missing(name, format!(">= {min}"));
    let Some(count) = probe.tolerate(counted, unanswered)? else {
        return Ok(0);
    };
    probe.check(CheckResult::at_least(name, count as f64, min as f64));
    Ok(count)
}

/// Count matches for an advisory check; an unanswered query counts as zero
async fn count_or_zero(probe: &mut Probe, name: &str, selector: &str) -> SondaResult<usize> {
    let counted = probe.session().count(&LocatorQuery::new(selector)).await;
    let unanswered = CheckResult::missing(name, "answered").advisory();
    Ok(probe.tolerate(counted, unanswered)?.unwrap_or(0))
}

/// Snapshot of the first element matching `selector`. An unanswered query
/// is noted as an advisory check and reads as absent.
async fn snapshot_first(
    probe: &mut Probe,
    selector: &str,
    properties: &[&str],
) -> SondaResult<Option<ElementSnapshot>> {
    let session = probe.session().clone();
    let snapshot = match session.first(&LocatorQuery::new(selector).first()).await {
        Ok(Some(handle)) => session.snapshot(&handle, properties).await,
        Ok(None) => Ok(None),
        Err(e) => Err(e),
    };
    let unanswered = CheckResult::missing(format!("inspect {selector}"), "answered").advisory();
    Ok(probe.tolerate(snapshot, unanswered)?.flatten())
}

/// Turn an action result into check `name`; a driver error fails the check
fn action_check(name: &str, result: SondaResult<ActionOutcome>) -> SondaResult<CheckResult> {
    match result {
        Ok(outcome) => Ok(outcome.into_check(name)),
        Err(e) if e.is_harness_failure() => Err(e),
        Err(e) => Ok(CheckResult::missing(name, "performed").with_detail(e.to_string())),
    }
}

/// Click the first match of `selector` and record it. Returns whether the
/// click was performed.
async fn click_check(
    probe: &mut Probe,
    name: &str,
    query: &LocatorQuery,
    advisory: bool,
) -> SondaResult<bool> {
    let clicked = probe.session().click_first(query).await;
    let check = action_check(name, clicked)?;
    let performed = check.passed;
    probe.check(if advisory { check.advisory() } else { check });
    Ok(performed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_names_round_trip() {
        for scenario in Scenario::ALL {
            assert_eq!(scenario.name().parse::<Scenario>().unwrap(), scenario);
        }
        assert!("dark-mode".parse::<Scenario>().unwrap_err().contains("paper-contrast"));
    }

    #[test]
    fn test_every_scenario_has_a_description() {
        let names: Vec<&str> = Scenario::ALL.iter().map(|s| s.name()).collect();
        assert_eq!(names.len(), 7);
        assert!(names.contains(&"reader-modal"));
        assert!(names.contains(&"library-headers"));
        assert!(Scenario::ALL.iter().all(|s| !s.description().is_empty()));
    }

    #[test]
    fn test_driver_error_fails_action_check() {
        let check = action_check("open reader", Err(SondaError::driver("node detached"))).unwrap();
        assert!(check.is_failure());
        assert_eq!(check.detail.as_deref(), Some("Driver error: node detached"));
        let dead = SondaError::SessionClosed {
            session: "s".to_string(),
        };
        assert!(action_check("open reader", Err(dead)).is_err());
    }

    #[test]
    fn test_mobile_fit_expands_per_viewport() {
        let settings = ProbeSettings::default();
        let probes = Scenario::MobileFit.probes("http://app.test", &settings);
        let names: Vec<String> = probes.iter().map(ProbeSteps::name).collect();
        assert_eq!(names, vec!["mobile-fit-320x568", "mobile-fit-390x844"]);
        let config = probes[0].browser_config(&BrowserConfig::new());
        assert_eq!(config.viewport, Viewport::PHONE_SMALL);
    }

    #[test]
    fn test_paper_contrast_forces_dark() {
        let settings = ProbeSettings::default();
        let probes = Scenario::PaperContrast.probes("http://app.test", &settings);
        assert_eq!(probes.len(), 1);
        let config = probes[0].browser_config(&BrowserConfig::new());
        assert_eq!(config.color_scheme, ColorScheme::Dark);
        assert_eq!(probes[0].url("/"), "http://app.test/");
    }
}
