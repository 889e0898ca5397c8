//! Sonda: race-free browser probes for rendering checks
//!
//! Sonda (Spanish: "probe") drives a headless browser through a short
//! scripted journey and reports what it saw as named checks.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          SONDA probe                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Session ──► Readiness ──► Locator ──► Interaction ──► Inspector │
//! │     │          Waiter                                     │      │
//! │     │                                                     ▼      │
//! │     └───────────────► Evidence Recorder ──► Verdict Reporter     │
//! └──────────────────────────────────────────────────────────────────┘
//!              │
//!              ▼
//!      PageDriver (chromium over CDP, or the in-memory mock)
//! ```
//!
//! Only a browser that cannot be launched, or an explicit abort, unwinds a
//! probe. Slow pages, missing elements and wrong colours are recorded as
//! [`CheckResult`]s and folded into the [`Verdict`].
//!
//! ```no_run
//! use sonda::{BrowserConfig, EvidenceConfig, MockLauncher, Scenario, ProbeSettings, run_all};
//!
//! # async fn demo() {
//! let settings = ProbeSettings::default();
//! let probes = Scenario::MobileFit.probes("http://localhost:5173", &settings);
//! let steps: Vec<&dyn sonda::ProbeSteps> =
//!     probes.iter().map(|p| p as &dyn sonda::ProbeSteps).collect();
//! let verdicts = run_all(
//!     &MockLauncher::new(),
//!     &BrowserConfig::new(),
//!     &EvidenceConfig::new("evidence"),
//!     &steps,
//! )
//! .await;
//! for verdict in &verdicts {
//!     print!("{}", verdict.summary());
//! }
//! # }
//! ```

#![warn(missing_docs)]

mod config;
/// Page driver seam and its implementations
pub mod driver;
mod evidence;
mod inspect;
mod interaction;
mod locator;
mod probe;
mod reporter;
mod result;
/// Built-in rendering probes
pub mod scenarios;
mod session;
mod wait;

pub use config::{
    BrowserConfig, ColorScheme, Viewport, DEFAULT_ACTION_TIMEOUT_MS, DEFAULT_NAVIGATION_TIMEOUT_MS,
};
#[cfg(feature = "browser")]
pub use driver::ChromiumLauncher;
pub use driver::{
    CaptureMode, ConsoleMessage, FailedRequest, Launcher, MockEffect, MockElement, MockLauncher,
    MockPage, MockRoute, NodeId, PageDriver, ScrollTarget,
};
pub use evidence::{slugify, EvidenceArtifact, EvidenceConfig, EvidenceRecorder, RunScope};
pub use inspect::{
    count_highlights, parse_color, parse_px, BoundingBox, ElementSnapshot, PageSnapshot, Rgba,
};
pub use interaction::{ActionOutcome, NotInteractableReason, RECHECK_DELAY_MS};
pub use locator::{ElementHandle, LocatorQuery, Pick};
pub use probe::{run_all, run_probe, Probe, ProbeSteps};
pub use reporter::{
    aggregate, CheckResult, ExitStatus, Observed, Verdict, VerdictOutcome, VerdictReporter,
};
pub use result::{SondaError, SondaResult};
pub use scenarios::{ProbeSettings, Scenario, ScenarioProbe};
pub use session::{NavigationOutcome, NetworkFailure, Session};
pub use wait::{
    ReadinessOutcome, ReadinessPolicy, StrategyAttempt, StrategyKind, WaitStrategy,
    DEFAULT_POLL_INTERVAL_MS, NETWORK_IDLE_THRESHOLD_MS,
};

/// Everything a probe script needs
pub mod prelude {
    pub use super::{
        BrowserConfig, CaptureMode, CheckResult, ColorScheme, ElementSnapshot, EvidenceConfig,
        LocatorQuery, Probe, ProbeSteps, ReadinessPolicy, ScrollTarget, Session, SondaError,
        SondaResult, Verdict, Viewport, WaitStrategy,
    };
}
