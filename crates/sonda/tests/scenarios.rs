//! Built-in probes driven end to end against scripted pages.
//!
//! Every test runs on a paused clock, so readiness waits and settle delays
//! cost nothing and the timing is deterministic.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use sonda::prelude::*;
use sonda::{
    run_all, run_probe, ExitStatus, MockEffect, MockElement, MockLauncher, MockPage, MockRoute,
    ProbeSettings, Scenario, VerdictOutcome,
};
use std::time::Duration;
use tempfile::TempDir;

const BASE: &str = "http://app.test";

fn settings() -> ProbeSettings {
    ProbeSettings::default()
}

fn url(path: &str) -> String {
    ProbeSettings::url(BASE, path)
}

async fn run_one(launcher: &MockLauncher, scenario: Scenario, evidence: &TempDir) -> Verdict {
    let settings = settings();
    let probes = scenario.probes(BASE, &settings);
    assert_eq!(probes.len(), 1);
    run_probe(
        launcher,
        &BrowserConfig::new(),
        &EvidenceConfig::new(evidence.path()).with_run_id("run"),
        &probes[0],
    )
    .await
}

fn failure_names(verdict: &Verdict) -> Vec<&str> {
    verdict.failures().iter().map(|c| c.name.as_str()).collect()
}

fn check<'a>(verdict: &'a Verdict, name: &str) -> &'a CheckResult {
    verdict
        .checks
        .iter()
        .find(|c| c.name == name)
        .unwrap_or_else(|| panic!("no check named {name} in {:#?}", verdict.checks))
}

// ============================================================================
// Search page
// ============================================================================

/// Search page where Enter in the input renders one result card after a
/// short delay; clicking the card expands the reading paper.
fn search_page(dark_paper: &str) -> MockPage {
    let paper = MockElement::new(".source-paper")
        .with_style("background-color", "rgb(250, 248, 243)")
        .with_scheme_style(ColorScheme::Dark, "background-color", dark_paper);
    let paper_text = MockElement::new(".source-text").with_style("color", "rgb(40, 40, 40)");
    let card = MockElement::new(".source-card")
        .with_html("<p>the <mark>love</mark> of God</p>")
        .with_rect(0.0, 120.0, 600.0, 80.0)
        .appears_after(Duration::from_millis(300))
        .on_click(MockEffect::Insert(paper))
        .on_click(MockEffect::Insert(paper_text));
    MockPage::new("Search").with_element(
        MockElement::new("input.search-input")
            .with_rect(0.0, 40.0, 400.0, 32.0)
            .on_key("Enter", MockEffect::Insert(card)),
    )
}

mod paper_contrast {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_light_paper_in_dark_mode_passes() {
        let evidence = TempDir::new().unwrap();
        let launcher = MockLauncher::new().route(
            url("/"),
            MockRoute::Page(search_page("rgb(250, 248, 243)")),
        );

        let verdict = run_one(&launcher, Scenario::PaperContrast, &evidence).await;

        assert_eq!(verdict.outcome, VerdictOutcome::Passed, "{}", verdict.summary());
        assert!(check(&verdict, "paper background").passed);
        assert!(check(&verdict, "paper text contrast").passed);
        assert!(launcher.was_called("fill:input.search-input=love"));
        assert!(launcher.was_called("key:input.search-input:Enter"));
        assert!(launcher.was_called("click:.source-card"));

        let labels: Vec<&str> = verdict.evidence.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["home dark", "paper dark"]);
        for artifact in &verdict.evidence {
            assert!(artifact.path.exists(), "{}", artifact.path.display());
        }
        assert_eq!(launcher.live_browsers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dark_paper_fails_background_only() {
        let evidence = TempDir::new().unwrap();
        let launcher = MockLauncher::new().route(
            url("/"),
            MockRoute::Page(search_page("rgb(30, 30, 30)")),
        );

        let verdict = run_one(&launcher, Scenario::PaperContrast, &evidence).await;

        assert_eq!(verdict.outcome, VerdictOutcome::Failed);
        assert_eq!(verdict.exit_status(), ExitStatus::Failure);
        assert_eq!(failure_names(&verdict), vec!["paper background"]);
        // Low contrast on the dark paper is reported but does not fail the run
        let contrast = check(&verdict, "paper text contrast");
        assert!(contrast.advisory);
        assert!(!contrast.passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_search_input_fails() {
        let evidence = TempDir::new().unwrap();
        let launcher =
            MockLauncher::new().route(url("/"), MockRoute::Page(MockPage::new("Empty")));

        let verdict = run_one(&launcher, Scenario::PaperContrast, &evidence).await;

        assert_eq!(verdict.outcome, VerdictOutcome::Failed);
        let names = failure_names(&verdict);
        assert!(names.contains(&"fill search query"), "{names:?}");
        assert!(names.contains(&"paper background"), "{names:?}");
        assert!(!launcher.was_called("key:"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_click_fails_and_continues() {
        let evidence = TempDir::new().unwrap();
        let launcher = MockLauncher::new()
            .route(url("/"), MockRoute::Page(search_page("rgb(250, 248, 243)")))
            .stalling("click:.source-card");

        let verdict = run_one(&launcher, Scenario::PaperContrast, &evidence).await;

        assert_eq!(verdict.exit_status(), ExitStatus::Failure, "{}", verdict.summary());
        assert!(verdict.harness_error.is_none());
        assert_eq!(failure_names(&verdict), vec!["expand first result", "paper background"]);
        let expand = check(&verdict, "expand first result");
        assert_eq!(expand.detail.as_deref(), Some("timed out after 10000ms"));
        check(&verdict, "console errors");
        assert!(launcher.was_called("stalled:click:.source-card"));
        assert_eq!(launcher.live_browsers(), 0);
    }
}

mod search_results {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_results_with_highlights_pass() {
        let evidence = TempDir::new().unwrap();
        let launcher = MockLauncher::new().route(
            url("/"),
            MockRoute::Page(search_page("rgb(250, 248, 243)")),
        );

        let verdict = run_one(&launcher, Scenario::SearchResults, &evidence).await;

        assert_eq!(verdict.outcome, VerdictOutcome::Passed, "{}", verdict.summary());
        assert!(check(&verdict, "result cards").passed);
        assert!(check(&verdict, "highlighted passages").passed);
        let labels: Vec<&str> = verdict.evidence.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["initial", "search results", "expanded result"]);
        assert!(launcher.was_called("screenshot:full-page"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_results_fails_card_count() {
        let evidence = TempDir::new().unwrap();
        let page = MockPage::new("Search").with_element(MockElement::new("input.search-input"));
        let launcher = MockLauncher::new().route(url("/"), MockRoute::Page(page));

        let verdict = run_one(&launcher, Scenario::SearchResults, &evidence).await;

        assert_eq!(failure_names(&verdict), vec!["result cards"]);
        let highlights = check(&verdict, "highlighted passages");
        assert!(highlights.advisory && !highlights.passed);
        assert!(!launcher.was_called("click:"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_console_errors_are_advisory() {
        let evidence = TempDir::new().unwrap();
        let page = search_page("rgb(250, 248, 243)")
            .with_console("error", "Uncaught TypeError: x is undefined")
            .with_failed_request("http://app.test/api/stats", "net::ERR_CONNECTION_REFUSED");
        let launcher = MockLauncher::new().route(url("/"), MockRoute::Page(page));

        let verdict = run_one(&launcher, Scenario::SearchResults, &evidence).await;

        assert_eq!(verdict.outcome, VerdictOutcome::Passed);
        let console = check(&verdict, "console errors");
        assert!(console.advisory && !console.passed);
        assert!(console.detail.as_deref().unwrap_or_default().contains("TypeError"));
        assert!(!check(&verdict, "failed requests").passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_card_count_fails_and_continues() {
        let evidence = TempDir::new().unwrap();
        let launcher = MockLauncher::new()
            .route(url("/"), MockRoute::Page(search_page("rgb(250, 248, 243)")))
            .stalling("count:.source-card");

        let verdict = run_one(&launcher, Scenario::SearchResults, &evidence).await;

        assert_eq!(verdict.exit_status(), ExitStatus::Failure, "{}", verdict.summary());
        assert_eq!(verdict.outcome, VerdictOutcome::Failed);
        assert!(verdict.harness_error.is_none());
        assert_eq!(failure_names(&verdict), vec!["result cards"]);
        let cards = check(&verdict, "result cards");
        assert_eq!(cards.detail.as_deref(), Some("count timed out after 10000ms"));
        // Steps after the stalled count still ran
        assert!(check(&verdict, "highlighted passages").passed);
        check(&verdict, "console errors");
        let labels: Vec<&str> = verdict.evidence.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["initial", "search results"]);
        assert_eq!(launcher.live_browsers(), 0);
    }
}

// ============================================================================
// Document pages
// ============================================================================

const DOCUMENT_CONTENT: &str = ".document-header, .prose-container, .paragraph-row";
const TRANSLATION_TEXT: &str = ".translation-col .paragraph-text";
const SIDE_BY_SIDE: &str = "[data-tooltip=\"Side-by-side\"]";

fn paragraph(line_height: &str, y: f64) -> MockElement {
    MockElement::new(TRANSLATION_TEXT)
        .with_text("In the name of God")
        .with_style("line-height", line_height)
        .with_style("font-size", "16px")
        .with_rect(700.0, y, 600.0, 48.0)
}

fn document_page(paragraphs: Vec<MockElement>) -> MockPage {
    let mut toggle = MockElement::new(SIDE_BY_SIDE).with_rect(1200.0, 10.0, 32.0, 32.0);
    for p in paragraphs {
        toggle = toggle.on_click(MockEffect::Insert(p));
    }
    MockPage::new("Address to Believers")
        .with_element(
            MockElement::new(".document-header")
                .also_matches(DOCUMENT_CONTENT)
                .with_text("Address to Believers")
                .appears_after(Duration::from_millis(800)),
        )
        .with_element(toggle)
}

mod line_height {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tight_line_height_passes() {
        let evidence = TempDir::new().unwrap();
        let page = document_page(vec![paragraph("20px", 100.0), paragraph("19.2px", 160.0)]);
        let launcher =
            MockLauncher::new().route(url(&settings().paths.document), MockRoute::Page(page));

        let verdict = run_one(&launcher, Scenario::LineHeight, &evidence).await;

        assert_eq!(verdict.outcome, VerdictOutcome::Passed, "{}", verdict.summary());
        assert!(check(&verdict, "translation paragraphs").passed);
        let ratio = check(&verdict, "line-height ratio");
        assert!(ratio.passed);
        assert_eq!(ratio.expected, "<= 1.25");
    }

    #[tokio::test(start_paused = true)]
    async fn test_loose_line_height_fails() {
        let evidence = TempDir::new().unwrap();
        let page = document_page(vec![paragraph("20px", 100.0), paragraph("28px", 160.0)]);
        let launcher =
            MockLauncher::new().route(url(&settings().paths.document), MockRoute::Page(page));

        let verdict = run_one(&launcher, Scenario::LineHeight, &evidence).await;

        assert_eq!(failure_names(&verdict), vec!["line-height ratio"]);
        let ratio = check(&verdict, "line-height ratio");
        assert!(ratio.detail.as_deref().unwrap_or_default().starts_with("largest at"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_toggle_stops_early() {
        let evidence = TempDir::new().unwrap();
        let page = MockPage::new("Doc").with_element(
            MockElement::new(".paragraph-row").also_matches(DOCUMENT_CONTENT),
        );
        let launcher =
            MockLauncher::new().route(url(&settings().paths.document), MockRoute::Page(page));

        let verdict = run_one(&launcher, Scenario::LineHeight, &evidence).await;

        assert_eq!(failure_names(&verdict), vec!["open side-by-side view"]);
        assert!(verdict.checks.iter().all(|c| c.name != "line-height ratio"));
        let labels: Vec<&str> = verdict.evidence.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["document"]);
    }
}

mod print_view {
    use super::*;

    fn print_page() -> MockPage {
        MockPage::new("Study")
            .with_element(
                MockElement::new(".document-title").with_text("  Excellence of Knowledge "),
            )
            .with_element(MockElement::new(".segment-row").with_rect(0.0, 80.0, 700.0, 40.0))
            .with_element(MockElement::new(".qr-image").with_rect(720.0, 80.0, 64.0, 64.0))
    }

    #[tokio::test(start_paused = true)]
    async fn test_rendered_print_view_passes() {
        let evidence = TempDir::new().unwrap();
        let launcher = MockLauncher::new()
            .route(url(&settings().paths.print), MockRoute::Page(print_page()));

        let verdict = run_one(&launcher, Scenario::PrintView, &evidence).await;

        assert_eq!(verdict.outcome, VerdictOutcome::Passed, "{}", verdict.summary());
        assert_eq!(
            check(&verdict, "document title").observed.to_string(),
            "Excellence of Knowledge"
        );
        assert!(check(&verdict, "qr code present").passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_state_fails() {
        let evidence = TempDir::new().unwrap();
        let page = MockPage::new("Study")
            .with_element(MockElement::new(".error-state").with_text("Document not found"));
        let launcher =
            MockLauncher::new().route(url(&settings().paths.print), MockRoute::Page(page));

        let verdict = run_one(&launcher, Scenario::PrintView, &evidence).await;

        let names = failure_names(&verdict);
        assert_eq!(names, vec!["no error state", "document title"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_title_snapshot_fails_title_only() {
        let evidence = TempDir::new().unwrap();
        let launcher = MockLauncher::new()
            .route(url(&settings().paths.print), MockRoute::Page(print_page()))
            .stalling("describe:.document-title");

        let verdict = run_one(&launcher, Scenario::PrintView, &evidence).await;

        assert_eq!(verdict.exit_status(), ExitStatus::Failure);
        assert_eq!(failure_names(&verdict), vec!["document title"]);
        let note = check(&verdict, "inspect .document-title");
        assert!(note.advisory);
        assert!(note.detail.as_deref().unwrap_or_default().contains("timed out"));
        assert!(check(&verdict, "segment rows").passed);
        assert!(check(&verdict, "qr code present").passed);
    }
}

// ============================================================================
// Reader
// ============================================================================

mod reader_modal {
    use super::*;

    /// Search page whose expanded card carries a Read More button that
    /// opens the reader; Escape removes the reader when `escape_closes`
    fn reader_page(escape_closes: bool) -> MockPage {
        let reader = MockElement::new(".reader-modal").with_rect(0.0, 0.0, 1400.0, 900.0);
        let read_more = MockElement::new(".read-more-btn")
            .with_rect(20.0, 400.0, 120.0, 32.0)
            .on_click(MockEffect::Insert(reader))
            .on_click(MockEffect::Insert(
                MockElement::new(".reader-paragraph").with_text("O Son of Spirit"),
            ))
            .on_click(MockEffect::Insert(
                MockElement::new(".reader-paragraph").with_text("My first counsel is this"),
            ))
            .on_click(MockEffect::Insert(MockElement::new(".reader-nav-btn")))
            .on_click(MockEffect::Insert(
                MockElement::new(".reader-nav-btn").with_rect(1300.0, 840.0, 40.0, 40.0),
            ));
        let card = MockElement::new(".source-card")
            .with_html("<p>the <mark>love</mark> of God</p>")
            .with_rect(0.0, 120.0, 600.0, 80.0)
            .appears_after(Duration::from_millis(300))
            .on_click(MockEffect::Insert(read_more));
        let page = MockPage::new("Search").with_element(
            MockElement::new("input.search-input")
                .with_rect(0.0, 40.0, 400.0, 32.0)
                .on_key("Enter", MockEffect::Insert(card)),
        );
        if escape_closes {
            page.on_key("Escape", MockEffect::Remove(".reader-modal".to_string()))
        } else {
            page
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_opens_and_closes() {
        let evidence = TempDir::new().unwrap();
        let launcher = MockLauncher::new().route(url("/"), MockRoute::Page(reader_page(true)));

        let verdict = run_one(&launcher, Scenario::ReaderModal, &evidence).await;

        assert_eq!(verdict.outcome, VerdictOutcome::Passed, "{}", verdict.summary());
        assert!(check(&verdict, "reader open").passed);
        assert_eq!(check(&verdict, "reader paragraphs").observed.to_string(), "2");
        assert!(check(&verdict, "reader next page").passed);
        assert!(check(&verdict, "reader closed").passed);
        assert!(launcher.was_called("click:.read-more-btn"));
        assert!(launcher.was_called("key:Escape"));
        let labels: Vec<&str> = verdict.evidence.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["initial", "expanded", "reader", "reader next page"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_that_ignores_escape_fails() {
        let evidence = TempDir::new().unwrap();
        let launcher = MockLauncher::new().route(url("/"), MockRoute::Page(reader_page(false)));

        let verdict = run_one(&launcher, Scenario::ReaderModal, &evidence).await;

        assert_eq!(failure_names(&verdict), vec!["reader closed"]);
        assert!(check(&verdict, "close reader").passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_read_more_fails() {
        let evidence = TempDir::new().unwrap();
        let launcher = MockLauncher::new().route(
            url("/"),
            MockRoute::Page(search_page("rgb(250, 248, 243)")),
        );

        let verdict = run_one(&launcher, Scenario::ReaderModal, &evidence).await;

        assert_eq!(failure_names(&verdict), vec!["open reader"]);
        assert!(verdict.checks.iter().all(|c| c.name != "reader closed"));
        assert!(!launcher.was_called("key:Escape"));
    }
}

// ============================================================================
// Library
// ============================================================================

mod library_headers {
    use super::*;

    fn library_page(religion_header: Option<MockElement>) -> MockPage {
        let collection_header = MockElement::new("header h1")
            .with_text("Core Tablets")
            .with_style("font-weight", "600");
        let pill = MockElement::new("aside button.rounded-full")
            .with_text("Core Tablets")
            .with_rect(20.0, 200.0, 120.0, 28.0)
            .on_click(MockEffect::Insert(collection_header));
        let mut religion = MockElement::new("aside button")
            .with_text("Bahá'í")
            .with_rect(20.0, 100.0, 200.0, 32.0)
            .on_click(MockEffect::Insert(pill));
        if let Some(header) = religion_header {
            religion = religion.on_click(MockEffect::Insert(header));
        }
        MockPage::new("Library").with_element(religion)
    }

    #[tokio::test(start_paused = true)]
    async fn test_religion_and_collection_headers_pass() {
        let evidence = TempDir::new().unwrap();
        let header = MockElement::new(".religion-header")
            .with_text("Bahá'í Faith")
            .with_style("font-weight", "700");
        let launcher = MockLauncher::new().route(
            url(&settings().paths.library),
            MockRoute::Page(library_page(Some(header))),
        );

        let verdict = run_one(&launcher, Scenario::LibraryHeaders, &evidence).await;

        assert_eq!(verdict.outcome, VerdictOutcome::Passed, "{}", verdict.summary());
        assert_eq!(check(&verdict, "religion header").observed.to_string(), "Bahá'í Faith");
        assert!(check(&verdict, "religion header weight").passed);
        assert_eq!(check(&verdict, "collection header").observed.to_string(), "Core Tablets");
        assert!(launcher.was_called("click:aside button.rounded-full"));
        let labels: Vec<&str> = verdict.evidence.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["library", "religion", "collection"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_religion_header_fails() {
        let evidence = TempDir::new().unwrap();
        let launcher = MockLauncher::new().route(
            url(&settings().paths.library),
            MockRoute::Page(library_page(None)),
        );

        let verdict = run_one(&launcher, Scenario::LibraryHeaders, &evidence).await;

        assert_eq!(failure_names(&verdict), vec!["religion header"]);
        assert!(check(&verdict, "collection header").passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_light_header_is_only_noted() {
        let evidence = TempDir::new().unwrap();
        let header = MockElement::new(".religion-header")
            .with_text("Bahá'í Faith")
            .with_style("font-weight", "400");
        let launcher = MockLauncher::new().route(
            url(&settings().paths.library),
            MockRoute::Page(library_page(Some(header))),
        );

        let verdict = run_one(&launcher, Scenario::LibraryHeaders, &evidence).await;

        assert!(verdict.passed(), "{}", verdict.summary());
        let weight = check(&verdict, "religion header weight");
        assert!(weight.advisory && !weight.passed);
    }
}

// ============================================================================
// Mobile viewports
// ============================================================================

mod mobile_fit {
    use super::*;

    fn home_with_card(y: f64) -> MockPage {
        MockPage::new("Home")
            .with_height(2000.0)
            .with_element(MockElement::new(".stats-card").with_rect(10.0, y, 300.0, 120.0))
    }

    async fn run_mobile(launcher: &MockLauncher, evidence: &TempDir) -> Vec<Verdict> {
        let settings = settings();
        let probes = Scenario::MobileFit.probes(BASE, &settings);
        let steps: Vec<&dyn ProbeSteps> = probes.iter().map(|p| p as &dyn ProbeSteps).collect();
        run_all(
            launcher,
            &BrowserConfig::new(),
            &EvidenceConfig::new(evidence.path()).with_run_id("run"),
            &steps,
        )
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_card_within_both_viewports_passes() {
        let evidence = TempDir::new().unwrap();
        let launcher = MockLauncher::new().route(url("/"), MockRoute::Page(home_with_card(400.0)));

        let verdicts = run_mobile(&launcher, &evidence).await;

        assert_eq!(verdicts.len(), 2);
        assert_eq!(launcher.launches(), 2);
        assert_eq!(launcher.live_browsers(), 0);
        for verdict in &verdicts {
            assert!(verdict.passed(), "{}", verdict.summary());
        }
        assert!(launcher.was_called("scroll:"));
        let dir = evidence.path().join("run").join("mobile-fit-320x568");
        assert!(dir.join("01-mobile.png").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_card_overflowing_small_phone_fails_there_only() {
        let evidence = TempDir::new().unwrap();
        let launcher = MockLauncher::new().route(url("/"), MockRoute::Page(home_with_card(500.0)));

        let verdicts = run_mobile(&launcher, &evidence).await;

        assert_eq!(verdicts[0].probe, "mobile-fit-320x568");
        assert_eq!(failure_names(&verdicts[0]), vec!["stats card bottom"]);
        assert_eq!(check(&verdicts[0], "stats card bottom").expected, "<= 568");
        assert!(verdicts[1].passed(), "{}", verdicts[1].summary());
        assert_eq!(
            ExitStatus::worst(verdicts.iter().map(Verdict::exit_status)),
            ExitStatus::Failure
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_card_fails() {
        let evidence = TempDir::new().unwrap();
        let launcher = MockLauncher::new().route(url("/"), MockRoute::Page(MockPage::new("Home")));

        let verdicts = run_mobile(&launcher, &evidence).await;

        for verdict in &verdicts {
            let card = check(verdict, "stats card bottom");
            assert!(!card.passed);
            assert_eq!(card.detail.as_deref(), Some("not found"));
        }
    }
}
