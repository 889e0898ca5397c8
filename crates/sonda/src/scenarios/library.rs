//! Library browser probe.

use super::{click_check, count_or_zero, open_page, snapshot_first, wait_for, ScenarioProbe};
use crate::driver::CaptureMode;
use crate::inspect::ElementSnapshot;
use crate::locator::LocatorQuery;
use crate::probe::Probe;
use crate::reporter::{CheckResult, Observed};
use crate::result::SondaResult;

/// Numeric `font-weight`; computed styles report keywords as numbers
fn font_weight(snapshot: &ElementSnapshot) -> Option<f64> {
    match snapshot.style("font-weight")?.trim() {
        "bold" => Some(700.0),
        "normal" => Some(400.0),
        value => value.parse().ok(),
    }
}

/// A header check: present with text, plus an advisory weight check
fn header_checks(
    name: &str,
    header: Option<ElementSnapshot>,
    min_weight: f64,
) -> Vec<CheckResult> {
    let Some(header) = header else {
        return vec![CheckResult::missing(name, "non-empty")];
    };
    let text = header.text.trim().to_string();
    let present = !text.is_empty();
    let weight_name = format!("{name} weight");
    let weight = match font_weight(&header) {
        Some(weight) => CheckResult::at_least(weight_name, weight, min_weight),
        None => CheckResult::missing(weight_name, format!(">= {min_weight}")),
    };
    vec![
        CheckResult::new(name, Observed::Text(text), "non-empty", present),
        weight.advisory(),
    ]
}

/// Picking a religion in the sidebar shows its header, and picking one of
/// its collections shows the collection header
pub(super) async fn library_headers(
    target: &ScenarioProbe<'_>,
    probe: &mut Probe,
) -> SondaResult<()> {
    let settings = target.settings;
    let selectors = &settings.selectors;
    let min_weight = settings.min_header_weight;

    open_page(probe, &target.url(&settings.paths.library), settings).await?;
    wait_for(
        probe,
        &selectors.sidebar_button,
        settings.content_timeout_ms,
        settings.settle_ms,
    )
    .await?;
    probe.capture(CaptureMode::Viewport, "library").await?;

    let religion = LocatorQuery::new(&selectors.sidebar_button).first();
    if !click_check(probe, "select religion", &religion, false).await? {
        return probe.record_page_errors();
    }
    wait_for(
        probe,
        &selectors.religion_header,
        settings.content_timeout_ms,
        settings.settle_ms,
    )
    .await?;
    probe.capture(CaptureMode::Viewport, "religion").await?;

    let properties = ["font-size", "font-weight", "color"];
    let header = snapshot_first(probe, &selectors.religion_header, &properties).await?;
    for check in header_checks("religion header", header, min_weight) {
        probe.check(check);
    }

    let pills = count_or_zero(probe, "collection buttons", &selectors.collection_button).await?;
    probe.check(CheckResult::at_least("collection buttons", pills as f64, 1.0).advisory());
    if pills > 0 {
        let collection = LocatorQuery::new(&selectors.collection_button).first();
        if click_check(probe, "select collection", &collection, false).await? {
            wait_for(
                probe,
                &selectors.collection_header,
                settings.content_timeout_ms,
                settings.settle_ms,
            )
            .await?;
            probe.capture(CaptureMode::Viewport, "collection").await?;
            let header = snapshot_first(probe, &selectors.collection_header, &properties).await?;
            for check in header_checks("collection header", header, min_weight) {
                probe.check(check);
            }
        }
    }

    probe.record_page_errors()
}
