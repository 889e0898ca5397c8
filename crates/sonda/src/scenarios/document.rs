//! Document page probes: bilingual line-height and the print view.

use super::{click_check, count_or_zero, open_page, snapshot_first, wait_for, ScenarioProbe};
use crate::driver::CaptureMode;
use crate::locator::LocatorQuery;
use crate::probe::Probe;
use crate::reporter::{CheckResult, Observed};
use crate::result::SondaResult;
use tracing::warn;

/// Text the print view shows while its data is still being fetched
const LOADING_MARKER: &str = "Loading document";

/// Paragraphs in the translation column of the side-by-side view keep
/// `line-height` within the configured multiple of their font size
pub(super) async fn line_height(target: &ScenarioProbe<'_>, probe: &mut Probe) -> SondaResult<()> {
    let settings = target.settings;
    let selectors = &settings.selectors;
    let max_ratio = settings.max_line_height_ratio;

    open_page(probe, &target.url(&settings.paths.document), settings).await?;
    wait_for(
        probe,
        &selectors.document_content,
        settings.content_timeout_ms,
        settings.settle_ms,
    )
    .await?;
    probe.capture(CaptureMode::Viewport, "document").await?;

    let toggle = LocatorQuery::new(&selectors.side_by_side).first();
    if !click_check(probe, "open side-by-side view", &toggle, false).await? {
        return probe.record_page_errors();
    }

    wait_for(
        probe,
        &selectors.translation_text,
        settings.content_timeout_ms,
        settings.settle_ms,
    )
    .await?;
    probe.capture(CaptureMode::Viewport, "side by side").await?;

    let resolved = probe
        .session()
        .resolve(&LocatorQuery::new(&selectors.translation_text))
        .await;
    let unanswered = CheckResult::missing("translation paragraphs", ">= 1");
    let Some(paragraphs) = probe.tolerate(resolved, unanswered)? else {
        return probe.record_page_errors();
    };
    probe.check(CheckResult::at_least(
        "translation paragraphs",
        paragraphs.len() as f64,
        1.0,
    ));

    let mut worst: Option<(f64, String)> = None;
    let mut unmeasured = 0usize;
    for handle in &paragraphs {
        let snapshot = match probe
            .session()
            .snapshot(handle, &["line-height", "font-size"])
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_harness_failure() => return Err(e),
            Err(e) => {
                warn!(element = %handle, error = %e, "paragraph not measured");
                None
            }
        };
        match snapshot.and_then(|s| s.line_height_ratio()) {
            Some(ratio) if worst.as_ref().map_or(true, |(w, _)| ratio > *w) => {
                worst = Some((ratio, handle.to_string()));
            }
            Some(_) => {}
            None => unmeasured += 1,
        }
    }

    match worst {
        Some((ratio, element)) => probe.check(
            CheckResult::at_most("line-height ratio", ratio, max_ratio)
                .with_detail(format!("largest at {element}")),
        ),
        None if !paragraphs.is_empty() => {
            let expected = format!("<= {max_ratio}");
            probe.check(CheckResult::missing("line-height ratio", expected));
        }
        None => {}
    }
    if unmeasured > 0 {
        let unmeasured = unmeasured as f64;
        probe.check(CheckResult::at_most("unmeasured paragraphs", unmeasured, 0.0).advisory());
    }

    probe.record_page_errors()
}

/// The printable study view renders a titled document without an error
/// state
pub(super) async fn print_view(target: &ScenarioProbe<'_>, probe: &mut Probe) -> SondaResult<()> {
    let settings = target.settings;
    let selectors = &settings.selectors;

    open_page(probe, &target.url(&settings.paths.print), settings).await?;
    wait_for(
        probe,
        &selectors.print_title,
        settings.content_timeout_ms,
        settings.settle_ms,
    )
    .await?;
    probe.capture(CaptureMode::FullPage, "print view").await?;

    let counted = probe
        .session()
        .count(&LocatorQuery::new(&selectors.error_state))
        .await;
    let unanswered = CheckResult::missing("no error state", "true");
    if let Some(errors) = probe.tolerate(counted, unanswered)? {
        probe.check(CheckResult::is_true("no error state", errors == 0));
    }

    let content = probe.session().page_content().await;
    let unanswered = CheckResult::missing("finished loading", "true").advisory();
    if let Some(markup) = probe.tolerate(content, unanswered)? {
        let loaded = !markup.contains(LOADING_MARKER);
        probe.check(CheckResult::is_true("finished loading", loaded).advisory());
    }

    let title = snapshot_first(probe, &selectors.print_title, &[]).await?;
    probe.check(match title {
        Some(snapshot) => {
            let text = snapshot.text.trim().to_string();
            let present = !text.is_empty();
            CheckResult::new("document title", Observed::Text(text), "non-empty", present)
        }
        None => CheckResult::missing("document title", "non-empty"),
    });

    let rows = count_or_zero(probe, "segment rows", &selectors.segment_row).await?;
    probe.check(CheckResult::at_least("segment rows", rows as f64, 1.0).advisory());
    let qr = count_or_zero(probe, "qr code present", &selectors.qr_image).await?;
    probe.check(CheckResult::is_true("qr code present", qr > 0).advisory());

    probe.record_page_errors()
}
