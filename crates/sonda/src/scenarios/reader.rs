//! Full-screen reader probe.

use super::search::submit_search;
use super::{
    action_check, click_check, count_or_zero, expect_count, open_page, wait_for, ScenarioProbe,
};
use crate::driver::CaptureMode;
use crate::locator::LocatorQuery;
use crate::probe::Probe;
use crate::reporter::CheckResult;
use crate::result::SondaResult;
use std::time::Duration;

/// Time the reader gets to animate closed after Escape
const CLOSE_SETTLE_MS: u64 = 500;

/// Read More on an expanded result opens the reader with paragraphs, and
/// Escape closes it again
pub(super) async fn reader_modal(target: &ScenarioProbe<'_>, probe: &mut Probe) -> SondaResult<()> {
    let settings = target.settings;
    let selectors = &settings.selectors;

    open_page(probe, &target.url(&settings.paths.search), settings).await?;
    probe.capture(CaptureMode::Viewport, "initial").await?;

    let submitted = submit_search(probe, settings).await?;
    let cards = expect_count(
        probe,
        "result cards",
        &selectors.result_card,
        settings.min_result_cards,
    )
    .await?;
    if !submitted || cards == 0 {
        return probe.record_page_errors();
    }

    let card = LocatorQuery::new(&selectors.result_card).first();
    click_check(probe, "expand first result", &card, false).await?;
    wait_for(
        probe,
        &selectors.read_more,
        settings.results_timeout_ms,
        settings.settle_ms,
    )
    .await?;
    probe.capture(CaptureMode::Viewport, "expanded").await?;

    let read_more = LocatorQuery::new(&selectors.read_more).first();
    if !click_check(probe, "open reader", &read_more, false).await? {
        return probe.record_page_errors();
    }
    wait_for(
        probe,
        &selectors.reader_modal,
        settings.content_timeout_ms,
        settings.settle_ms,
    )
    .await?;
    probe.capture(CaptureMode::Viewport, "reader").await?;

    if expect_count(probe, "reader open", &selectors.reader_modal, 1).await? > 0 {
        let paragraphs = &selectors.reader_paragraph;
        let paragraphs = count_or_zero(probe, "reader paragraphs", paragraphs).await? as f64;
        probe.check(CheckResult::at_least("reader paragraphs", paragraphs, 1.0).advisory());
        let loading = &selectors.reader_loading;
        let loading = count_or_zero(probe, "reader finished loading", loading).await?;
        probe.check(CheckResult::is_true("reader finished loading", loading == 0).advisory());
        let empty = count_or_zero(probe, "reader has content", &selectors.reader_empty).await?;
        probe.check(CheckResult::is_true("reader has content", empty == 0).advisory());
        page_forward(probe, &selectors.reader_nav).await?;
    }

    let escaped = probe.session().press_key(None, "Escape").await;
    probe.check(action_check("close reader", escaped)?);
    tokio::time::sleep(Duration::from_millis(CLOSE_SETTLE_MS)).await;
    let counted = probe
        .session()
        .count(&LocatorQuery::new(&selectors.reader_modal))
        .await;
    let unanswered = CheckResult::missing("reader closed", "true");
    if let Some(open) = probe.tolerate(counted, unanswered)? {
        probe.check(CheckResult::is_true("reader closed", open == 0));
    }

    probe.record_page_errors()
}

/// Click the reader's last navigation button unless it is disabled
async fn page_forward(probe: &mut Probe, selector: &str) -> SondaResult<()> {
    let query = LocatorQuery::new(selector).last();
    let session = probe.session().clone();
    let enabled = match session.first(&query).await {
        Ok(Some(handle)) => match session.snapshot(&handle, &[]).await {
            Ok(Some(snapshot)) => snapshot.attribute("disabled").is_none(),
            Ok(None) => false,
            Err(e) if e.is_harness_failure() => return Err(e),
            Err(_) => false,
        },
        Ok(None) => false,
        Err(e) if e.is_harness_failure() => return Err(e),
        Err(_) => false,
    };
    if enabled && click_check(probe, "reader next page", &query, true).await? {
        probe.capture(CaptureMode::Viewport, "reader next page").await?;
    }
    Ok(())
}
