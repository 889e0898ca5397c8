//! Search page probes: paper contrast and result cards.

use super::{
    action_check, click_check, expect_count, open_page, snapshot_first, wait_for, ProbeSettings,
    ScenarioProbe,
};
use crate::driver::CaptureMode;
use crate::inspect::count_highlights;
use crate::interaction::ActionOutcome;
use crate::locator::LocatorQuery;
use crate::probe::Probe;
use crate::reporter::CheckResult;
use crate::result::SondaResult;

/// Type the query into the search input and press Enter, then wait for
/// result cards. Returns whether the search was submitted.
pub(super) async fn submit_search(
    probe: &mut Probe,
    settings: &ProbeSettings,
) -> SondaResult<bool> {
    let selectors = &settings.selectors;
    let query = LocatorQuery::new(&selectors.search_input).first();
    let found = probe.session().first(&query).await;
    let unanswered = CheckResult::missing("fill search query", "performed");
    let input = match probe.tolerate(found, unanswered)? {
        Some(Some(input)) => input,
        Some(None) => {
            probe.check(ActionOutcome::absent(&query).into_check("fill search query"));
            return Ok(false);
        }
        None => return Ok(false),
    };

    let filled = probe.session().fill(&input, &settings.query).await;
    let check = action_check("fill search query", filled)?;
    let filled = check.passed;
    probe.check(check);
    if !filled {
        return Ok(false);
    }
    let pressed = probe.session().press_key(Some(&input), "Enter").await;
    let check = action_check("submit search", pressed)?;
    let submitted = check.passed;
    probe.check(check);
    if submitted {
        wait_for(
            probe,
            &selectors.result_card,
            settings.results_timeout_ms,
            settings.settle_ms,
        )
        .await?;
    }
    Ok(submitted)
}

/// The reading paper keeps its light background when the page is
/// rendered with `prefers-color-scheme: dark`
pub(super) async fn paper_contrast(
    target: &ScenarioProbe<'_>,
    probe: &mut Probe,
) -> SondaResult<()> {
    let settings = target.settings;
    let selectors = &settings.selectors;
    let expected = settings.paper_color()?;

    open_page(probe, &target.url(&settings.paths.search), settings).await?;
    probe.capture(CaptureMode::Viewport, "home dark").await?;

    if submit_search(probe, settings).await? {
        let cards = expect_count(
            probe,
            "result cards",
            &selectors.result_card,
            settings.min_result_cards,
        )
        .await?;
        if cards > 0 {
            let card = LocatorQuery::new(&selectors.result_card).first();
            click_check(probe, "expand first result", &card, false).await?;
            wait_for(
                probe,
                &selectors.paper,
                settings.results_timeout_ms,
                settings.settle_ms,
            )
            .await?;
            probe.capture(CaptureMode::Viewport, "paper dark").await?;
        }
    }

    let paper = snapshot_first(probe, &selectors.paper, &["background-color"]).await?;
    let background = paper.as_ref().and_then(|s| s.color("background-color"));
    probe.check(CheckResult::color_matches("paper background", background, expected));

    let text = snapshot_first(probe, &selectors.paper_text, &["color"]).await?;
    let foreground = text.as_ref().and_then(|s| s.color("color"));
    let min_contrast = settings.min_text_contrast;
    let contrast = match (foreground, background) {
        (Some(fg), Some(bg)) => {
            CheckResult::at_least("paper text contrast", fg.contrast_ratio(&bg), min_contrast)
                .with_detail(format!("text {fg} on {bg}"))
        }
        _ => CheckResult::missing("paper text contrast", format!(">= {min_contrast}")),
    };
    probe.check(contrast.advisory());

    probe.record_page_errors()
}

/// A search produces result cards, and the results page carries
/// highlighted passages
pub(super) async fn search_results(
    target: &ScenarioProbe<'_>,
    probe: &mut Probe,
) -> SondaResult<()> {
    let settings = target.settings;
    let selectors = &settings.selectors;

    open_page(probe, &target.url(&settings.paths.search), settings).await?;
    probe.capture(CaptureMode::FullPage, "initial").await?;

    let submitted = submit_search(probe, settings).await?;
    let cards = expect_count(
        probe,
        "result cards",
        &selectors.result_card,
        settings.min_result_cards,
    )
    .await?;
    probe.capture(CaptureMode::FullPage, "search results").await?;

    if submitted {
        let content = probe.session().page_content().await;
        let unanswered = CheckResult::missing("highlighted passages", ">= 1").advisory();
        if let Some(markup) = probe.tolerate(content, unanswered)? {
            let marks = count_highlights(&markup) as f64;
            probe.check(CheckResult::at_least("highlighted passages", marks, 1.0).advisory());
        }
    }

    if cards > 0 {
        let card = LocatorQuery::new(&selectors.result_card).first();
        click_check(probe, "expand first result", &card, true).await?;
        probe.capture(CaptureMode::FullPage, "expanded result").await?;
    }

    probe.record_page_errors()
}
