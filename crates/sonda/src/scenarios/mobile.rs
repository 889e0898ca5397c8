//! Narrow-viewport probe.

use super::{action_check, open_page, wait_for, ScenarioProbe};
use crate::driver::{CaptureMode, ScrollTarget};
use crate::locator::LocatorQuery;
use crate::probe::Probe;
use crate::reporter::CheckResult;
use crate::result::SondaResult;

/// The statistics card is rendered and its bottom edge stays within the
/// viewport height
pub(super) async fn mobile_fit(target: &ScenarioProbe<'_>, probe: &mut Probe) -> SondaResult<()> {
    let settings = target.settings;
    let selectors = &settings.selectors;
    let viewport_height = f64::from(probe.session().config().viewport.height);

    open_page(probe, &target.url(&settings.paths.search), settings).await?;
    wait_for(
        probe,
        &selectors.stats_card,
        settings.results_timeout_ms,
        settings.settle_ms,
    )
    .await?;
    probe.capture(CaptureMode::Viewport, "mobile").await?;

    let name = "stats card bottom";
    let expected = format!("<= {viewport_height}");
    let found = probe
        .session()
        .first(&LocatorQuery::new(&selectors.stats_card).first())
        .await;
    let card = probe.tolerate(found, CheckResult::missing(name, expected.clone()))?;
    let check = match card {
        None => None,
        Some(None) => Some(CheckResult::missing(name, expected).with_detail("not found")),
        Some(Some(handle)) => {
            let visible = probe.session().is_visible(&handle).await;
            let snapshot = probe.session().snapshot(&handle, &[]).await;
            Some(match (visible, snapshot) {
                (Ok(true), Ok(Some(snapshot))) if !snapshot.bounds.is_empty() => {
                    let bounds = snapshot.bounds;
                    CheckResult::at_most(name, bounds.bottom(), viewport_height).with_detail(
                        format!("y={:.0}, height={:.0}", bounds.y, bounds.height),
                    )
                }
                (Err(e), _) | (_, Err(e)) if e.is_harness_failure() => return Err(e),
                (Err(e), _) | (_, Err(e)) => {
                    CheckResult::missing(name, expected).with_detail(e.to_string())
                }
                _ => CheckResult::missing(name, expected).with_detail("not rendered"),
            })
        }
    };
    if let Some(check) = check {
        probe.check(check);
    }

    probe.capture(CaptureMode::FullPage, "mobile full").await?;
    let scrolled = probe.session().scroll(ScrollTarget::Bottom).await;
    probe.check(action_check("scroll to bottom", scrolled)?.advisory());
    probe.capture(CaptureMode::Viewport, "mobile scrolled").await?;

    probe.record_page_errors()
}
