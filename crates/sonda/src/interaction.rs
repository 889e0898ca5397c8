//! Interaction Driver: typed actions against resolved elements.
//!
//! Every action checks interactability first, with one implicit re-check
//! after [`RECHECK_DELAY_MS`]. An element that is attached and rendered but
//! outside the viewport is scrolled into view before that re-check. Nothing
//! is retried beyond that; a target that still cannot be used comes back
//! as [`ActionOutcome::NotInteractable`], not as an error.

use crate::driver::{NodeState, ScrollTarget};
use crate::locator::{ElementHandle, LocatorQuery};
use crate::reporter::{CheckResult, Observed};
use crate::result::{SondaError, SondaResult};
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Delay before the single implicit re-check
pub const RECHECK_DELAY_MS: u64 = 250;

/// Why an action could not be performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotInteractableReason {
    /// The query matched nothing
    Absent,
    /// The element left the document
    Detached,
    /// The element is not rendered
    Hidden,
    /// The element could not be brought into the viewport
    OutsideViewport,
}

impl NotInteractableReason {
    fn of(state: NodeState) -> Option<Self> {
        if !state.attached {
            Some(Self::Detached)
        } else if !state.visible {
            Some(Self::Hidden)
        } else if !state.in_viewport {
            Some(Self::OutsideViewport)
        } else {
            None
        }
    }
}

impl fmt::Display for NotInteractableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Absent => "absent",
            Self::Detached => "detached",
            Self::Hidden => "hidden",
            Self::OutsideViewport => "outside viewport",
        })
    }
}

/// Result of one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum ActionOutcome {
    /// The action was dispatched
    Performed,
    /// The target could not receive the action
    NotInteractable {
        /// Target description
        target: String,
        /// Why
        reason: NotInteractableReason,
    },
    /// The driver did not answer in time
    TimedOut {
        /// Timeout that expired
        ms: u64,
    },
}

impl ActionOutcome {
    /// Whether the action was dispatched
    #[must_use]
    pub const fn is_performed(&self) -> bool {
        matches!(self, Self::Performed)
    }

    /// Nothing matched `query`
    #[must_use]
    pub fn absent(query: &LocatorQuery) -> Self {
        warn!(query = %query, "no element to act on");
        Self::NotInteractable {
            target: query.to_string(),
            reason: NotInteractableReason::Absent,
        }
    }

    /// Turn the outcome into a check named `name`
    #[must_use]
    pub fn into_check(self, name: impl Into<String>) -> CheckResult {
        let passed = self.is_performed();
        let detail = match &self {
            Self::Performed => None,
            Self::NotInteractable { target, reason } => Some(format!("{target} is {reason}")),
            Self::TimedOut { ms } => Some(format!("timed out after {ms}ms")),
        };
        let check = CheckResult::new(
            name,
            Observed::Text(self.to_string()),
            "performed",
            passed,
        );
        match detail {
            Some(detail) => check.with_detail(detail),
            None => check,
        }
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Performed => f.write_str("performed"),
            Self::NotInteractable { .. } => f.write_str("not interactable"),
            Self::TimedOut { .. } => f.write_str("timed out"),
        }
    }
}

/// Map a bounded driver call to an outcome, keeping protocol errors as errors
fn settle(result: SondaResult<()>) -> SondaResult<ActionOutcome> {
    match result {
        Ok(()) => Ok(ActionOutcome::Performed),
        Err(SondaError::Timeout { ms, .. }) => Ok(ActionOutcome::TimedOut { ms }),
        Err(e) => Err(e),
    }
}

impl Session {
    /// Check interactability, scrolling and re-checking once if needed
    async fn ensure_interactable(
        &self,
        handle: &ElementHandle,
    ) -> SondaResult<Result<(), ActionOutcome>> {
        self.check_handle(handle)?;
        let driver = self.driver()?;
        let state = match self.bounded("interactability", driver.node_state(handle.node())).await {
            Ok(state) => state,
            Err(SondaError::Timeout { ms, .. }) => return Ok(Err(ActionOutcome::TimedOut { ms })),
            Err(e) => return Err(e),
        };
        if state.is_interactable() {
            return Ok(Ok(()));
        }
        if state.attached && state.visible {
            debug!(element = %handle, "scrolling into view");
            if let Err(e) = self
                .bounded("scroll into view", driver.scroll_into_view(handle.node()))
                .await
            {
                debug!(element = %handle, error = %e, "scroll into view failed");
            }
        }
        tokio::time::sleep(Duration::from_millis(RECHECK_DELAY_MS)).await;
        let state = match self.bounded("interactability", driver.node_state(handle.node())).await {
            Ok(state) => state,
            Err(SondaError::Timeout { ms, .. }) => return Ok(Err(ActionOutcome::TimedOut { ms })),
            Err(e) => return Err(e),
        };
        match NotInteractableReason::of(state) {
            None => Ok(Ok(())),
            Some(reason) => {
                warn!(element = %handle, %reason, "target not interactable");
                Ok(Err(ActionOutcome::NotInteractable {
                    target: handle.to_string(),
                    reason,
                }))
            }
        }
    }

    /// Replace the value of an input element
    pub async fn fill(&self, handle: &ElementHandle, text: &str) -> SondaResult<ActionOutcome> {
        if let Err(outcome) = self.ensure_interactable(handle).await? {
            return Ok(outcome);
        }
        debug!(element = %handle, "fill");
        let driver = self.driver()?;
        settle(self.bounded("fill", driver.fill(handle.node(), text)).await)
    }

    /// Click the centre of an element
    pub async fn click(&self, handle: &ElementHandle) -> SondaResult<ActionOutcome> {
        if let Err(outcome) = self.ensure_interactable(handle).await? {
            return Ok(outcome);
        }
        debug!(element = %handle, "click");
        let driver = self.driver()?;
        settle(self.bounded("click", driver.click(handle.node())).await)
    }

    /// Press a named key (`Enter`, `Escape`, `a`, ...), on an element or
    /// on whatever currently has focus
    pub async fn press_key(
        &self,
        handle: Option<&ElementHandle>,
        key: &str,
    ) -> SondaResult<ActionOutcome> {
        if let Some(handle) = handle {
            if let Err(outcome) = self.ensure_interactable(handle).await? {
                return Ok(outcome);
            }
        }
        debug!(key, "press key");
        let driver = self.driver()?;
        settle(
            self.bounded("press key", driver.press_key(handle.map(ElementHandle::node), key))
                .await,
        )
    }

    /// Scroll the document
    pub async fn scroll(&self, target: ScrollTarget) -> SondaResult<ActionOutcome> {
        let driver = self.driver()?;
        settle(self.bounded("scroll", driver.scroll(target)).await)
    }

    /// Click the first element the query resolves to
    pub async fn click_first(&self, query: &LocatorQuery) -> SondaResult<ActionOutcome> {
        match self.first(query).await? {
            Some(handle) => self.click(&handle).await,
            None => Ok(ActionOutcome::absent(query)),
        }
    }

    /// Fill the first element the query resolves to
    pub async fn fill_first(&self, query: &LocatorQuery, text: &str) -> SondaResult<ActionOutcome> {
        match self.first(query).await? {
            Some(handle) => self.fill(&handle, text).await,
            None => Ok(ActionOutcome::absent(query)),
        }
    }
}
