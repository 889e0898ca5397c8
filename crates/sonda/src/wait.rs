//! Readiness Waiter
//!
//! Decides when asynchronously loaded content has settled. A
//! [`ReadinessPolicy`] is an ordered list of strategies; each runs under
//! its own timeout and the first one to succeed ends the wait. The whole
//! wait is therefore bounded by the sum of the strategy timeouts. Running
//! out of strategies is reported in the [`ReadinessOutcome`], not raised:
//! content that never shows up may be exactly what a probe is checking.

use crate::locator::LocatorQuery;
use crate::result::{SondaError, SondaResult};
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Polling interval for selector and network checks (100ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Network idle threshold (500ms without requests)
pub const NETWORK_IDLE_THRESHOLD_MS: u64 = 500;

// =============================================================================
// STRATEGIES
// =============================================================================

/// Kind of strategy, as reported in outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// No requests in flight for a quiet period
    NetworkIdle,
    /// A selector resolved to at least one element
    Selector,
    /// A bounded sleep
    FixedDelay,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkIdle => f.write_str("network-idle"),
            Self::Selector => f.write_str("selector"),
            Self::FixedDelay => f.write_str("fixed-delay"),
        }
    }
}

/// One way of deciding the page is ready
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitStrategy {
    /// No request in flight for `quiet`, within `timeout`
    NetworkIdle {
        /// Upper bound for this strategy
        timeout: Duration,
        /// Required quiet period
        quiet: Duration,
    },
    /// `query` resolves to at least one element within `timeout`
    Selector {
        /// What must appear
        query: LocatorQuery,
        /// Upper bound for this strategy
        timeout: Duration,
    },
    /// Sleep for the duration, then consider the page ready
    FixedDelay(Duration),
}

impl WaitStrategy {
    /// Network idle with the default 500ms quiet period
    #[must_use]
    pub const fn network_idle(timeout_ms: u64) -> Self {
        Self::NetworkIdle {
            timeout: Duration::from_millis(timeout_ms),
            quiet: Duration::from_millis(NETWORK_IDLE_THRESHOLD_MS),
        }
    }

    /// Wait for a selector to match
    #[must_use]
    pub fn selector(query: impl Into<LocatorQuery>, timeout_ms: u64) -> Self {
        Self::Selector {
            query: query.into(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Fixed fallback delay
    #[must_use]
    pub const fn fixed(delay_ms: u64) -> Self {
        Self::FixedDelay(Duration::from_millis(delay_ms))
    }

    /// Reported kind
    #[must_use]
    pub const fn kind(&self) -> StrategyKind {
        match self {
            Self::NetworkIdle { .. } => StrategyKind::NetworkIdle,
            Self::Selector { .. } => StrategyKind::Selector,
            Self::FixedDelay(_) => StrategyKind::FixedDelay,
        }
    }

    /// Longest this strategy may take
    #[must_use]
    pub const fn budget(&self) -> Duration {
        match self {
            Self::NetworkIdle { timeout, .. } | Self::Selector { timeout, .. } => *timeout,
            Self::FixedDelay(delay) => *delay,
        }
    }
}

impl fmt::Display for WaitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkIdle { timeout, quiet } => write!(
                f,
                "network-idle(quiet={}ms, timeout={}ms)",
                quiet.as_millis(),
                timeout.as_millis()
            ),
            Self::Selector { query, timeout } => {
                write!(f, "selector({query}, timeout={}ms)", timeout.as_millis())
            }
            Self::FixedDelay(delay) => write!(f, "fixed-delay({}ms)", delay.as_millis()),
        }
    }
}

// =============================================================================
// POLICY
// =============================================================================

/// Ordered wait strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessPolicy {
    strategies: Vec<WaitStrategy>,
    poll_interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            strategies: Vec::new(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl ReadinessPolicy {
    /// Empty policy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a strategy
    #[must_use]
    pub fn then(mut self, strategy: WaitStrategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Set the polling interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Wait for `selector`, falling back to a fixed delay
    #[must_use]
    pub fn selector_or_delay(selector: &str, timeout_ms: u64, fallback_ms: u64) -> Self {
        Self::new()
            .then(WaitStrategy::selector(selector, timeout_ms))
            .then(WaitStrategy::fixed(fallback_ms))
    }

    /// Strategies in evaluation order
    #[must_use]
    pub fn strategies(&self) -> &[WaitStrategy] {
        &self.strategies
    }

    /// Worst-case duration: the sum of every strategy's timeout
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.strategies.iter().map(WaitStrategy::budget).sum()
    }
}

// =============================================================================
// OUTCOME
// =============================================================================

/// How one strategy fared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyAttempt {
    /// Strategy kind
    pub kind: StrategyKind,
    /// Whether it succeeded
    pub satisfied: bool,
    /// Time spent in it
    pub elapsed: Duration,
}

/// Result of [`Session::await_ready`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessOutcome {
    /// Whether some strategy succeeded
    pub satisfied: bool,
    /// The strategy that succeeded, if any
    pub strategy_used: Option<StrategyKind>,
    /// Total time spent waiting
    pub elapsed: Duration,
    /// Every strategy that ran, in order
    pub attempts: Vec<StrategyAttempt>,
}

impl fmt::Display for ReadinessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.strategy_used {
            Some(kind) if self.satisfied => {
                write!(f, "ready via {kind} after {}ms", self.elapsed.as_millis())
            }
            _ if self.satisfied => f.write_str("ready (nothing to wait for)"),
            _ => write!(
                f,
                "not ready after {}ms ({} strategies exhausted)",
                self.elapsed.as_millis(),
                self.attempts.len()
            ),
        }
    }
}

// =============================================================================
// WAITER
// =============================================================================

impl Session {
    /// Block until the policy is satisfied or every strategy has timed out.
    ///
    /// An empty policy is satisfied immediately. Only driver failures (a
    /// closed session, a dead browser) are errors.
    pub async fn await_ready(&self, policy: &ReadinessPolicy) -> SondaResult<ReadinessOutcome> {
        let started = Instant::now();
        let mut attempts = Vec::with_capacity(policy.strategies.len());
        for strategy in &policy.strategies {
            let begun = Instant::now();
            let satisfied = self.run_strategy(strategy, policy.poll_interval).await?;
            attempts.push(StrategyAttempt {
                kind: strategy.kind(),
                satisfied,
                elapsed: begun.elapsed(),
            });
            debug!(%strategy, satisfied, "readiness strategy finished");
            if satisfied {
                let outcome = ReadinessOutcome {
                    satisfied: true,
                    strategy_used: Some(strategy.kind()),
                    elapsed: started.elapsed(),
                    attempts,
                };
                info!(session = %self.id(), %outcome, "page ready");
                return Ok(outcome);
            }
        }
        let outcome = ReadinessOutcome {
            satisfied: policy.strategies.is_empty(),
            strategy_used: None,
            elapsed: started.elapsed(),
            attempts,
        };
        if !outcome.satisfied {
            warn!(session = %self.id(), %outcome, "readiness degraded");
        }
        Ok(outcome)
    }

    async fn run_strategy(&self, strategy: &WaitStrategy, poll: Duration) -> SondaResult<bool> {
        match strategy {
            WaitStrategy::FixedDelay(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(true)
            }
            WaitStrategy::NetworkIdle { timeout, quiet } => {
                Self::finished_within(*timeout, self.until_idle(*quiet, poll)).await
            }
            WaitStrategy::Selector { query, timeout } => {
                Self::finished_within(*timeout, self.until_present(query, poll)).await
            }
        }
    }

    async fn until_idle(&self, quiet: Duration, poll: Duration) -> SondaResult<()> {
        let driver = self.driver()?;
        loop {
            let activity = driver.network_activity().await?;
            if activity.inflight == 0 && activity.idle_for >= quiet {
                return Ok(());
            }
            tokio::time::sleep(poll).await;
        }
    }

    async fn until_present(&self, query: &LocatorQuery, poll: Duration) -> SondaResult<()> {
        loop {
            if self.count(query).await? > 0 {
                return Ok(());
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// `Ok(true)` if the loop finished in time, `Ok(false)` on timeout
    async fn finished_within<F>(timeout: Duration, fut: F) -> SondaResult<bool>
    where
        F: std::future::Future<Output = SondaResult<()>>,
    {
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(())) => Ok(true),
            Ok(Err(SondaError::Timeout { .. })) | Err(_) => Ok(false),
            Ok(Err(e)) => Err(e),
        }
    }
}
