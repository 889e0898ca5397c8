//! Session: one browser, one page, one configuration.
//!
//! A session owns its [`BrowserConfig`] and the driver behind it. Closing
//! is idempotent; [`Session::scoped`] guarantees `close` runs on every exit
//! path of the body. Handles and snapshots taken from a session are
//! rejected once it is closed.

use crate::config::BrowserConfig;
use crate::driver::{ConsoleMessage, FailedRequest, Launcher, NavigationReply, PageDriver};
use crate::locator::ElementHandle;
use crate::result::{SondaError, SondaResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why a navigation never produced a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkFailure {
    /// Host name did not resolve
    Dns,
    /// Host refused, reset or was unreachable
    Connection,
    /// TLS handshake or certificate failure
    Tls,
    /// Anything else the network layer reported
    Other,
}

impl NetworkFailure {
    /// Classify a browser network error text such as
    /// `net::ERR_NAME_NOT_RESOLVED`
    #[must_use]
    pub fn classify(error_text: &str) -> Self {
        let text = error_text.to_ascii_uppercase();
        if text.contains("NAME_NOT_RESOLVED") || text.contains("NAME_RESOLUTION") {
            Self::Dns
        } else if text.contains("CERT") || text.contains("SSL") {
            Self::Tls
        } else if text.contains("CONNECTION_")
            || text.contains("ADDRESS_UNREACHABLE")
            || text.contains("INTERNET_DISCONNECTED")
            || text.contains("EMPTY_RESPONSE")
        {
            Self::Connection
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for NetworkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dns => f.write_str("DNS failure"),
            Self::Connection => f.write_str("connection failure"),
            Self::Tls => f.write_str("TLS failure"),
            Self::Other => f.write_str("network failure"),
        }
    }
}

/// Result of [`Session::navigate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum NavigationOutcome {
    /// Document parsed with a non-error status
    Loaded {
        /// HTTP status, when the driver could read it
        status: Option<u16>,
        /// URL after redirects
        url: String,
    },
    /// Document parsed but the server answered with 4xx/5xx
    HttpError {
        /// HTTP status
        status: u16,
        /// URL after redirects
        url: String,
    },
    /// No document: DNS, connection or TLS failure
    Unreachable {
        /// Failure class
        kind: NetworkFailure,
        /// Browser error text
        reason: String,
    },
    /// The timeout expired before the document parsed
    TimedOut {
        /// The timeout that expired, in milliseconds
        after_ms: u64,
    },
}

impl NavigationOutcome {
    /// Turn a driver reply into an outcome
    #[must_use]
    pub fn from_reply(reply: NavigationReply) -> Self {
        match reply {
            NavigationReply::Loaded {
                status: Some(status),
                url,
            } if status >= 400 => Self::HttpError { status, url },
            NavigationReply::Loaded { status, url } => Self::Loaded { status, url },
            NavigationReply::Failed { error_text } => Self::Unreachable {
                kind: NetworkFailure::classify(&error_text),
                reason: error_text,
            },
        }
    }

    /// Whether the page is usable for further steps
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded { .. })
    }
}

impl fmt::Display for NavigationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded {
                status: Some(status),
                url,
            } => write!(f, "loaded {url} ({status})"),
            Self::Loaded { status: None, url } => write!(f, "loaded {url}"),
            Self::HttpError { status, url } => write!(f, "HTTP {status} from {url}"),
            Self::Unreachable { kind, reason } => write!(f, "{kind}: {reason}"),
            Self::TimedOut { after_ms } => write!(f, "timed out after {after_ms}ms"),
        }
    }
}

struct SessionInner {
    id: Arc<str>,
    config: BrowserConfig,
    driver: Box<dyn PageDriver>,
    closed: AtomicBool,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            warn!(
                session = %self.id,
                "session dropped without close; driver teardown left to Drop"
            );
        }
    }
}

/// A live browser page and the configuration it was opened with.
///
/// Cloning is cheap and yields another reference to the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("viewport", &self.inner.config.viewport)
            .field("color_scheme", &self.inner.config.color_scheme)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Launch a browser for `config`.
    ///
    /// # Errors
    ///
    /// `BrowserLaunch` when the browser cannot be started.
    pub async fn open(config: BrowserConfig, launcher: &dyn Launcher) -> SondaResult<Self> {
        let id: Arc<str> = Arc::from(uuid::Uuid::new_v4().simple().to_string());
        info!(
            session = %id,
            viewport = %config.viewport,
            color_scheme = %config.color_scheme,
            "opening session"
        );
        let driver = launcher.launch(&config).await.map_err(|e| match e {
            SondaError::BrowserLaunch { .. } => e,
            other => SondaError::launch(other.to_string()),
        })?;
        Ok(Self {
            inner: Arc::new(SessionInner {
                id,
                config,
                driver,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Open a session, run `body`, and close the session whatever happened.
    ///
    /// The body's error wins over a close error.
    pub async fn scoped<T, F, Fut>(
        config: BrowserConfig,
        launcher: &dyn Launcher,
        body: F,
    ) -> SondaResult<T>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = SondaResult<T>>,
    {
        let session = Self::open(config, launcher).await?;
        let result = body(session.clone()).await;
        let closed = session.close().await;
        match (result, closed) {
            (Err(e), _) | (Ok(_), Err(e)) => Err(e),
            (Ok(value), Ok(())) => Ok(value),
        }
    }

    /// Session identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub(crate) fn shared_id(&self) -> Arc<str> {
        Arc::clone(&self.inner.id)
    }

    /// Configuration this session was opened with
    #[must_use]
    pub fn config(&self) -> &BrowserConfig {
        &self.inner.config
    }

    /// Whether [`close`](Self::close) has run
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Navigate to `url`, waiting at most `timeout` for the document.
    ///
    /// Every network-level outcome is data; only a closed session or a
    /// driver protocol error is an `Err`.
    pub async fn navigate(&self, url: &str, timeout: Duration) -> SondaResult<NavigationOutcome> {
        let driver = self.driver()?;
        info!(session = %self.id(), url, "navigate");
        let outcome = match tokio::time::timeout(timeout, driver.navigate(url)).await {
            Ok(reply) => NavigationOutcome::from_reply(reply?),
            Err(_) => NavigationOutcome::TimedOut {
                after_ms: timeout.as_millis() as u64,
            },
        };
        if outcome.is_loaded() {
            info!(session = %self.id(), %outcome, "navigation settled");
        } else {
            warn!(session = %self.id(), %outcome, "navigation failed");
        }
        Ok(outcome)
    }

    /// Navigate with the configured navigation timeout
    pub async fn goto(&self, url: &str) -> SondaResult<NavigationOutcome> {
        self.navigate(url, self.config().navigation_timeout()).await
    }

    /// Evaluate a script expression in the page
    pub async fn evaluate(&self, expression: &str) -> SondaResult<serde_json::Value> {
        let driver = self.driver()?;
        self.bounded("evaluate", driver.evaluate(expression)).await
    }

    /// Console messages the page has emitted so far
    pub fn console_messages(&self) -> SondaResult<Vec<ConsoleMessage>> {
        Ok(self.driver()?.console_messages())
    }

    /// Requests that failed at the network layer so far
    pub fn failed_requests(&self) -> SondaResult<Vec<FailedRequest>> {
        Ok(self.driver()?.failed_requests())
    }

    /// Tear down the browser. Safe to call more than once.
    pub async fn close(&self) -> SondaResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            debug!(session = %self.id(), "close: already closed");
            return Ok(());
        }
        info!(session = %self.id(), "closing session");
        self.inner.driver.close().await
    }

    /// The driver, unless the session is closed
    pub(crate) fn driver(&self) -> SondaResult<&dyn PageDriver> {
        if self.is_closed() {
            return Err(SondaError::SessionClosed {
                session: self.id().to_string(),
            });
        }
        Ok(self.inner.driver.as_ref())
    }

    /// Reject handles from other sessions
    pub(crate) fn check_handle(&self, handle: &ElementHandle) -> SondaResult<()> {
        if handle.session_id() != self.id() {
            return Err(SondaError::ForeignHandle {
                handle_session: handle.session_id().to_string(),
                session: self.id().to_string(),
            });
        }
        Ok(())
    }

    /// Bound a driver call by the configured action timeout
    pub(crate) async fn bounded<T, Fut>(&self, operation: &str, fut: Fut) -> SondaResult<T>
    where
        Fut: Future<Output = SondaResult<T>>,
    {
        let timeout = self.config().action_timeout();
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| SondaError::Timeout {
                operation: operation.to_string(),
                ms: timeout.as_millis() as u64,
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{MockLauncher, MockPage, MockRoute};

    mod classify_tests {
        use super::*;

        #[test]
        fn test_classify_network_failures() {
            assert_eq!(
                NetworkFailure::classify("net::ERR_NAME_NOT_RESOLVED"),
                NetworkFailure::Dns
            );
            assert_eq!(
                NetworkFailure::classify("net::ERR_CONNECTION_REFUSED"),
                NetworkFailure::Connection
            );
            assert_eq!(
                NetworkFailure::classify("net::ERR_CERT_AUTHORITY_INVALID"),
                NetworkFailure::Tls
            );
            assert_eq!(
                NetworkFailure::classify("net::ERR_ABORTED"),
                NetworkFailure::Other
            );
        }

        #[test]
        fn test_http_error_status() {
            let outcome = NavigationOutcome::from_reply(NavigationReply::Loaded {
                status: Some(503),
                url: "http://localhost/".into(),
            });
            assert_eq!(
                outcome,
                NavigationOutcome::HttpError {
                    status: 503,
                    url: "http://localhost/".into()
                }
            );
            assert!(!outcome.is_loaded());
        }

        #[test]
        fn test_unknown_status_is_loaded() {
            let outcome = NavigationOutcome::from_reply(NavigationReply::Loaded {
                status: None,
                url: "file:///tmp/a.html".into(),
            });
            assert!(outcome.is_loaded());
        }
    }

    mod lifecycle_tests {
        use super::*;

        fn launcher() -> MockLauncher {
            MockLauncher::new()
                .route("http://app.test/", MockRoute::Page(MockPage::new("Home")))
                .route("http://slow.test/", MockRoute::Hang)
                .route(
                    "http://down.test/",
                    MockRoute::Unreachable("net::ERR_CONNECTION_REFUSED".into()),
                )
        }

        #[tokio::test]
        async fn test_close_is_idempotent() {
            let launcher = launcher();
            let session = Session::open(BrowserConfig::default(), &launcher)
                .await
                .unwrap();
            assert_eq!(launcher.live_browsers(), 1);
            session.close().await.unwrap();
            session.close().await.unwrap();
            assert!(session.is_closed());
            assert_eq!(launcher.live_browsers(), 0);
        }

        #[tokio::test]
        async fn test_operations_after_close_fail() {
            let launcher = launcher();
            let session = Session::open(BrowserConfig::default(), &launcher)
                .await
                .unwrap();
            session.close().await.unwrap();
            let err = session.goto("http://app.test/").await.unwrap_err();
            assert!(matches!(err, SondaError::SessionClosed { .. }));
        }

        #[tokio::test]
        async fn test_navigation_outcomes() {
            let launcher = launcher();
            let session = Session::open(BrowserConfig::default(), &launcher)
                .await
                .unwrap();
            assert!(session.goto("http://app.test/").await.unwrap().is_loaded());
            assert!(matches!(
                session.goto("http://down.test/").await.unwrap(),
                NavigationOutcome::Unreachable {
                    kind: NetworkFailure::Connection,
                    ..
                }
            ));
            assert!(matches!(
                session.goto("http://nowhere.test/").await.unwrap(),
                NavigationOutcome::Unreachable {
                    kind: NetworkFailure::Dns,
                    ..
                }
            ));
            session.close().await.unwrap();
        }

        #[tokio::test(start_paused = true)]
        async fn test_navigation_timeout_is_an_outcome() {
            let launcher = launcher();
            let session = Session::open(BrowserConfig::default(), &launcher)
                .await
                .unwrap();
            let outcome = session
                .navigate("http://slow.test/", Duration::from_millis(1500))
                .await
                .unwrap();
            assert_eq!(outcome, NavigationOutcome::TimedOut { after_ms: 1500 });
            // The session survives a timed-out step
            assert!(session.goto("http://app.test/").await.unwrap().is_loaded());
            session.close().await.unwrap();
        }

        #[tokio::test]
        async fn test_scoped_closes_on_error() {
            let launcher = launcher();
            let result: SondaResult<()> =
                Session::scoped(BrowserConfig::default(), &launcher, |_session| async {
                    Err(SondaError::aborted("step failed"))
                })
                .await;
            assert!(matches!(result, Err(SondaError::Aborted { .. })));
            assert_eq!(launcher.live_browsers(), 0);
        }

        #[tokio::test]
        async fn test_launch_failure() {
            let launcher = launcher().failing_launch("chromium not found");
            let err = Session::open(BrowserConfig::default(), &launcher)
                .await
                .unwrap_err();
            assert!(err.is_harness_failure());
            assert_eq!(launcher.live_browsers(), 0);
        }

        #[tokio::test]
        async fn test_foreign_handle_rejected() {
            let launcher = launcher();
            let a = Session::open(BrowserConfig::default(), &launcher)
                .await
                .unwrap();
            let b = Session::open(BrowserConfig::default(), &launcher)
                .await
                .unwrap();
            let handle = ElementHandle::new(a.shared_id(), 1, "p", 0);
            assert!(a.check_handle(&handle).is_ok());
            assert!(matches!(
                b.check_handle(&handle),
                Err(SondaError::ForeignHandle { .. })
            ));
            a.close().await.unwrap();
            b.close().await.unwrap();
        }
    }
}
