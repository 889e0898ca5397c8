//! Page driver seam.
//!
//! Every harness component talks to the browser through [`PageDriver`].
//! Two implementations exist:
//!
//! - [`ChromiumLauncher`] (feature `browser`): a real Chromium over CDP via
//!   chromiumoxide.
//! - [`MockLauncher`]: an in-memory, scripted page model used by the test
//!   suite and for dry runs.
//!
//! Drivers speak in [`NodeId`]s. The ids are only meaningful for the page
//! document they came from; after a navigation a stale id reports as
//! detached.

pub mod mock;

#[cfg(feature = "browser")]
pub mod chromium;

use crate::config::BrowserConfig;
use crate::inspect::{ElementSnapshot, PageSnapshot};
use crate::result::SondaResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[cfg(feature = "browser")]
pub use chromium::ChromiumLauncher;
pub use mock::{MockEffect, MockElement, MockLauncher, MockPage, MockRoute};

/// Driver-local element identifier
pub type NodeId = u64;

/// Screenshot extent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureMode {
    /// Only what is currently inside the viewport
    #[default]
    Viewport,
    /// The whole scrollable document
    FullPage,
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Viewport => f.write_str("viewport"),
            Self::FullPage => f.write_str("full-page"),
        }
    }
}

/// What the driver saw when a navigation settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationReply {
    /// The document was parsed
    Loaded {
        /// HTTP status of the main document, when known
        status: Option<u16>,
        /// URL after redirects
        url: String,
    },
    /// The navigation never produced a document
    Failed {
        /// Network error text (e.g. `net::ERR_NAME_NOT_RESOLVED`)
        error_text: String,
    },
}

/// Interactability facts about one element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeState {
    /// Still connected to the document
    pub attached: bool,
    /// Rendered with a non-empty box and not hidden
    pub visible: bool,
    /// Box intersects the viewport
    pub in_viewport: bool,
}

impl NodeState {
    /// A node that no longer exists
    pub const DETACHED: Self = Self {
        attached: false,
        visible: false,
        in_viewport: false,
    };

    /// Whether the node can receive input right now
    #[must_use]
    pub const fn is_interactable(&self) -> bool {
        self.attached && self.visible && self.in_viewport
    }
}

/// Network activity as seen since the last navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkActivity {
    /// Requests that have started but not finished
    pub inflight: usize,
    /// Time since the last request started or finished
    pub idle_for: Duration,
}

/// A console message emitted by the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    /// Message level (`log`, `warning`, `error`, ...)
    pub level: String,
    /// Message text
    pub text: String,
}

impl ConsoleMessage {
    /// Create a console message
    #[must_use]
    pub fn new(level: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            text: text.into(),
        }
    }

    /// Whether this is an error-level message
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.level.eq_ignore_ascii_case("error")
    }
}

/// A request that failed at the network layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRequest {
    /// Request URL
    pub url: String,
    /// Failure text reported by the browser
    pub reason: String,
}

impl FailedRequest {
    /// Create a failed request record
    #[must_use]
    pub fn new(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// Where to scroll the page
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollTarget {
    /// Top of the document
    Top,
    /// Bottom of the document
    Bottom,
    /// Relative vertical offset in CSS pixels
    By(f64),
}

/// Low-level control over one browser page.
///
/// Implementations own the browser process behind the page. Methods never
/// block indefinitely on their own; callers still bound every call with a
/// timeout.
#[async_trait]
pub trait PageDriver: Send + Sync + fmt::Debug {
    /// Navigate the page and wait for the document to parse
    async fn navigate(&self, url: &str) -> SondaResult<NavigationReply>;

    /// Resolve a CSS selector (optionally filtered by contained text) to
    /// node ids in document order
    async fn query(&self, selector: &str, text: Option<&str>) -> SondaResult<Vec<NodeId>>;

    /// Count matches with a single DOM query
    async fn count(&self, selector: &str, text: Option<&str>) -> SondaResult<usize>;

    /// Interactability of a node
    async fn node_state(&self, node: NodeId) -> SondaResult<NodeState>;

    /// Scroll a node into the viewport
    async fn scroll_into_view(&self, node: NodeId) -> SondaResult<()>;

    /// Click the centre of a node
    async fn click(&self, node: NodeId) -> SondaResult<()>;

    /// Replace the value of an input-like node
    async fn fill(&self, node: NodeId, text: &str) -> SondaResult<()>;

    /// Press a named key, focused on `node` when given
    async fn press_key(&self, node: Option<NodeId>, key: &str) -> SondaResult<()>;

    /// Scroll the document
    async fn scroll(&self, target: ScrollTarget) -> SondaResult<()>;

    /// Capture the rendered state of a node; `None` if it is detached
    async fn describe(
        &self,
        node: NodeId,
        properties: &[String],
    ) -> SondaResult<Option<ElementSnapshot>>;

    /// Document-level facts
    async fn page_snapshot(&self) -> SondaResult<PageSnapshot>;

    /// Serialized document markup
    async fn content(&self) -> SondaResult<String>;

    /// Evaluate a script expression and return its JSON value
    async fn evaluate(&self, expression: &str) -> SondaResult<serde_json::Value>;

    /// Current network activity
    async fn network_activity(&self) -> SondaResult<NetworkActivity>;

    /// Console messages seen since launch
    fn console_messages(&self) -> Vec<ConsoleMessage>;

    /// Failed requests seen since launch
    fn failed_requests(&self) -> Vec<FailedRequest>;

    /// PNG screenshot
    async fn screenshot(&self, mode: CaptureMode) -> SondaResult<Vec<u8>>;

    /// Tear down the page and its browser. Must be idempotent.
    async fn close(&self) -> SondaResult<()>;
}

/// Starts a browser and hands back its page driver
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Launch a browser configured by `config`
    async fn launch(&self, config: &BrowserConfig) -> SondaResult<Box<dyn PageDriver>>;
}
