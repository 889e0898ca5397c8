//! In-memory page driver.
//!
//! [`MockLauncher`] serves scripted [`MockPage`]s by URL. Elements match
//! selectors by exact string, can appear after a delay, react to clicks
//! and key presses, and carry per-colour-scheme computed styles. All
//! timing uses `tokio::time`, so tests can run with a paused clock.

use super::{
    CaptureMode, ConsoleMessage, FailedRequest, Launcher, NavigationReply, NetworkActivity,
    NodeId, NodeState, PageDriver, ScrollTarget,
};
use crate::config::{BrowserConfig, ColorScheme, Viewport};
use crate::inspect::{BoundingBox, ElementSnapshot, PageSnapshot};
use crate::result::{SondaError, SondaResult};
use async_trait::async_trait;
use image::{ImageFormat, RgbaImage};
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// A state change triggered by a click or key press
#[derive(Debug, Clone, PartialEq)]
pub enum MockEffect {
    /// Attach a new element (its `appears_after` counts from now)
    Insert(MockElement),
    /// Detach every element matching a selector
    Remove(String),
    /// Add a class to `<html>`
    AddDocumentClass(String),
    /// Mark the network busy for a while
    NetworkBusy(Duration),
}

/// A scripted element
#[derive(Debug, Clone, PartialEq)]
pub struct MockElement {
    selectors: Vec<String>,
    text: String,
    html: String,
    classes: Vec<String>,
    attributes: BTreeMap<String, String>,
    styles: BTreeMap<String, String>,
    scheme_styles: HashMap<ColorScheme, BTreeMap<String, String>>,
    rect: BoundingBox,
    visible: bool,
    appears_after: Duration,
    on_click: Vec<MockEffect>,
    on_key: Vec<(String, MockEffect)>,
}

impl MockElement {
    /// Element matched by `selector`
    #[must_use]
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selectors: vec![selector.into()],
            text: String::new(),
            html: String::new(),
            classes: Vec::new(),
            attributes: BTreeMap::new(),
            styles: BTreeMap::new(),
            scheme_styles: HashMap::new(),
            rect: BoundingBox::new(0.0, 0.0, 100.0, 20.0),
            visible: true,
            appears_after: Duration::ZERO,
            on_click: Vec::new(),
            on_key: Vec::new(),
        }
    }

    /// Also match `selector`
    #[must_use]
    pub fn also_matches(mut self, selector: impl Into<String>) -> Self {
        self.selectors.push(selector.into());
        self
    }

    /// Inner text (also used as markup when none is set)
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Inner markup
    #[must_use]
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    /// Add a class
    #[must_use]
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Computed style under every colour scheme
    #[must_use]
    pub fn with_style(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.styles.insert(property.into(), value.into());
        self
    }

    /// Computed style under one colour scheme only
    #[must_use]
    pub fn with_scheme_style(
        mut self,
        scheme: ColorScheme,
        property: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.scheme_styles
            .entry(scheme)
            .or_default()
            .insert(property.into(), value.into());
        self
    }

    /// Document-space rectangle
    #[must_use]
    pub const fn with_rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.rect = BoundingBox::new(x, y, width, height);
        self
    }

    /// Attached but not rendered
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Attach only after `delay`
    #[must_use]
    pub const fn appears_after(mut self, delay: Duration) -> Self {
        self.appears_after = delay;
        self
    }

    /// Effect of clicking this element
    #[must_use]
    pub fn on_click(mut self, effect: MockEffect) -> Self {
        self.on_click.push(effect);
        self
    }

    /// Effect of pressing `key` while this element has focus
    #[must_use]
    pub fn on_key(mut self, key: impl Into<String>, effect: MockEffect) -> Self {
        self.on_key.push((key.into(), effect));
        self
    }

    fn matches(&self, selector: &str, text: Option<&str>) -> bool {
        self.selectors.iter().any(|s| s == selector)
            && text.map_or(true, |t| self.text.contains(t))
    }

    fn markup(&self) -> &str {
        if self.html.is_empty() {
            &self.text
        } else {
            &self.html
        }
    }
}

/// A scripted document
#[derive(Debug, Clone, PartialEq)]
pub struct MockPage {
    title: String,
    status: u16,
    document_classes: Vec<String>,
    body_classes: Vec<String>,
    elements: Vec<MockElement>,
    console: Vec<ConsoleMessage>,
    failed_requests: Vec<FailedRequest>,
    network_busy_for: Duration,
    height: f64,
    evaluations: BTreeMap<String, serde_json::Value>,
    key_effects: Vec<(String, MockEffect)>,
}

impl MockPage {
    /// Empty page with a title and status 200
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status: 200,
            document_classes: Vec::new(),
            body_classes: Vec::new(),
            elements: Vec::new(),
            console: Vec::new(),
            failed_requests: Vec::new(),
            network_busy_for: Duration::ZERO,
            height: 0.0,
            evaluations: BTreeMap::new(),
            key_effects: Vec::new(),
        }
    }

    /// HTTP status of the document
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Class on `<html>`
    #[must_use]
    pub fn with_document_class(mut self, class: impl Into<String>) -> Self {
        self.document_classes.push(class.into());
        self
    }

    /// Class on `<body>`
    #[must_use]
    pub fn with_body_class(mut self, class: impl Into<String>) -> Self {
        self.body_classes.push(class.into());
        self
    }

    /// Add an element
    #[must_use]
    pub fn with_element(mut self, element: MockElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Console output emitted on load
    #[must_use]
    pub fn with_console(mut self, level: &str, text: &str) -> Self {
        self.console.push(ConsoleMessage::new(level, text));
        self
    }

    /// A request that fails on load
    #[must_use]
    pub fn with_failed_request(mut self, url: &str, reason: &str) -> Self {
        self.failed_requests.push(FailedRequest::new(url, reason));
        self
    }

    /// Keep the network busy for `duration` after load
    #[must_use]
    pub const fn with_network_busy(mut self, duration: Duration) -> Self {
        self.network_busy_for = duration;
        self
    }

    /// Scrollable document height
    #[must_use]
    pub const fn with_height(mut self, height: f64) -> Self {
        self.height = height;
        self
    }

    /// Canned result for a script expression
    #[must_use]
    pub fn with_evaluation(mut self, expression: &str, value: serde_json::Value) -> Self {
        self.evaluations.insert(expression.to_string(), value);
        self
    }

    /// Effect of pressing `key` with no element focused
    #[must_use]
    pub fn on_key(mut self, key: impl Into<String>, effect: MockEffect) -> Self {
        self.key_effects.push((key.into(), effect));
        self
    }
}

/// What a URL serves
#[derive(Debug, Clone, PartialEq)]
pub enum MockRoute {
    /// A document
    Page(MockPage),
    /// A network failure with the given error text
    Unreachable(String),
    /// Never answers
    Hang,
}

/// Launches [`MockDriver`]s and keeps count of the live ones
#[derive(Debug, Clone, Default)]
pub struct MockLauncher {
    routes: Arc<BTreeMap<String, MockRoute>>,
    launch_failure: Option<String>,
    stalls: Arc<Vec<String>>,
    live: Arc<AtomicUsize>,
    launches: Arc<AtomicUsize>,
    history: Arc<Mutex<Vec<String>>>,
}

impl MockLauncher {
    /// Launcher with no routes; every URL fails DNS resolution
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `route` at `url`
    #[must_use]
    pub fn route(mut self, url: impl Into<String>, route: MockRoute) -> Self {
        Arc::make_mut(&mut self.routes).insert(url.into(), route);
        self
    }

    /// Make every launch fail
    #[must_use]
    pub fn failing_launch(mut self, message: impl Into<String>) -> Self {
        self.launch_failure = Some(message.into());
        self
    }

    /// Never answer driver calls starting with `call`, e.g. `count:.card`
    /// or `click:button`. Covers `query`, `count`, `click` and `describe`.
    #[must_use]
    pub fn stalling(mut self, call: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.stalls).push(call.into());
        self
    }

    /// Browsers launched and not yet closed
    #[must_use]
    pub fn live_browsers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Browsers launched in total
    #[must_use]
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Driver calls across every launched browser, e.g. `click:button[0]`
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Check if a call with this prefix was made
    #[must_use]
    pub fn was_called(&self, call: &str) -> bool {
        self.history().iter().any(|c| c.starts_with(call))
    }
}

#[async_trait]
impl Launcher for MockLauncher {
    async fn launch(&self, config: &BrowserConfig) -> SondaResult<Box<dyn PageDriver>> {
        if let Some(message) = &self.launch_failure {
            return Err(SondaError::launch(message.clone()));
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDriver {
            routes: Arc::clone(&self.routes),
            viewport: config.viewport,
            color_scheme: config.color_scheme,
            state: Mutex::new(MockState::default()),
            closed: AtomicBool::new(false),
            stalls: Arc::clone(&self.stalls),
            live: Arc::clone(&self.live),
            history: Arc::clone(&self.history),
        }))
    }
}

#[derive(Debug)]
struct MockNode {
    id: NodeId,
    element: MockElement,
    since: Instant,
    removed: bool,
}

impl MockNode {
    fn attached(&self, now: Instant) -> bool {
        !self.removed && now >= self.since + self.element.appears_after
    }
}

#[derive(Debug)]
struct LoadedPage {
    url: String,
    page: MockPage,
    nodes: Vec<MockNode>,
    busy_until: Instant,
    scroll_y: f64,
}

#[derive(Debug, Default)]
struct MockState {
    loaded: Option<LoadedPage>,
    next_node: NodeId,
    console: Vec<ConsoleMessage>,
    failed: Vec<FailedRequest>,
}

/// Driver for one scripted page
#[derive(Debug)]
pub struct MockDriver {
    routes: Arc<BTreeMap<String, MockRoute>>,
    viewport: Viewport,
    color_scheme: ColorScheme,
    state: Mutex<MockState>,
    closed: AtomicBool,
    stalls: Arc<Vec<String>>,
    live: Arc<AtomicUsize>,
    history: Arc<Mutex<Vec<String>>>,
}

impl MockDriver {
    fn state(&self) -> SondaResult<MutexGuard<'_, MockState>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SondaError::driver("browser has been closed"));
        }
        self.state
            .lock()
            .map_err(|_| SondaError::driver("mock state poisoned"))
    }

    fn record(&self, call: String) {
        if let Ok(mut history) = self.history.lock() {
            history.push(call);
        }
    }

    /// Hang forever if `call` was configured to stall
    async fn stall_point(&self, call: &str) {
        if self.stalls.iter().any(|s| call.starts_with(s.as_str())) {
            self.record(format!("stalled:{call}"));
            std::future::pending::<()>().await;
        }
    }

    fn node_label(&self, node: NodeId) -> SondaResult<String> {
        let state = self.state()?;
        Ok(state
            .loaded
            .as_ref()
            .map_or_else(|| format!("#{node}"), |l| Self::label(l, node)))
    }

    fn load(&self, state: &mut MockState, url: &str, page: &MockPage) {
        let now = Instant::now();
        let mut nodes = Vec::with_capacity(page.elements.len());
        for element in &page.elements {
            state.next_node += 1;
            nodes.push(MockNode {
                id: state.next_node,
                element: element.clone(),
                since: now,
                removed: false,
            });
        }
        state.console.extend(page.console.iter().cloned());
        state.failed.extend(page.failed_requests.iter().cloned());
        state.loaded = Some(LoadedPage {
            url: url.to_string(),
            page: page.clone(),
            nodes,
            busy_until: now + page.network_busy_for,
            scroll_y: 0.0,
        });
    }

    fn page_height(&self, loaded: &LoadedPage) -> f64 {
        let content = loaded
            .nodes
            .iter()
            .map(|n| n.element.rect.bottom())
            .fold(0.0, f64::max);
        loaded
            .page
            .height
            .max(content)
            .max(f64::from(self.viewport.height))
    }

    fn node_state_in(&self, loaded: &LoadedPage, node: NodeId) -> NodeState {
        let now = Instant::now();
        let Some(n) = loaded.nodes.iter().find(|n| n.id == node) else {
            return NodeState::DETACHED;
        };
        if !n.attached(now) {
            return NodeState::DETACHED;
        }
        let rect = n.element.rect;
        let top = rect.y - loaded.scroll_y;
        let bottom = top + rect.height;
        NodeState {
            attached: true,
            visible: n.element.visible && !rect.is_empty(),
            in_viewport: bottom > 0.0
                && top < f64::from(self.viewport.height)
                && rect.right() > 0.0
                && rect.x < f64::from(self.viewport.width),
        }
    }

    fn apply(&self, state: &mut MockState, effects: Vec<MockEffect>) {
        let now = Instant::now();
        for effect in effects {
            let mut fresh = None;
            if let Some(loaded) = state.loaded.as_mut() {
                match effect {
                    MockEffect::Insert(element) => {
                        loaded.busy_until = loaded.busy_until.max(now + element.appears_after);
                        fresh = Some(element);
                    }
                    MockEffect::Remove(selector) => {
                        for n in &mut loaded.nodes {
                            if n.element.matches(&selector, None) {
                                n.removed = true;
                            }
                        }
                    }
                    MockEffect::AddDocumentClass(class) => {
                        loaded.page.document_classes.push(class);
                    }
                    MockEffect::NetworkBusy(duration) => {
                        loaded.busy_until = loaded.busy_until.max(now + duration);
                    }
                }
            }
            if let Some(element) = fresh {
                state.next_node += 1;
                let id = state.next_node;
                if let Some(loaded) = state.loaded.as_mut() {
                    loaded.nodes.push(MockNode {
                        id,
                        element,
                        since: now,
                        removed: false,
                    });
                }
            }
        }
    }

    fn loaded_mut(state: &mut MockState) -> SondaResult<&mut LoadedPage> {
        state
            .loaded
            .as_mut()
            .ok_or_else(|| SondaError::driver("no document loaded"))
    }

    fn label(loaded: &LoadedPage, node: NodeId) -> String {
        loaded
            .nodes
            .iter()
            .find(|n| n.id == node)
            .and_then(|n| n.element.selectors.first().cloned())
            .unwrap_or_else(|| format!("#{node}"))
    }

    fn encode_png(width: u32, height: u32) -> SondaResult<Vec<u8>> {
        let image = RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255]));
        let mut buf = Vec::new();
        image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        Ok(buf)
    }
}

#[async_trait]
impl PageDriver for MockDriver {
    async fn navigate(&self, url: &str) -> SondaResult<NavigationReply> {
        self.record(format!("navigate:{url}"));
        let route = self.routes.get(url).cloned();
        let reply = {
            let mut state = self.state()?;
            match route {
                Some(MockRoute::Page(page)) => {
                    self.load(&mut state, url, &page);
                    Some(NavigationReply::Loaded {
                        status: Some(page.status),
                        url: url.to_string(),
                    })
                }
                Some(MockRoute::Unreachable(error_text)) => {
                    Some(NavigationReply::Failed { error_text })
                }
                Some(MockRoute::Hang) => None,
                None => Some(NavigationReply::Failed {
                    error_text: "net::ERR_NAME_NOT_RESOLVED".to_string(),
                }),
            }
        };
        match reply {
            Some(reply) => Ok(reply),
            None => std::future::pending().await,
        }
    }

    async fn query(&self, selector: &str, text: Option<&str>) -> SondaResult<Vec<NodeId>> {
        self.stall_point(&format!("query:{selector}")).await;
        let state = self.state()?;
        let now = Instant::now();
        Ok(state
            .loaded
            .iter()
            .flat_map(|l| &l.nodes)
            .filter(|n| n.attached(now) && n.element.matches(selector, text))
            .map(|n| n.id)
            .collect())
    }

    async fn count(&self, selector: &str, text: Option<&str>) -> SondaResult<usize> {
        self.stall_point(&format!("count:{selector}")).await;
        let state = self.state()?;
        let now = Instant::now();
        Ok(state
            .loaded
            .iter()
            .flat_map(|l| &l.nodes)
            .filter(|n| n.attached(now) && n.element.matches(selector, text))
            .count())
    }

    async fn node_state(&self, node: NodeId) -> SondaResult<NodeState> {
        let state = self.state()?;
        Ok(state
            .loaded
            .as_ref()
            .map_or(NodeState::DETACHED, |l| self.node_state_in(l, node)))
    }

    async fn scroll_into_view(&self, node: NodeId) -> SondaResult<()> {
        let mut state = self.state()?;
        let loaded = Self::loaded_mut(&mut state)?;
        self.record(format!("scroll_into_view:{}", Self::label(loaded, node)));
        let max_scroll = self.page_height(loaded) - f64::from(self.viewport.height);
        if let Some(n) = loaded.nodes.iter().find(|n| n.id == node) {
            loaded.scroll_y = n.element.rect.y.clamp(0.0, max_scroll.max(0.0));
        }
        Ok(())
    }

    async fn click(&self, node: NodeId) -> SondaResult<()> {
        let label = self.node_label(node)?;
        self.stall_point(&format!("click:{label}")).await;
        let mut state = self.state()?;
        let loaded = Self::loaded_mut(&mut state)?;
        if !self.node_state_in(loaded, node).attached {
            return Err(SondaError::driver(format!("node {node} is detached")));
        }
        self.record(format!("click:{}", Self::label(loaded, node)));
        let effects = loaded
            .nodes
            .iter()
            .find(|n| n.id == node)
            .map(|n| n.element.on_click.clone())
            .unwrap_or_default();
        self.apply(&mut state, effects);
        Ok(())
    }

    async fn fill(&self, node: NodeId, text: &str) -> SondaResult<()> {
        let mut state = self.state()?;
        let loaded = Self::loaded_mut(&mut state)?;
        self.record(format!("fill:{}={text}", Self::label(loaded, node)));
        let n = loaded
            .nodes
            .iter_mut()
            .find(|n| n.id == node)
            .ok_or_else(|| SondaError::driver(format!("node {node} is detached")))?;
        n.element
            .attributes
            .insert("value".to_string(), text.to_string());
        Ok(())
    }

    async fn press_key(&self, node: Option<NodeId>, key: &str) -> SondaResult<()> {
        let mut state = self.state()?;
        let loaded = Self::loaded_mut(&mut state)?;
        let effects: Vec<MockEffect> = match node {
            Some(node) => {
                self.record(format!("key:{}:{key}", Self::label(loaded, node)));
                loaded
                    .nodes
                    .iter()
                    .find(|n| n.id == node)
                    .map(|n| n.element.on_key.clone())
                    .unwrap_or_default()
            }
            None => {
                self.record(format!("key:{key}"));
                loaded.page.key_effects.clone()
            }
        }
        .into_iter()
        .filter(|(k, _)| k == key)
        .map(|(_, effect)| effect)
        .collect();
        self.apply(&mut state, effects);
        Ok(())
    }

    async fn scroll(&self, target: ScrollTarget) -> SondaResult<()> {
        let mut state = self.state()?;
        let loaded = Self::loaded_mut(&mut state)?;
        let max_scroll = (self.page_height(loaded) - f64::from(self.viewport.height)).max(0.0);
        loaded.scroll_y = match target {
            ScrollTarget::Top => 0.0,
            ScrollTarget::Bottom => max_scroll,
            ScrollTarget::By(dy) => (loaded.scroll_y + dy).clamp(0.0, max_scroll),
        };
        self.record(format!("scroll:{}", loaded.scroll_y));
        Ok(())
    }

    async fn describe(
        &self,
        node: NodeId,
        properties: &[String],
    ) -> SondaResult<Option<ElementSnapshot>> {
        let label = self.node_label(node)?;
        self.stall_point(&format!("describe:{label}")).await;
        let state = self.state()?;
        let Some(loaded) = state.loaded.as_ref() else {
            return Ok(None);
        };
        if !self.node_state_in(loaded, node).attached {
            return Ok(None);
        }
        let Some(n) = loaded.nodes.iter().find(|n| n.id == node) else {
            return Ok(None);
        };
        let element = &n.element;
        let scheme = element.scheme_styles.get(&self.color_scheme);
        let styles = properties
            .iter()
            .filter_map(|p| {
                scheme
                    .and_then(|s| s.get(p))
                    .or_else(|| element.styles.get(p))
                    .map(|v| (p.clone(), v.clone()))
            })
            .collect();
        let rect = element.rect;
        Ok(Some(ElementSnapshot {
            styles,
            bounds: BoundingBox::new(rect.x, rect.y - loaded.scroll_y, rect.width, rect.height),
            classes: element.classes.clone(),
            attributes: element.attributes.clone(),
            text: element.text.clone(),
            html: element.markup().to_string(),
        }))
    }

    async fn page_snapshot(&self) -> SondaResult<PageSnapshot> {
        let state = self.state()?;
        Ok(state
            .loaded
            .as_ref()
            .map_or_else(PageSnapshot::default, |l| PageSnapshot {
                title: l.page.title.clone(),
                url: l.url.clone(),
                document_classes: l.page.document_classes.clone(),
                body_classes: l.page.body_classes.clone(),
            }))
    }

    async fn content(&self) -> SondaResult<String> {
        let state = self.state()?;
        let Some(loaded) = state.loaded.as_ref() else {
            return Ok("<html><head></head><body></body></html>".to_string());
        };
        let now = Instant::now();
        let mut html = format!(
            "<html class=\"{}\"><head><title>{}</title></head><body class=\"{}\">",
            loaded.page.document_classes.join(" "),
            loaded.page.title,
            loaded.page.body_classes.join(" ")
        );
        for n in loaded.nodes.iter().filter(|n| n.attached(now)) {
            html.push_str(&format!(
                "<div class=\"{}\">{}</div>",
                n.element.classes.join(" "),
                n.element.markup()
            ));
        }
        html.push_str("</body></html>");
        Ok(html)
    }

    async fn evaluate(&self, expression: &str) -> SondaResult<serde_json::Value> {
        self.record(format!("evaluate:{expression}"));
        let state = self.state()?;
        Ok(state
            .loaded
            .as_ref()
            .and_then(|l| l.page.evaluations.get(expression).cloned())
            .unwrap_or(serde_json::Value::Null))
    }

    async fn network_activity(&self) -> SondaResult<NetworkActivity> {
        let state = self.state()?;
        let now = Instant::now();
        Ok(match state.loaded.as_ref() {
            Some(l) if now < l.busy_until => NetworkActivity {
                inflight: 1,
                idle_for: Duration::ZERO,
            },
            Some(l) => NetworkActivity {
                inflight: 0,
                idle_for: now - l.busy_until,
            },
            None => NetworkActivity::default(),
        })
    }

    fn console_messages(&self) -> Vec<ConsoleMessage> {
        self.state
            .lock()
            .map(|s| s.console.clone())
            .unwrap_or_default()
    }

    fn failed_requests(&self) -> Vec<FailedRequest> {
        self.state
            .lock()
            .map(|s| s.failed.clone())
            .unwrap_or_default()
    }

    async fn screenshot(&self, mode: CaptureMode) -> SondaResult<Vec<u8>> {
        let height = {
            let state = self.state()?;
            match (mode, state.loaded.as_ref()) {
                (CaptureMode::FullPage, Some(l)) => self.page_height(l).ceil() as u32,
                _ => self.viewport.height,
            }
        };
        self.record(format!("screenshot:{mode}"));
        Self::encode_png(self.viewport.width, height)
    }

    async fn close(&self) -> SondaResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.live.fetch_sub(1, Ordering::SeqCst);
            self.record("close".to_string());
        }
        Ok(())
    }
}

impl Drop for MockDriver {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launcher() -> MockLauncher {
        let page = MockPage::new("Library")
            .with_document_class("dark")
            .with_element(
                MockElement::new(".source-paper")
                    .with_style("background-color", "rgb(250, 248, 243)")
                    .with_scheme_style(ColorScheme::Dark, "color", "rgb(30, 30, 30)")
                    .with_rect(0.0, 100.0, 800.0, 400.0),
            )
            .with_element(
                MockElement::new("input.search-input").on_key(
                    "Enter",
                    MockEffect::Insert(
                        MockElement::new(".source-card")
                            .with_text("love")
                            .appears_after(Duration::from_millis(300)),
                    ),
                ),
            )
            .with_element(MockElement::new(".footer").with_rect(0.0, 2000.0, 800.0, 50.0));
        MockLauncher::new().route("http://app.test/", MockRoute::Page(page))
    }

    async fn open(launcher: &MockLauncher, config: &BrowserConfig) -> Box<dyn PageDriver> {
        let driver = launcher.launch(config).await.unwrap();
        driver.navigate("http://app.test/").await.unwrap();
        driver
    }

    #[tokio::test]
    async fn test_scheme_styles_override_base() {
        let launcher = launcher();
        let config = BrowserConfig::new().with_color_scheme(ColorScheme::Dark);
        let dark = open(&launcher, &config).await;
        let node = dark.query(".source-paper", None).await.unwrap()[0];
        let props = vec!["background-color".to_string(), "color".to_string()];
        let snap = dark.describe(node, &props).await.unwrap().unwrap();
        assert_eq!(snap.style("color"), Some("rgb(30, 30, 30)"));
        assert_eq!(snap.style("background-color"), Some("rgb(250, 248, 243)"));

        let light = open(&launcher, &BrowserConfig::new()).await;
        let node = light.query(".source-paper", None).await.unwrap()[0];
        let snap = light.describe(node, &props).await.unwrap().unwrap();
        assert_eq!(snap.style("color"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_effect_inserts_after_delay() {
        let launcher = launcher();
        let driver = open(&launcher, &BrowserConfig::new()).await;
        let input = driver.query("input.search-input", None).await.unwrap()[0];
        driver.press_key(Some(input), "Enter").await.unwrap();
        assert_eq!(driver.count(".source-card", None).await.unwrap(), 0);
        assert_eq!(driver.network_activity().await.unwrap().inflight, 1);
        tokio::time::advance(Duration::from_millis(300)).await;
        assert_eq!(driver.count(".source-card", Some("love")).await.unwrap(), 1);
        assert_eq!(driver.network_activity().await.unwrap().inflight, 0);
        assert!(launcher.was_called("key:input.search-input:Enter"));
    }

    #[tokio::test]
    async fn test_stale_nodes_after_navigation() {
        let launcher = launcher();
        let driver = open(&launcher, &BrowserConfig::new()).await;
        let node = driver.query(".source-paper", None).await.unwrap()[0];
        driver.navigate("http://app.test/").await.unwrap();
        assert_eq!(driver.node_state(node).await.unwrap(), NodeState::DETACHED);
    }

    #[tokio::test]
    async fn test_viewport_tracking() {
        let launcher = launcher();
        let driver = open(&launcher, &BrowserConfig::new()).await;
        let footer = driver.query(".footer", None).await.unwrap()[0];
        assert!(!driver.node_state(footer).await.unwrap().in_viewport);
        driver.scroll_into_view(footer).await.unwrap();
        assert!(driver.node_state(footer).await.unwrap().in_viewport);
        driver.scroll(ScrollTarget::Top).await.unwrap();
        assert!(!driver.node_state(footer).await.unwrap().in_viewport);
    }

    #[tokio::test]
    async fn test_screenshot_dimensions() {
        let launcher = launcher();
        let driver = open(&launcher, &BrowserConfig::new().with_viewport(320, 568)).await;
        let png = driver.screenshot(CaptureMode::FullPage).await.unwrap();
        let image = image::load_from_memory(&png).unwrap();
        assert_eq!((image.width(), image.height()), (320, 2050));
        let png = driver.screenshot(CaptureMode::Viewport).await.unwrap();
        let image = image::load_from_memory(&png).unwrap();
        assert_eq!(image.height(), 568);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_call_never_answers() {
        let launcher = launcher().stalling("count:.source-paper");
        let driver = open(&launcher, &BrowserConfig::new()).await;
        let stalled = tokio::time::timeout(
            Duration::from_secs(60),
            driver.count(".source-paper", None),
        )
        .await;
        assert!(stalled.is_err());
        assert_eq!(driver.count(".footer", None).await.unwrap(), 1);
        assert!(launcher.was_called("stalled:count:.source-paper"));
    }

    #[tokio::test]
    async fn test_close_releases_browser() {
        let launcher = launcher();
        let driver = launcher.launch(&BrowserConfig::new()).await.unwrap();
        assert_eq!(launcher.live_browsers(), 1);
        driver.close().await.unwrap();
        driver.close().await.unwrap();
        assert_eq!(launcher.live_browsers(), 0);
        assert!(driver.navigate("http://app.test/").await.is_err());
        drop(driver);
        assert_eq!(launcher.live_browsers(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases_browser() {
        let launcher = launcher();
        let driver = launcher.launch(&BrowserConfig::new()).await.unwrap();
        drop(driver);
        assert_eq!(launcher.live_browsers(), 0);
        assert_eq!(launcher.launches(), 1);
    }
}
