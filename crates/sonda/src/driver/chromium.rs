//! Chromium driver over CDP (chromiumoxide).
//!
//! Element ids live in a page-side registry (`window.__sonda`) keyed by a
//! `WeakMap`, so resolving elements never writes to the DOM. A navigation
//! replaces `window`, which drops the registry and turns old ids stale.
//! Every script returns a JSON string so `null` and `undefined` survive
//! the round trip.

#![allow(clippy::items_after_statements, clippy::similar_names)]

use super::{
    CaptureMode, ConsoleMessage, FailedRequest, Launcher, NavigationReply, NetworkActivity,
    NodeId, NodeState, PageDriver, ScrollTarget,
};
use crate::config::BrowserConfig;
use crate::inspect::{ElementSnapshot, PageSnapshot};
use crate::result::{SondaError, SondaResult};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    MediaFeature, SetDeviceMetricsOverrideParams, SetEmulatedMediaParams,
};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, EventLoadingFailed, EventLoadingFinished,
    EventRequestWillBeSent, Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams, NavigateParams, Viewport as ClipRect,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    EnableParams as RuntimeEnableParams, EventConsoleApiCalled, EventExceptionThrown,
};
use chromiumoxide::cdp::IntoEventKind;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Requests older than this no longer count as in flight (long polls,
/// event streams).
const STALLED_REQUEST_MS: u64 = 2_000;

const REGISTRY: &str =
    "(window.__sonda = window.__sonda || { next: 1, nodes: new Map(), ids: new WeakMap() })";

fn cdp(err: impl std::fmt::Display) -> SondaError {
    SondaError::driver(err.to_string())
}

fn js(value: impl serde::Serialize) -> String {
    serde_json::to_value(value)
        .unwrap_or(serde_json::Value::Null)
        .to_string()
}

/// Fresh profile directory for one browser; removed when dropped
fn profile_dir() -> SondaResult<TempDir> {
    tempfile::Builder::new()
        .prefix("sonda-profile-")
        .tempdir()
        .map_err(|e| SondaError::launch(format!("profile directory: {e}")))
}

/// Launches a local Chromium per session
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromiumLauncher;

impl ChromiumLauncher {
    /// Create a launcher
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Launcher for ChromiumLauncher {
    async fn launch(&self, config: &BrowserConfig) -> SondaResult<Box<dyn PageDriver>> {
        let profile = profile_dir()?;
        let mut builder = CdpConfig::builder()
            .user_data_dir(profile.path())
            .window_size(config.viewport.width, config.viewport.height);
        if !config.headless {
            builder = builder.with_head();
        }
        if !config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = config.chromium_path {
            builder = builder.chrome_executable(path);
        }
        let cdp_config = builder.build().map_err(SondaError::launch)?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| SondaError::launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        match ChromiumDriver::prepare(&browser, config).await {
            Ok((page, events, tasks)) => {
                info!(
                    viewport = %config.viewport,
                    profile = %profile.path().display(),
                    "chromium launched"
                );
                Ok(Box::new(ChromiumDriver {
                    browser: Mutex::new(browser),
                    page,
                    events,
                    tasks,
                    handler,
                    closed: AtomicBool::new(false),
                    _profile: profile,
                }))
            }
            Err(e) => {
                let mut browser = browser;
                if let Err(close_err) = browser.close().await {
                    warn!(error = %close_err, "closing half-launched browser failed");
                }
                let _ = browser.wait().await;
                handler.abort();
                Err(SondaError::launch(e.to_string()))
            }
        }
    }
}

#[derive(Debug, Default)]
struct PageEvents {
    inflight: HashMap<String, Instant>,
    urls: HashMap<String, String>,
    last_activity: Option<Instant>,
    console: Vec<ConsoleMessage>,
    failed: Vec<FailedRequest>,
}

impl PageEvents {
    fn started(&mut self, id: String, url: String) {
        let now = Instant::now();
        self.inflight.insert(id.clone(), now);
        self.urls.insert(id, url);
        self.last_activity = Some(now);
    }

    fn finished(&mut self, id: &str) {
        self.inflight.remove(id);
        self.urls.remove(id);
        self.last_activity = Some(Instant::now());
    }

    fn failed(&mut self, id: &str, reason: &str) {
        if let Some(url) = self.urls.get(id).cloned() {
            self.failed.push(FailedRequest::new(url, reason));
        }
        self.finished(id);
    }

    fn activity(&self) -> NetworkActivity {
        let now = Instant::now();
        let stall = Duration::from_millis(STALLED_REQUEST_MS);
        NetworkActivity {
            inflight: self
                .inflight
                .values()
                .filter(|started| now.duration_since(**started) < stall)
                .count(),
            idle_for: self
                .last_activity
                .map_or(Duration::MAX, |t| now.duration_since(t)),
        }
    }
}

fn spawn_listener<T, F>(
    mut stream: EventStream<T>,
    events: Arc<StdMutex<PageEvents>>,
    apply: F,
) -> JoinHandle<()>
where
    T: IntoEventKind + Unpin + Send + Sync + 'static,
    F: Fn(&mut PageEvents, &T) + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            if let Ok(mut guard) = events.lock() {
                apply(&mut *guard, &*event);
            }
        }
    })
}

fn remote_text(args: &[chromiumoxide::cdp::js_protocol::runtime::RemoteObject]) -> String {
    args.iter()
        .map(|arg| match &arg.value {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => arg.description.clone().unwrap_or_default(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A key as CDP wants it dispatched
#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyDefinition {
    key: String,
    code: String,
    key_code: i64,
    text: Option<String>,
}

impl KeyDefinition {
    fn for_key(key: &str) -> Self {
        let named = |code: &str, key_code: i64, text: Option<&str>| Self {
            key: key.to_string(),
            code: code.to_string(),
            key_code,
            text: text.map(str::to_string),
        };
        match key {
            "Enter" => named("Enter", 13, Some("\r")),
            "Escape" => named("Escape", 27, None),
            "Tab" => named("Tab", 9, None),
            "Backspace" => named("Backspace", 8, None),
            "Delete" => named("Delete", 46, None),
            "ArrowLeft" => named("ArrowLeft", 37, None),
            "ArrowUp" => named("ArrowUp", 38, None),
            "ArrowRight" => named("ArrowRight", 39, None),
            "ArrowDown" => named("ArrowDown", 40, None),
            "Home" => named("Home", 36, None),
            "End" => named("End", 35, None),
            "PageUp" => named("PageUp", 33, None),
            "PageDown" => named("PageDown", 34, None),
            " " | "Space" => Self {
                key: " ".to_string(),
                code: "Space".to_string(),
                key_code: 32,
                text: Some(" ".to_string()),
            },
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_alphabetic() => Self {
                        key: other.to_string(),
                        code: format!("Key{}", c.to_ascii_uppercase()),
                        key_code: i64::from(c.to_ascii_uppercase() as u8),
                        text: Some(other.to_string()),
                    },
                    (Some(c), None) if c.is_ascii_digit() => Self {
                        key: other.to_string(),
                        code: format!("Digit{c}"),
                        key_code: i64::from(c as u8),
                        text: Some(other.to_string()),
                    },
                    (Some(_), None) => Self {
                        key: other.to_string(),
                        code: String::new(),
                        key_code: 0,
                        text: Some(other.to_string()),
                    },
                    _ => named(other, 0, None),
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNodeState {
    attached: bool,
    visible: bool,
    in_viewport: bool,
}

#[derive(Debug, Deserialize)]
struct DocumentInfo {
    status: Option<u16>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct Point {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct DocumentSize {
    width: f64,
    height: f64,
}

/// Driver for one Chromium page
#[derive(Debug)]
pub struct ChromiumDriver {
    browser: Mutex<Browser>,
    page: Page,
    events: Arc<StdMutex<PageEvents>>,
    tasks: Vec<JoinHandle<()>>,
    handler: JoinHandle<()>,
    closed: AtomicBool,
    // Declared last so the browser is gone before its profile is removed
    _profile: TempDir,
}

impl ChromiumDriver {
    async fn prepare(
        browser: &Browser,
        config: &BrowserConfig,
    ) -> SondaResult<(Page, Arc<StdMutex<PageEvents>>, Vec<JoinHandle<()>>)> {
        let page = browser.new_page("about:blank").await.map_err(cdp)?;

        let viewport = config.viewport;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            1.0,
            viewport.is_mobile(),
        ))
        .await
        .map_err(cdp)?;

        if config.color_scheme != crate::config::ColorScheme::NoPreference {
            let media = SetEmulatedMediaParams::builder()
                .features(vec![MediaFeature::new(
                    "prefers-color-scheme",
                    config.color_scheme.media_value(),
                )])
                .build();
            page.execute(media).await.map_err(cdp)?;
        }
        if let Some(ua) = &config.user_agent {
            page.execute(SetUserAgentOverrideParams::new(ua.clone()))
                .await
                .map_err(cdp)?;
        }

        page.execute(NetworkEnableParams::default())
            .await
            .map_err(cdp)?;
        page.execute(RuntimeEnableParams::default())
            .await
            .map_err(cdp)?;
        if !config.extra_headers.is_empty() {
            let headers = Headers::new(serde_json::to_value(&config.extra_headers)?);
            page.execute(SetExtraHttpHeadersParams::new(headers))
                .await
                .map_err(cdp)?;
        }

        let events = Arc::new(StdMutex::new(PageEvents::default()));
        let tasks = vec![
            spawn_listener(
                page.event_listener::<EventRequestWillBeSent>()
                    .await
                    .map_err(cdp)?,
                Arc::clone(&events),
                |e, ev: &EventRequestWillBeSent| {
                    e.started(ev.request_id.as_ref().to_string(), ev.request.url.clone());
                },
            ),
            spawn_listener(
                page.event_listener::<EventLoadingFinished>()
                    .await
                    .map_err(cdp)?,
                Arc::clone(&events),
                |e, ev: &EventLoadingFinished| e.finished(ev.request_id.as_ref()),
            ),
            spawn_listener(
                page.event_listener::<EventLoadingFailed>()
                    .await
                    .map_err(cdp)?,
                Arc::clone(&events),
                |e, ev: &EventLoadingFailed| e.failed(ev.request_id.as_ref(), &ev.error_text),
            ),
            spawn_listener(
                page.event_listener::<EventConsoleApiCalled>()
                    .await
                    .map_err(cdp)?,
                Arc::clone(&events),
                |e, ev: &EventConsoleApiCalled| {
                    let level = format!("{:?}", ev.r#type).to_lowercase();
                    e.console.push(ConsoleMessage::new(level, remote_text(&ev.args)));
                },
            ),
            spawn_listener(
                page.event_listener::<EventExceptionThrown>()
                    .await
                    .map_err(cdp)?,
                Arc::clone(&events),
                |e, ev: &EventExceptionThrown| {
                    let details = &ev.exception_details;
                    let text = details
                        .exception
                        .as_ref()
                        .and_then(|ex| ex.description.clone())
                        .unwrap_or_else(|| details.text.clone());
                    e.console.push(ConsoleMessage::new("error", text));
                },
            ),
        ];
        Ok((page, events, tasks))
    }

    fn check_open(&self) -> SondaResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SondaError::driver("browser has been closed"));
        }
        Ok(())
    }

    /// Evaluate a script that returns a JSON string and decode it
    async fn eval_json<T: DeserializeOwned>(&self, script: String) -> SondaResult<T> {
        self.check_open()?;
        let raw: String = self
            .page
            .evaluate(script)
            .await
            .map_err(cdp)?
            .into_value()
            .map_err(cdp)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Run `body` against the registered element bound to `el`
    async fn with_node<T: DeserializeOwned>(
        &self,
        node: NodeId,
        body: &str,
        detached: &str,
    ) -> SondaResult<T> {
        self.eval_json(format!(
            "(() => {{ const el = {REGISTRY}.nodes.get({node}); \
             if (!el || !el.isConnected) return JSON.stringify({detached}); \
             {body} }})()"
        ))
        .await
    }

    async fn dispatch_key(
        &self,
        def: &KeyDefinition,
        kind: DispatchKeyEventType,
    ) -> SondaResult<()> {
        let mut builder = DispatchKeyEventParams::builder()
            .r#type(kind.clone())
            .key(def.key.clone())
            .windows_virtual_key_code(def.key_code)
            .native_virtual_key_code(def.key_code);
        if !def.code.is_empty() {
            builder = builder.code(def.code.clone());
        }
        if kind != DispatchKeyEventType::KeyUp {
            if let Some(text) = &def.text {
                builder = builder.text(text.clone());
            }
        }
        self.page
            .execute(builder.build().map_err(cdp)?)
            .await
            .map_err(cdp)?;
        Ok(())
    }

    async fn dispatch_mouse(
        &self,
        kind: DispatchMouseEventType,
        x: f64,
        y: f64,
    ) -> SondaResult<()> {
        let params = DispatchMouseEventParams::builder()
            .r#type(kind)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(cdp)?;
        self.page.execute(params).await.map_err(cdp)?;
        Ok(())
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn navigate(&self, url: &str) -> SondaResult<NavigationReply> {
        self.check_open()?;
        if let Ok(mut events) = self.events.lock() {
            events.inflight.clear();
            events.urls.clear();
        }
        let reply = self
            .page
            .execute(NavigateParams::new(url))
            .await
            .map_err(cdp)?;
        if let Some(error_text) = reply.result.error_text.clone() {
            return Ok(NavigationReply::Failed { error_text });
        }
        self.page.wait_for_navigation().await.map_err(cdp)?;
        let info: DocumentInfo = self
            .eval_json(
                "(() => { const e = performance.getEntriesByType('navigation')[0]; \
                 return JSON.stringify({ status: e && e.responseStatus ? e.responseStatus : null, \
                 url: location.href }); })()"
                    .to_string(),
            )
            .await?;
        Ok(NavigationReply::Loaded {
            status: info.status,
            url: info.url,
        })
    }

    async fn query(&self, selector: &str, text: Option<&str>) -> SondaResult<Vec<NodeId>> {
        self.eval_json(format!(
            "(() => {{ const reg = {REGISTRY}; const text = {text}; const out = []; \
             for (const el of document.querySelectorAll({selector})) {{ \
               const shown = el.innerText || el.textContent || ''; \
               if (text !== null && !shown.includes(text)) continue; \
               let id = reg.ids.get(el); \
               if (id === undefined) {{ \
                 id = reg.next++; reg.ids.set(el, id); reg.nodes.set(id, el); \
               }} \
               out.push(id); \
             }} \
             return JSON.stringify(out); }})()",
            selector = js(selector),
            text = js(text),
        ))
        .await
    }

    async fn count(&self, selector: &str, text: Option<&str>) -> SondaResult<usize> {
        self.eval_json(format!(
            "(() => {{ const text = {text}; const all = document.querySelectorAll({selector}); \
             if (text === null) return JSON.stringify(all.length); \
             let n = 0; for (const el of all) {{ \
               if ((el.innerText || el.textContent || '').includes(text)) n++; }} \
             return JSON.stringify(n); }})()",
            selector = js(selector),
            text = js(text),
        ))
        .await
    }

    async fn node_state(&self, node: NodeId) -> SondaResult<NodeState> {
        let raw: RawNodeState = self
            .with_node(
                node,
                "const r = el.getBoundingClientRect(); const cs = getComputedStyle(el); \
                 const visible = r.width > 0 && r.height > 0 && cs.visibility !== 'hidden' \
                   && cs.display !== 'none' && parseFloat(cs.opacity || '1') > 0; \
                 const inViewport = r.bottom > 0 && r.right > 0 \
                   && r.top < window.innerHeight && r.left < window.innerWidth; \
                 return JSON.stringify({ attached: true, visible, inViewport });",
                "{ attached: false, visible: false, inViewport: false }",
            )
            .await?;
        Ok(NodeState {
            attached: raw.attached,
            visible: raw.visible,
            in_viewport: raw.in_viewport,
        })
    }

    async fn scroll_into_view(&self, node: NodeId) -> SondaResult<()> {
        let _: bool = self
            .with_node(
                node,
                "el.scrollIntoView({ block: 'center', inline: 'nearest' }); \
                 return JSON.stringify(true);",
                "false",
            )
            .await?;
        Ok(())
    }

    async fn click(&self, node: NodeId) -> SondaResult<()> {
        let center: Option<Point> = self
            .with_node(
                node,
                "const r = el.getBoundingClientRect(); \
                 return JSON.stringify({ x: r.x + r.width / 2, y: r.y + r.height / 2 });",
                "null",
            )
            .await?;
        let Some(Point { x, y }) = center else {
            return Err(SondaError::driver(format!("node {node} is detached")));
        };
        debug!(node, x, y, "click");
        self.dispatch_mouse(DispatchMouseEventType::MouseMoved, x, y)
            .await?;
        self.dispatch_mouse(DispatchMouseEventType::MousePressed, x, y)
            .await?;
        self.dispatch_mouse(DispatchMouseEventType::MouseReleased, x, y)
            .await
    }

    async fn fill(&self, node: NodeId, text: &str) -> SondaResult<()> {
        let focused: bool = self
            .with_node(
                node,
                "el.focus(); \
                 if ('value' in el) { \
                   el.value = ''; el.dispatchEvent(new Event('input', { bubbles: true })); \
                 } \
                 else if (el.isContentEditable) { el.textContent = ''; } \
                 return JSON.stringify(document.activeElement === el);",
                "false",
            )
            .await?;
        if !focused {
            return Err(SondaError::driver(format!("node {node} did not take focus")));
        }
        self.page
            .execute(InsertTextParams::new(text))
            .await
            .map_err(cdp)?;
        Ok(())
    }

    async fn press_key(&self, node: Option<NodeId>, key: &str) -> SondaResult<()> {
        if let Some(node) = node {
            let _: bool = self
                .with_node(node, "el.focus(); return JSON.stringify(true);", "false")
                .await?;
        }
        let def = KeyDefinition::for_key(key);
        let down = if def.text.is_some() {
            DispatchKeyEventType::KeyDown
        } else {
            DispatchKeyEventType::RawKeyDown
        };
        self.dispatch_key(&def, down).await?;
        self.dispatch_key(&def, DispatchKeyEventType::KeyUp).await
    }

    async fn scroll(&self, target: ScrollTarget) -> SondaResult<()> {
        let script = match target {
            ScrollTarget::Top => "window.scrollTo(0, 0)".to_string(),
            ScrollTarget::Bottom => {
                "window.scrollTo(0, document.documentElement.scrollHeight)".to_string()
            }
            ScrollTarget::By(dy) => format!("window.scrollBy(0, {dy})"),
        };
        let _: bool = self
            .eval_json(format!("(() => {{ {script}; return JSON.stringify(true); }})()"))
            .await?;
        Ok(())
    }

    async fn describe(
        &self,
        node: NodeId,
        properties: &[String],
    ) -> SondaResult<Option<ElementSnapshot>> {
        let body = format!(
            "const cs = getComputedStyle(el); const styles = {{}}; \
             for (const p of {props}) {{ \
               let v = cs.getPropertyValue(p); \
               if (p === 'line-height' && v === 'normal') {{ \
                 const ruler = document.createElement('div'); \
                 ruler.textContent = 'M'; \
                 ruler.style.cssText = 'position:absolute;visibility:hidden;left:-9999px;top:0;' \
                   + 'white-space:nowrap;padding:0;border:0;line-height:normal'; \
                 ruler.style.fontFamily = cs.fontFamily; ruler.style.fontSize = cs.fontSize; \
                 ruler.style.fontWeight = cs.fontWeight; ruler.style.fontStyle = cs.fontStyle; \
                 document.body.appendChild(ruler); \
                 v = ruler.getBoundingClientRect().height + 'px'; \
                 ruler.remove(); \
               }} \
               if (v !== '') styles[p] = v; \
             }} \
             const r = el.getBoundingClientRect(); const attributes = {{}}; \
             for (const a of el.attributes) attributes[a.name] = a.value; \
             return JSON.stringify({{ styles, \
               bounds: {{ x: r.x, y: r.y, width: r.width, height: r.height }}, \
               classes: Array.from(el.classList), attributes, \
               text: el.innerText ?? el.textContent ?? '', html: el.innerHTML }});",
            props = js(properties),
        );
        self.with_node(node, &body, "null").await
    }

    async fn page_snapshot(&self) -> SondaResult<PageSnapshot> {
        self.eval_json(
            "JSON.stringify({ title: document.title, url: location.href, \
             document_classes: Array.from(document.documentElement.classList), \
             body_classes: document.body ? Array.from(document.body.classList) : [] })"
                .to_string(),
        )
        .await
    }

    async fn content(&self) -> SondaResult<String> {
        self.check_open()?;
        self.page.content().await.map_err(cdp)
    }

    async fn evaluate(&self, expression: &str) -> SondaResult<serde_json::Value> {
        self.eval_json(format!("JSON.stringify(({expression}) ?? null)"))
            .await
    }

    async fn network_activity(&self) -> SondaResult<NetworkActivity> {
        self.check_open()?;
        Ok(self
            .events
            .lock()
            .map(|e| e.activity())
            .unwrap_or_default())
    }

    fn console_messages(&self) -> Vec<ConsoleMessage> {
        self.events
            .lock()
            .map(|e| e.console.clone())
            .unwrap_or_default()
    }

    fn failed_requests(&self) -> Vec<FailedRequest> {
        self.events
            .lock()
            .map(|e| e.failed.clone())
            .unwrap_or_default()
    }

    async fn screenshot(&self, mode: CaptureMode) -> SondaResult<Vec<u8>> {
        self.check_open()?;
        let mut params = CaptureScreenshotParams::builder().format(CaptureScreenshotFormat::Png);
        if mode == CaptureMode::FullPage {
            let size: DocumentSize = self
                .eval_json(
                    "JSON.stringify({ width: document.documentElement.scrollWidth, \
                     height: document.documentElement.scrollHeight })"
                        .to_string(),
                )
                .await?;
            params = params.capture_beyond_viewport(true).clip(ClipRect {
                x: 0.0,
                y: 0.0,
                width: size.width,
                height: size.height,
                scale: 1.0,
            });
        }
        let screenshot = self.page.execute(params.build()).await.map_err(cdp)?;

        use base64::Engine;
        let data: &str = screenshot.data.as_ref();
        base64::engine::general_purpose::STANDARD
            .decode(data.as_bytes())
            .map_err(|e| SondaError::driver(format!("screenshot decode failed: {e}")))
    }

    async fn close(&self) -> SondaResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for task in &self.tasks {
            task.abort();
        }
        let mut browser = self.browser.lock().await;
        let closed = browser.close().await.map_err(cdp);
        if let Err(e) = browser.wait().await {
            warn!(error = %e, "waiting for chromium to exit failed");
        }
        self.handler.abort();
        info!("chromium closed");
        closed.map(|_| ())
    }
}

impl Drop for ChromiumDriver {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.handler.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_launch_gets_its_own_profile() {
        let first = profile_dir().unwrap();
        let second = profile_dir().unwrap();
        assert_ne!(first.path(), second.path());
        assert!(first.path().is_dir());
        let name = first.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("sonda-profile-"), "{name}");

        let path = first.path().to_path_buf();
        drop(first);
        assert!(!path.exists());
    }

    #[test]
    fn test_named_keys() {
        let enter = KeyDefinition::for_key("Enter");
        assert_eq!(enter.key_code, 13);
        assert_eq!(enter.text.as_deref(), Some("\r"));
        let escape = KeyDefinition::for_key("Escape");
        assert_eq!(escape.code, "Escape");
        assert_eq!(escape.text, None);
    }

    #[test]
    fn test_character_keys() {
        let a = KeyDefinition::for_key("a");
        assert_eq!(a.code, "KeyA");
        assert_eq!(a.key_code, 65);
        assert_eq!(a.text.as_deref(), Some("a"));
        let seven = KeyDefinition::for_key("7");
        assert_eq!(seven.code, "Digit7");
        let space = KeyDefinition::for_key("Space");
        assert_eq!(space.key, " ");
    }

    #[test]
    fn test_unknown_named_key_has_no_text() {
        let f5 = KeyDefinition::for_key("F5");
        assert_eq!(f5.key, "F5");
        assert_eq!(f5.text, None);
    }

    #[test]
    fn test_stalled_requests_do_not_count() {
        let mut events = PageEvents::default();
        events.started("1".into(), "http://app/api".into());
        assert_eq!(events.activity().inflight, 1);
        events
            .inflight
            .insert("2".into(), Instant::now() - Duration::from_secs(10));
        assert_eq!(events.activity().inflight, 1);
        events.failed("1", "net::ERR_FAILED");
        assert_eq!(events.activity().inflight, 0);
        assert_eq!(events.failed[0].url, "http://app/api");
    }

    #[test]
    fn test_js_literals() {
        assert_eq!(js("a\"b"), "\"a\\\"b\"");
        assert_eq!(js(None::<&str>), "null");
    }
}
