//! Inspector: rendered element and page state.
//!
//! Snapshots hold computed values (after the cascade and after media
//! queries for the emulated colour scheme), never authored ones. Length
//! values come back from the driver in absolute pixels; `line-height:
//! normal` is measured in the page before it reaches us.

use crate::locator::ElementHandle;
use crate::result::SondaResult;
use crate::session::Session;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use tracing::debug;

/// Bounding box for an element, relative to the viewport
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl BoundingBox {
    /// Create a new bounding box
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge
    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge
    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Get the center point
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Whether the box has a rendered area
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Point-in-time capture of one element
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementSnapshot {
    /// Requested computed style properties
    pub styles: BTreeMap<String, String>,
    /// Bounding rectangle
    pub bounds: BoundingBox,
    /// Class list in document order
    pub classes: Vec<String>,
    /// Attribute map
    pub attributes: BTreeMap<String, String>,
    /// Rendered inner text
    pub text: String,
    /// Raw inner markup
    pub html: String,
}

impl ElementSnapshot {
    /// Raw computed value of a style property
    #[must_use]
    pub fn style(&self, property: &str) -> Option<&str> {
        self.styles.get(property).map(String::as_str)
    }

    /// A style property in pixels
    #[must_use]
    pub fn style_px(&self, property: &str) -> Option<f64> {
        self.style(property).and_then(parse_px)
    }

    /// A colour-valued style property
    #[must_use]
    pub fn color(&self, property: &str) -> Option<Rgba> {
        self.style(property).and_then(parse_color)
    }

    /// Whether the class list contains `class`
    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// Attribute value
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// `line-height / font-size`, both in pixels
    #[must_use]
    pub fn line_height_ratio(&self) -> Option<f64> {
        let line_height = self.style_px("line-height")?;
        let font_size = self.style_px("font-size")?;
        (font_size > 0.0).then(|| line_height / font_size)
    }
}

/// Document-level facts
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Document title
    pub title: String,
    /// Current URL
    pub url: String,
    /// Classes on `<html>`
    pub document_classes: Vec<String>,
    /// Classes on `<body>`
    pub body_classes: Vec<String>,
}

impl PageSnapshot {
    /// Whether either root element carries `class`
    #[must_use]
    pub fn has_root_class(&self, class: &str) -> bool {
        self.document_classes
            .iter()
            .chain(&self.body_classes)
            .any(|c| c == class)
    }
}

/// An sRGB colour with alpha
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    /// Red channel
    pub r: u8,
    /// Green channel
    pub g: u8,
    /// Blue channel
    pub b: u8,
    /// Alpha in `0.0..=1.0`
    pub a: f32,
}

impl Rgba {
    /// Opaque colour
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Compare the colour channels, ignoring alpha
    #[must_use]
    pub fn same_rgb(&self, other: &Self) -> bool {
        self.r == other.r && self.g == other.g && self.b == other.b
    }

    /// Relative luminance in `0.0..=1.0` (WCAG definition)
    #[must_use]
    pub fn luminance(&self) -> f64 {
        fn channel(c: u8) -> f64 {
            let c = f64::from(c) / 255.0;
            if c <= 0.039_28 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        }
        0.0722f64.mul_add(
            channel(self.b),
            0.2126f64.mul_add(channel(self.r), 0.7152 * channel(self.g)),
        )
    }

    /// WCAG contrast ratio against `other`, in `1.0..=21.0`
    #[must_use]
    pub fn contrast_ratio(&self, other: &Self) -> f64 {
        let (a, b) = (self.luminance(), other.luminance());
        (a.max(b) + 0.05) / (a.min(b) + 0.05)
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if (self.a - 1.0).abs() < f32::EPSILON {
            write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
        } else {
            write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
        }
    }
}

/// Parse a computed pixel length such as `24px` or `18.5px`.
///
/// Unitless zero is accepted. Anything else (`normal`, `em`, `%`) is `None`.
#[must_use]
pub fn parse_px(value: &str) -> Option<f64> {
    let value = value.trim();
    if value == "0" {
        return Some(0.0);
    }
    let number = value.strip_suffix("px")?.trim();
    number.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parse a computed colour: `rgb(r, g, b)`, `rgba(r, g, b, a)` or the
/// space-separated `rgb(r g b / a)` form.
#[must_use]
pub fn parse_color(value: &str) -> Option<Rgba> {
    let value = value.trim().to_ascii_lowercase();
    if value == "transparent" {
        return Some(Rgba {
            r: 0,
            g: 0,
            b: 0,
            a: 0.0,
        });
    }
    let inner = value
        .strip_prefix("rgba(")
        .or_else(|| value.strip_prefix("rgb("))?
        .strip_suffix(')')?;
    let parts: Vec<&str> = inner
        .split([',', ' ', '/'])
        .filter(|p| !p.is_empty())
        .collect();
    if !(3..=4).contains(&parts.len()) {
        return None;
    }
    let channel = |s: &str| -> Option<u8> {
        let n = s.parse::<f64>().ok()?;
        (0.0..=255.0).contains(&n).then(|| n.round() as u8)
    };
    let alpha = match parts.get(3) {
        None => 1.0,
        Some(a) => match a.strip_suffix('%') {
            Some(pct) => pct.parse::<f32>().ok()? / 100.0,
            None => a.parse::<f32>().ok()?,
        },
    };
    if !(0.0..=1.0).contains(&alpha) {
        return None;
    }
    Some(Rgba {
        r: channel(parts[0])?,
        g: channel(parts[1])?,
        b: channel(parts[2])?,
        a: alpha,
    })
}

/// Count `<mark>` elements in serialized markup
#[must_use]
pub fn count_highlights(markup: &str) -> usize {
    static MARK: OnceLock<Regex> = OnceLock::new();
    MARK.get_or_init(|| Regex::new(r"(?i)<mark[\s>]").expect("static pattern"))
        .find_iter(markup)
        .count()
}

impl Session {
    /// Capture the rendered state of an element.
    ///
    /// Returns `Ok(None)` when the element is no longer attached.
    pub async fn snapshot(
        &self,
        handle: &ElementHandle,
        properties: &[&str],
    ) -> SondaResult<Option<ElementSnapshot>> {
        self.check_handle(handle)?;
        let properties: Vec<String> = properties.iter().map(|p| (*p).to_string()).collect();
        let driver = self.driver()?;
        let snapshot = self
            .bounded("snapshot", driver.describe(handle.node(), &properties))
            .await?;
        debug!(element = %handle, attached = snapshot.is_some(), "snapshot");
        Ok(snapshot)
    }

    /// Title, URL and root classes of the current document
    pub async fn page_snapshot(&self) -> SondaResult<PageSnapshot> {
        let driver = self.driver()?;
        self.bounded("page snapshot", driver.page_snapshot()).await
    }

    /// Serialized markup of the current document
    pub async fn page_content(&self) -> SondaResult<String> {
        let driver = self.driver()?;
        self.bounded("page content", driver.content()).await
    }
}
