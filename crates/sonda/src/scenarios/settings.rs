//! Expected contract values and selectors for the built-in probes.
//!
//! Every field has a default, so a settings file only needs to name what
//! differs for the deployment under test.

use crate::config::Viewport;
use crate::inspect::{parse_color, Rgba};
use crate::result::{SondaError, SondaResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Contract values the probes check against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeSettings {
    /// Computed background the reading paper must keep in dark mode
    pub paper_background: String,
    /// Minimum WCAG contrast between paper text and paper
    pub min_text_contrast: f64,
    /// Largest allowed `line-height / font-size` in the translation column
    pub max_line_height_ratio: f64,
    /// Fewest result cards a search must produce
    pub min_result_cards: usize,
    /// Search query
    pub query: String,
    /// Network-idle bound after each navigation
    pub ready_timeout_ms: u64,
    /// Bound for search results to appear
    pub results_timeout_ms: u64,
    /// Bound for document content to appear
    pub content_timeout_ms: u64,
    /// Fallback delay when a selector never appears
    pub settle_ms: u64,
    /// Lightest `font-weight` a library header may use
    pub min_header_weight: f64,
    /// Viewports for the mobile fit probe
    pub mobile_viewports: Vec<Viewport>,
    /// Page paths below the base URL
    pub paths: ProbePaths,
    /// Element selectors
    pub selectors: ProbeSelectors,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            paper_background: "rgb(250, 248, 243)".to_string(),
            min_text_contrast: 4.5,
            max_line_height_ratio: 1.25,
            min_result_cards: 1,
            query: "love".to_string(),
            ready_timeout_ms: 10_000,
            results_timeout_ms: 10_000,
            content_timeout_ms: 15_000,
            settle_ms: 2_000,
            min_header_weight: 600.0,
            mobile_viewports: vec![Viewport::PHONE_SMALL, Viewport::PHONE_STANDARD],
            paths: ProbePaths::default(),
            selectors: ProbeSelectors::default(),
        }
    }
}

/// Page paths, joined onto the base URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbePaths {
    /// Search page
    pub search: String,
    /// A document with a bilingual side-by-side view
    pub document: String,
    /// Printable study view
    pub print: String,
    /// Library browser
    pub library: String,
}

impl Default for ProbePaths {
    fn default() -> Self {
        Self {
            search: "/".to_string(),
            document: "/library/bahai/core-tablets/001-address-to-believers_ar".to_string(),
            print: "/print/study?doc=067_excellence_of_knowledge".to_string(),
            library: "/library".to_string(),
        }
    }
}

/// CSS selectors for the application's elements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeSelectors {
    /// Search input
    pub search_input: String,
    /// One search result
    pub result_card: String,
    /// Expanded reading paper
    pub paper: String,
    /// Text on the reading paper
    pub paper_text: String,
    /// Any sign that document content has loaded
    pub document_content: String,
    /// Side-by-side toggle
    pub side_by_side: String,
    /// Paragraph text in the translation column
    pub translation_text: String,
    /// Library statistics card
    pub stats_card: String,
    /// Print view title
    pub print_title: String,
    /// Print view segment row
    pub segment_row: String,
    /// Print view QR code
    pub qr_image: String,
    /// Error state container
    pub error_state: String,
    /// Read More button on an expanded result
    pub read_more: String,
    /// Full-screen reader
    pub reader_modal: String,
    /// Paragraph inside the reader
    pub reader_paragraph: String,
    /// Reader loading indicator
    pub reader_loading: String,
    /// Reader empty state
    pub reader_empty: String,
    /// Reader previous/next buttons
    pub reader_nav: String,
    /// Religion buttons in the library sidebar
    pub sidebar_button: String,
    /// Religion header in the library main column
    pub religion_header: String,
    /// Collection pills in the library sidebar
    pub collection_button: String,
    /// Collection header in the library main column
    pub collection_header: String,
}

impl Default for ProbeSelectors {
    fn default() -> Self {
        Self {
            search_input: "input.search-input".to_string(),
            result_card: ".source-card".to_string(),
            paper: ".source-paper".to_string(),
            paper_text: ".source-text".to_string(),
            document_content: ".document-header, .prose-container, .paragraph-row".to_string(),
            side_by_side: "[data-tooltip=\"Side-by-side\"]".to_string(),
            translation_text: ".translation-col .paragraph-text".to_string(),
            stats_card: ".stats-card".to_string(),
            print_title: ".document-title".to_string(),
            segment_row: ".segment-row".to_string(),
            qr_image: ".qr-image".to_string(),
            error_state: ".error-state".to_string(),
            read_more: ".read-more-btn".to_string(),
            reader_modal: ".reader-modal".to_string(),
            reader_paragraph: ".reader-paragraph".to_string(),
            reader_loading: ".reader-loading".to_string(),
            reader_empty: ".reader-empty".to_string(),
            reader_nav: ".reader-nav-btn".to_string(),
            sidebar_button: "aside button".to_string(),
            religion_header: ".religion-header".to_string(),
            collection_button: "aside button.rounded-full".to_string(),
            collection_header: "header h1".to_string(),
        }
    }
}

impl ProbeSettings {
    /// Parse settings from YAML
    pub fn from_yaml_str(yaml: &str) -> SondaResult<Self> {
        let settings: Self = serde_yaml_ng::from_str(yaml).map_err(|e| SondaError::Settings {
            message: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a YAML file
    pub fn load(path: &Path) -> SondaResult<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| SondaError::Settings {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> SondaResult<String> {
        serde_yaml_ng::to_string(self).map_err(|e| SondaError::Settings {
            message: e.to_string(),
        })
    }

    /// The expected paper colour
    pub fn paper_color(&self) -> SondaResult<Rgba> {
        parse_color(&self.paper_background).ok_or_else(|| SondaError::Settings {
            message: format!("paper_background '{}' is not a colour", self.paper_background),
        })
    }

    /// Reject values no probe could check against
    pub fn validate(&self) -> SondaResult<()> {
        self.paper_color()?;
        if self.max_line_height_ratio.is_nan() || self.max_line_height_ratio <= 0.0 {
            return Err(SondaError::Settings {
                message: "max_line_height_ratio must be positive".to_string(),
            });
        }
        if self.mobile_viewports.iter().any(|v| v.width == 0 || v.height == 0) {
            return Err(SondaError::Settings {
                message: "mobile viewports must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// `base_url` joined with `path`
    #[must_use]
    pub fn url(base_url: &str, path: &str) -> String {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
