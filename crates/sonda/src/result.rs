//! Result and error types for Sonda.
//!
//! Only acquisition failures and caller-requested aborts are meant to unwind
//! a probe. Everything the page can legitimately do wrong (slow content,
//! missing elements, wrong colours) travels as data instead.

use thiserror::Error;

/// Result type for Sonda operations
pub type SondaResult<T> = Result<T, SondaError>;

/// Errors that can occur in Sonda
#[derive(Debug, Error)]
pub enum SondaError {
    /// Browser could not be started (acquisition failure)
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// Operation attempted on a session that was already torn down
    #[error("Session {session} is closed")]
    SessionClosed {
        /// Session identifier
        session: String,
    },

    /// Element handle belongs to another session
    #[error("Element handle from session {handle_session} used in session {session}")]
    ForeignHandle {
        /// Session that produced the handle
        handle_session: String,
        /// Session the handle was used with
        session: String,
    },

    /// A bounded operation exceeded its timeout
    #[error("{operation} timed out after {ms}ms")]
    Timeout {
        /// Operation name
        operation: String,
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Protocol-level failure reported by the page driver
    #[error("Driver error: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// Evidence could not be written
    #[error("Evidence capture failed: {message}")]
    Evidence {
        /// Error message
        message: String,
    },

    /// Probe settings could not be loaded
    #[error("Invalid settings: {message}")]
    Settings {
        /// Error message
        message: String,
    },

    /// Probe was aborted by the caller
    #[error("Probe aborted: {reason}")]
    Aborted {
        /// Why the probe stopped
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image decoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl SondaError {
    /// Create a driver error
    #[must_use]
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Create a launch error
    #[must_use]
    pub fn launch(message: impl Into<String>) -> Self {
        Self::BrowserLaunch {
            message: message.into(),
        }
    }

    /// Create an evidence error
    #[must_use]
    pub fn evidence(message: impl Into<String>) -> Self {
        Self::Evidence {
            message: message.into(),
        }
    }

    /// Create an abort error
    #[must_use]
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Whether this error means the harness itself failed, as opposed to the
    /// page under test misbehaving. Everything else ends up as a failed check.
    #[must_use]
    pub const fn is_harness_failure(&self) -> bool {
        matches!(
            self,
            Self::BrowserLaunch { .. }
                | Self::SessionClosed { .. }
                | Self::ForeignHandle { .. }
                | Self::Settings { .. }
        )
    }
}
