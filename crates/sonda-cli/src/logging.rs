//! Log subscriber setup

use crate::config::{CliConfig, LogFormat};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter from `RUST_LOG`, or from the verbosity flags when it is unset
#[must_use]
pub fn env_filter(config: &CliConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.log_directive()))
}

/// Install the global subscriber. Logs go to stderr; a second call is a
/// no-op.
pub fn init(config: &CliConfig) {
    let filter = env_filter(config);
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(config.color.should_color()),
            )
            .try_init(),
    };
    if installed.is_err() {
        tracing::debug!("log subscriber already installed");
    }
}
