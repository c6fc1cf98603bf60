//! Process-wide log output for the `ceo` binary and anything embedding the loop.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Directive variable read ahead of `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "CEO_LOG";

/// `CEO_LOG` wins over `RUST_LOG`; with neither set every target logs at `level`.
pub fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the global subscriber: plain text lines, or one JSON object per
/// line when `json` is set. A subscriber installed earlier stays in place.
pub fn init_tracing(json: bool, level: Level) {
    let text = (!json).then(|| fmt::layer().with_target(false));
    let structured = json.then(|| fmt::layer().with_target(false).json());

    let installed = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(text)
        .with(structured)
        .try_init();
    if installed.is_err() {
        tracing::debug!(event = "tracing.already_installed");
    }
}
