//! Tracing/logging initialization for the relay binary.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// * `default_filter` -- directive used when `RUST_LOG` is unset or invalid
///   (e.g. `"camrelay_daemon=info"`).
/// * `log_json` -- emit one JSON object per line instead of the plain
///   `LEVEL target: message` format that journald picks up.
///
/// Calling this twice is harmless: the second subscriber is discarded.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Build the default filter directive for a log level, covering both the
/// library and the binary targets.
pub fn default_filter(level: &str) -> String {
    format!("camrelay_daemon={level},camrelay_core={level},camrelay={level}")
}
