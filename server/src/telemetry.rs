//! Structured logging setup. `LOG_FORMAT=json` switches to JSON output for
//! log aggregators; anything else keeps the human-readable default.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init(log_format: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init();
    }
}
