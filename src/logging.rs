//! Structured logging setup using the `tracing` ecosystem.
//!
//! Configures a `tracing-subscriber` with either JSON output (for
//! production) or pretty-printed output (for TTY / local dev). Format is
//! auto-detected from the terminal but can be forced via `--json` or
//! `--pretty`. Connection-level chatter from the HTTP client stack is
//! capped at `warn` unless the requested level is `trace`.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::LogLevel;

/// Crates whose debug output is per-connection noise.
const NOISY_TARGETS: &[&str] = &["hyper_util", "rustls", "hyper_rustls"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[must_use]
pub fn resolve_format(pretty: bool, json: bool) -> LogFormat {
    if json {
        LogFormat::Json
    } else if pretty || std::io::IsTerminal::is_terminal(&std::io::stdout()) {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    }
}

#[must_use]
pub fn build_filter(level: &LogLevel) -> Targets {
    let tracing_level = level.to_tracing_level();
    let mut filter = Targets::new().with_default(tracing_level);
    if tracing_level != tracing::Level::TRACE {
        let capped = LevelFilter::WARN.min(LevelFilter::from_level(tracing_level));
        for target in NOISY_TARGETS {
            filter = filter.with_target(*target, capped);
        }
    }
    filter
}

pub fn init(level: &LogLevel, format: LogFormat) {
    let filter = build_filter(level);

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(false))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
}
