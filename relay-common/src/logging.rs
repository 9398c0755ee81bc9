//! Logging utilities for the relay bot.
//!
//! # Noise Filtering
//!
//! Noisy library modules (hyper, reqwest, h2, rustls, tungstenite) are set to
//! `warn` so gateway frames and connection pool chatter stay out of the way
//! of the bot's own logs. `RUST_LOG` overrides everything.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Modules pinned to `warn`.
pub const NOISY_MODULES: &[&str] = &[
    "hyper",
    "hyper_util",
    "reqwest",
    "h2",
    "rustls",
    "tokio_util",
    "tungstenite",
    "tokio_tungstenite",
];

/// Build the filter directive string for a base level.
fn filter_directives(log_level: &str) -> String {
    let mut directives = String::from(log_level);
    for module in NOISY_MODULES {
        directives.push_str(&format!(",{}=warn", module));
    }
    directives
}

fn build_filter(log_level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(filter_directives(log_level))
}

/// Initialize logging.
///
/// * `log_level` - Base log level (trace, debug, info, warn, error)
/// * `log_format` - "json" for structured JSON, anything else for human-readable
pub fn init_logging(log_level: &str, log_format: &str) {
    let filter = build_filter(log_level);
    let subscriber = tracing_subscriber::registry().with(filter);

    if log_format == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        let _ = subscriber.with(fmt_layer).try_init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(true)
            .with_file(false)
            .with_line_number(false);
        let _ = subscriber.with(fmt_layer).try_init();
    }

    tracing::info!(
        log_level = %log_level,
        log_format = %log_format,
        noise_filtered = NOISY_MODULES.len(),
        "Logging initialized"
    );
}

/// Generate a new trace ID for one inbound event.
pub fn generate_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Span for handling one inbound chat event.
#[macro_export]
macro_rules! event_span {
    ($trace_id:expr, $($field:tt)*) => {
        tracing::info_span!("chat_event", trace_id = %$trace_id, $($field)*)
    };
}
