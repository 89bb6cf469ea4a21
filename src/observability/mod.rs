pub mod token_counter;

use crate::protocol::parts::{FinishReason, Usage};
use tracing_subscriber::EnvFilter;

/// Log levels accepted by [`init_tracing`] and the config file.
pub const LOG_LEVELS: &[&str] = &[
    "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL", "DISABLED",
];

/// Map a config log level to a tracing filter directive.
///
/// - "DISABLED" -> `None`, no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, WARN, ERROR)
#[must_use]
pub fn filter_directive(log_level: &str) -> Option<String> {
    let level = log_level.to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_owned()),
        "CRITICAL" => Some("ERROR".to_owned()),
        _ => Some(level),
    }
}

/// Initialize the tracing subscriber with the configured log level.
///
/// Output goes to stderr so stdout stays free for replayed parts.
pub fn init_tracing(log_level: &str) {
    let Some(directive) = filter_directive(log_level) else {
        return;
    };

    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Log token usage for a finished stream, computing duration from start time.
pub fn log_stream_finish(
    provider: &str,
    finish_reason: FinishReason,
    usage: &Usage,
    start_time: std::time::Instant,
) {
    token_counter::log_stream_usage(provider, finish_reason, usage, start_time.elapsed());
}
