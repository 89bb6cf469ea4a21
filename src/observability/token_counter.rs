use crate::protocol::parts::{FinishReason, Usage};
use std::time::Duration;
use tracing::info;

/// Total tokens for logging: the reported total, else input + output when
/// both sides were reported and the sum fits in a `u64`.
#[must_use]
pub fn resolved_total(usage: &Usage) -> Option<u64> {
    match (usage.total_tokens, usage.input_tokens, usage.output_tokens) {
        (Some(total), _, _) => Some(total),
        (None, Some(input), Some(output)) => input.checked_add(output),
        _ => None,
    }
}

/// Log token usage for a finished stream at INFO level.
pub fn log_stream_usage(
    provider: &str,
    finish_reason: FinishReason,
    usage: &Usage,
    duration: Duration,
) {
    info!(
        provider = provider,
        finish_reason = finish_reason.as_str(),
        input_tokens = usage.input_tokens.unwrap_or(0),
        output_tokens = usage.output_tokens.unwrap_or(0),
        cached_input_tokens = usage.cached_input_tokens.unwrap_or(0),
        reasoning_tokens = usage.reasoning_tokens.unwrap_or(0),
        total_tokens = resolved_total(usage).unwrap_or(0),
        duration_seconds = duration.as_secs_f64(),
        "stream finished"
    );
}
