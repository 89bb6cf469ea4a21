use super::openai_chat::OpenAiUsage;
use super::parts::{FinishReason, ResponseMetadata, Usage};

// ---------------------------------------------------------------------------
// Finish reason mappings
// ---------------------------------------------------------------------------

/// Map a vendor finish reason string to [`FinishReason`].
///
/// Unrecognized strings map to [`FinishReason::Unknown`].
#[must_use]
pub fn openai_finish_reason_to_canonical(s: &str) -> FinishReason {
    match s {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "content_filter" => FinishReason::ContentFilter,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        _ => FinishReason::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Metadata and usage mappings
// ---------------------------------------------------------------------------

#[must_use]
pub fn response_metadata_from_parts(
    id: Option<&str>,
    model: Option<&str>,
    created: Option<u64>,
) -> ResponseMetadata {
    ResponseMetadata {
        id: id.map(str::to_owned),
        model_id: model.map(str::to_owned),
        timestamp: created,
    }
}

/// Token counts plus the vendor-only figures that belong in provider metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageReport {
    pub usage: Usage,
    pub provider_fields: serde_json::Map<String, serde_json::Value>,
}

#[must_use]
pub fn openai_usage_to_report(usage: &OpenAiUsage) -> UsageReport {
    let mut provider_fields = serde_json::Map::new();
    let completion_details = usage.completion_tokens_details.as_ref();

    if let Some(accepted) = completion_details.and_then(|d| d.accepted_prediction_tokens) {
        provider_fields.insert("acceptedPredictionTokens".to_owned(), accepted.into());
    }
    if let Some(rejected) = completion_details.and_then(|d| d.rejected_prediction_tokens) {
        provider_fields.insert("rejectedPredictionTokens".to_owned(), rejected.into());
    }

    UsageReport {
        usage: Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cached_input_tokens: usage
                .prompt_tokens_details
                .as_ref()
                .and_then(|d| d.cached_tokens),
            reasoning_tokens: completion_details.and_then(|d| d.reasoning_tokens),
            total_tokens: usage.total_tokens,
        },
        provider_fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(openai_finish_reason_to_canonical("stop"), FinishReason::Stop);
        assert_eq!(
            openai_finish_reason_to_canonical("length"),
            FinishReason::Length
        );
        assert_eq!(
            openai_finish_reason_to_canonical("content_filter"),
            FinishReason::ContentFilter
        );
        assert_eq!(
            openai_finish_reason_to_canonical("tool_calls"),
            FinishReason::ToolCalls
        );
        assert_eq!(
            openai_finish_reason_to_canonical("function_call"),
            FinishReason::ToolCalls
        );
        assert_eq!(
            openai_finish_reason_to_canonical("eos_token"),
            FinishReason::Unknown
        );
        assert_eq!(openai_finish_reason_to_canonical(""), FinishReason::Unknown);
    }

    #[test]
    fn test_usage_report_details() {
        let wire: OpenAiUsage = serde_json::from_value(json!({
            "prompt_tokens": 15,
            "completion_tokens": 20,
            "total_tokens": 35,
            "prompt_tokens_details": {"cached_tokens": 4},
            "completion_tokens_details": {
                "reasoning_tokens": 7,
                "accepted_prediction_tokens": 3,
                "rejected_prediction_tokens": null
            }
        }))
        .unwrap();
        let report = openai_usage_to_report(&wire);
        assert_eq!(report.usage.input_tokens, Some(15));
        assert_eq!(report.usage.output_tokens, Some(20));
        assert_eq!(report.usage.total_tokens, Some(35));
        assert_eq!(report.usage.cached_input_tokens, Some(4));
        assert_eq!(report.usage.reasoning_tokens, Some(7));
        assert_eq!(report.provider_fields["acceptedPredictionTokens"], 3);
        assert!(!report.provider_fields.contains_key("rejectedPredictionTokens"));
    }

    #[test]
    fn test_usage_report_sparse() {
        let wire: OpenAiUsage = serde_json::from_value(json!({"prompt_tokens": 2})).unwrap();
        let report = openai_usage_to_report(&wire);
        assert_eq!(report.usage.input_tokens, Some(2));
        assert_eq!(report.usage.output_tokens, None);
        assert!(report.provider_fields.is_empty());
    }
}
