use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// Vendor-specific auxiliary data attached to `finish`, keyed by provider.
pub type ProviderMetadata = serde_json::Map<String, serde_json::Value>;

/// Terminal classification of why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
    #[default]
    Unknown,
}

impl FinishReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolCalls => "tool-calls",
            FinishReason::ContentFilter => "content-filter",
            FinishReason::Error => "error",
            FinishReason::Unknown => "unknown",
        }
    }
}

/// Token usage. Every field is optional because vendors omit sub-counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

impl Usage {
    /// Overwrite each field for which `later` carries a value.
    ///
    /// Values are replaced, never summed.
    pub fn overwrite_from(&mut self, later: &Usage) {
        fn take(slot: &mut Option<u64>, value: Option<u64>) {
            if value.is_some() {
                *slot = value;
            }
        }
        take(&mut self.input_tokens, later.input_tokens);
        take(&mut self.output_tokens, later.output_tokens);
        take(&mut self.cached_input_tokens, later.cached_input_tokens);
        take(&mut self.reasoning_tokens, later.reasoning_tokens);
        take(&mut self.total_tokens, later.total_tokens);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Usage::default()
    }
}

/// Response identity, taken from the first valid frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Creation time, unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

/// A citation emitted inline with text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "sourceType", rename_all = "kebab-case")]
pub enum Source {
    Url {
        id: String,
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
}

/// A warning produced while preparing the call, reported by `stream-start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CallWarning {
    UnsupportedSetting {
        setting: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    Other {
        message: String,
    },
}

/// A canonical, vendor-independent event in the normalized output sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamPart {
    StreamStart {
        warnings: Vec<CallWarning>,
    },
    ResponseMetadata(ResponseMetadata),
    TextDelta {
        id: String,
        delta: String,
    },
    ReasoningDelta {
        id: String,
        delta: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolInputStart {
        id: String,
        tool_name: String,
    },
    ToolInputDelta {
        id: String,
        delta: String,
    },
    ToolInputEnd {
        id: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: String,
    },
    Source(Source),
    Error {
        error: StreamError,
    },
    #[serde(rename_all = "camelCase")]
    Finish {
        finish_reason: FinishReason,
        usage: Usage,
        #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
        provider_metadata: ProviderMetadata,
    },
    #[serde(rename_all = "camelCase")]
    Raw {
        raw_value: serde_json::Value,
    },
}

impl StreamPart {
    /// The part's wire tag, e.g. `"text-delta"`.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            StreamPart::StreamStart { .. } => "stream-start",
            StreamPart::ResponseMetadata(_) => "response-metadata",
            StreamPart::TextDelta { .. } => "text-delta",
            StreamPart::ReasoningDelta { .. } => "reasoning-delta",
            StreamPart::ToolInputStart { .. } => "tool-input-start",
            StreamPart::ToolInputDelta { .. } => "tool-input-delta",
            StreamPart::ToolInputEnd { .. } => "tool-input-end",
            StreamPart::ToolCall { .. } => "tool-call",
            StreamPart::Source(_) => "source",
            StreamPart::Error { .. } => "error",
            StreamPart::Finish { .. } => "finish",
            StreamPart::Raw { .. } => "raw",
        }
    }

    #[must_use]
    pub fn is_finish(&self) -> bool {
        matches!(self, StreamPart::Finish { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_usage_overwrite_is_field_wise() {
        let mut usage = Usage {
            input_tokens: Some(3),
            output_tokens: Some(1),
            ..Usage::default()
        };
        usage.overwrite_from(&Usage {
            output_tokens: Some(9),
            total_tokens: Some(12),
            ..Usage::default()
        });
        assert_eq!(usage.input_tokens, Some(3));
        assert_eq!(usage.output_tokens, Some(9));
        assert_eq!(usage.total_tokens, Some(12));
        assert_eq!(usage.cached_input_tokens, None);
    }

    #[test]
    fn test_finish_reason_serde_names() {
        assert_eq!(
            serde_json::to_value(FinishReason::ToolCalls).unwrap(),
            json!("tool-calls")
        );
        assert_eq!(
            serde_json::to_value(FinishReason::ContentFilter).unwrap(),
            json!("content-filter")
        );
        assert_eq!(FinishReason::default(), FinishReason::Unknown);
    }

    #[test]
    fn test_text_delta_wire_shape() {
        let part = StreamPart::TextDelta {
            id: "0".into(),
            delta: "Hi".into(),
        };
        assert_eq!(
            serde_json::to_value(&part).unwrap(),
            json!({"type": "text-delta", "id": "0", "delta": "Hi"})
        );
    }

    #[test]
    fn test_tool_call_wire_shape() {
        let part = StreamPart::ToolCall {
            tool_call_id: "call_1".into(),
            tool_name: "lookup".into(),
            input: "{}".into(),
        };
        assert_eq!(
            serde_json::to_value(&part).unwrap(),
            json!({"type": "tool-call", "toolCallId": "call_1", "toolName": "lookup", "input": "{}"})
        );
    }

    #[test]
    fn test_response_metadata_wire_shape() {
        let part = StreamPart::ResponseMetadata(ResponseMetadata {
            id: Some("chatcmpl-1".into()),
            model_id: Some("gpt-4o".into()),
            timestamp: Some(1_711_357_598),
        });
        assert_eq!(
            serde_json::to_value(&part).unwrap(),
            json!({
                "type": "response-metadata",
                "id": "chatcmpl-1",
                "modelId": "gpt-4o",
                "timestamp": 1_711_357_598
            })
        );
    }

    #[test]
    fn test_finish_omits_empty_provider_metadata() {
        let part = StreamPart::Finish {
            finish_reason: FinishReason::Stop,
            usage: Usage {
                input_tokens: Some(10),
                output_tokens: Some(5),
                ..Usage::default()
            },
            provider_metadata: ProviderMetadata::new(),
        };
        assert_eq!(
            serde_json::to_value(&part).unwrap(),
            json!({
                "type": "finish",
                "finishReason": "stop",
                "usage": {"inputTokens": 10, "outputTokens": 5}
            })
        );
    }

    #[test]
    fn test_source_wire_shape() {
        let part = StreamPart::Source(Source::Url {
            id: "source-0".into(),
            url: "https://example.com".into(),
            title: None,
        });
        assert_eq!(
            serde_json::to_value(&part).unwrap(),
            json!({"type": "source", "sourceType": "url", "id": "source-0", "url": "https://example.com"})
        );
    }
}
