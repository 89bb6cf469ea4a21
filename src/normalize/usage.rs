//! Usage and response-metadata aggregation across chunks.

use serde_json::{Map, Value};

use crate::protocol::mapping::UsageReport;
use crate::protocol::parts::{ProviderMetadata, ResponseMetadata, StreamPart, Usage};

/// Collects response identity once and token usage from every chunk.
///
/// Usage is last-value-wins per field; a final choice-less chunk usually
/// carries the authoritative totals.
#[derive(Debug, Default)]
pub struct UsageAggregator {
    metadata_emitted: bool,
    usage: Usage,
    provider_fields: Map<String, Value>,
    logprobs: Option<Value>,
}

impl UsageAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a `response-metadata` part for the first chunk only.
    pub fn observe_metadata(&mut self, metadata: ResponseMetadata) -> Option<StreamPart> {
        if self.metadata_emitted {
            return None;
        }
        self.metadata_emitted = true;
        Some(StreamPart::ResponseMetadata(metadata))
    }

    pub fn record_usage(&mut self, report: UsageReport) {
        self.usage.overwrite_from(&report.usage);
        self.provider_fields.extend(report.provider_fields);
    }

    pub fn record_logprobs(&mut self, logprobs: Value) {
        self.logprobs = Some(logprobs);
    }

    #[must_use]
    pub fn usage(&self) -> Usage {
        self.usage
    }

    #[must_use]
    pub fn metadata_emitted(&self) -> bool {
        self.metadata_emitted
    }

    /// Provider metadata for `finish`: `{<provider>: {..}}`, always keyed
    /// by the provider even when nothing vendor-specific was seen.
    #[must_use]
    pub fn provider_metadata(&self, provider: &str) -> ProviderMetadata {
        let mut fields = self.provider_fields.clone();
        if let Some(logprobs) = &self.logprobs {
            fields.insert("logprobs".to_owned(), logprobs.clone());
        }
        let mut metadata = ProviderMetadata::new();
        metadata.insert(provider.to_owned(), Value::Object(fields));
        metadata
    }
}
