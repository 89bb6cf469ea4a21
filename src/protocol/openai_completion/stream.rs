use crate::normalize::{ChunkDelta, ChunkDialect};
use crate::protocol::mapping::{
    openai_finish_reason_to_canonical, openai_usage_to_report, response_metadata_from_parts,
};

use super::OpenAiCompletionChunk;

/// Legacy text-completion chunk family. Produces text only, never tool calls.
#[derive(Debug, Clone)]
pub struct OpenAiCompletionDialect {
    provider: String,
}

impl OpenAiCompletionDialect {
    #[must_use]
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

impl Default for OpenAiCompletionDialect {
    fn default() -> Self {
        Self::new("openai")
    }
}

impl ChunkDialect for OpenAiCompletionDialect {
    type Chunk = OpenAiCompletionChunk;

    fn provider(&self) -> &str {
        &self.provider
    }

    fn decode_chunk(&self, chunk: OpenAiCompletionChunk) -> ChunkDelta {
        decode_completion_chunk(chunk)
    }
}

#[must_use]
pub fn decode_completion_chunk(chunk: OpenAiCompletionChunk) -> ChunkDelta {
    let mut out = ChunkDelta {
        metadata: response_metadata_from_parts(
            chunk.id.as_deref(),
            chunk.model.as_deref(),
            chunk.created,
        ),
        usage: chunk.usage.as_ref().map(openai_usage_to_report),
        ..ChunkDelta::default()
    };

    if let Some(choice) = chunk.choices.into_iter().next() {
        out.finish_reason = choice
            .finish_reason
            .as_deref()
            .map(openai_finish_reason_to_canonical);
        out.text = choice.text;
        out.logprobs = choice.logprobs.filter(|l| !l.is_null());
    }

    out
}
