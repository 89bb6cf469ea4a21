use smallvec::SmallVec;

use crate::normalize::{ChunkDelta, ChunkDialect, Citation, ToolCallFragment};
use crate::protocol::mapping::{
    openai_finish_reason_to_canonical, openai_usage_to_report, response_metadata_from_parts,
};

use super::OpenAiStreamChunk;

/// Chat-completion chunk family (`/chat/completions` with `stream: true`).
#[derive(Debug, Clone)]
pub struct OpenAiChatDialect {
    provider: String,
}

impl OpenAiChatDialect {
    #[must_use]
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

impl Default for OpenAiChatDialect {
    fn default() -> Self {
        Self::new("openai")
    }
}

impl ChunkDialect for OpenAiChatDialect {
    type Chunk = OpenAiStreamChunk;

    fn provider(&self) -> &str {
        &self.provider
    }

    fn decode_chunk(&self, chunk: OpenAiStreamChunk) -> ChunkDelta {
        decode_openai_stream_chunk(chunk)
    }
}

/// Decode a chat stream chunk into a vendor-neutral [`ChunkDelta`].
///
/// Only the first choice is consumed.
#[must_use]
pub fn decode_openai_stream_chunk(chunk: OpenAiStreamChunk) -> ChunkDelta {
    let mut out = ChunkDelta {
        metadata: response_metadata_from_parts(
            chunk.id.as_deref(),
            chunk.model.as_deref(),
            chunk.created,
        ),
        usage: chunk.usage.as_ref().map(openai_usage_to_report),
        ..ChunkDelta::default()
    };

    let Some(choice) = chunk.choices.into_iter().next() else {
        return out;
    };

    out.finish_reason = choice
        .finish_reason
        .as_deref()
        .map(openai_finish_reason_to_canonical);
    out.logprobs = choice.logprobs.and_then(|logprobs| logprobs.content);

    let Some(delta) = choice.delta else {
        return out;
    };

    out.text = delta.content;
    out.reasoning = delta.reasoning_content.filter(|r| !r.is_empty());

    if let Some(tool_calls) = delta.tool_calls {
        out.tool_calls = tool_calls
            .into_iter()
            .map(|tc| {
                let (name, arguments) = match tc.function {
                    Some(func) => (func.name, func.arguments),
                    None => (None, None),
                };
                ToolCallFragment {
                    index: tc.index,
                    id: tc.id,
                    kind: tc.type_,
                    name,
                    arguments,
                }
            })
            .collect::<SmallVec<_>>();
    }

    if let Some(annotations) = delta.annotations {
        out.citations = annotations
            .into_iter()
            .filter(|a| a.type_ == "url_citation")
            .filter_map(|a| a.url_citation)
            .map(|c| Citation {
                url: c.url,
                title: c.title,
            })
            .collect();
    }

    out
}
