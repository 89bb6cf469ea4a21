//! The streaming state machine: vendor chunks in, canonical [`StreamPart`]s out.
//!
//! [`StreamPart`]: crate::protocol::parts::StreamPart

pub mod orchestrator;
pub mod tool_calls;
pub mod usage;

use serde::de::DeserializeOwned;
use smallvec::SmallVec;
use tokio_util::sync::CancellationToken;

use crate::protocol::mapping::UsageReport;
use crate::protocol::parts::{CallWarning, FinishReason, ResponseMetadata};

pub use orchestrator::{normalize_stream, StreamNormalizer};
pub use tool_calls::{ToolCallAccumulator, ToolCallState};
pub use usage::UsageAggregator;

/// Text-block id used for `text-delta` parts unless configured otherwise.
pub const DEFAULT_TEXT_BLOCK_ID: &str = "0";
/// Reasoning-block id used for `reasoning-delta` parts.
pub const REASONING_BLOCK_ID: &str = "reasoning-0";

/// One vendor chunk family.
///
/// A dialect names the chunk schema the validator checks frames against and
/// flattens one validated chunk into a [`ChunkDelta`]. All state lives in the
/// normalizer, so dialects are plain values.
pub trait ChunkDialect {
    type Chunk: DeserializeOwned;

    /// Key under which provider metadata is reported on `finish`.
    fn provider(&self) -> &str;

    fn decode_chunk(&self, chunk: Self::Chunk) -> ChunkDelta;
}

/// Vendor-neutral content of one chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkDelta {
    pub metadata: ResponseMetadata,
    pub usage: Option<UsageReport>,
    pub finish_reason: Option<FinishReason>,
    pub text: Option<String>,
    pub reasoning: Option<String>,
    pub tool_calls: SmallVec<[ToolCallFragment; 1]>,
    pub citations: Vec<Citation>,
    pub logprobs: Option<serde_json::Value>,
}

/// One incremental piece of a tool call, keyed by its per-stream index.
///
/// `id`, `kind` and `name` are normally present only on the first fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub index: u32,
    pub id: Option<String>,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub url: String,
    pub title: Option<String>,
}

/// Per-call options for the normalizer.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Emit a `raw` part ahead of the parts derived from each frame.
    pub include_raw_chunks: bool,
    /// Warnings collected while preparing the call, reported by `stream-start`.
    pub warnings: Vec<CallWarning>,
    pub text_block_id: String,
    /// Stops pulling from the upstream when cancelled.
    pub cancel: Option<CancellationToken>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            include_raw_chunks: false,
            warnings: Vec::new(),
            text_block_id: DEFAULT_TEXT_BLOCK_ID.to_owned(),
            cancel: None,
        }
    }
}

impl StreamOptions {
    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    #[must_use]
    pub fn with_warnings(mut self, warnings: Vec<CallWarning>) -> Self {
        self.warnings = warnings;
        self
    }
}
