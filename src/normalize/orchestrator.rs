//! Stream orchestrator.
//!
//! [`StreamNormalizer`] is the synchronous core: one frame payload in, zero or
//! more [`StreamPart`]s out, and exactly one `finish` when it is consumed.
//! [`normalize_stream`] drives it from a byte stream, pulling one frame at a
//! time.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::time::Instant;

use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::tool_calls::ToolCallAccumulator;
use super::usage::UsageAggregator;
use super::{ChunkDelta, ChunkDialect, StreamOptions, REASONING_BLOCK_ID};
use crate::error::StreamError;
use crate::observability::log_stream_finish;
use crate::protocol::parts::{FinishReason, Source, StreamPart, Usage};
use crate::protocol::validate::{validate_frame, ParseResult, ValidatedFrame};
use crate::stream::{sse_frame_stream, SseEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Streaming,
}

/// Per-call normalizer state.
///
/// Created for one streaming call and consumed by [`StreamNormalizer::finish`];
/// nothing is shared between calls.
#[derive(Debug)]
pub struct StreamNormalizer<D> {
    dialect: D,
    options: StreamOptions,
    phase: Phase,
    started_at: Option<Instant>,
    finish_reason: FinishReason,
    tool_calls: ToolCallAccumulator,
    usage: UsageAggregator,
    sources_emitted: usize,
    frames_seen: u64,
}

impl<D: ChunkDialect> StreamNormalizer<D> {
    #[must_use]
    pub fn new(dialect: D, options: StreamOptions) -> Self {
        Self {
            dialect,
            options,
            phase: Phase::Idle,
            started_at: None,
            finish_reason: FinishReason::Unknown,
            tool_calls: ToolCallAccumulator::new(),
            usage: UsageAggregator::new(),
            sources_emitted: 0,
            frames_seen: 0,
        }
    }

    fn begin(&mut self, out: &mut Vec<StreamPart>) {
        if self.phase != Phase::Idle {
            return;
        }
        self.phase = Phase::Streaming;
        self.started_at = Some(Instant::now());
        if !self.options.warnings.is_empty() {
            out.push(StreamPart::StreamStart {
                warnings: std::mem::take(&mut self.options.warnings),
            });
        }
    }

    /// Process one frame payload, appending the parts it produces to `out`.
    ///
    /// Malformed frames and vendor error frames become `error` parts and set
    /// the finish reason to `error`; processing continues with the next frame.
    pub fn push_frame(&mut self, payload: &str, out: &mut Vec<StreamPart>) {
        self.begin(out);
        self.frames_seen += 1;

        let (value, raw) = match validate_frame::<D::Chunk>(payload) {
            ParseResult::Success { value, raw } => (Ok(value), raw),
            ParseResult::Failure { error, raw } => (Err(error), raw),
        };
        if self.options.include_raw_chunks {
            out.push(StreamPart::Raw { raw_value: raw });
        }

        match value {
            Ok(ValidatedFrame::Chunk(chunk)) => {
                let delta = self.dialect.decode_chunk(chunk);
                self.apply_delta(delta, out);
            }
            Ok(ValidatedFrame::VendorError(chunk)) => {
                let error = StreamError::from(chunk);
                warn!(
                    provider = self.dialect.provider(),
                    frame = self.frames_seen,
                    error = %error,
                    "upstream reported an error in the stream"
                );
                self.push_error(error, out);
            }
            Err(error) => {
                warn!(
                    provider = self.dialect.provider(),
                    frame = self.frames_seen,
                    error = %error,
                    "skipping malformed frame"
                );
                self.push_error(error, out);
            }
        }
    }

    fn push_error(&mut self, error: StreamError, out: &mut Vec<StreamPart>) {
        self.finish_reason = FinishReason::Error;
        out.push(StreamPart::Error { error });
    }

    fn apply_delta(&mut self, delta: ChunkDelta, out: &mut Vec<StreamPart>) {
        let ChunkDelta {
            metadata,
            usage,
            finish_reason,
            text,
            reasoning,
            tool_calls,
            citations,
            logprobs,
        } = delta;

        if let Some(part) = self.usage.observe_metadata(metadata) {
            out.push(part);
        }
        if let Some(report) = usage {
            self.usage.record_usage(report);
        }
        // An error already reported in this stream outranks the vendor's reason.
        if let Some(reason) = finish_reason {
            if self.finish_reason != FinishReason::Error {
                self.finish_reason = reason;
            }
        }
        if let Some(logprobs) = logprobs {
            self.usage.record_logprobs(logprobs);
        }

        if let Some(reasoning) = reasoning {
            out.push(StreamPart::ReasoningDelta {
                id: REASONING_BLOCK_ID.to_owned(),
                delta: reasoning,
            });
        }
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            out.push(StreamPart::TextDelta {
                id: self.options.text_block_id.clone(),
                delta: text,
            });
        }

        for fragment in tool_calls {
            if let Err(error) = self.tool_calls.push_fragment(fragment, out) {
                warn!(
                    provider = self.dialect.provider(),
                    frame = self.frames_seen,
                    error = %error,
                    "dropping invalid tool call fragment"
                );
                self.push_error(error, out);
            }
        }

        for citation in citations {
            out.push(StreamPart::Source(Source::Url {
                id: format!("source-{}", self.sources_emitted),
                url: citation.url,
                title: citation.title,
            }));
            self.sources_emitted += 1;
        }
    }

    /// Close the stream: complete open empty-argument tool calls and append
    /// the single terminal `finish` part.
    pub fn finish(mut self, out: &mut Vec<StreamPart>) {
        self.begin(out);
        self.tool_calls.finish_open_calls(out);

        let provider = self.dialect.provider();
        let usage = self.usage.usage();
        debug!(
            provider,
            frames = self.frames_seen,
            tool_calls = self.tool_calls.calls().len(),
            open_tool_calls = self.tool_calls.open_count(),
            finish_reason = self.finish_reason.as_str(),
            "normalizer finished"
        );
        if let Some(started_at) = self.started_at {
            log_stream_finish(provider, self.finish_reason, &usage, started_at);
        }

        out.push(StreamPart::Finish {
            finish_reason: self.finish_reason,
            usage,
            provider_metadata: self.usage.provider_metadata(provider),
        });
    }

    /// Close the stream after a transport fault; the finish reason is `error`.
    pub fn finish_with_error(mut self, out: &mut Vec<StreamPart>) {
        self.finish_reason = FinishReason::Error;
        self.finish(out);
    }

    #[must_use]
    pub fn finish_reason(&self) -> FinishReason {
        self.finish_reason
    }

    #[must_use]
    pub fn usage(&self) -> Usage {
        self.usage.usage()
    }

    #[must_use]
    pub fn tool_calls(&self) -> &ToolCallAccumulator {
        &self.tool_calls
    }

    #[must_use]
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Whether at least one frame has been pushed.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.phase == Phase::Streaming
    }
}

// ---------------------------------------------------------------------------
// Async driver
// ---------------------------------------------------------------------------

enum Pulled {
    Frame(Option<Result<SseEvent, StreamError>>),
    Cancelled,
}

struct Driver<F, D> {
    frames: Pin<Box<F>>,
    normalizer: Option<StreamNormalizer<D>>,
    cancel: Option<CancellationToken>,
    scratch: Vec<StreamPart>,
    pending: VecDeque<Result<StreamPart, StreamError>>,
}

impl<F, D> Driver<F, D>
where
    F: Stream<Item = Result<SseEvent, StreamError>>,
    D: ChunkDialect,
{
    async fn pull(&mut self) -> Pulled {
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => Pulled::Cancelled,
                    frame = self.frames.next() => Pulled::Frame(frame),
                }
            }
            None => Pulled::Frame(self.frames.next().await),
        }
    }

    fn flush_scratch(&mut self) {
        self.pending.extend(self.scratch.drain(..).map(Ok));
    }
}

/// Normalize a vendor SSE byte stream into canonical [`StreamPart`]s.
///
/// The stream is lazy: nothing is read until it is polled, and each poll
/// decodes at most one frame when no parts are pending. It always ends with
/// exactly one `finish` part unless cancelled:
///
/// - a transport error is yielded as `Err(StreamError::Transport)`, followed
///   by `finish` with reason `error`;
/// - cancellation through [`StreamOptions::cancel`] yields
///   `Err(StreamError::Aborted)` and ends without `finish`.
///
/// The returned stream is fused.
pub fn normalize_stream<S, E, D>(
    byte_stream: S,
    dialect: D,
    mut options: StreamOptions,
) -> impl Stream<Item = Result<StreamPart, StreamError>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
    D: ChunkDialect + Send + 'static,
{
    let cancel = options.cancel.take();
    let driver = Driver {
        frames: Box::pin(sse_frame_stream(byte_stream)),
        normalizer: Some(StreamNormalizer::new(dialect, options)),
        cancel,
        scratch: Vec::with_capacity(8),
        pending: VecDeque::new(),
    };

    futures_util::stream::unfold(driver, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            st.normalizer.as_ref()?;

            if st.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                return abort(st);
            }

            match st.pull().await {
                Pulled::Cancelled => return abort(st),
                Pulled::Frame(Some(Ok(frame))) => {
                    let Some(normalizer) = st.normalizer.as_mut() else {
                        return None;
                    };
                    normalizer.push_frame(&frame.data, &mut st.scratch);
                    st.flush_scratch();
                }
                Pulled::Frame(Some(Err(error))) => {
                    let Some(normalizer) = st.normalizer.take() else {
                        return None;
                    };
                    warn!(error = %error, "upstream byte stream failed");
                    st.pending.push_back(Err(error));
                    normalizer.finish_with_error(&mut st.scratch);
                    st.flush_scratch();
                }
                Pulled::Frame(None) => {
                    let Some(normalizer) = st.normalizer.take() else {
                        return None;
                    };
                    normalizer.finish(&mut st.scratch);
                    st.flush_scratch();
                }
            }
        }
    })
    .fuse()
}

fn abort<F, D: ChunkDialect>(
    mut st: Driver<F, D>,
) -> Option<(Result<StreamPart, StreamError>, Driver<F, D>)> {
    if let Some(normalizer) = st.normalizer.take() {
        debug!(
            frames = normalizer.frames_seen(),
            "stream cancelled before finish"
        );
    }
    Some((Err(StreamError::Aborted), st))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::protocol::openai_chat::stream::OpenAiChatDialect;
    use crate::protocol::openai_completion::stream::OpenAiCompletionDialect;
    use crate::protocol::parts::CallWarning;
    use serde_json::json;

    fn chat_frame(content: &str) -> String {
        json!({
            "id": "chatcmpl-1",
            "created": 1_700_000_000,
            "model": "gpt-4o",
            "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
        })
        .to_string()
    }

    fn run_chat(frames: &[String], options: StreamOptions) -> Vec<StreamPart> {
        let mut normalizer = StreamNormalizer::new(OpenAiChatDialect::default(), options);
        let mut out = Vec::new();
        for frame in frames {
            normalizer.push_frame(frame, &mut out);
        }
        normalizer.finish(&mut out);
        out
    }

    fn type_names(parts: &[StreamPart]) -> Vec<&'static str> {
        parts.iter().map(StreamPart::type_name).collect()
    }

    fn finish_of(parts: &[StreamPart]) -> (FinishReason, Usage) {
        match parts.last() {
            Some(StreamPart::Finish {
                finish_reason,
                usage,
                ..
            }) => (*finish_reason, *usage),
            other => panic!("expected finish, got {other:?}"),
        }
    }

    #[test]
    fn test_hello_world_sequence() {
        let frames = vec![
            chat_frame("Hello"),
            chat_frame(", "),
            chat_frame("World!"),
            json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}).to_string(),
        ];
        let out = run_chat(&frames, StreamOptions::default());
        assert_eq!(
            type_names(&out),
            [
                "response-metadata",
                "text-delta",
                "text-delta",
                "text-delta",
                "finish"
            ]
        );
        let text: String = out
            .iter()
            .filter_map(|p| match p {
                StreamPart::TextDelta { id, delta } => {
                    assert_eq!(id, "0");
                    Some(delta.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hello, World!");
        assert_eq!(finish_of(&out).0, FinishReason::Stop);
        assert_eq!(
            out[0],
            StreamPart::ResponseMetadata(crate::protocol::parts::ResponseMetadata {
                id: Some("chatcmpl-1".into()),
                model_id: Some("gpt-4o".into()),
                timestamp: Some(1_700_000_000),
            })
        );
    }

    #[test]
    fn test_malformed_frame_yields_error_then_finish() {
        let out = run_chat(&["{ this is not json".to_owned()], StreamOptions::default());
        assert_eq!(type_names(&out), ["error", "finish"]);
        match &out[0] {
            StreamPart::Error { error } => assert_eq!(error.kind(), ErrorKind::FrameParse),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(finish_of(&out).0, FinishReason::Error);
    }

    #[test]
    fn test_schema_mismatch_and_vendor_error_keep_draining() {
        let frames = vec![
            json!({"choices": "nope"}).to_string(),
            json!({"error": {"message": "overloaded", "type": "server_error", "code": 529}})
                .to_string(),
            chat_frame("after"),
            json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}).to_string(),
        ];
        let out = run_chat(&frames, StreamOptions::default());
        assert_eq!(
            type_names(&out),
            ["error", "error", "response-metadata", "text-delta", "finish"]
        );
        match &out[1] {
            StreamPart::Error {
                error:
                    StreamError::Upstream {
                        message,
                        error_type,
                        code,
                    },
            } => {
                assert_eq!(message, "overloaded");
                assert_eq!(error_type.as_deref(), Some("server_error"));
                assert_eq!(code.as_deref(), Some("529"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(finish_of(&out).0, FinishReason::Error);
    }

    #[test]
    fn test_usage_from_final_choiceless_frame() {
        let frames = vec![
            chat_frame("Hi"),
            json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}).to_string(),
            json!({"choices": [], "usage": {"prompt_tokens": 12, "completion_tokens": 3}})
                .to_string(),
        ];
        let out = run_chat(&frames, StreamOptions::default());
        let (reason, usage) = finish_of(&out);
        assert_eq!(reason, FinishReason::Stop);
        assert_eq!(
            usage,
            Usage {
                input_tokens: Some(12),
                output_tokens: Some(3),
                ..Usage::default()
            }
        );
    }

    #[test]
    fn test_tool_call_stream_with_empty_arguments() {
        let frames = vec![
            json!({"id": "chatcmpl-2", "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "id": "call_1", "type": "function",
                 "function": {"name": "list_files", "arguments": ""}}
            ]}}]})
            .to_string(),
            json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]})
                .to_string(),
        ];
        let out = run_chat(&frames, StreamOptions::default());
        assert_eq!(
            type_names(&out),
            [
                "response-metadata",
                "tool-input-start",
                "tool-input-end",
                "tool-call",
                "finish"
            ]
        );
        assert!(matches!(
            &out[3],
            StreamPart::ToolCall { input, tool_name, .. } if input == "{}" && tool_name == "list_files"
        ));
        assert_eq!(finish_of(&out).0, FinishReason::ToolCalls);
    }

    #[test]
    fn test_invalid_tool_fragment_is_reported() {
        let frames = vec![json!({"choices": [{"index": 0, "delta": {"tool_calls": [
            {"index": 0, "type": "function", "function": {"name": "f"}}
        ]}}]})
        .to_string()];
        let out = run_chat(&frames, StreamOptions::default());
        assert_eq!(type_names(&out), ["response-metadata", "error", "finish"]);
        match &out[1] {
            StreamPart::Error { error } => assert_eq!(error.kind(), ErrorKind::InvalidToolCall),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(finish_of(&out).0, FinishReason::Error);
    }

    #[test]
    fn test_raw_parts_precede_derived_parts() {
        let options = StreamOptions {
            include_raw_chunks: true,
            ..StreamOptions::default()
        };
        let out = run_chat(&[chat_frame("x"), "garbage".to_owned()], options);
        assert_eq!(
            type_names(&out),
            ["raw", "response-metadata", "text-delta", "raw", "error", "finish"]
        );
        assert_eq!(
            out[3],
            StreamPart::Raw {
                raw_value: json!("garbage")
            }
        );
    }

    #[test]
    fn test_stream_start_only_with_warnings() {
        let warnings = vec![CallWarning::UnsupportedSetting {
            setting: "topK".into(),
            details: None,
        }];
        let out = run_chat(
            &[chat_frame("x")],
            StreamOptions::default().with_warnings(warnings.clone()),
        );
        assert_eq!(out[0], StreamPart::StreamStart { warnings });

        let out = run_chat(&[], StreamOptions::default());
        assert_eq!(type_names(&out), ["finish"]);
    }

    #[test]
    fn test_reasoning_and_sources() {
        let frames = vec![json!({"choices": [{"index": 0, "delta": {
            "reasoning_content": "think",
            "content": "answer",
            "annotations": [
                {"type": "url_citation", "url_citation": {"url": "https://a.example"}},
                {"type": "url_citation", "url_citation": {"url": "https://b.example", "title": "B"}}
            ]
        }}]})
        .to_string()];
        let out = run_chat(&frames, StreamOptions::default());
        assert_eq!(
            type_names(&out),
            [
                "response-metadata",
                "reasoning-delta",
                "text-delta",
                "source",
                "source",
                "finish"
            ]
        );
        assert_eq!(
            out[4],
            StreamPart::Source(Source::Url {
                id: "source-1".into(),
                url: "https://b.example".into(),
                title: Some("B".into()),
            })
        );
    }

    #[test]
    fn test_error_finish_reason_is_sticky() {
        let frames = vec![
            "nope".to_owned(),
            json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}).to_string(),
        ];
        let out = run_chat(&frames, StreamOptions::default());
        assert_eq!(finish_of(&out).0, FinishReason::Error);
    }

    #[test]
    fn test_provider_metadata_keyed_by_dialect() {
        let mut normalizer = StreamNormalizer::new(
            OpenAiCompletionDialect::new("azure"),
            StreamOptions::default(),
        );
        let mut out = Vec::new();
        normalizer.push_frame(
            &json!({"choices": [{"text": "a", "finish_reason": "length",
                     "logprobs": {"tokens": ["a"]}}]})
            .to_string(),
            &mut out,
        );
        assert!(normalizer.is_streaming());
        assert_eq!(normalizer.finish_reason(), FinishReason::Length);
        normalizer.finish(&mut out);
        match out.last() {
            Some(StreamPart::Finish {
                provider_metadata, ..
            }) => {
                assert_eq!(
                    provider_metadata["azure"],
                    json!({"logprobs": {"tokens": ["a"]}})
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_after_frame_aborts_with_debug_logging() {
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_test_writer()
                .finish(),
        );
        let token = CancellationToken::new();
        let body = format!("data: {}\n\n", chat_frame("hi"));
        let upstream = futures_util::stream::iter(vec![Ok::<_, std::convert::Infallible>(
            bytes::Bytes::from(body),
        )])
        .chain(futures_util::stream::pending());
        let mut parts = Box::pin(normalize_stream(
            upstream,
            OpenAiChatDialect::default(),
            StreamOptions::default().with_cancel(token.clone()),
        ));

        let mut seen = Vec::new();
        while let Some(Ok(part)) = parts.next().await {
            let done = part.type_name() == "text-delta";
            seen.push(part);
            if done {
                break;
            }
        }
        assert_eq!(type_names(&seen), ["response-metadata", "text-delta"]);

        token.cancel();
        assert!(matches!(parts.next().await, Some(Err(StreamError::Aborted))));
        assert!(parts.next().await.is_none());
    }
}
