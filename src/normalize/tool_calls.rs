//! Tool-call accumulator.
//!
//! Argument text arrives in arbitrarily small fragments keyed by a per-stream
//! call index. Calls live in an arena (`calls`) addressed through an
//! index → slot map, so arrival order is preserved for the end-of-stream pass.

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use super::ToolCallFragment;
use crate::error::StreamError;
use crate::json_scan::is_complete_json;
use crate::protocol::parts::StreamPart;

/// Input used for a call whose arguments were empty when the stream ended.
pub const EMPTY_ARGUMENTS: &str = "{}";

/// State of one tool call observed in the stream.
///
/// `argument_buffer` only grows until `finished` is set; after that the call
/// ignores every further fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallState {
    pub index: u32,
    pub id: String,
    pub name: String,
    pub argument_buffer: String,
    pub finished: bool,
}

impl ToolCallState {
    fn emit_completed(&mut self, out: &mut Vec<StreamPart>) {
        out.push(StreamPart::ToolInputEnd {
            id: self.id.clone(),
        });
        out.push(StreamPart::ToolCall {
            tool_call_id: self.id.clone(),
            tool_name: self.name.clone(),
            input: self.argument_buffer.clone(),
        });
        self.finished = true;
    }

    fn complete_if_parsable(&mut self, out: &mut Vec<StreamPart>) {
        if arguments_complete(&self.argument_buffer) {
            self.emit_completed(out);
        }
    }
}

/// Whether an argument buffer holds exactly one syntactically valid JSON value.
fn arguments_complete(buffer: &str) -> bool {
    // The scanner rejects most prefixes without allocating; serde has the
    // final say on what counts as valid JSON.
    is_complete_json(buffer) && serde_json::from_str::<serde::de::IgnoredAny>(buffer).is_ok()
}

#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: Vec<ToolCallState>,
    slots: FxHashMap<u32, usize>,
}

impl ToolCallAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment, appending the parts it produces to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidToolCall`] when the first fragment of an
    /// index lacks an id or a function name, or names a non-function type.
    /// The fragment is dropped and nothing is appended.
    pub fn push_fragment(
        &mut self,
        fragment: ToolCallFragment,
        out: &mut Vec<StreamPart>,
    ) -> Result<(), StreamError> {
        if let Some(&slot) = self.slots.get(&fragment.index) {
            let call = &mut self.calls[slot];
            if call.finished {
                debug!(
                    index = fragment.index,
                    id = %call.id,
                    "dropping fragment for finished tool call"
                );
                return Ok(());
            }
            let arguments = fragment.arguments.unwrap_or_default();
            call.argument_buffer.push_str(&arguments);
            out.push(StreamPart::ToolInputDelta {
                id: call.id.clone(),
                delta: arguments,
            });
            call.complete_if_parsable(out);
            return Ok(());
        }

        let ToolCallFragment {
            index,
            id,
            kind,
            name,
            arguments,
        } = fragment;

        if let Some(kind) = kind.as_deref().filter(|k| *k != "function") {
            return Err(StreamError::InvalidToolCall(format!(
                "tool call {index}: expected 'function' type, got '{kind}'"
            )));
        }
        let Some(id) = id else {
            return Err(StreamError::InvalidToolCall(format!(
                "tool call {index}: expected 'id' to be a string"
            )));
        };
        let Some(name) = name else {
            return Err(StreamError::InvalidToolCall(format!(
                "tool call {index}: expected 'function.name' to be a string"
            )));
        };

        out.push(StreamPart::ToolInputStart {
            id: id.clone(),
            tool_name: name.clone(),
        });

        let arguments = arguments.unwrap_or_default();
        let mut call = ToolCallState {
            index,
            id,
            name,
            argument_buffer: String::new(),
            finished: false,
        };
        if !arguments.is_empty() {
            call.argument_buffer.push_str(&arguments);
            out.push(StreamPart::ToolInputDelta {
                id: call.id.clone(),
                delta: arguments,
            });
            call.complete_if_parsable(out);
        }

        self.slots.insert(index, self.calls.len());
        self.calls.push(call);
        Ok(())
    }

    /// End-of-stream pass over calls that are still open.
    ///
    /// Empty or whitespace-only buffers complete as `{}`. Anything else never
    /// became valid JSON and is left without a `tool-call`.
    pub fn finish_open_calls(&mut self, out: &mut Vec<StreamPart>) {
        for call in self.calls.iter_mut().filter(|c| !c.finished) {
            if call.argument_buffer.trim().is_empty() {
                call.argument_buffer.clear();
                call.argument_buffer.push_str(EMPTY_ARGUMENTS);
                call.emit_completed(out);
            } else {
                warn!(
                    index = call.index,
                    id = %call.id,
                    tool = %call.name,
                    buffered = call.argument_buffer.len(),
                    "tool call arguments never became valid JSON"
                );
            }
        }
    }

    /// Calls in first-seen order.
    #[must_use]
    pub fn calls(&self) -> &[ToolCallState] {
        &self.calls
    }

    #[must_use]
    pub fn get(&self, index: u32) -> Option<&ToolCallState> {
        self.slots.get(&index).map(|&slot| &self.calls[slot])
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        self.calls.iter().filter(|c| !c.finished).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
