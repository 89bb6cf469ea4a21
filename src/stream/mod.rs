pub mod sse;

pub use sse::{is_done_event, sse_frame_stream, SseParser};

/// Payload of the frame that terminates an SSE stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// A parsed SSE frame from the upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}
