//! Frame decoding: vendor bytes in, one [`SseEvent`] per `data:` frame out.
//!
//! [`SseParser`] does the line work on text; [`sse_frame_stream`] owns the
//! byte side (code points split across reads, the `[DONE]` sentinel, and
//! upstream faults).

use std::fmt::Display;

use futures_util::{Stream, StreamExt};
use memchr::memchr_iter;
use smallvec::SmallVec;

use super::{SseEvent, DONE_SENTINEL};
use crate::error::StreamError;

struct PendingEvents {
    events: SmallVec<[SseEvent; 8]>,
    head: usize,
}

impl PendingEvents {
    #[inline]
    fn new() -> Self {
        Self {
            events: SmallVec::new(),
            head: 0,
        }
    }

    #[inline]
    fn pop_front(&mut self) -> Option<SseEvent> {
        if self.head >= self.events.len() {
            return None;
        }
        let event = std::mem::take(&mut self.events[self.head]);
        self.head += 1;
        if self.head == self.events.len() {
            self.events.clear();
            self.head = 0;
        }
        Some(event)
    }

    #[inline]
    fn extend_from_vec(&mut self, parsed: &mut Vec<SseEvent>) {
        self.events.extend(parsed.drain(..));
    }
}

// ---------------------------------------------------------------------------
// SseParser
// ---------------------------------------------------------------------------

/// Fields collected for the frame currently being assembled.
#[derive(Debug, Default)]
struct PartialFrame {
    event: Option<String>,
    data: Option<String>,
    last_id: Option<String>,
}

impl PartialFrame {
    /// Apply one line with its terminator removed. A blank line closes the
    /// frame; a frame without any `data` field is discarded.
    fn apply_line(&mut self, line: &str, out: &mut Vec<SseEvent>) {
        if line.is_empty() {
            self.close(out);
            return;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "data" => match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_owned()),
            },
            "event" => self.event = Some(value.to_owned()),
            "id" => self.last_id = Some(value.to_owned()),
            // Comments (empty field name), `retry` and unknown fields.
            _ => {}
        }
    }

    fn close(&mut self, out: &mut Vec<SseEvent>) {
        let event = self.event.take();
        if let Some(data) = self.data.take() {
            out.push(SseEvent {
                event,
                data,
                id: self.last_id.clone(),
            });
        }
    }
}

/// Splits decoded text into frames for the validator.
///
/// Reads may end anywhere, including mid-line; the unconsumed tail is kept
/// until its newline arrives. Lines end with `\n` or `\r\n`. Every
/// blank-line-terminated frame carrying at least one `data:` line becomes one
/// [`SseEvent`], its `data:` lines joined with `\n`. The `id` persists across
/// frames; `event` applies to one frame only.
#[derive(Debug, Default)]
pub struct SseParser {
    text: String,
    consumed: usize,
    frame: PartialFrame,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience wrapper over [`SseParser::feed_into`].
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Append `chunk` and push every frame it completes onto `out`.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<SseEvent>) {
        self.text.push_str(chunk);
        let from = self.consumed;
        for newline in memchr_iter(b'\n', &self.text.as_bytes()[from..]) {
            let end = from + newline;
            let line = &self.text[self.consumed..end];
            self.frame
                .apply_line(line.strip_suffix('\r').unwrap_or(line), out);
            self.consumed = end + 1;
        }
        self.compact();
    }

    /// End of input: treat an unterminated last line as complete and close
    /// any frame still open.
    pub fn finish(&mut self, out: &mut Vec<SseEvent>) {
        let tail = std::mem::take(&mut self.text);
        if let Some(line) = tail.get(self.consumed..).filter(|l| !l.is_empty()) {
            self.frame.apply_line(line.trim_end_matches('\r'), out);
        }
        self.consumed = 0;
        self.frame.close(out);
    }

    /// Drop consumed text once it dominates the buffer or passes 8 KiB.
    fn compact(&mut self) {
        if self.consumed == self.text.len() {
            self.text.clear();
            self.consumed = 0;
        } else if self.consumed > 0
            && (self.consumed >= self.text.len() / 2 || self.consumed >= 8 * 1024)
        {
            self.text.drain(..self.consumed);
            self.consumed = 0;
        }
    }
}

/// Check if an [`SseEvent`] is the terminal `[DONE]` sentinel.
#[must_use]
pub fn is_done_event(event: &SseEvent) -> bool {
    event.data.trim() == DONE_SENTINEL
}

// ---------------------------------------------------------------------------
// Stream utility
// ---------------------------------------------------------------------------

/// Decode as much of `remainder` as is valid UTF-8 and feed it to the parser,
/// keeping a trailing split code point for the next read.
fn feed_utf8(remainder: &mut Vec<u8>, parser: &mut SseParser, out: &mut Vec<SseEvent>) {
    let consumed = match std::str::from_utf8(remainder.as_slice()) {
        Ok(text) => {
            parser.feed_into(text, out);
            remainder.len()
        }
        // Invalid sequence mid-buffer rather than a code point split across reads.
        Err(e) if e.error_len().is_some() => {
            parser.feed_into(&String::from_utf8_lossy(remainder), out);
            remainder.len()
        }
        Err(e) => {
            let valid_up_to = e.valid_up_to();
            parser.feed_into(&String::from_utf8_lossy(&remainder[..valid_up_to]), out);
            valid_up_to
        }
    };
    remainder.drain(..consumed);
}

struct FrameDecoder<S> {
    byte_stream: std::pin::Pin<Box<S>>,
    parser: SseParser,
    remainder: Vec<u8>,
    parsed: Vec<SseEvent>,
    pending: PendingEvents,
    upstream_done: bool,
}

/// Split a byte stream into SSE frames.
///
/// The returned stream is lazy: each pull reads from `byte_stream` only until
/// at least one frame is complete. It ends after the `[DONE]` sentinel (which
/// is not yielded and after which nothing more is read), or when the byte
/// stream ends. A byte-stream error is yielded once as
/// [`StreamError::Transport`] and ends the frame stream.
pub fn sse_frame_stream<S, E>(
    byte_stream: S,
) -> impl Stream<Item = Result<SseEvent, StreamError>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let decoder = FrameDecoder {
        byte_stream: Box::pin(byte_stream),
        parser: SseParser::new(),
        remainder: Vec::new(),
        parsed: Vec::with_capacity(8),
        pending: PendingEvents::new(),
        upstream_done: false,
    };

    futures_util::stream::unfold(decoder, |mut st| async move {
        loop {
            if let Some(event) = st.pending.pop_front() {
                if is_done_event(&event) {
                    return None;
                }
                return Some((Ok(event), st));
            }
            if st.upstream_done {
                return None;
            }

            match st.byte_stream.next().await {
                Some(Ok(bytes)) => {
                    if st.remainder.is_empty() {
                        if let Ok(text) = std::str::from_utf8(&bytes) {
                            st.parser.feed_into(text, &mut st.parsed);
                        } else {
                            st.remainder.extend_from_slice(&bytes);
                            feed_utf8(&mut st.remainder, &mut st.parser, &mut st.parsed);
                        }
                    } else {
                        st.remainder.extend_from_slice(&bytes);
                        feed_utf8(&mut st.remainder, &mut st.parser, &mut st.parsed);
                    }
                }
                Some(Err(err)) => {
                    st.upstream_done = true;
                    return Some((Err(StreamError::Transport(err.to_string())), st));
                }
                None => {
                    st.upstream_done = true;
                    if !st.remainder.is_empty() {
                        let tail = String::from_utf8_lossy(&st.remainder).into_owned();
                        st.remainder.clear();
                        st.parser.feed_into(&tail, &mut st.parsed);
                    }
                    st.parser.finish(&mut st.parsed);
                }
            }
            st.pending.extend_from_vec(&mut st.parsed);
        }
    })
    .fuse()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
