use serde::{Serialize, Serializer};

/// Error type carried by `error` stream parts and by stream-level faults.
///
/// Frame-level kinds (`FrameParse`, `SchemaValidation`, `Upstream`,
/// `InvalidToolCall`) are recovered inside the stream and surface as
/// [`crate::protocol::parts::StreamPart::Error`]. `Transport` and `Aborted`
/// are stream-level faults yielded as `Err` items by
/// [`crate::normalize::normalize_stream`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("Frame parse error: {0}")]
    FrameParse(String),
    #[error("Schema validation error: {0}")]
    SchemaValidation(String),
    #[error("Upstream error: {message}")]
    Upstream {
        message: String,
        error_type: Option<String>,
        code: Option<String>,
    },
    #[error("Invalid tool call: {0}")]
    InvalidToolCall(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Stream aborted")]
    Aborted,
}

/// Broad error category, stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    FrameParse,
    SchemaValidation,
    Upstream,
    InvalidToolCall,
    Transport,
    Aborted,
}

impl StreamError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            StreamError::FrameParse(_) => ErrorKind::FrameParse,
            StreamError::SchemaValidation(_) => ErrorKind::SchemaValidation,
            StreamError::Upstream { .. } => ErrorKind::Upstream,
            StreamError::InvalidToolCall(_) => ErrorKind::InvalidToolCall,
            StreamError::Transport(_) => ErrorKind::Transport,
            StreamError::Aborted => ErrorKind::Aborted,
        }
    }

    /// Whether the error is recovered at the frame level (the stream keeps
    /// going and still ends with `finish`).
    #[must_use]
    pub fn is_frame_level(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::FrameParse
                | ErrorKind::SchemaValidation
                | ErrorKind::Upstream
                | ErrorKind::InvalidToolCall
        )
    }
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    kind: ErrorKind,
    message: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    error_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
}

impl Serialize for StreamError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let (error_type, code) = match self {
            StreamError::Upstream {
                error_type, code, ..
            } => (error_type.as_deref(), code.as_deref()),
            _ => (None, None),
        };
        ErrorPayload {
            kind: self.kind(),
            message: self.to_string(),
            error_type,
            code,
        }
        .serialize(serializer)
    }
}
