//! Frame validation.
//!
//! A malformed frame is an expected condition in a long-lived stream, so
//! validation reports failures as values and never panics or returns early
//! past the caller.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::error_shapes::{looks_like_error_object, VendorErrorChunk};
use crate::error::StreamError;

/// A payload that passed validation.
#[derive(Debug, Clone)]
pub enum ValidatedFrame<T> {
    /// A normal vendor chunk.
    Chunk(T),
    /// A deliberate error report embedded in the stream.
    VendorError(VendorErrorChunk),
}

/// Outcome of validating one frame payload.
///
/// Both arms keep the untouched payload (`raw`) for `raw` passthrough parts.
/// For payloads that are not JSON at all, `raw` is the payload string.
#[derive(Debug, Clone)]
pub enum ParseResult<T> {
    Success {
        value: ValidatedFrame<T>,
        raw: serde_json::Value,
    },
    Failure {
        error: StreamError,
        raw: serde_json::Value,
    },
}

impl<T> ParseResult<T> {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ParseResult::Success { .. })
    }

    #[must_use]
    pub fn raw(&self) -> &serde_json::Value {
        match self {
            ParseResult::Success { raw, .. } | ParseResult::Failure { raw, .. } => raw,
        }
    }
}

/// Parse and validate one frame payload against chunk schema `T` or the vendor
/// error schema.
#[must_use]
pub fn validate_frame<T>(payload: &str) -> ParseResult<T>
where
    T: DeserializeOwned,
{
    let raw: serde_json::Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(err) => {
            return ParseResult::Failure {
                error: StreamError::FrameParse(err.to_string()),
                raw: serde_json::Value::String(payload.to_owned()),
            };
        }
    };

    if looks_like_error_object(&raw) {
        if let Ok(error) = VendorErrorChunk::deserialize(&raw) {
            return ParseResult::Success {
                value: ValidatedFrame::VendorError(error),
                raw,
            };
        }
    }

    match T::deserialize(&raw) {
        Ok(chunk) => ParseResult::Success {
            value: ValidatedFrame::Chunk(chunk),
            raw,
        },
        Err(err) => ParseResult::Failure {
            error: StreamError::SchemaValidation(err.to_string()),
            raw,
        },
    }
}
