use serde::{Deserialize, Deserializer};

use crate::error::StreamError;

/// Error object a vendor embeds in the stream instead of a normal chunk:
/// `{"error": {"message": ..., "type": ..., "param": ..., "code": ...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct VendorErrorChunk {
    pub error: VendorErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VendorErrorBody {
    pub message: String,
    #[serde(rename = "type", default)]
    pub type_: Option<String>,
    #[serde(default)]
    pub param: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "code_as_string")]
    pub code: Option<String>,
}

/// Vendors send `code` as a string or as a number.
fn code_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(code)) => Some(code),
        Some(other) => Some(other.to_string()),
    })
}

impl From<VendorErrorChunk> for StreamError {
    fn from(chunk: VendorErrorChunk) -> Self {
        StreamError::Upstream {
            message: chunk.error.message,
            error_type: chunk.error.type_,
            code: chunk.error.code,
        }
    }
}

/// Whether a parsed payload has the shape of an embedded error object.
pub(crate) fn looks_like_error_object(value: &serde_json::Value) -> bool {
    value
        .as_object()
        .and_then(|obj| obj.get("error"))
        .is_some_and(serde_json::Value::is_object)
}
