pub mod stream;

use serde::{Deserialize, Serialize};

use super::openai_chat::OpenAiUsage;

/// A legacy text-completion streaming chunk (`/completions`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiCompletionChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub choices: Vec<OpenAiCompletionChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<OpenAiUsage>,
}

/// A choice within a completion chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiCompletionChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<serde_json::Value>,
}
