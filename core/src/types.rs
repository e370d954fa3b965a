use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single {role, content} turn as sent to the chat-completion endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Request body for `POST {base_url}{chat_path}`
#[derive(Debug, Clone, Serialize)]
pub struct InferenceRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

impl InferenceRequest {
    pub fn new(
        model: impl Into<String>,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature,
            max_tokens,
            stream: false,
        }
    }
}

/// Result of a successful chat-completion call
#[derive(Debug, Clone)]
pub struct InferenceResponse {
    /// `choices[0].message.content`, or a truncated rendering of the payload
    /// when the provider returned an unexpected shape
    pub text: String,
    pub raw: Value,
    pub model: Option<String>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    /// Attempts used, including the successful one
    pub attempts: u32,
    /// Latency of the successful attempt
    pub latency_ms: f64,
}

impl InferenceResponse {
    /// Whether the completion used at least `ratio` of the requested token budget,
    /// in which case it is presumed to have been cut off.
    pub fn presumed_truncated(&self, max_tokens: u32, ratio: f64) -> bool {
        is_presumed_truncated(self.completion_tokens, max_tokens, ratio)
    }
}

pub fn is_presumed_truncated(completion_tokens: Option<u32>, max_tokens: u32, ratio: f64) -> bool {
    match completion_tokens {
        Some(used) if max_tokens > 0 => f64::from(used) >= f64::from(max_tokens) * ratio,
        _ => false,
    }
}

/// Truncate to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
