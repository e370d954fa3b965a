use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::InferenceSettings;
use crate::errors::{InferenceError, InferenceResult};
use crate::types::*;

/// Fixed pause between attempts
pub const RETRY_BACKOFF: Duration = Duration::from_millis(150);

/// Payload renderings used as fallback text are capped at this many characters
const FALLBACK_TEXT_CHARS: usize = 500;

/// Anything that can answer a chat-completion request
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, request: InferenceRequest) -> InferenceResult<InferenceResponse>;

    /// Full URL requests are sent to (for logging/display)
    fn endpoint(&self) -> String;
}

/// Client for an OpenAI-compatible chat-completion endpoint
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http_client: Client,
    base_url: String,
    chat_path: String,
    timeout: Duration,
    max_retries: u32,
}

impl InferenceClient {
    /// Create a new client. `timeout_ms` is applied to every attempt separately.
    pub fn new(
        base_url: &str,
        chat_path: &str,
        api_key: Option<&str>,
        timeout_ms: u64,
        max_retries: u32,
    ) -> InferenceResult<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(InferenceError::Config(
                "A base URL is required to initialize the inference client".to_string(),
            ));
        }

        let chat_path = if chat_path.starts_with('/') {
            chat_path.to_string()
        } else {
            format!("/{}", chat_path)
        };

        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| InferenceError::Config(format!("Invalid API key format: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()
            .map_err(|e| InferenceError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            chat_path,
            timeout: Duration::from_millis(timeout_ms.max(100)),
            max_retries,
        })
    }

    pub fn from_settings(settings: &InferenceSettings) -> InferenceResult<Self> {
        let base_url = settings.base_url.as_deref().ok_or_else(|| {
            InferenceError::Config("inference.base_url is not configured".to_string())
        })?;
        Self::new(
            base_url,
            &settings.chat_path,
            settings.api_key.as_deref(),
            settings.timeout_ms,
            settings.max_retries,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Convenience wrapper building the request from its parts
    pub async fn chat_messages(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> InferenceResult<InferenceResponse> {
        self.send_with_retry(&InferenceRequest::new(model, messages, temperature, max_tokens))
            .await
    }

    async fn send_with_retry(&self, request: &InferenceRequest) -> InferenceResult<InferenceResponse> {
        let url = self.endpoint();
        let total_attempts = self.max_retries + 1;
        let mut last_error = None;

        for attempt in 1..=total_attempts {
            match self.send_once(&url, request, attempt).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() => {
                    warn!(attempt, total_attempts, error = %e, "Inference attempt failed");
                    last_error = Some(e);
                    if attempt < total_attempts {
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    }
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Inference attempt failed, not retrying");
                    return Err(e);
                }
            }
        }

        Err(match last_error {
            Some(InferenceError::Timeout { message, .. }) => InferenceError::Timeout {
                attempts: total_attempts,
                message,
            },
            Some(other) => other,
            None => InferenceError::Transport("no attempt was made".to_string()),
        })
    }

    async fn send_once(
        &self,
        url: &str,
        request: &InferenceRequest,
        attempt: u32,
    ) -> InferenceResult<InferenceResponse> {
        let started = Instant::now();

        let response = self
            .http_client
            .post(url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| map_transport_error(e, attempt))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| map_transport_error(e, attempt))?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        if !status.is_success() {
            return Err(InferenceError::Http {
                status_code: status.as_u16(),
                body: truncate_chars(&body, FALLBACK_TEXT_CHARS).to_string(),
            });
        }

        debug!(attempt, latency_ms, bytes = body.len(), "Inference response received");
        Ok(parse_completion(&body, attempt, latency_ms))
    }
}

#[async_trait]
impl ChatBackend for InferenceClient {
    async fn chat(&self, request: InferenceRequest) -> InferenceResult<InferenceResponse> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            max_tokens = request.max_tokens,
            "Sending chat completion request"
        );
        self.send_with_retry(&request).await
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, self.chat_path)
    }
}

fn map_transport_error(e: reqwest::Error, attempt: u32) -> InferenceError {
    if e.is_timeout() {
        InferenceError::Timeout {
            attempts: attempt,
            message: e.to_string(),
        }
    } else {
        InferenceError::Transport(e.to_string())
    }
}

/// Extract `choices[0].message.content` and usage from a 200 body.
/// Unexpected shapes degrade to a truncated rendering of the payload.
fn parse_completion(body: &str, attempts: u32, latency_ms: f64) -> InferenceResponse {
    let raw: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Inference response is not JSON, using body as text");
            return InferenceResponse {
                text: truncate_chars(body, FALLBACK_TEXT_CHARS).to_string(),
                raw: Value::String(body.to_string()),
                model: None,
                prompt_tokens: None,
                completion_tokens: None,
                attempts,
                latency_ms,
            };
        }
    };

    let text = match raw.pointer("/choices/0/message/content").and_then(Value::as_str) {
        Some(content) => content.to_string(),
        None => {
            warn!("Inference response has no choices[0].message.content");
            truncate_chars(&raw.to_string(), FALLBACK_TEXT_CHARS).to_string()
        }
    };

    let usage_field = |name: &str| {
        raw.get("usage")
            .and_then(|usage| usage.get(name))
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    };

    InferenceResponse {
        prompt_tokens: usage_field("prompt_tokens"),
        completion_tokens: usage_field("completion_tokens"),
        model: raw.get("model").and_then(Value::as_str).map(str::to_string),
        text,
        raw,
        attempts,
        latency_ms,
    }
}

/// Human-readable classification of a backend URL
pub fn backend_label(base_url: &str) -> &'static str {
    let url = base_url.to_lowercase();
    let is_loopback = url.contains("localhost") || url.contains("127.0.0.1");

    if url.contains(":1234") || url.contains("lmstudio") {
        "LMStudio"
    } else if is_loopback {
        // Port 8000 on loopback is normally a forwarded remote endpoint
        if url.contains(":8000") {
            "AIM (remote)"
        } else {
            "AIM (local)"
        }
    } else if url.contains("prod") {
        "AIM (prod)"
    } else if url.starts_with("http://") || url.starts_with("https://") {
        "AIM (remote)"
    } else {
        "AIM (OpenAI-compatible)"
    }
}
