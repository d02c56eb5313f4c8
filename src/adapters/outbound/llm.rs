use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde_json::Value;

use crate::core::domain::ModelReply;
use crate::core::error::Error as CoreError;
use crate::core::ports::ModelClient;

pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Longest slice of an error body echoed back into a response text.
const MAX_ERROR_BODY_CHARS: usize = 300;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// [`ModelClient`] that posts one-turn chat completions to an OpenAI-style endpoint.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    inner: Arc<ChatCompletionsClientInner>,
}

struct ChatCompletionsClientInner {
    endpoint: String,
    http_client: reqwest::Client,
}

impl ChatCompletionsClient {
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(anyhow!("API key may not be empty"));
        }

        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(anyhow!("Completions endpoint may not be empty"));
        }

        let http_client = build_http_client(api_key.trim())?;
        Ok(Self {
            inner: Arc::new(ChatCompletionsClientInner {
                endpoint,
                http_client,
            }),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    async fn request(&self, prompt: &str, model: &str) -> crate::core::Result<String> {
        let body = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .inner
            .http_client
            .post(&self.inner.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| CoreError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let excerpt: String = text.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(CoreError::Transport(if excerpt.is_empty() {
                format!("endpoint returned HTTP {status}")
            } else {
                format!("endpoint returned HTTP {status}: {excerpt}")
            }));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| CoreError::MalformedResponse(format!("body is not JSON ({err})")))?;
        extract_content(&payload)
    }
}

impl std::fmt::Debug for ChatCompletionsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsClient")
            .field("endpoint", &self.inner.endpoint)
            .finish()
    }
}

#[async_trait]
impl ModelClient for ChatCompletionsClient {
    async fn query(&self, prompt: &str, model: &str) -> ModelReply {
        match self.request(prompt, model).await {
            Ok(content) => ModelReply::Answer(content),
            Err(err) => ModelReply::from_error(&err),
        }
    }
}

/// Pull `choices[0].message.content` out of a completions payload.
fn extract_content(payload: &Value) -> crate::core::Result<String> {
    let choices = payload
        .get("choices")
        .and_then(Value::as_array)
        .ok_or_else(|| CoreError::MalformedResponse("missing 'choices' list".into()))?;
    let first = choices
        .first()
        .ok_or_else(|| CoreError::MalformedResponse("'choices' list is empty".into()))?;
    first
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| {
            CoreError::MalformedResponse("first choice has no 'message.content'".into())
        })
}

fn build_http_client(api_key: &str) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|_| anyhow!("API key contains characters not allowed in a header"))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);

    // System proxy discovery only when EVALBENCH_ENABLE_SYSTEM_PROXY is set.
    let mut builder = reqwest::Client::builder().default_headers(headers);
    if std::env::var_os("EVALBENCH_ENABLE_SYSTEM_PROXY").is_none() {
        builder = builder.no_proxy();
    }
    builder
        .build()
        .map_err(|err| anyhow!("Failed to build HTTP client: {err}"))
}
