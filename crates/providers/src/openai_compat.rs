//! OpenAI-compatible provider implementation.
//!
//! Speaks the `/chat/completions` protocol:
//! - the persona is the first `system` turn of the message list
//! - `temperature` is sent unless the model is sampling-exempt
//! - streaming deltas arrive as `choices[0].delta.content`, ended by `[DONE]`

use async_trait::async_trait;
use relaychat_core::error::ProviderError;
use relaychat_core::model::ProviderKind;
use relaychat_core::provider::*;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::sse;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    /// Model names that must not receive `temperature`
    sampling_exempt: Vec<String>,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
            sampling_exempt: vec!["o3-mini".into()],
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", DEFAULT_BASE_URL, api_key)
    }

    /// Replace the list of models that reject sampling parameters.
    pub fn with_sampling_exempt(mut self, models: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.sampling_exempt = models.into_iter().map(Into::into).collect();
        self
    }

    fn is_sampling_exempt(&self, model: &str) -> bool {
        self.sampling_exempt.iter().any(|m| m == model)
    }

    fn to_api_messages(request: &ProviderRequest) -> Vec<serde_json::Value> {
        let mut messages = Vec::with_capacity(request.window.len() + 2);
        messages.push(serde_json::json!({ "role": "system", "content": request.system_prompt }));
        messages.extend(request.window.iter().map(|m| {
            serde_json::json!({ "role": wire_role(m.role), "content": m.content })
        }));
        messages.push(serde_json::json!({ "role": "user", "content": request.current_text }));
        messages
    }

    /// Decode one streaming `data:` payload.
    fn decode_event(data: &str) -> Result<StreamDecode, ProviderError> {
        if data == "[DONE]" {
            return Ok(StreamDecode::Terminal);
        }

        let event: StreamResponse = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
                return Ok(StreamDecode::Skip);
            }
        };

        if let Some(error) = event.error {
            return Err(ProviderError::StreamInterrupted(error.message));
        }

        let content = event
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|c| !c.is_empty());

        Ok(content.map_or(StreamDecode::Skip, StreamDecode::Fragment))
    }

    async fn send(&self, request: &ProviderRequest) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.render_request(request);

        debug!(
            provider = %self.name,
            model = %request.model,
            stream = request.stream,
            window = request.window.len(),
            "Sending completion request"
        );

        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if request.stream {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder.json(&body).send().await.map_err(sse::transport_error)?;
        sse::check_status(&self.name, response).await
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn render_request(&self, request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(request),
            "stream": request.stream,
        });

        if !self.is_sampling_exempt(&request.model) {
            body["temperature"] = serde_json::json!(DEFAULT_TEMPERATURE);
        }

        body
    }

    fn decode_increment(&self, raw_event: &str) -> Result<StreamDecode, ProviderError> {
        Self::decode_event(raw_event)
    }

    fn decode_full(&self, raw_response: &serde_json::Value) -> Result<String, ProviderError> {
        raw_response["choices"][0]["message"]["content"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))
    }

    async fn complete(&self, request: ProviderRequest) -> Result<String, ProviderError> {
        let request = request.streaming(false);
        let response = self.send(&request).await?;

        let body: serde_json::Value = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse response: {e}"))
        })?;

        self.decode_full(&body)
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let request = request.streaming(true);
        let response = self.send(&request).await?;
        Ok(sse::spawn_pump(
            self.name.clone(),
            response.bytes_stream(),
            Self::decode_event,
        ))
    }
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}
