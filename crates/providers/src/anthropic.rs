//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as a top-level field, never a turn
//! - Streaming via SSE with `content_block_delta` events

use async_trait::async_trait;
use relaychat_core::error::ProviderError;
use relaychat_core::model::ProviderKind;
use relaychat_core::provider::*;
use tracing::{debug, trace};

use crate::sse;

const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .unwrap_or_default();

        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn to_api_messages(request: &ProviderRequest) -> Vec<serde_json::Value> {
        request
            .window
            .iter()
            .map(|m| serde_json::json!({ "role": wire_role(m.role), "content": m.content }))
            .chain(std::iter::once(
                serde_json::json!({ "role": "user", "content": request.current_text }),
            ))
            .collect()
    }

    /// Decode one streaming `data:` payload.
    fn decode_event(data: &str) -> Result<StreamDecode, ProviderError> {
        let event: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE");
                return Ok(StreamDecode::Skip);
            }
        };

        match event["type"].as_str().unwrap_or("") {
            "content_block_delta" => {
                let delta = &event["delta"];
                match (delta["type"].as_str(), delta["text"].as_str()) {
                    (Some("text_delta"), Some(text)) if !text.is_empty() => {
                        Ok(StreamDecode::Fragment(text.to_string()))
                    }
                    _ => Ok(StreamDecode::Skip),
                }
            }
            "message_stop" => Ok(StreamDecode::Terminal),
            "error" => {
                let message = event["error"]["message"]
                    .as_str()
                    .unwrap_or("Anthropic stream error")
                    .to_string();
                Err(ProviderError::StreamInterrupted(message))
            }
            _ => Ok(StreamDecode::Skip),
        }
    }

    async fn send(&self, request: &ProviderRequest) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.render_request(request);

        debug!(
            provider = %self.name,
            model = %request.model,
            stream = request.stream,
            window = request.window.len(),
            "Sending Anthropic request"
        );

        let mut builder = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json");
        if request.stream {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder.json(&body).send().await.map_err(sse::transport_error)?;
        sse::check_status(&self.name, response).await
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn render_request(&self, request: &ProviderRequest) -> serde_json::Value {
        serde_json::json!({
            "model": request.model,
            "system": request.system_prompt,
            "messages": Self::to_api_messages(request),
            "max_tokens": DEFAULT_MAX_TOKENS,
            "temperature": DEFAULT_TEMPERATURE,
            "stream": request.stream,
        })
    }

    fn decode_increment(&self, raw_event: &str) -> Result<StreamDecode, ProviderError> {
        Self::decode_event(raw_event)
    }

    fn decode_full(&self, raw_response: &serde_json::Value) -> Result<String, ProviderError> {
        raw_response["content"][0]["text"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| ProviderError::InvalidResponse("No text content block in response".into()))
    }

    async fn complete(&self, request: ProviderRequest) -> Result<String, ProviderError> {
        let request = request.streaming(false);
        let response = self.send(&request).await?;

        let body: serde_json::Value = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse Anthropic response: {e}"))
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

#[cfg(test)]
mod tests {
    use super::*;
    use relaychat_core::message::Message;

    #[test]
    fn provider_defaults() {
        let provider = AnthropicProvider::new("sk-ant-test");
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.kind(), ProviderKind::Anthropic);
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn custom_base_url_trims_slash() {
        let provider = AnthropicProvider::new("key").with_base_url("http://localhost:8080/");
        assert_eq!(provider.base_url, "http://localhost:8080");
    }

    #[test]
    fn system_prompt_is_top_level_not_a_turn() {
        let provider = AnthropicProvider::new("key");
        let req = ProviderRequest::new(
            "claude-3-7-sonnet-20250219",
            "Be brief.",
            vec![Message::assistant("Hi!"), Message::user("earlier")],
            "now",
        );
        let body = provider.render_request(&req);

        assert_eq!(body["system"], "Be brief.");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().all(|m| m["role"] != "system"));
        assert_eq!(messages[0]["role"], "assistant");
        assert_eq!(messages[2]["content"], "now");
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["temperature"], 0.7);
    }

    #[test]
    fn empty_window_still_sends_current_turn() {
        let provider = AnthropicProvider::new("key");
        let body = provider.render_request(&ProviderRequest::new("m", "p", vec![], "hello"));
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn decode_text_delta() {
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#;
        assert_eq!(
            AnthropicProvider::decode_event(data).unwrap(),
            StreamDecode::Fragment("Hello".into())
        );
    }

    #[test]
    fn decode_skips_non_text_events() {
        let events = [
            r#"{"type":"message_start","message":{"id":"msg_1"}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"ping"}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{"}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":3}}"#,
        ];
        for data in events {
            assert_eq!(AnthropicProvider::decode_event(data).unwrap(), StreamDecode::Skip);
        }
    }

    #[test]
    fn decode_message_stop_is_terminal() {
        assert_eq!(
            AnthropicProvider::decode_event(r#"{"type":"message_stop"}"#).unwrap(),
            StreamDecode::Terminal
        );
    }

    #[test]
    fn decode_error_event_interrupts() {
        let data = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let err = AnthropicProvider::decode_event(data).unwrap_err();
        assert!(matches!(err, ProviderError::StreamInterrupted(ref m) if m == "Overloaded"));
    }

    #[test]
    fn decode_full_takes_first_text_block() {
        let provider = AnthropicProvider::new("key");
        let body = serde_json::json!({
            "content": [{"type": "text", "text": "Hello there"}],
            "stop_reason": "end_turn"
        });
        assert_eq!(provider.decode_full(&body).unwrap(), "Hello there");
        assert!(provider.decode_full(&serde_json::json!({"content": []})).is_err());
    }
}
