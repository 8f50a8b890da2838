//! Provider trait: the abstraction over LLM wire protocols.
//!
//! A Provider knows how to render a neutral request (persona, history window,
//! current user text) into its upstream schema, and how to decode the
//! upstream response back into plain text, either as a complete message or
//! as a stream of fragments.
//!
//! Implementations: OpenAI-compatible chat completions, Anthropic messages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Receiver;

use crate::error::ProviderError;
use crate::message::{Message, Role};
use crate::model::ProviderKind;

/// Sampling temperature used for every model that accepts one.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// A provider-neutral request for one assistant turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model name sent upstream (`ModelSpec::wire_name`)
    pub model: String,

    /// The system persona
    pub system_prompt: String,

    /// Prior turns, oldest first, without the current user turn
    #[serde(default)]
    pub window: Vec<Message>,

    /// The live user turn, appended last by every adapter
    pub current_text: String,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
}

impl ProviderRequest {
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        window: Vec<Message>,
        current_text: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            window,
            current_text: current_text.into(),
            stream: false,
        }
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Binary role mapping shared by both adapters: anything that is not an
/// assistant turn goes upstream as `user`.
pub fn wire_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "assistant",
        Role::User | Role::System => "user",
    }
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            done: false,
        }
    }

    pub fn finished() -> Self {
        Self {
            content: None,
            done: true,
        }
    }
}

/// Result of decoding one upstream streaming event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDecode {
    /// A text fragment to relay
    Fragment(String),
    /// An event carrying no text (keep-alive, metadata, empty delta)
    Skip,
    /// The upstream signalled the end of the stream
    Terminal,
}

/// Receiving half of a provider stream. The outer `Result` of
/// [`Provider::stream`] reports failures before any data; items reporting
/// `Err` are failures after the upstream accepted the request.
pub type ChunkReceiver = Receiver<std::result::Result<StreamChunk, ProviderError>>;

/// The core Provider trait.
///
/// Both wire protocols implement this trait. The relay calls `complete()` or
/// `stream()` without knowing which protocol is behind it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "anthropic").
    fn name(&self) -> &str;

    /// Which wire protocol this provider speaks.
    fn kind(&self) -> ProviderKind;

    /// Render the upstream request body.
    fn render_request(&self, request: &ProviderRequest) -> serde_json::Value;

    /// Decode one raw SSE `data:` payload.
    fn decode_increment(&self, raw_event: &str) -> std::result::Result<StreamDecode, ProviderError>;

    /// Decode a complete non-streaming response body into text.
    fn decode_full(&self, raw_response: &serde_json::Value) -> std::result::Result<String, ProviderError>;

    /// Send a request and get the complete response text.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<String, ProviderError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a
    /// single fragment followed by a final chunk.
    async fn stream(&self, request: ProviderRequest) -> std::result::Result<ChunkReceiver, ProviderError> {
        let text = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(2);
        let _ = tx.send(Ok(StreamChunk::text(text))).await;
        let _ = tx.send(Ok(StreamChunk::finished())).await;
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAi
        }

        fn render_request(&self, request: &ProviderRequest) -> serde_json::Value {
            serde_json::json!({ "text": request.current_text })
        }

        fn decode_increment(&self, raw_event: &str) -> Result<StreamDecode, ProviderError> {
            Ok(StreamDecode::Fragment(raw_event.to_string()))
        }

        fn decode_full(&self, raw_response: &serde_json::Value) -> Result<String, ProviderError> {
            Ok(raw_response["text"].as_str().unwrap_or_default().to_string())
        }

        async fn complete(&self, request: ProviderRequest) -> Result<String, ProviderError> {
            self.decode_full(&self.render_request(&request))
        }
    }

    #[test]
    fn request_builder_defaults() {
        let req = ProviderRequest::new("gpt-4o", "persona", vec![], "hi");
        assert!(!req.stream);
        assert!(req.window.is_empty());
        assert!(req.streaming(true).stream);
    }

    #[test]
    fn role_mapping_is_binary() {
        assert_eq!(wire_role(Role::Assistant), "assistant");
        assert_eq!(wire_role(Role::User), "user");
        assert_eq!(wire_role(Role::System), "user");
    }

    #[tokio::test]
    async fn default_stream_wraps_complete() {
        let provider = EchoProvider;
        let mut rx = provider
            .stream(ProviderRequest::new("m", "p", vec![], "hello"))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().unwrap(), StreamChunk::text("hello"));
        assert!(rx.recv().await.unwrap().unwrap().done);
        assert!(rx.recv().await.is_none());
    }
}
