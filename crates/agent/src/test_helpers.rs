//! Shared test helpers for relay and turn tests.

use std::sync::{Arc, Mutex};

use relaychat_core::error::ProviderError;
use relaychat_core::model::ProviderKind;
use relaychat_core::provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk, StreamDecode};
use relaychat_store::{ConversationStore, InMemoryBackend};

/// What a [`ScriptedProvider`] does when called.
#[derive(Clone)]
pub enum Script {
    /// Stream these fragments, then finish cleanly.
    Fragments(Vec<&'static str>),
    /// Fail before any data.
    FailBeforeData(ProviderError),
    /// Stream these fragments, then fault.
    FailAfter(Vec<&'static str>, ProviderError),
    /// Non-streaming success.
    Reply(&'static str),
}

/// A mock provider that plays back a script and records every request.
pub struct ScriptedProvider {
    kind: ProviderKind,
    script: Script,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(kind: ProviderKind, script: Script) -> Self {
        Self {
            kind,
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn openai(script: Script) -> Arc<Self> {
        Arc::new(Self::new(ProviderKind::OpenAi, script))
    }

    pub fn anthropic(script: Script) -> Arc<Self> {
        Arc::new(Self::new(ProviderKind::Anthropic, script))
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn render_request(&self, request: &ProviderRequest) -> serde_json::Value {
        serde_json::json!({ "model": request.model })
    }

    fn decode_increment(&self, raw_event: &str) -> Result<StreamDecode, ProviderError> {
        Ok(StreamDecode::Fragment(raw_event.to_string()))
    }

    fn decode_full(&self, raw_response: &serde_json::Value) -> Result<String, ProviderError> {
        Ok(raw_response.to_string())
    }

    async fn complete(&self, request: ProviderRequest) -> Result<String, ProviderError> {
        self.requests.lock().unwrap().push(request);
        match &self.script {
            Script::Reply(text) => Ok(text.to_string()),
            Script::Fragments(parts) => Ok(parts.concat()),
            Script::FailBeforeData(e) | Script::FailAfter(_, e) => Err(e.clone()),
        }
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);

        let (parts, fault) = match &self.script {
            Script::FailBeforeData(e) => return Err(e.clone()),
            Script::Fragments(parts) => (parts.clone(), None),
            Script::FailAfter(parts, e) => (parts.clone(), Some(e.clone())),
            Script::Reply(text) => (vec![*text], None),
        };

        let (tx, rx) = tokio::sync::mpsc::channel(8);
        tokio::spawn(async move {
            for part in parts {
                let _ = tx.send(Ok(StreamChunk::text(part))).await;
            }
            let last = match fault {
                Some(e) => Err(e),
                None => Ok(StreamChunk::finished()),
            };
            let _ = tx.send(last).await;
        });
        Ok(rx)
    }
}

/// A store on a fresh in-memory backend.
pub fn memory_store() -> Arc<ConversationStore> {
    Arc::new(ConversationStore::new(Arc::new(InMemoryBackend::new())))
}

pub fn interrupted(reason: &str) -> ProviderError {
    ProviderError::StreamInterrupted(reason.to_string())
}
