//! The streaming relay: drives one provider call for one conversation.
//!
//! ```text
//! AwaitingProvider ──ok──▶ Streaming ──exhausted──▶ Completed
//!        │                     │
//!        │ error               │ fault
//!        ▼                     ▼
//!   FailedEmpty     FailedPartial (≥1 fragment) / FailedEmpty
//! ```
//!
//! Every fragment is emitted as soon as it is decoded. The accumulated text
//! is persisted as one assistant turn on completion, and on a fault after at
//! least one fragment. A failure before any output persists nothing.

use std::sync::Arc;

use relaychat_core::error::{Error, ProviderError};
use relaychat_core::message::{ConversationId, Message, UserId};
use relaychat_core::provider::{Provider, ProviderRequest};
use relaychat_store::ConversationStore;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::stream_event::RelayEvent;

/// Where a relay run ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    AwaitingProvider,
    Streaming,
    Completed,
    FailedEmpty,
    FailedPartial,
}

impl RelayState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::FailedEmpty | Self::FailedPartial)
    }
}

/// Summary of a finished relay run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub state: RelayState,
    pub fragments: usize,
    pub text: String,
}

/// Relays one assistant turn from a provider into a conversation.
pub struct StreamingRelay {
    store: Arc<ConversationStore>,
    provider: Arc<dyn Provider>,
    user: UserId,
    conversation: ConversationId,
}

impl StreamingRelay {
    pub fn new(
        store: Arc<ConversationStore>,
        provider: Arc<dyn Provider>,
        user: UserId,
        conversation: ConversationId,
    ) -> Self {
        Self {
            store,
            provider,
            user,
            conversation,
        }
    }

    /// Run the relay on a background task and return its event stream.
    ///
    /// Dropping the receiver does not cancel the run; the provider is
    /// drained and the reply persisted regardless.
    pub fn spawn(self, request: ProviderRequest) -> mpsc::Receiver<RelayEvent> {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            self.run(request, tx).await;
        });
        rx
    }

    /// Drive the streaming state machine to a terminal state.
    pub async fn run(&self, request: ProviderRequest, events: mpsc::Sender<RelayEvent>) -> RelayReport {
        let mut sink = EventSink::new(events);
        let mut state = RelayState::AwaitingProvider;
        debug!(
            provider = self.provider.name(),
            model = %request.model,
            conversation = %self.conversation,
            ?state,
            "Relay started"
        );

        let mut chunks = match self.provider.stream(request).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Provider rejected stream request");
                sink.emit(RelayEvent::Error {
                    message: format!("Error creating completion: {e}"),
                    partial: None,
                })
                .await;
                return RelayReport {
                    state: RelayState::FailedEmpty,
                    fragments: 0,
                    text: String::new(),
                };
            }
        };

        state = RelayState::Streaming;
        let mut accumulated = String::new();
        let mut fragments = 0usize;
        let mut fault: Option<ProviderError> = None;

        while let Some(item) = chunks.recv().await {
            match item {
                Ok(chunk) => {
                    if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                        accumulated.push_str(&text);
                        fragments += 1;
                        sink.emit(RelayEvent::Fragment(text)).await;
                    }
                    if chunk.done {
                        break;
                    }
                }
                Err(e) => {
                    fault = Some(e);
                    break;
                }
            }
        }
        debug!(conversation = %self.conversation, ?state, fragments, "Provider stream drained");

        match fault {
            None => {
                self.persist(&accumulated).await;
                sink.emit(RelayEvent::Done).await;
                info!(conversation = %self.conversation, fragments, "Relay completed");
                RelayReport {
                    state: RelayState::Completed,
                    fragments,
                    text: accumulated,
                }
            }
            Some(e) => {
                let err = Error::ProviderStream {
                    source: e.clone(),
                    fragments,
                };
                warn!(conversation = %self.conversation, error = %err, "Relay failed mid-stream");

                let (state, partial) = if fragments > 0 {
                    self.persist(&accumulated).await;
                    (RelayState::FailedPartial, Some(accumulated.clone()))
                } else {
                    (RelayState::FailedEmpty, None)
                };

                sink.emit(RelayEvent::Error {
                    message: format!("Error processing stream: {e}"),
                    partial,
                })
                .await;

                RelayReport {
                    state,
                    fragments,
                    text: accumulated,
                }
            }
        }
    }

    /// The non-streaming path: one blocking call, one persisted turn.
    ///
    /// A failure persists an apology as the assistant turn and is returned
    /// to the caller.
    pub async fn complete(&self, request: ProviderRequest) -> Result<String, Error> {
        debug!(
            provider = self.provider.name(),
            model = %request.model,
            conversation = %self.conversation,
            "Relaying non-streaming request"
        );

        match self.provider.complete(request).await {
            Ok(text) => {
                self.persist(&text).await;
                Ok(text)
            }
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Non-streaming request failed");
                self.persist(&format!("Sorry, an error occurred: {e}")).await;
                Err(Error::ProviderRequest(e))
            }
        }
    }

    async fn persist(&self, text: &str) {
        if let Err(e) = self
            .store
            .append(&self.user, &self.conversation, Message::assistant(text))
            .await
        {
            warn!(conversation = %self.conversation, error = %e, "Failed to persist assistant turn");
        }
    }
}

/// Event sender that tolerates a departed consumer.
struct EventSink {
    tx: mpsc::Sender<RelayEvent>,
    closed: bool,
}

impl EventSink {
    fn new(tx: mpsc::Sender<RelayEvent>) -> Self {
        Self { tx, closed: false }
    }

    async fn emit(&mut self, event: RelayEvent) {
        if self.closed {
            return;
        }
        if self.tx.send(event).await.is_err() {
            self.closed = true;
            debug!("Relay consumer disconnected, continuing to drain provider");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, Script, interrupted, memory_store};
    use relaychat_core::message::Role;

    fn user() -> UserId {
        UserId::from("u1")
    }

    fn chat() -> ConversationId {
        ConversationId::from("default")
    }

    async fn setup(script: Script) -> (Arc<ConversationStore>, StreamingRelay) {
        let store = memory_store();
        store.create(&user(), &chat()).await;
        store.append_user_turn(&user(), &chat(), "Hi").await.unwrap();
        let relay = StreamingRelay::new(store.clone(), ScriptedProvider::openai(script), user(), chat());
        (store, relay)
    }

    fn request() -> ProviderRequest {
        ProviderRequest::new("gpt-4o", "persona", vec![], "Hi").streaming(true)
    }

    async fn collect(mut rx: mpsc::Receiver<RelayEvent>) -> Vec<RelayEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn hello_scenario_streams_and_persists() {
        let (store, relay) = setup(Script::Fragments(vec!["He", "llo", "!"])).await;
        let events = collect(relay.spawn(request())).await;

        assert_eq!(
            events,
            vec![
                RelayEvent::Fragment("He".into()),
                RelayEvent::Fragment("llo".into()),
                RelayEvent::Fragment("!".into()),
                RelayEvent::Done,
            ]
        );

        let conv = store.get(&user(), &chat()).await.unwrap();
        let last = conv.last_message().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, "Hello!");
    }

    #[tokio::test]
    async fn accumulated_text_equals_concatenated_fragments() {
        let (_store, relay) = setup(Script::Fragments(vec!["a", "b", "c", "d"])).await;
        let (tx, rx) = mpsc::channel(16);
        let report = relay.run(request(), tx).await;

        assert_eq!(report.state, RelayState::Completed);
        assert_eq!(report.fragments, 4);

        let streamed: String = collect(rx)
            .await
            .into_iter()
            .filter_map(|e| match e {
                RelayEvent::Fragment(t) => Some(t),
                _ => None,
            })
            .collect();
        assert_eq!(streamed, report.text);
    }

    #[tokio::test]
    async fn failure_before_data_persists_nothing() {
        let (store, relay) = setup(Script::FailBeforeData(ProviderError::AuthenticationFailed(
            "bad key".into(),
        )))
        .await;
        let before = store.get(&user(), &chat()).await.unwrap().messages.len();

        let (tx, rx) = mpsc::channel(16);
        let report = relay.run(request(), tx).await;
        assert_eq!(report.state, RelayState::FailedEmpty);

        let events = collect(rx).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            RelayEvent::Error { message, partial } => {
                assert!(message.starts_with("Error creating completion:"));
                assert!(partial.is_none());
            }
            other => panic!("unexpected event {other:?}"),
        }

        let conv = store.get(&user(), &chat()).await.unwrap();
        assert_eq!(conv.messages.len(), before);
        assert_eq!(conv.last_message().unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn fault_after_fragments_persists_partial_text() {
        let (store, relay) =
            setup(Script::FailAfter(vec!["He", "llo"], interrupted("connection reset"))).await;
        let (tx, rx) = mpsc::channel(16);
        let report = relay.run(request(), tx).await;

        assert_eq!(report.state, RelayState::FailedPartial);
        assert_eq!(report.fragments, 2);

        let events = collect(rx).await;
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[2],
            RelayEvent::Error {
                message: "Error processing stream: Stream interrupted: connection reset".into(),
                partial: Some("Hello".into()),
            }
        );

        let conv = store.get(&user(), &chat()).await.unwrap();
        assert_eq!(conv.last_message().unwrap().content, "Hello");
        assert!(conv.ends_with_assistant());
    }

    #[tokio::test]
    async fn fault_without_fragments_is_failed_empty() {
        let (store, relay) = setup(Script::FailAfter(vec![], interrupted("eof"))).await;
        let (tx, rx) = mpsc::channel(16);
        let report = relay.run(request(), tx).await;

        assert_eq!(report.state, RelayState::FailedEmpty);
        let events = collect(rx).await;
        assert!(matches!(
            &events[..],
            [RelayEvent::Error { message, partial: None }] if message.starts_with("Error processing stream:")
        ));
        assert!(!store.get(&user(), &chat()).await.unwrap().ends_with_assistant());
    }

    #[tokio::test]
    async fn nothing_follows_a_terminal_event() {
        let (_store, relay) = setup(Script::FailAfter(vec!["x"], interrupted("boom"))).await;
        let events = collect(relay.spawn(request())).await;
        let terminal = events.iter().position(RelayEvent::is_terminal).unwrap();
        assert_eq!(terminal, events.len() - 1);
    }

    #[tokio::test]
    async fn dropped_consumer_still_persists_reply() {
        let (store, relay) = setup(Script::Fragments(vec!["still ", "saved"])).await;
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let report = relay.run(request(), tx).await;
        assert_eq!(report.state, RelayState::Completed);
        assert_eq!(
            store.get(&user(), &chat()).await.unwrap().last_message().unwrap().content,
            "still saved"
        );
    }

    #[tokio::test]
    async fn non_streaming_success_persists_reply() {
        let (store, relay) = setup(Script::Reply("Full answer")).await;
        let text = relay.complete(request().streaming(false)).await.unwrap();

        assert_eq!(text, "Full answer");
        assert_eq!(
            store.get(&user(), &chat()).await.unwrap().last_message().unwrap().content,
            "Full answer"
        );
    }

    #[tokio::test]
    async fn non_streaming_failure_persists_apology_and_errors() {
        let (store, relay) = setup(Script::FailBeforeData(ProviderError::Timeout("120s".into()))).await;
        let err = relay.complete(request().streaming(false)).await.unwrap_err();
        assert!(matches!(err, Error::ProviderRequest(ProviderError::Timeout(_))));

        let conv = store.get(&user(), &chat()).await.unwrap();
        let last = conv.last_message().unwrap();
        assert!(last.is_assistant());
        assert!(last.content.starts_with("Sorry, an error occurred: "));
    }

    #[test]
    fn terminal_states() {
        assert!(!RelayState::AwaitingProvider.is_terminal());
        assert!(!RelayState::Streaming.is_terminal());
        assert!(RelayState::Completed.is_terminal());
        assert!(RelayState::FailedEmpty.is_terminal());
        assert!(RelayState::FailedPartial.is_terminal());
    }
}
