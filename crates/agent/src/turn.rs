//! The turn controller: orchestrates one user request end to end.
//!
//! 1. Lazily create the conversation (seeded with the greeting)
//! 2. Append the user turn, deriving the title if still the placeholder
//! 3. Resolve the model; unknown ids never reach a provider
//! 4. Build the request from the history window
//! 5. Dispatch to the streaming or non-streaming relay path
//!
//! Errors escaping steps 3 to 5 leave an apology as the assistant turn
//! unless the conversation already ends on one.

use std::sync::Arc;

use relaychat_config::AppConfig;
use relaychat_core::error::{Error, Result};
use relaychat_core::message::{ConversationId, Message, UserId};
use relaychat_core::model::ModelRegistry;
use relaychat_core::provider::ProviderRequest;
use relaychat_providers::ProviderRouter;
use relaychat_store::ConversationStore;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::relay::StreamingRelay;
use crate::stream_event::RelayEvent;
use crate::window::{self, DEFAULT_HISTORY_LIMIT};

/// Per-deployment knobs for every turn.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub system_prompt: String,
    pub history_limit: usize,
    pub greeting: String,
}

impl TurnSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            system_prompt: config.persona.system_prompt.clone(),
            history_limit: config.chat.history_limit,
            greeting: config.persona.greeting.clone(),
        }
    }
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            system_prompt: relaychat_config::DEFAULT_SYSTEM_PROMPT.to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            greeting: relaychat_core::message::DEFAULT_GREETING.to_string(),
        }
    }
}

/// One inbound chat request.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub user: UserId,
    pub conversation: ConversationId,
    pub text: String,
    pub model: String,
}

/// What the caller gets back for a turn.
#[derive(Debug)]
pub enum TurnOutcome {
    /// Relay events for a streaming model.
    Streaming(mpsc::Receiver<RelayEvent>),
    /// The full reply of a non-streaming model.
    Complete(String),
}

pub struct TurnController {
    store: Arc<ConversationStore>,
    router: ProviderRouter,
    models: ModelRegistry,
    settings: TurnSettings,
}

impl TurnController {
    pub fn new(
        store: Arc<ConversationStore>,
        router: ProviderRouter,
        models: ModelRegistry,
        settings: TurnSettings,
    ) -> Self {
        Self {
            store,
            router,
            models,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    /// Handle one user turn.
    pub async fn handle(&self, turn: TurnRequest) -> Result<TurnOutcome> {
        let TurnRequest {
            user,
            conversation,
            text,
            model,
        } = turn;

        self.store
            .create_seeded(&user, &conversation, &self.settings.greeting)
            .await;
        let snapshot = self.store.append_user_turn(&user, &conversation, &text).await?;

        let Some(spec) = self.models.resolve(&model).cloned() else {
            warn!(model = %model, "Rejected turn for unknown model");
            return Err(Error::InvalidModel(model));
        };

        info!(
            user = %user,
            conversation = %conversation,
            model = %model,
            provider = %spec.provider,
            stream = spec.supports_stream,
            "Handling turn"
        );

        let result = self.dispatch(&user, &conversation, &snapshot.messages, text, spec).await;

        if let Err(e) = &result {
            self.apologize(&user, &conversation, e).await;
        }
        result
    }

    async fn dispatch(
        &self,
        user: &UserId,
        conversation: &ConversationId,
        messages: &[Message],
        text: String,
        spec: relaychat_core::model::ModelSpec,
    ) -> Result<TurnOutcome> {
        let provider = self.router.get(spec.provider).map_err(Error::ProviderRequest)?;

        let history = window::context_window(messages, self.settings.history_limit);
        debug!(window = history.len(), "History window selected");

        let request = ProviderRequest::new(spec.wire_name, &self.settings.system_prompt, history, text)
            .streaming(spec.supports_stream);
        let relay = StreamingRelay::new(self.store.clone(), provider, user.clone(), conversation.clone());

        if spec.supports_stream {
            Ok(TurnOutcome::Streaming(relay.spawn(request)))
        } else {
            relay.complete(request).await.map(TurnOutcome::Complete)
        }
    }

    /// Leave an apology as the assistant turn unless one already closes the
    /// conversation.
    async fn apologize(&self, user: &UserId, conversation: &ConversationId, err: &Error) {
        let reply = Message::assistant(format!(
            "Sorry, there was an error processing your request: {err}"
        ));
        match self.store.append_reply_if_missing(user, conversation, reply).await {
            Ok(true) => debug!(conversation = %conversation, "Recorded error reply"),
            Ok(false) => {}
            Err(e) => warn!(conversation = %conversation, error = %e, "Failed to record error reply"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{Script, ScriptedProvider, interrupted, memory_store};
    use relaychat_core::error::ProviderError;
    use relaychat_core::message::{DEFAULT_GREETING, Role};

    fn controller(providers: Vec<Arc<ScriptedProvider>>) -> TurnController {
        let mut router = ProviderRouter::new();
        for p in providers {
            router.register(p);
        }
        TurnController::new(memory_store(), router, ModelRegistry::builtin(), TurnSettings::default())
    }

    fn turn(text: &str, model: &str) -> TurnRequest {
        TurnRequest {
            user: UserId::from("u1"),
            conversation: ConversationId::from("default"),
            text: text.into(),
            model: model.into(),
        }
    }

    async fn drain(outcome: TurnOutcome) -> Vec<RelayEvent> {
        let TurnOutcome::Streaming(mut rx) = outcome else {
            panic!("expected a streaming outcome");
        };
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    async fn conversation(ctl: &TurnController) -> relaychat_core::message::Conversation {
        ctl.store()
            .get(&UserId::from("u1"), &ConversationId::from("default"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn first_turn_on_fresh_conversation() {
        let provider = ScriptedProvider::openai(Script::Fragments(vec!["He", "llo", "!"]));
        let ctl = controller(vec![provider.clone()]);

        let events = drain(ctl.handle(turn("Hi", "gpt-4o")).await.unwrap()).await;
        assert_eq!(events.len(), 4);
        assert_eq!(events[3], RelayEvent::Done);

        let conv = conversation(&ctl).await;
        let roles: Vec<Role> = conv.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);
        assert_eq!(conv.messages[0].content, DEFAULT_GREETING);
        assert_eq!(conv.messages[2].content, "Hello!");
        assert_eq!(conv.title, "Hi");

        let request = provider.last_request().unwrap();
        assert_eq!(request.current_text, "Hi");
        assert_eq!(request.window.len(), 1);
        assert_eq!(request.window[0].content, DEFAULT_GREETING);
        assert!(request.stream);
    }

    #[tokio::test]
    async fn current_turn_is_never_in_the_window() {
        let provider = ScriptedProvider::openai(Script::Fragments(vec!["ok"]));
        let ctl = controller(vec![provider.clone()]);

        for text in ["one", "two", "three", "four"] {
            drain(ctl.handle(turn(text, "gpt-4o")).await.unwrap()).await;
            let request = provider.last_request().unwrap();
            assert!(request.window.iter().all(|m| m.content != text));
            assert!(request.window.len() <= 4);
        }
    }

    #[tokio::test]
    async fn unknown_model_makes_no_provider_call() {
        let provider = ScriptedProvider::openai(Script::Fragments(vec!["x"]));
        let ctl = controller(vec![provider.clone()]);

        let err = ctl.handle(turn("Hi", "gpt-99")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidModel(ref m) if m == "gpt-99"));
        assert_eq!(provider.call_count(), 0);

        let conv = conversation(&ctl).await;
        assert_eq!(conv.last_message().unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn unconfigured_provider_leaves_one_apology() {
        let ctl = controller(vec![]);

        let err = ctl.handle(turn("Hi", "claude-3-7-sonnet")).await.unwrap_err();
        assert!(matches!(err, Error::ProviderRequest(ProviderError::NotConfigured(_))));

        let conv = conversation(&ctl).await;
        let last = conv.last_message().unwrap();
        assert!(last.is_assistant());
        assert!(last.content.starts_with("Sorry, there was an error processing your request: "));
    }

    #[tokio::test]
    async fn non_streaming_model_returns_complete_reply() {
        let provider = ScriptedProvider::openai(Script::Reply("Deliberate answer"));
        let ctl = controller(vec![provider.clone()]);

        match ctl.handle(turn("Think hard", "o1")).await.unwrap() {
            TurnOutcome::Complete(text) => assert_eq!(text, "Deliberate answer"),
            TurnOutcome::Streaming(_) => panic!("o1 does not stream"),
        }
        assert!(!provider.last_request().unwrap().stream);
        assert_eq!(conversation(&ctl).await.last_message().unwrap().content, "Deliberate answer");
    }

    #[tokio::test]
    async fn non_streaming_failure_is_not_apologized_twice() {
        let provider = ScriptedProvider::openai(Script::FailBeforeData(ProviderError::Network(
            "refused".into(),
        )));
        let ctl = controller(vec![provider]);

        assert!(ctl.handle(turn("Hi", "o3-mini")).await.is_err());

        let conv = conversation(&ctl).await;
        assert_eq!(conv.messages.len(), 3);
        assert!(conv.messages[2].content.starts_with("Sorry, an error occurred: "));
    }

    #[tokio::test]
    async fn streaming_failure_before_data_leaves_user_turn_last() {
        let provider = ScriptedProvider::anthropic(Script::FailBeforeData(
            ProviderError::RateLimited { retry_after_secs: 5 },
        ));
        let ctl = controller(vec![provider]);

        let events = drain(ctl.handle(turn("Hi", "claude-3-5-sonnet")).await.unwrap()).await;
        assert!(matches!(&events[..], [RelayEvent::Error { .. }]));
        assert_eq!(conversation(&ctl).await.last_message().unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn partial_stream_is_persisted_through_controller() {
        let provider = ScriptedProvider::anthropic(Script::FailAfter(vec!["Par", "tial"], interrupted("reset")));
        let ctl = controller(vec![provider]);

        drain(ctl.handle(turn("Hi", "claude-3-7-sonnet")).await.unwrap()).await;
        assert_eq!(conversation(&ctl).await.last_message().unwrap().content, "Partial");
    }

    #[tokio::test]
    async fn anthropic_models_use_wire_names() {
        let provider = ScriptedProvider::anthropic(Script::Fragments(vec!["ok"]));
        let ctl = controller(vec![provider.clone()]);

        drain(ctl.handle(turn("Hi", "claude-3-5-sonnet")).await.unwrap()).await;
        assert_eq!(provider.last_request().unwrap().model, "claude-3-5-sonnet-20240620");
    }

    #[tokio::test]
    async fn title_is_derived_once() {
        let provider = ScriptedProvider::openai(Script::Fragments(vec!["ok"]));
        let ctl = controller(vec![provider]);

        drain(ctl.handle(turn("Explain quicksort in one paragraph please", "gpt-4o")).await.unwrap()).await;
        drain(ctl.handle(turn("Now mergesort", "gpt-4o")).await.unwrap()).await;
        assert_eq!(conversation(&ctl).await.title, "Explain quicksort in one parag...");
    }
}
