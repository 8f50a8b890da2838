//! The per-user conversation store.
//!
//! Every mutation runs under one write lock against the current state and is
//! followed by a flush of the full snapshot to the persistence backend.
//! Flushes are serialized and each one snapshots the state after it gets its
//! turn, so the last flush to finish always carries the newest state.
//! A failed flush is logged; the in-memory mutation stands.

use std::collections::BTreeMap;
use std::sync::Arc;

use relaychat_core::error::StoreError;
use relaychat_core::message::{
    Conversation, ConversationId, DEFAULT_GREETING, Message, UserId,
};
use relaychat_core::persistence::{PersistenceBackend, StoreSnapshot};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, warn};

pub struct ConversationStore {
    state: RwLock<StoreSnapshot>,
    backend: Arc<dyn PersistenceBackend>,
    flush_lock: Mutex<()>,
    greeting: String,
}

impl ConversationStore {
    /// An empty store writing through to `backend`. Nothing is loaded.
    pub fn new(backend: Arc<dyn PersistenceBackend>) -> Self {
        Self::with_state(backend, StoreSnapshot::new())
    }

    /// Load the backend's snapshot and start from it.
    ///
    /// A load failure is logged and the store starts empty.
    pub async fn open(backend: Arc<dyn PersistenceBackend>) -> Self {
        let state = match backend.load().await {
            Ok(snapshot) => {
                debug!(backend = backend.name(), users = snapshot.len(), "Conversation store loaded");
                snapshot
            }
            Err(e) => {
                error!(backend = backend.name(), error = %e, "Failed to load chat histories, starting empty");
                StoreSnapshot::new()
            }
        };
        Self::with_state(backend, state)
    }

    fn with_state(backend: Arc<dyn PersistenceBackend>, state: StoreSnapshot) -> Self {
        Self {
            state: RwLock::new(state),
            backend,
            flush_lock: Mutex::new(()),
            greeting: DEFAULT_GREETING.to_string(),
        }
    }

    /// Override the greeting seeded into new conversations.
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    // --- Reads ---

    pub async fn get(&self, user: &UserId, id: &ConversationId) -> Result<Conversation, StoreError> {
        let state = self.state.read().await;
        state
            .get(user)
            .and_then(|chats| chats.get(id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// All conversations of `user`, newest first.
    pub async fn list(&self, user: &UserId) -> Vec<Conversation> {
        let state = self.state.read().await;
        let mut chats: Vec<Conversation> = state
            .get(user)
            .map(|chats| chats.values().cloned().collect())
            .unwrap_or_default();
        chats.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        chats
    }

    // --- Creation ---

    /// Seed `id` with the greeting unless it already exists.
    pub async fn create(&self, user: &UserId, id: &ConversationId) -> Conversation {
        self.create_seeded(user, id, &self.greeting).await
    }

    /// Like [`create`](Self::create), with an explicit greeting.
    pub async fn create_seeded(
        &self,
        user: &UserId,
        id: &ConversationId,
        greeting: &str,
    ) -> Conversation {
        let (conversation, created) = {
            let mut state = self.state.write().await;
            let chats = state.entry(user.clone()).or_default();
            match chats.get(id) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let conversation = Conversation::seeded(id.clone(), greeting);
                    chats.insert(id.clone(), conversation.clone());
                    (conversation, true)
                }
            }
        };

        if created {
            debug!(user = %user, conversation = %id, "Conversation created");
            self.flush().await;
        }
        conversation
    }

    /// Create a conversation under a freshly generated id.
    pub async fn new_conversation(&self, user: &UserId) -> Conversation {
        self.create(user, &ConversationId::new()).await
    }

    /// First sight of a user seeds their `default_id` conversation.
    /// Returns `true` if the user was new.
    pub async fn ensure_user(&self, user: &UserId, default_id: &ConversationId) -> bool {
        let seeded = {
            let mut state = self.state.write().await;
            if state.contains_key(user) {
                false
            } else {
                let mut chats = BTreeMap::new();
                chats.insert(
                    default_id.clone(),
                    Conversation::seeded(default_id.clone(), &self.greeting),
                );
                state.insert(user.clone(), chats);
                true
            }
        };

        if seeded {
            self.flush().await;
        }
        seeded
    }

    // --- Mutations ---

    /// Append `message`. Returns the conversation's new revision.
    pub async fn append(
        &self,
        user: &UserId,
        id: &ConversationId,
        message: Message,
    ) -> Result<u64, StoreError> {
        self.mutate(user, id, |conv| {
            conv.push(message);
            conv.revision
        })
        .await
    }

    /// Append the user's turn and derive the title if it is still the
    /// placeholder. Returns the conversation as it stands after the append.
    pub async fn append_user_turn(
        &self,
        user: &UserId,
        id: &ConversationId,
        text: &str,
    ) -> Result<Conversation, StoreError> {
        self.mutate(user, id, |conv| {
            conv.push(Message::user(text));
            if conv.apply_auto_title(text) {
                debug!(conversation = %conv.id, title = %conv.title, "Conversation titled");
            }
            conv.clone()
        })
        .await
    }

    /// Append `message` only if the conversation does not already end on an
    /// assistant turn. Returns whether it was appended.
    pub async fn append_reply_if_missing(
        &self,
        user: &UserId,
        id: &ConversationId,
        message: Message,
    ) -> Result<bool, StoreError> {
        let appended = {
            let mut state = self.state.write().await;
            let conv = Self::lookup(&mut state, user, id)?;
            if conv.ends_with_assistant() {
                false
            } else {
                conv.push(message);
                true
            }
        };

        if appended {
            self.flush().await;
        }
        Ok(appended)
    }

    pub async fn rename(
        &self,
        user: &UserId,
        id: &ConversationId,
        title: impl Into<String>,
    ) -> Result<(), StoreError> {
        let title = title.into();
        self.mutate(user, id, |conv| conv.rename(title)).await
    }

    pub async fn delete(&self, user: &UserId, id: &ConversationId) -> Result<(), StoreError> {
        {
            let mut state = self.state.write().await;
            state
                .get_mut(user)
                .and_then(|chats| chats.remove(id))
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        }
        debug!(user = %user, conversation = %id, "Conversation deleted");
        self.flush().await;
        Ok(())
    }

    async fn mutate<T>(
        &self,
        user: &UserId,
        id: &ConversationId,
        f: impl FnOnce(&mut Conversation) -> T,
    ) -> Result<T, StoreError> {
        let out = {
            let mut state = self.state.write().await;
            let conv = Self::lookup(&mut state, user, id)?;
            f(conv)
        };
        self.flush().await;
        Ok(out)
    }

    fn lookup<'a>(
        state: &'a mut StoreSnapshot,
        user: &UserId,
        id: &ConversationId,
    ) -> Result<&'a mut Conversation, StoreError> {
        state
            .get_mut(user)
            .and_then(|chats| chats.get_mut(id))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Write the current state through to the backend.
    async fn flush(&self) {
        let _guard = self.flush_lock.lock().await;
        let snapshot = self.state.read().await.clone();
        if let Err(e) = self.backend.save(&snapshot).await {
            warn!(backend = self.backend.name(), error = %e, "Failed to save chat histories");
        }
    }
}
