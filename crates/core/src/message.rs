//! Message and Conversation domain types.
//!
//! These are the core value objects that flow through the entire system:
//! User sends a message → Turn controller appends it → Relay streams the
//! provider's reply → the reply is appended as an assistant turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title every conversation starts with until the first user turn arrives.
pub const PLACEHOLDER_TITLE: &str = "New Chat";

/// Greeting seeded as the first assistant turn of every new conversation.
pub const DEFAULT_GREETING: &str = "👋 Hello! I'm your AI assistant. How can I help you today?";

/// Number of characters kept when deriving a title from the first user turn.
pub const TITLE_MAX_CHARS: usize = 30;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of the user (client session) owning conversations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Mint a fresh anonymous user id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System entries; adapters send them as user turns
    System,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    #[serde(default = "new_message_id")]
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

/// Derive a conversation title from the first user message.
///
/// Keeps the first 30 characters and appends `...` only when something was cut.
pub fn derive_title(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// A conversation is an ordered sequence of messages with shared context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Placeholder, auto-derived, or user-set title
    pub title: String,

    /// Ordered messages, append-only
    pub messages: Vec<Message>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the conversation was last mutated
    pub updated_at: DateTime<Utc>,

    /// Bumped on every mutation; lets callers detect concurrent writers
    #[serde(default)]
    pub revision: u64,
}

impl Conversation {
    /// Create a conversation seeded with the assistant greeting.
    pub fn seeded(id: ConversationId, greeting: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: PLACEHOLDER_TITLE.to_string(),
            messages: vec![Message::assistant(greeting)],
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    /// Add a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.touch();
    }

    /// Replace the title (explicit rename).
    pub fn rename(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.touch();
    }

    /// Derive the title from `text` if the conversation still carries the
    /// placeholder. Returns `true` when the title changed.
    pub fn apply_auto_title(&mut self, text: &str) -> bool {
        if self.title != PLACEHOLDER_TITLE || text.is_empty() {
            return false;
        }
        self.title = derive_title(text);
        true
    }

    /// The most recent message, if any.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Whether the conversation currently ends on an assistant turn.
    pub fn ends_with_assistant(&self) -> bool {
        self.last_message().is_some_and(Message::is_assistant)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.revision += 1;
    }
}
