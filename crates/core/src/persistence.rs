//! Persistence trait: the durability boundary of the conversation store.
//!
//! The store keeps the authoritative state in memory and hands a full
//! snapshot to the backend after every mutation. Backends may fail; the
//! store logs the failure and keeps going.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::message::{Conversation, ConversationId, UserId};

/// Every user's conversations, keyed by user then conversation id.
pub type StoreSnapshot = BTreeMap<UserId, BTreeMap<ConversationId, Conversation>>;

/// A durable home for store snapshots.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// The name of this backend (e.g., "file", "memory").
    fn name(&self) -> &str;

    /// Load the full per-user conversation map. Called once at startup.
    async fn load(&self) -> Result<StoreSnapshot, StoreError>;

    /// Replace the durable copy with `snapshot`.
    async fn save(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError>;
}
