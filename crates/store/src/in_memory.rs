//! In-memory backend for tests and ephemeral sessions.

use async_trait::async_trait;
use relaychat_core::error::StoreError;
use relaychat_core::persistence::{PersistenceBackend, StoreSnapshot};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// A backend that keeps the last saved snapshot in memory.
///
/// A fresh store opened on the same backend sees everything the previous
/// store saved, which makes it handy for restart scenarios in tests.
pub struct InMemoryBackend {
    saved: RwLock<StoreSnapshot>,
    saves: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            saved: RwLock::new(StoreSnapshot::new()),
            saves: AtomicUsize::new(0),
        }
    }

    /// The most recently saved snapshot.
    pub async fn saved(&self) -> StoreSnapshot {
        self.saved.read().await.clone()
    }

    /// How many times `save` has been called.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceBackend for InMemoryBackend {
    fn name(&self) -> &str { "memory" }

    async fn load(&self) -> Result<StoreSnapshot, StoreError> {
        Ok(self.saved.read().await.clone())
    }

    async fn save(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        *self.saved.write().await = snapshot.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
