//! No-op persistence backend. Conversations live only as long as the process.

use async_trait::async_trait;
use relaychat_core::error::StoreError;
use relaychat_core::persistence::{PersistenceBackend, StoreSnapshot};

/// A backend that loads nothing and discards every snapshot.
pub struct NoopBackend;

#[async_trait]
impl PersistenceBackend for NoopBackend {
    fn name(&self) -> &str { "none" }

    async fn load(&self) -> Result<StoreSnapshot, StoreError> {
        Ok(StoreSnapshot::new())
    }

    async fn save(&self, _snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        Ok(())
    }
}
