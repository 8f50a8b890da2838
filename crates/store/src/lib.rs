//! Conversation store and persistence backends for RelayChat.
//!
//! The store is the process-wide, in-memory source of truth; backends only
//! receive full snapshots after each mutation.

pub mod file_backend;
pub mod in_memory;
pub mod noop;
pub mod store;

pub use file_backend::FileBackend;
pub use in_memory::InMemoryBackend;
pub use noop::NoopBackend;
pub use store::ConversationStore;
