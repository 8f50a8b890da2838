//! # RelayChat Core
//!
//! Domain types, traits, and error definitions for the RelayChat relay.
//! This crate has **no HTTP or runtime dependencies**. It defines the domain
//! model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every seam is defined as a trait here. Implementations live in their
//! respective crates:
//! - `Provider` is implemented once per upstream wire protocol
//! - `PersistenceBackend` is implemented by the store's durability backends
//!
//! All crates depend inward on core, so the relay and the turn controller
//! can be tested against mock providers and in-memory backends.

pub mod error;
pub mod message;
pub mod model;
pub mod persistence;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, StoreError};
pub use message::{Conversation, ConversationId, Message, Role, UserId};
pub use model::{ModelRegistry, ModelSpec, ProviderKind};
pub use persistence::{PersistenceBackend, StoreSnapshot};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk, StreamDecode};
