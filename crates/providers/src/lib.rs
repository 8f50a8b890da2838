//! LLM Provider implementations for RelayChat.
//!
//! Both wire protocols implement the `relaychat_core::Provider` trait.
//! The router selects the adapter for a model's `ProviderKind`.

pub mod anthropic;
pub mod openai_compat;
pub mod router;
mod sse;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
