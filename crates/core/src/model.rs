//! Model registry: the static table of models the relay may talk to.
//!
//! The turn controller never contacts a provider for a model id that is
//! absent from this table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The upstream wire protocol a model is served over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI chat completions
    #[serde(alias = "openai_compat")]
    OpenAi,
    /// Anthropic messages
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registry entry describing how to reach one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Which adapter handles this model
    pub provider: ProviderKind,

    /// The model name sent upstream
    #[serde(alias = "name")]
    pub wire_name: String,

    /// Whether responses are relayed fragment by fragment
    #[serde(default = "default_stream", alias = "stream")]
    pub supports_stream: bool,
}

fn default_stream() -> bool {
    true
}

impl ModelSpec {
    pub fn new(provider: ProviderKind, wire_name: impl Into<String>, supports_stream: bool) -> Self {
        Self {
            provider,
            wire_name: wire_name.into(),
            supports_stream,
        }
    }
}

/// Immutable map from model id to [`ModelSpec`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelSpec>,
}

impl ModelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The models shipped out of the box.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.insert("gpt-4o", ModelSpec::new(ProviderKind::OpenAi, "gpt-4o", true));
        registry.insert(
            "gpt-4o-mini",
            ModelSpec::new(ProviderKind::OpenAi, "gpt-4o-mini", true),
        );
        registry.insert("o1", ModelSpec::new(ProviderKind::OpenAi, "o1", false));
        registry.insert("o3-mini", ModelSpec::new(ProviderKind::OpenAi, "o3-mini", false));
        registry.insert(
            "claude-3-5-sonnet",
            ModelSpec::new(ProviderKind::Anthropic, "claude-3-5-sonnet-20240620", true),
        );
        registry.insert(
            "claude-3-7-sonnet",
            ModelSpec::new(ProviderKind::Anthropic, "claude-3-7-sonnet-20250219", true),
        );
        registry
    }

    /// Add or replace an entry. Only used while building the registry at startup.
    pub fn insert(&mut self, id: impl Into<String>, spec: ModelSpec) {
        self.models.insert(id.into(), spec);
    }

    /// Merge entries from `other`, overriding ids already present.
    pub fn extend(&mut self, other: impl IntoIterator<Item = (String, ModelSpec)>) {
        self.models.extend(other);
    }

    /// Look up a model by id.
    pub fn resolve(&self, id: &str) -> Option<&ModelSpec> {
        self.models.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    /// Iterate `(id, spec)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelSpec)> {
        self.models.iter().map(|(id, spec)| (id.as_str(), spec))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
