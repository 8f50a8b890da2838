//! Provider router: selects the adapter serving a model's wire protocol.

use std::collections::HashMap;
use std::sync::Arc;

use relaychat_core::error::ProviderError;
use relaychat_core::model::ProviderKind;
use relaychat_core::provider::Provider;
use tracing::{debug, info};

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::{self, OpenAiCompatProvider};

/// Routes requests to the configured adapter for each [`ProviderKind`].
#[derive(Default, Clone)]
pub struct ProviderRouter {
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under the protocol it speaks.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.kind(), provider);
    }

    /// Get the adapter for `kind`.
    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| ProviderError::NotConfigured(format!("no API key configured for {kind}")))
    }

    pub fn is_configured(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }

    /// List configured provider kinds.
    pub fn list(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<ProviderKind> = self.providers.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

/// Build providers from configuration. Providers without an API key are
/// left out, so their models fail with `NotConfigured`.
pub fn build_from_config(config: &relaychat_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new();

    let openai = &config.providers.openai;
    if let Some(api_key) = openai.api_key.as_deref().filter(|k| !k.is_empty()) {
        let base_url = openai
            .api_url
            .as_deref()
            .unwrap_or(openai_compat::DEFAULT_BASE_URL);
        router.register(Arc::new(
            OpenAiCompatProvider::new("openai", base_url, api_key)
                .with_sampling_exempt(config.sampling_exempt_models.iter().cloned()),
        ));
    } else {
        debug!("OpenAI provider not configured");
    }

    let anthropic = &config.providers.anthropic;
    if let Some(api_key) = anthropic.api_key.as_deref().filter(|k| !k.is_empty()) {
        let mut provider = AnthropicProvider::new(api_key);
        if let Some(base_url) = &anthropic.api_url {
            provider = provider.with_base_url(base_url);
        }
        router.register(Arc::new(provider));
    } else {
        debug!("Anthropic provider not configured");
    }

    info!(providers = ?router.list(), "Provider router ready");
    router
}
