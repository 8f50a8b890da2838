//! `relaychat status`: show the effective configuration.

use relaychat_config::AppConfig;
use relaychat_core::model::ProviderKind;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let key_state = |kind| if config.has_api_key(kind) { "configured" } else { "missing" };

    println!("RelayChat Status");
    println!("================");
    println!("  Config dir:     {}", AppConfig::config_dir().display());
    println!("  Default model:  {}", config.chat.default_model);
    println!("  Default chat:   {}", config.chat.default_chat_id);
    println!("  History limit:  {}", config.chat.history_limit);
    println!("  Store:          {:?} ({})", config.store.backend, config.store.path.display());
    println!("  Gateway:        {}:{}", config.gateway.host, config.gateway.port);
    println!("  OpenAI key:     {}", key_state(ProviderKind::OpenAi));
    println!("  Anthropic key:  {}", key_state(ProviderKind::Anthropic));

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  Config file found");
    } else {
        println!("\n  No config file, run `relaychat onboard` first");
    }

    Ok(())
}
