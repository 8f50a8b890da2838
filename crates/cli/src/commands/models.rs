//! `relaychat models`: list the model registry.

use relaychat_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let registry = config.model_registry();

    println!("Available Models");
    println!("================");
    println!();
    println!("  {:<20} {:<10} {:<30} {}", "ID", "PROVIDER", "WIRE NAME", "MODE");
    for (id, spec) in registry.iter() {
        let mode = if spec.supports_stream { "stream" } else { "single" };
        let marker = if id == config.chat.default_model { "*" } else { " " };
        let key = if config.has_api_key(spec.provider) { "" } else { "  (no key)" };
        println!(
            "{marker} {id:<20} {:<10} {:<30} {mode}{key}",
            spec.provider.as_str(),
            spec.wire_name
        );
    }
    println!();
    println!("  * default model");
    if !config.sampling_exempt_models.is_empty() {
        println!("  Sent without temperature: {}", config.sampling_exempt_models.join(", "));
    }

    Ok(())
}
