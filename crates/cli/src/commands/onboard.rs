//! `relaychat onboard`: first-time setup.

use relaychat_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("RelayChat First-Time Setup");
    println!("==========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\nConfig already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("Created config.toml at: {}", config_path.display());
        println!("\nNext steps:");
        println!("   1. Add an API key under [providers.openai] or [providers.anthropic]");
        println!("      (or export OPENAI_API_KEY / CLAUDE_API_KEY)");
        println!("   2. Run: relaychat serve");
        println!("   3. Or try: relaychat chat -m \"Hello\"\n");
    }

    Ok(())
}
