//! `relaychat serve`: start the HTTP chat gateway.

use relaychat_config::{AppConfig, StoreBackendKind};

pub async fn run(port_override: Option<u16>, ephemeral: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }
    if ephemeral {
        config.store.backend = StoreBackendKind::Memory;
    }

    println!("RelayChat Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    match config.store.backend {
        StoreBackendKind::File => println!("   History:   {}", config.store.path.display()),
        StoreBackendKind::Memory => println!("   History:   in memory"),
        StoreBackendKind::Noop => println!("   History:   not persisted"),
    }

    relaychat_gateway::start(config).await?;

    Ok(())
}
