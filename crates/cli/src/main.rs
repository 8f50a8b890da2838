//! RelayChat CLI, the main entry point.
//!
//! Commands:
//! - `serve`    Start the HTTP chat gateway
//! - `chat`     Send one message and stream the reply to stdout
//! - `models`   List the model registry
//! - `onboard`  Write a default config file
//! - `status`   Show the effective configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "relaychat",
    about = "RelayChat: chat orchestration and streaming relay",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Keep conversations in memory only
        #[arg(long)]
        ephemeral: bool,
    },

    /// Send a single message and stream the reply
    Chat {
        /// The message to send
        #[arg(short, long)]
        message: String,

        /// Model id from the registry
        #[arg(long)]
        model: Option<String>,

        /// Conversation to append to
        #[arg(long)]
        chat_id: Option<String>,
    },

    /// List the available models
    Models,

    /// Write the default configuration file
    Onboard,

    /// Show the effective configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { port, ephemeral } => commands::serve::run(port, ephemeral).await?,
        Commands::Chat {
            message,
            model,
            chat_id,
        } => commands::chat::run(message, model, chat_id).await?,
        Commands::Models => commands::models::run().await?,
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
