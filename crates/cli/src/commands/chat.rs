//! `relaychat chat`: run one turn and stream the reply to stdout.

use std::io::Write;

use relaychat_agent::{RelayEvent, TurnOutcome, TurnRequest};
use relaychat_config::AppConfig;
use relaychat_core::message::{ConversationId, UserId};

/// Conversations started from the terminal belong to this user.
const LOCAL_USER: &str = "local";

pub async fn run(
    message: String,
    model: Option<String>,
    chat_id: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if config.providers.openai.api_key.is_none() && config.providers.anthropic.api_key.is_none() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENAI_API_KEY     (gpt-4o, gpt-4o-mini, o1, o3-mini)");
        eprintln!("    CLAUDE_API_KEY     (claude-3-5-sonnet, claude-3-7-sonnet)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let turn = TurnRequest {
        user: UserId::from(LOCAL_USER),
        conversation: ConversationId::from(chat_id.unwrap_or_else(|| config.chat.default_chat_id.clone())),
        model: model.unwrap_or_else(|| config.chat.default_model.clone()),
        text: message,
    };

    tracing::debug!(model = %turn.model, conversation = %turn.conversation, "Sending turn");
    let controller = relaychat_gateway::build_controller(&config).await;

    match controller.handle(turn).await? {
        TurnOutcome::Complete(text) => println!("{text}"),
        TurnOutcome::Streaming(mut rx) => {
            let mut stdout = std::io::stdout();
            while let Some(event) = rx.recv().await {
                match event {
                    RelayEvent::Fragment(text) => {
                        print!("{text}");
                        stdout.flush()?;
                    }
                    RelayEvent::Done => println!(),
                    RelayEvent::Error { message, partial } => {
                        if partial.is_some() {
                            println!();
                        }
                        return Err(message.into());
                    }
                }
            }
        }
    }

    Ok(())
}
