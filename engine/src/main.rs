// Viva discovery service
// Main entry point for the viva binary

use clap::Parser;
use viva_engine::cli::{
    Cli, Command, ConversationAction, SecretAction, SessionAction, TokensAction,
};
use viva_engine::config::Config;
use viva_engine::handlers::{
    handle_conversation_show, handle_doctor, handle_secret_set, handle_session_issue,
    handle_session_purge, handle_session_revoke, handle_tokens_balance, handle_tokens_grant,
    handle_tokens_usage, OutputFormat,
};
use viva_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG wins over both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    tracing::debug!(
        "Viva v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    // Handle commands
    match cli.command {
        Command::Serve => viva_engine::api::serve(config).await,

        Command::Session { action } => match action {
            SessionAction::Issue { user, ttl_hours } => {
                handle_session_issue(user, ttl_hours, &config, format).await
            }
            SessionAction::Revoke { token } => handle_session_revoke(token, &config, format).await,
            SessionAction::Purge => handle_session_purge(&config, format).await,
        },

        Command::Tokens { action } => match action {
            TokensAction::Grant { user, amount } => {
                handle_tokens_grant(user, amount, &config, format).await
            }
            TokensAction::Balance { user } => handle_tokens_balance(user, &config, format).await,
            TokensAction::Usage { user, limit } => {
                handle_tokens_usage(user, limit, &config, format).await
            }
        },

        Command::Conversation { action } => match action {
            ConversationAction::Show { vision, category } => {
                handle_conversation_show(vision, category, &config, format).await
            }
        },

        Command::Secret { action } => match action {
            SecretAction::Set { key } => handle_secret_set(key, format),
        },

        Command::Doctor => {
            tracing::info!("Running diagnostics...");
            handle_doctor(&config, format).await
        }
    }
}
