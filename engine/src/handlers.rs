//! Command handlers for CLI operations
//!
//! This module implements the handlers for the administrative commands:
//! - session issue / revoke / purge: manage bearer sessions
//! - tokens grant / balance / usage: manage token balances
//! - conversation show: inspect stored discovery conversations
//! - secret set: store a secret in the OS keychain
//! - doctor: validate configuration and check dependencies

use anyhow::{Context, Result};
use serde_json::json;

use crate::api::SECRET_SERVICE;
use crate::config::Config;
use crate::db::Database;
use crate::discovery::resolve_category;
use crate::llm::openai::API_KEY_SECRET;
use crate::secrets::SecretManager;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

async fn open_database(config: &Config) -> Result<Database> {
    Database::new(&config.database_path())
        .await
        .context("Failed to open database")
}

fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

/// Issue a bearer session for a user
pub async fn handle_session_issue(
    user: String,
    ttl_hours: Option<u64>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let user = user.trim();
    if user.is_empty() {
        anyhow::bail!("--user must not be blank");
    }

    let ttl = ttl_hours.unwrap_or(config.auth.session_ttl_hours);
    let db = open_database(config).await?;
    let session = db.sessions().issue(user, ttl).await?;

    match format {
        OutputFormat::Text => {
            println!("Session issued for {}", session.user_id);
            println!("  Token:   {}", session.token.expose());
            println!("  Expires: {}", format_timestamp(session.expires_at));
            println!();
            println!("The token is shown once. Send it as `Authorization: Bearer <token>`.");
        }
        OutputFormat::Json => {
            let output = json!({
                "user_id": session.user_id,
                "token": session.token.expose(),
                "expires_at": session.expires_at,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    db.close().await?;
    Ok(())
}

/// Revoke a bearer session
pub async fn handle_session_revoke(
    token: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let db = open_database(config).await?;
    let revoked = db.sessions().revoke(token.trim()).await?;

    match format {
        OutputFormat::Text => {
            if revoked {
                println!("✓ Session revoked");
            } else {
                println!("No session matches that token");
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "revoked": revoked }))?
            );
        }
    }

    db.close().await?;
    Ok(())
}

/// Delete expired sessions
pub async fn handle_session_purge(config: &Config, format: OutputFormat) -> Result<()> {
    let db = open_database(config).await?;
    let purged = db.sessions().purge_expired().await?;

    match format {
        OutputFormat::Text => println!("Purged {} expired session(s)", purged),
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "purged": purged }))?
            );
        }
    }

    db.close().await?;
    Ok(())
}

/// Add tokens to a user's balance
pub async fn handle_tokens_grant(
    user: String,
    amount: i64,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let db = open_database(config).await?;
    let remaining = db.tokens().grant(user.trim(), amount).await?;

    match format {
        OutputFormat::Text => {
            println!("✓ Granted {} tokens to {}", amount, user.trim());
            println!("  Remaining: {}", remaining);
        }
        OutputFormat::Json => {
            let output = json!({
                "user_id": user.trim(),
                "granted": amount,
                "tokens_remaining": remaining,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    db.close().await?;
    Ok(())
}

/// Show a user's balance
pub async fn handle_tokens_balance(
    user: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let db = open_database(config).await?;
    let details = db.tokens().balance_details(user.trim()).await?;

    match format {
        OutputFormat::Text => match &details {
            Some(balance) => {
                println!("Token balance for {}:", balance.user_id);
                println!("  Remaining: {}", balance.tokens_remaining);
                println!("  Used:      {}", balance.tokens_used);
                println!("  Updated:   {}", format_timestamp(balance.updated_at));
            }
            None => println!("{} has no token balance (treated as 0)", user.trim()),
        },
        OutputFormat::Json => {
            let output = match &details {
                Some(balance) => serde_json::to_value(balance)?,
                None => json!({
                    "user_id": user.trim(),
                    "tokens_remaining": 0,
                    "tokens_used": 0,
                }),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    db.close().await?;
    Ok(())
}

/// Show a user's most recent usage rows
pub async fn handle_tokens_usage(
    user: String,
    limit: u32,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let db = open_database(config).await?;
    let rows = db.tokens().usage_for(user.trim(), limit).await?;

    match format {
        OutputFormat::Text => {
            if rows.is_empty() {
                println!("No token usage recorded for {}", user.trim());
            } else {
                println!("Token usage for {} (last {}):", user.trim(), limit);
                println!();
                for row in &rows {
                    println!(
                        "{}  {:<22} {:>6} tokens  {:.4}¢  {}{}",
                        format_timestamp(row.created_at),
                        row.action_type,
                        row.tokens_used,
                        row.cost_estimate_cents,
                        row.model_used,
                        if row.success { "" } else { "  (failed)" }
                    );
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ "usage": rows }))?);
        }
    }

    db.close().await?;
    Ok(())
}

/// Show the conversations of a vision, optionally narrowed to one category
pub async fn handle_conversation_show(
    vision: String,
    category: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let category_key = match category.as_deref() {
        Some(name) => Some(
            resolve_category(name)
                .map(|c| c.key)
                .with_context(|| format!("Unknown category '{}'", name))?,
        ),
        None => None,
    };

    let db = open_database(config).await?;
    let conversations: Vec<_> = db
        .conversations()
        .list_for_vision(vision.trim())
        .await?
        .into_iter()
        .filter(|c| category_key.map_or(true, |key| c.category == key))
        .collect();

    match format {
        OutputFormat::Text => {
            if conversations.is_empty() {
                println!("No conversations for vision {}", vision.trim());
            }
            for conversation in &conversations {
                println!("Conversation {}", conversation.id);
                println!("  Category:  {}", conversation.category);
                println!("  User:      {}", conversation.user_id);
                println!("  Steps:     {}/3", conversation.messages.len());
                println!("  State:     {}", conversation.vibrational_state.as_str());
                println!("  Created:   {}", format_timestamp(conversation.created_at));
                if let Some(completed) = conversation.completed_at {
                    println!("  Completed: {}", format_timestamp(completed));
                }
                if let Some(vision_text) = &conversation.generated_vision {
                    println!();
                    println!("  {}", vision_text);
                }
                println!();
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "conversations": conversations }))?
            );
        }
    }

    db.close().await?;
    Ok(())
}

/// Prompt for a secret and store it in the keychain
pub fn handle_secret_set(key: String, format: OutputFormat) -> Result<()> {
    let manager = SecretManager::new(SECRET_SERVICE);
    manager
        .prompt_and_store(key.trim())
        .map_err(|e| anyhow::anyhow!("Failed to store secret: {}", e))?;

    match format {
        OutputFormat::Text => println!("✓ Stored {} in the OS keychain", key.trim()),
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "stored": key.trim() }))?
            );
        }
    }
    Ok(())
}

/// Run system diagnostics
///
/// Reports the configuration, data directory, database and provider key.
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks = Vec::new();

    // Config is already validated when loaded
    checks.push(("Configuration", "Valid"));

    if config.core.data_dir.exists() {
        checks.push(("Data directory", "Exists"));
    } else {
        checks.push(("Data directory", "Missing"));
        issues.push(format!(
            "Data directory does not exist: {:?}",
            config.core.data_dir
        ));
    }

    match Database::new(&config.database_path()).await {
        Ok(db) => {
            checks.push(("Database connection", "OK"));
            db.close().await.ok();
        }
        Err(e) => {
            checks.push(("Database connection", "Failed"));
            issues.push(format!("Cannot open database: {}", e));
        }
    }

    if SecretManager::new(SECRET_SERVICE).has_secret(API_KEY_SECRET) {
        checks.push(("OpenAI API key", "Configured"));
    } else {
        checks.push(("OpenAI API key", "Not configured"));
        issues.push(
            "No OpenAI API key. Set OPENAI_API_KEY or run 'viva secret set openai_api_key'."
                .to_string(),
        );
    }

    match format {
        OutputFormat::Text => {
            println!("Viva System Diagnostics");
            println!("============================");
            println!();

            println!("System Checks:");
            for (check, status) in &checks {
                println!("  {:<25} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_timestamp(86_400), "1970-01-02 00:00:00 UTC");
    }
}
