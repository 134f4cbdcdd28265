//! CLI interface for Viva
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for running and administering the
//! discovery service.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Viva discovery service
///
/// Guides a user through a short discovery dialogue per life category and
/// writes a first-person vision statement from their answers.
#[derive(Parser, Debug)]
#[command(name = "viva")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP service in the foreground
    Serve,

    /// Manage bearer sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Manage token balances
    Tokens {
        #[command(subcommand)]
        action: TokensAction,
    },

    /// Inspect stored conversations
    Conversation {
        #[command(subcommand)]
        action: ConversationAction,
    },

    /// Manage secrets in the OS keychain
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },

    /// Run system diagnostics
    Doctor,
}

/// Session management actions
#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// Issue a bearer token for a user
    Issue {
        /// User id the session authenticates as
        #[arg(long)]
        user: String,

        /// Session lifetime in hours (defaults to auth.session_ttl_hours)
        #[arg(long)]
        ttl_hours: Option<u64>,
    },

    /// Revoke a bearer token
    Revoke {
        /// The token to revoke
        token: String,
    },

    /// Delete expired sessions
    Purge,
}

/// Token balance actions
#[derive(Subcommand, Debug)]
pub enum TokensAction {
    /// Add tokens to a user's balance
    Grant {
        #[arg(long)]
        user: String,

        #[arg(long)]
        amount: i64,
    },

    /// Show a user's balance
    Balance {
        #[arg(long)]
        user: String,
    },

    /// Show a user's recent usage
    Usage {
        #[arg(long)]
        user: String,

        /// Number of rows to show (default: 20)
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

/// Conversation inspection actions
#[derive(Subcommand, Debug)]
pub enum ConversationAction {
    /// Show conversations of a vision
    Show {
        /// Vision id
        #[arg(long)]
        vision: String,

        /// Only show this category
        #[arg(long)]
        category: Option<String>,
    },
}

/// Secret management actions
#[derive(Subcommand, Debug)]
pub enum SecretAction {
    /// Prompt for a secret and store it in the keychain
    Set {
        /// Secret name (e.g. openai_api_key)
        key: String,
    },
}
