//! Error types and handling
//!
//! This module provides the error type shared by the discovery engine and its
//! clients. Every variant implements the `VivaErrorExt` trait which provides a
//! user-friendly hint and indicates whether retrying can succeed.
//!
//! # Security
//!
//! Messages carried by the downstream variants (`Database`, `LLMProvider`,
//! `Internal`) may contain driver or provider detail. They are logged
//! server-side only; clients receive a generic message for them.

use thiserror::Error;

/// Trait for Viva error extensions
pub trait VivaErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and never contains secrets,
    /// SQL, or provider responses.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be fixed by resubmitting (possibly with a
    /// corrected payload). Non-recoverable errors need operator action.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Client input**: missing identifiers, malformed selections, unknown action or category
/// - **Authorization**: missing/expired session, conversation owned by someone else
/// - **State**: transition not allowed from the persisted phase, stale write
/// - **Downstream**: database, completion provider, configuration, keychain
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, VivaErrorExt};
///
/// let error = EngineError::TemplateNotFound("love".to_string());
/// assert!(error.is_recoverable());
/// assert!(error.is_client_fault());
///
/// let fatal = EngineError::Config("bad port".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Client input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("No discovery template for category: {0}")]
    TemplateNotFound(String),

    // Authorization errors
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // Conversation state errors
    #[error("Action '{action}' is not allowed while the conversation is {phase}")]
    InvalidTransition { phase: String, action: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Completion provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    // Keyring errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    #[error("Internal error: {0}")]
    Internal(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// True for faults caused by the request itself (surfaced as 400)
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::InvalidAction(_) | Self::TemplateNotFound(_)
        )
    }

    /// True for faults caused by the persisted conversation state (surfaced as 409)
    pub fn is_state_fault(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. } | Self::Conflict(_))
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        // {:#} keeps the whole context chain on one line
        Self::Database(format!("{:#}", err))
    }
}

impl VivaErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::InvalidInput(_) => "Check the request fields and selections",
            Self::InvalidAction(_) => {
                "Use one of: start, submit_step_1, submit_step_2, submit_step_3"
            }
            Self::TemplateNotFound(_) => "Discovery is not available for this category yet",

            Self::Unauthorized(_) => "Sign in again to continue",
            Self::Forbidden(_) => "This conversation belongs to another account",

            Self::InvalidTransition { .. } => {
                "Reload the conversation; it is at a different step than this request"
            }
            Self::Conflict(_) => "This step was already submitted. Reload and try again",

            Self::Config(_) => "Check your config.toml file for errors",
            Self::Database(_) => "Database operation failed. Try again shortly",
            Self::LLMProvider(_) => "VIVA is unavailable right now. Try again shortly",
            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",
            Self::Internal(_) => "Something went wrong. Try again",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::KeyringError(_))
    }
}
