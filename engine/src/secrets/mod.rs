pub mod cache;
pub mod string;

pub use cache::SecretCache;
pub use string::SecretString;

use keyring::Entry;
use regex::Regex;
use sdk::errors::EngineError;
use std::sync::OnceLock;

/// SecretManager resolves named secrets for the service.
///
/// Lookup order for a key such as `openai_api_key`:
/// 1. the environment variable named by the upper-cased key (`OPENAI_API_KEY`)
/// 2. the OS keychain entry under the manager's service name
///
/// The server never prompts. Interactive entry happens only through
/// `viva secret set`, which calls [`SecretManager::prompt_and_store`].
///
/// The SecretManager also scrubs secrets out of text before it is logged.
pub struct SecretManager {
    service_name: String,
}

/// Regex patterns for detecting secrets in log output.
/// These are compiled once and reused.
static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

/// Initializes and returns the secret detection patterns.
///
/// Patterns match:
/// - OpenAI API keys: sk-[a-zA-Z0-9]{20,}
/// - Bearer tokens: Bearer\s+[^\s]{20,}
/// - Viva session tokens: vs_[a-zA-Z0-9]{40}
fn get_secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        [
            r"sk-[a-zA-Z0-9\-_]{20,}",
            r"Bearer\s+[^\s]{20,}",
            r"\bvs_[a-zA-Z0-9]{40}\b",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

/// Environment variable consulted before the keychain
fn env_var_name(key: &str) -> String {
    key.to_ascii_uppercase()
}

impl SecretManager {
    /// Creates a new SecretManager with the given service name.
    ///
    /// The service name is used to namespace secrets in the OS keychain.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Retrieves a secret from the environment or the OS keychain.
    ///
    /// # Errors
    /// Returns `EngineError::KeyringError` if the secret is in neither place
    /// or keychain access fails
    pub fn get_secret(&self, key: &str) -> Result<String, EngineError> {
        if let Ok(value) = std::env::var(env_var_name(key)) {
            if !value.trim().is_empty() {
                tracing::debug!("Resolved secret '{}' from environment", key);
                return Ok(value);
            }
        }

        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        match entry.get_password() {
            Ok(secret) => {
                tracing::debug!("Retrieved secret '{}' from keychain", key);
                Ok(secret)
            }
            Err(keyring::Error::NoEntry) => Err(EngineError::KeyringError(format!(
                "Secret '{}' not found. Set {} or run `viva secret set {}`",
                key,
                env_var_name(key),
                key
            ))),
            Err(e) => Err(EngineError::KeyringError(format!(
                "Failed to retrieve secret '{}': {}",
                key, e
            ))),
        }
    }

    /// Stores a secret in the OS keychain.
    pub fn set_secret(&self, key: &str, value: &str) -> Result<(), EngineError> {
        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        entry.set_password(value).map_err(|e| {
            EngineError::KeyringError(format!("Failed to store secret '{}': {}", key, e))
        })?;

        tracing::info!("Stored secret '{}' in keychain", key);
        Ok(())
    }

    /// Checks whether a secret is resolvable without prompting.
    pub fn has_secret(&self, key: &str) -> bool {
        self.get_secret(key).is_ok()
    }

    /// Prompts for a secret on the terminal (input is not echoed) and stores it.
    pub fn prompt_and_store(&self, key: &str) -> Result<(), EngineError> {
        let secret = rpassword::prompt_password_stderr(&format!("Enter value for '{}': ", key))
            .map_err(|e| EngineError::KeyringError(format!("Failed to read input: {}", e)))?;

        let secret = secret.trim();
        if secret.is_empty() {
            return Err(EngineError::KeyringError(
                "Secret cannot be empty".to_string(),
            ));
        }

        self.set_secret(key, secret)
    }

    /// Scrubs secrets from text by replacing them with [REDACTED].
    ///
    /// # Examples
    /// ```
    /// use viva_engine::secrets::SecretManager;
    ///
    /// let manager = SecretManager::new("test");
    /// let scrubbed = manager.scrub("My API key is sk-1234567890abcdefghij");
    /// assert_eq!(scrubbed, "My API key is [REDACTED]");
    /// ```
    pub fn scrub(&self, text: &str) -> String {
        scrub(text)
    }
}

/// Free-function form of [`SecretManager::scrub`] for call sites without a manager
pub fn scrub(text: &str) -> String {
    let mut result = text.to_string();

    for pattern in get_secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }

    result
}
