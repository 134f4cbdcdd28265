//! Completion Provider Abstraction
//!
//! The discovery engine only needs single-shot chat completions: a list of
//! messages in, one text out, plus the token counts the provider reports.
//! The `CompletionProvider` trait is that contract; `openai` implements it
//! against a Chat Completions compatible endpoint and tests substitute a mock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod openai;

pub use openai::OpenAIProvider;

/// Result type for completion operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur while talking to a provider
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Message in a completion request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// A single completion call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the provider to constrain its output to a JSON object
    pub json_response: bool,
}

/// Token counts reported by the provider
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Provider output
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// `None` when the provider did not report usage
    pub usage: Option<TokenUsage>,
}

/// Completion provider trait
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "openai")
    fn name(&self) -> &str;

    /// Model identifier sent with every request; also the cost table key
    fn model(&self) -> &str;

    /// Run one completion
    ///
    /// # Returns
    /// * `Ok(Completion)` - the first choice's text and reported usage
    /// * `Err(LLMError)` - transport, auth, or decoding failure
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Check if the provider is usable (credentials present)
    /// Default implementation returns true.
    async fn check_health(&self) -> bool {
        true
    }
}

/// Pull a JSON object out of model output.
///
/// Handles:
/// 1. Raw JSON: the whole content is one object
/// 2. Fenced JSON (with or without trailing prose)
/// 3. An object embedded in prose, found by brace matching
pub fn extract_json_object(content: &str) -> Option<serde_json::Value> {
    let trimmed = content.trim();

    if let Some(value) = parse_object(trimmed) {
        return Some(value);
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Some(value) = parse_object(inner.trim()) {
            return Some(value);
        }
    }

    let pos = trimmed.find('{')?;
    let candidate = extract_balanced_json(&trimmed[pos..])?;
    parse_object(candidate)
}

fn parse_object(s: &str) -> Option<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_str(s).ok()?;
    value.is_object().then_some(value)
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start = fence_start + 3 + after_opening.find('\n')? + 1;
    let body_end = body_start + content[body_start..].find("```")?;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
