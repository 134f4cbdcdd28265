//! Token budget module
//!
//! Before every completion call the orchestrator asks the budget whether the
//! user can afford the request's estimated size. The check is a read-only
//! guard: nothing is reserved, and a shortfall makes the caller substitute a
//! fixed fallback text instead of calling the provider.
//!
//! After a call, usage is charged in the background. Accounting failures are
//! logged and never reach the user.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db::{TokenRepository, UsageRecord};
use crate::llm::CompletionRequest;

/// Price of 1K tokens in cents: (input, output)
const TOKEN_COSTS: &[(&str, f64, f64)] = &[
    ("gpt-5", 5.0, 15.0),
    ("gpt-5-mini", 3.0, 9.0),
    ("gpt-5-nano", 1.0, 3.0),
    ("gpt-4o", 2.5, 10.0),
    ("gpt-4o-mini", 0.15, 0.6),
    ("gpt-4-turbo", 1.0, 3.0),
    ("gpt-3.5-turbo", 0.5, 1.5),
];

/// The four generation sub-steps of a discovery conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPhase {
    Acknowledgment,
    PatternDetection,
    PatternMessage,
    Vision,
}

impl GenerationPhase {
    /// `action_type` written to the usage table
    pub fn action_type(&self) -> &'static str {
        match self {
            GenerationPhase::Acknowledgment => "discovery_acknowledgment",
            GenerationPhase::PatternDetection => "discovery_pattern_detection",
            GenerationPhase::PatternMessage => "discovery_pattern_message",
            GenerationPhase::Vision => "discovery_vision_generation",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationPhase::Acknowledgment => "acknowledgment",
            GenerationPhase::PatternDetection => "pattern_detection",
            GenerationPhase::PatternMessage => "pattern_message",
            GenerationPhase::Vision => "vision",
        }
    }
}

/// Returned by [`TokenBudget::check`] when the balance cannot cover a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenShortfall {
    pub needed: i64,
    pub available: i64,
}

/// Estimate tokens for a piece of text: ceil(chars / chars_per_token)
///
/// Non-empty text always counts as at least one token.
pub fn estimate_tokens_for_text(text: &str, chars_per_token: usize) -> i64 {
    let chars = text.chars().count();
    if chars == 0 {
        return 0;
    }
    let per_token = chars_per_token.max(1);
    i64::try_from(chars.div_ceil(per_token)).unwrap_or(i64::MAX)
}

/// Estimate a whole request: every message plus the output cap
pub fn estimate_request_tokens(request: &CompletionRequest, chars_per_token: usize) -> i64 {
    let prompt: i64 = request
        .messages
        .iter()
        .map(|m| estimate_tokens_for_text(&m.content, chars_per_token))
        .sum();
    prompt.saturating_add(i64::from(request.max_tokens))
}

/// Estimated cost in cents, rounded to two decimals
///
/// Unknown models cost 0 and log a warning.
pub fn calculate_cost_cents(model: &str, input_tokens: i64, output_tokens: i64) -> f64 {
    let Some(&(_, input_rate, output_rate)) =
        TOKEN_COSTS.iter().find(|(name, _, _)| *name == model)
    else {
        warn!("Unknown model for cost calculation: {}", model);
        return 0.0;
    };

    let cost = (input_tokens as f64 / 1000.0) * input_rate
        + (output_tokens as f64 / 1000.0) * output_rate;
    (cost * 100.0).round() / 100.0
}

/// Per-user token budget backed by the balance table
#[derive(Clone)]
pub struct TokenBudget {
    repo: TokenRepository,
    chars_per_token: usize,
}

impl TokenBudget {
    pub fn new(repo: TokenRepository, chars_per_token: usize) -> Self {
        Self {
            repo,
            chars_per_token,
        }
    }

    pub fn chars_per_token(&self) -> usize {
        self.chars_per_token
    }

    pub fn estimate(&self, request: &CompletionRequest) -> i64 {
        estimate_request_tokens(request, self.chars_per_token)
    }

    /// Check whether `user_id` can afford `estimated` tokens
    ///
    /// Returns `Ok(None)` when the balance is sufficient.
    pub async fn check(&self, user_id: &str, estimated: i64) -> Result<Option<TokenShortfall>> {
        let available = self.repo.balance(user_id).await?;

        if available < estimated {
            debug!(
                "Token shortfall for user {}: needed {}, available {}",
                user_id, estimated, available
            );
            return Ok(Some(TokenShortfall {
                needed: estimated,
                available,
            }));
        }

        Ok(None)
    }

    /// Charge usage without waiting for the write
    ///
    /// The returned handle may be awaited (tests do); the request path drops it.
    pub fn record_in_background(&self, usage: UsageRecord) -> tokio::task::JoinHandle<()> {
        let repo = self.repo.clone();
        tokio::spawn(async move {
            if let Err(e) = repo.record_usage(&usage).await {
                warn!(
                    "Failed to record token usage for {} ({}): {:#}",
                    usage.user_id, usage.action_type, e
                );
            }
        })
    }
}
