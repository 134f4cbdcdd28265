/// Token balance and usage accounting
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use super::now_secs;

/// Balance row for one user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenBalance {
    pub user_id: String,
    pub tokens_remaining: i64,
    pub tokens_used: i64,
    pub updated_at: i64,
}

/// One completed (or attempted) provider call to charge
#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub user_id: String,
    pub action_type: String,
    pub model_used: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_estimate_cents: f64,
    pub success: bool,
    pub metadata: serde_json::Value,
}

impl UsageRecord {
    pub fn tokens_used(&self) -> i64 {
        self.input_tokens + self.output_tokens
    }
}

/// A stored usage row as listed by `viva tokens usage`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsageRow {
    pub id: i64,
    pub user_id: String,
    pub action_type: String,
    pub model_used: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub tokens_used: i64,
    pub cost_estimate_cents: f64,
    pub success: bool,
    pub metadata: serde_json::Value,
    pub created_at: i64,
}

/// Token repository for database operations
#[derive(Clone)]
pub struct TokenRepository {
    pool: SqlitePool,
}

impl TokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Remaining tokens for a user; a user without a balance row has 0
    pub async fn balance(&self, user_id: &str) -> Result<i64> {
        let remaining: Option<i64> =
            sqlx::query_scalar("SELECT tokens_remaining FROM token_balances WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to fetch token balance")?;

        Ok(remaining.unwrap_or(0))
    }

    /// Full balance row, if the user has one
    pub async fn balance_details(&self, user_id: &str) -> Result<Option<TokenBalance>> {
        let row = sqlx::query(
            "SELECT user_id, tokens_remaining, tokens_used, updated_at \
             FROM token_balances WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch token balance")?;

        Ok(row.map(|r| TokenBalance {
            user_id: r.get("user_id"),
            tokens_remaining: r.get("tokens_remaining"),
            tokens_used: r.get("tokens_used"),
            updated_at: r.get("updated_at"),
        }))
    }

    /// Add tokens to a user's balance, creating the row if needed
    ///
    /// Returns the new remaining balance.
    pub async fn grant(&self, user_id: &str, amount: i64) -> Result<i64> {
        if amount <= 0 {
            anyhow::bail!("Grant amount must be positive, got {}", amount);
        }

        let now = now_secs()?;
        sqlx::query(
            "INSERT INTO token_balances (user_id, tokens_remaining, tokens_used, updated_at) \
             VALUES (?, ?, 0, ?) \
             ON CONFLICT (user_id) DO UPDATE SET \
             tokens_remaining = tokens_remaining + excluded.tokens_remaining, \
             updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(amount)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to grant tokens")?;

        self.balance(user_id).await
    }

    /// Insert a usage row and debit the balance in one transaction
    ///
    /// The balance never drops below zero.
    pub async fn record_usage(&self, usage: &UsageRecord) -> Result<()> {
        let now = now_secs()?;
        let tokens_used = usage.tokens_used();
        let metadata =
            serde_json::to_string(&usage.metadata).context("Failed to encode usage metadata")?;

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin usage transaction")?;

        sqlx::query(
            "INSERT INTO token_usage \
             (user_id, action_type, model_used, input_tokens, output_tokens, tokens_used, \
              cost_estimate_cents, success, metadata, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&usage.user_id)
        .bind(&usage.action_type)
        .bind(&usage.model_used)
        .bind(usage.input_tokens)
        .bind(usage.output_tokens)
        .bind(tokens_used)
        .bind(usage.cost_estimate_cents)
        .bind(usage.success)
        .bind(&metadata)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to insert token usage")?;

        sqlx::query(
            "INSERT INTO token_balances (user_id, tokens_remaining, tokens_used, updated_at) \
             VALUES (?, 0, ?, ?) \
             ON CONFLICT (user_id) DO UPDATE SET \
             tokens_remaining = MAX(tokens_remaining - excluded.tokens_used, 0), \
             tokens_used = tokens_used + excluded.tokens_used, \
             updated_at = excluded.updated_at",
        )
        .bind(&usage.user_id)
        .bind(tokens_used)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to debit token balance")?;

        tx.commit()
            .await
            .context("Failed to commit usage transaction")?;

        Ok(())
    }

    /// Most recent usage rows for a user, newest first
    pub async fn usage_for(&self, user_id: &str, limit: u32) -> Result<Vec<TokenUsageRow>> {
        let rows = sqlx::query(
            "SELECT id, user_id, action_type, model_used, input_tokens, output_tokens, tokens_used, \
             cost_estimate_cents, success, metadata, created_at \
             FROM token_usage WHERE user_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch token usage")?;

        rows.into_iter()
            .map(|r| -> Result<TokenUsageRow> {
                let metadata: String = r.get("metadata");
                Ok(TokenUsageRow {
                    id: r.get("id"),
                    user_id: r.get("user_id"),
                    action_type: r.get("action_type"),
                    model_used: r.get("model_used"),
                    input_tokens: r.get("input_tokens"),
                    output_tokens: r.get("output_tokens"),
                    tokens_used: r.get("tokens_used"),
                    cost_estimate_cents: r.get("cost_estimate_cents"),
                    success: r.get("success"),
                    metadata: serde_json::from_str(&metadata)
                        .context("Corrupt token usage metadata")?,
                    created_at: r.get("created_at"),
                })
            })
            .collect()
    }
}
