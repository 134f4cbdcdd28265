/// Bearer session storage
///
/// Only the SHA-256 of a session token is stored. The plain token is shown
/// once, when it is issued.
use anyhow::{Context, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use super::now_secs;
use crate::secrets::SecretString;

const TOKEN_PREFIX: &str = "vs_";
const TOKEN_RANDOM_LEN: usize = 40;

/// A freshly issued session
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: SecretString,
    pub user_id: String,
    pub expires_at: i64,
}

/// Generate a session token: `vs_` followed by 40 alphanumerics
fn generate_token() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", TOKEN_PREFIX, random)
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Session repository for database operations
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Issue a new session for a user, valid for `ttl_hours`
    pub async fn issue(&self, user_id: &str, ttl_hours: u64) -> Result<IssuedSession> {
        if user_id.trim().is_empty() {
            anyhow::bail!("User id must not be empty");
        }

        let token = generate_token();
        let now = now_secs()?;
        let ttl_secs = i64::try_from(ttl_hours.saturating_mul(3600)).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(ttl_secs);

        sqlx::query(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(hash_token(&token))
        .bind(user_id)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .context("Failed to store session")?;

        tracing::info!("Issued session for user {}", user_id);

        Ok(IssuedSession {
            token: SecretString::new(token),
            user_id: user_id.to_string(),
            expires_at,
        })
    }

    /// Resolve a bearer token to its user, if the session exists and is live
    pub async fn authenticate(&self, token: &str) -> Result<Option<String>> {
        if !token.starts_with(TOKEN_PREFIX) {
            return Ok(None);
        }

        let now = now_secs()?;
        let user_id: Option<String> = sqlx::query_scalar(
            "SELECT user_id FROM sessions WHERE token_hash = ? AND expires_at > ?",
        )
        .bind(hash_token(token))
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up session")?;

        Ok(user_id)
    }

    /// Revoke one session; returns whether it existed
    pub async fn revoke(&self, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(hash_token(token))
            .execute(&self.pool)
            .await
            .context("Failed to revoke session")?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every expired session; returns how many were removed
    pub async fn purge_expired(&self) -> Result<u64> {
        let now = now_secs()?;
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .context("Failed to purge sessions")?;

        Ok(result.rows_affected())
    }
}
