/// Database module for SQLite persistence
///
/// This module provides storage for discovery conversations, token balances
/// and usage accounting, and bearer sessions. It uses sqlx with parameterized
/// queries and WAL mode for better concurrency.
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{ConnectOptions, Executor};
use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

pub mod conversations;
pub mod sessions;
pub mod tokens;

// Re-export commonly used types
pub use conversations::{
    Conversation, ConversationRepository, CreateOutcome, PreviousVision, StepRecord, StepUpdate,
    VibrationalState, WriteOutcome,
};
pub use sessions::{IssuedSession, SessionRepository};
pub use tokens::{TokenBalance, TokenRepository, TokenUsageRow, UsageRecord};

/// Current Unix time in seconds
pub(crate) fn now_secs() -> Result<i64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is before the Unix epoch")?
        .as_secs() as i64)
}

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Enable WAL mode for better concurrency
    /// 3. Run migrations to set up the schema
    ///
    /// SQLite replays a leftover WAL automatically when the file is reopened
    /// after an unclean shutdown.
    pub async fn new(db_path: &Path) -> Result<Self> {
        info!("Initializing database at: {}", db_path.display());

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let connection_string = format!("sqlite:{}", db_path.display());
        let options = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5))
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        debug!("Database connection established");

        let db = Self { pool };

        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    ///
    /// Migrations are idempotent and run on every startup.
    async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        self.pool
            .execute(include_str!("../../migrations/001_initial.sql"))
            .await
            .context("Failed to execute migration 001_initial.sql")?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Flush the WAL to disk
    pub async fn flush_wal(&self) -> Result<()> {
        info!("Flushing WAL to disk");

        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("Failed to flush WAL")?;

        debug!("WAL flushed successfully");
        Ok(())
    }

    /// Close the database connection
    ///
    /// This flushes the WAL and closes all connections in the pool.
    pub async fn close(self) -> Result<()> {
        info!("Closing database connection");

        self.flush_wal().await?;
        self.pool.close().await;

        info!("Database connection closed");
        Ok(())
    }

    pub fn conversations(&self) -> ConversationRepository {
        ConversationRepository::new(self.pool.clone())
    }

    pub fn tokens(&self) -> TokenRepository {
        TokenRepository::new(self.pool.clone())
    }

    pub fn sessions(&self) -> SessionRepository {
        SessionRepository::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_database_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Database::new(&db_path).await.unwrap();

        assert!(db_path.exists());

        let result = sqlx::query("SELECT 1").fetch_one(db.pool()).await;
        assert!(result.is_ok());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_migrations_create_tables() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Database::new(&db_path).await.unwrap();

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(db.pool())
                .await
                .unwrap();

        assert!(tables.contains(&"vision_conversations".to_string()));
        assert!(tables.contains(&"token_balances".to_string()));
        assert!(tables.contains(&"token_usage".to_string()));
        assert!(tables.contains(&"sessions".to_string()));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Database::new(&db_path).await.unwrap();
        db.close().await.unwrap();

        // Reopening re-runs the migration file against the existing schema
        let db = Database::new(&db_path).await.unwrap();
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_wal_mode_enabled() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Database::new(&db_path).await.unwrap();

        let journal_mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(db.pool())
            .await
            .unwrap();

        assert_eq!(journal_mode.to_lowercase(), "wal");

        db.close().await.unwrap();
    }
}
