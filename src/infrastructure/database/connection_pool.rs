use sqlx::{sqlite::SqlitePoolOptions, Executor, SqlitePool};
use std::sync::Arc;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS cached_videos (
        video_id TEXT PRIMARY KEY,
        score REAL NOT NULL,
        categories TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        last_updated TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cached_channels (
        channel_id TEXT PRIMARY KEY,
        score REAL NOT NULL,
        auto_flag INTEGER NOT NULL DEFAULT 0,
        last_updated TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pending_votes (
        video_id TEXT PRIMARY KEY,
        category TEXT NOT NULL,
        timestamp INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sync_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
];

#[derive(Clone)]
pub struct ConnectionPool {
    pool: Arc<SqlitePool>,
}

impl ConnectionPool {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub async fn from_memory() -> Result<Self, sqlx::Error> {
        // Single connection so every statement sees the same in-memory database.
        Self::new("sqlite::memory:", 1).await
    }

    pub fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Idempotent schema setup; safe to run again after a provider-level reset.
    pub async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            self.pool.execute(*statement).await?;
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
