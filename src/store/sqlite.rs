//! SQLite-backed store
//!
//! Survives process restarts, so an upload interrupted by a crash can be
//! resumed by the next run.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use super::{Store, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS resume_urls (
    fingerprint TEXT PRIMARY KEY NOT NULL,
    url TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// Persistent fingerprint store
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a store from a database URL such as `sqlite:./tus.db`
    pub async fn open(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?;
        Self::connect(options).await
    }

    /// Open (or create) a store at a filesystem path
    pub async fn open_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new().filename(path.as_ref());
        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, StoreError> {
        let options = options
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(SCHEMA).execute(&pool).await?;

        tracing::debug!("Resume store ready");

        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, fingerprint: &str) -> Result<Option<String>, StoreError> {
        let url = sqlx::query_scalar::<_, String>(
            "SELECT url FROM resume_urls WHERE fingerprint = ?",
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        Ok(url)
    }

    async fn set(&self, fingerprint: &str, url: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO resume_urls (fingerprint, url, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(fingerprint) DO UPDATE SET
                url = excluded.url,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(fingerprint)
        .bind(url)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, fingerprint: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM resume_urls WHERE fingerprint = ?")
            .bind(fingerprint)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}
