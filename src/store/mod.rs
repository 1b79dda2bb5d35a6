//! Resume Store
//!
//! Persists fingerprint -> upload URL mappings so an interrupted upload
//! can be picked up again later, possibly by another process.
//!
//! Implementations synchronize internally: one store is shared by every
//! uploader spawned from a client.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

/// Store backend errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Fingerprint -> upload URL mapping
#[async_trait]
pub trait Store: Send + Sync {
    /// Look up the upload URL recorded for a fingerprint
    async fn get(&self, fingerprint: &str) -> Result<Option<String>, StoreError>;

    /// Record (or replace) the upload URL for a fingerprint
    async fn set(&self, fingerprint: &str, url: &str) -> Result<(), StoreError>;

    /// Forget a fingerprint; missing keys are not an error
    async fn delete(&self, fingerprint: &str) -> Result<(), StoreError>;

    /// Release the backend
    async fn close(&self) -> Result<(), StoreError>;
}
