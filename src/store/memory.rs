//! In-memory store

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Store, StoreError};

/// Process-local store; entries do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded fingerprints
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, fingerprint: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().get(fingerprint).cloned())
    }

    async fn set(&self, fingerprint: &str, url: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .insert(fingerprint.to_string(), url.to_string());
        Ok(())
    }

    async fn delete(&self, fingerprint: &str) -> Result<(), StoreError> {
        self.entries.write().remove(fingerprint);
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.entries.write().clear();
        Ok(())
    }
}
