//! Client configuration

use std::env;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, TusError};
use crate::protocol::DEFAULT_CHUNK_SIZE;
use crate::store::{MemoryStore, SqliteStore, Store};
use crate::transport::{HeaderMap, HeaderName, HeaderValue};

/// Client configuration
#[derive(Clone)]
pub struct Config {
    /// Maximum bytes sent per chunk request
    pub chunk_size: usize,

    /// Record upload URLs so interrupted uploads can be resumed
    pub resume: bool,

    /// Send chunks as POST with `X-HTTP-Method-Override: PATCH`, for
    /// proxies that drop PATCH requests
    pub override_patch_method: bool,

    /// Extra headers sent with every request
    pub headers: HeaderMap,

    /// Resume store; required when `resume` is enabled
    pub store: Option<Arc<dyn Store>>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            chunk_size: DEFAULT_CHUNK_SIZE,
            resume: true,
            override_patch_method: false,
            headers: HeaderMap::new(),
            store: Some(Arc::new(MemoryStore::new())),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("chunk_size", &self.chunk_size)
            .field("resume", &self.resume)
            .field("override_patch_method", &self.override_patch_method)
            .field("headers", &self.headers)
            .field("store", &self.store.as_ref().map(|_| "dyn Store"))
            .finish()
    }
}

impl Config {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_override_patch_method(mut self, enabled: bool) -> Self {
        self.override_patch_method = enabled;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Add an extra request header (e.g. `Authorization`)
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let invalid = || TusError::InvalidRequestHeader {
            name: name.to_string(),
            value: value.to_string(),
        };
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        self.headers.append(name, value);
        Ok(self)
    }

    /// Check the configuration before a client uses it
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size < 1 {
            return Err(TusError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }

        if self.resume && self.store.is_none() {
            return Err(TusError::InvalidConfig(
                "a store is required when resume is enabled".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Environment Settings
// ============================================================================

/// Settings for the `tus-upload` binary, read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Creation endpoint (`TUS_ENDPOINT`, required)
    pub endpoint: String,
    /// `TUS_CHUNK_SIZE` in bytes
    pub chunk_size: usize,
    /// `TUS_RESUME`
    pub resume: bool,
    /// `TUS_OVERRIDE_PATCH`
    pub override_patch_method: bool,
    /// `TUS_STORE_URL`, e.g. `sqlite:./tus.db`; in-memory store when unset
    pub store_url: Option<String>,
}

impl ClientSettings {
    pub fn from_env() -> std::result::Result<Self, env::VarError> {
        let endpoint = env::var("TUS_ENDPOINT")?;
        Ok(Self::from_lookup(endpoint, |key| env::var(key).ok()))
    }

    /// Build settings from a key lookup; malformed values fall back to defaults
    pub fn from_lookup<F>(endpoint: String, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        ClientSettings {
            endpoint,
            chunk_size: lookup("TUS_CHUNK_SIZE")
                .and_then(|v| v.trim().parse().ok())
                .filter(|size: &usize| *size > 0)
                .unwrap_or(DEFAULT_CHUNK_SIZE),
            resume: lookup("TUS_RESUME")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(true),
            override_patch_method: lookup("TUS_OVERRIDE_PATCH")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(false),
            store_url: lookup("TUS_STORE_URL").filter(|v| !v.trim().is_empty()),
        }
    }

    /// Open the configured store and assemble a [`Config`]
    pub async fn build_config(&self) -> Result<Config> {
        let store: Arc<dyn Store> = match &self.store_url {
            Some(url) => Arc::new(SqliteStore::open(url).await?),
            None => Arc::new(MemoryStore::new()),
        };

        let config = Config::default()
            .with_chunk_size(self.chunk_size)
            .with_resume(self.resume)
            .with_override_patch_method(self.override_patch_method)
            .with_store(store);

        config.validate()?;
        Ok(config)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
