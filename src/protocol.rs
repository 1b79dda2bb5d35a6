//! Protocol constants and header codecs for tus 1.0.0

use base64::Engine;

use crate::error::{Result, TusError};
use crate::upload::Metadata;

// ============================================================================
// Constants
// ============================================================================

/// Protocol revision sent in every `Tus-Resumable` header
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Default chunk size: 2MB
pub const DEFAULT_CHUNK_SIZE: usize = 2 * 1024 * 1024;

/// Content type required on chunk transfer requests
pub const OFFSET_OCTET_STREAM: &str = "application/offset+octet-stream";

/// Header names (lowercase, as `HeaderName::from_static` requires)
pub mod header {
    pub const TUS_RESUMABLE: &str = "tus-resumable";
    pub const TUS_VERSION: &str = "tus-version";
    pub const UPLOAD_LENGTH: &str = "upload-length";
    pub const UPLOAD_OFFSET: &str = "upload-offset";
    pub const UPLOAD_METADATA: &str = "upload-metadata";
    pub const METHOD_OVERRIDE: &str = "x-http-method-override";
    pub const LOCATION: &str = "location";
}

// ============================================================================
// Codecs
// ============================================================================

/// Encode metadata as comma-separated `key base64(value)` pairs.
///
/// Keys are emitted in sorted order and there is no trailing separator.
/// A key that is empty or contains a space or comma cannot be encoded.
pub fn encode_metadata(metadata: &Metadata) -> Result<String> {
    let mut pairs = Vec::with_capacity(metadata.len());

    for (key, value) in metadata {
        if !is_valid_metadata_key(key) {
            return Err(TusError::InvalidMetadataKey(key.clone()));
        }
        pairs.push(format!(
            "{} {}",
            key,
            base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
        ));
    }

    Ok(pairs.join(","))
}

fn is_valid_metadata_key(key: &str) -> bool {
    !key.is_empty() && !key.contains(|c: char| c == ' ' || c == ',')
}

/// Parse an `Upload-Offset` / `Upload-Length` header value
pub fn parse_offset(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
