//! Upload source
//!
//! An [`Upload`] owns the byte stream being transferred together with its
//! size, the offset acknowledged by the server so far, a fingerprint used
//! as the resume key, and creation-time metadata.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, SeekFrom};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::protocol::encode_metadata;

/// Upload metadata (key -> plain value; encoded on the wire)
pub type Metadata = BTreeMap<String, String>;

/// Seekable async byte source
pub trait UploadStream: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> UploadStream for T {}

// ============================================================================
// Upload
// ============================================================================

pub struct Upload {
    stream: Box<dyn UploadStream>,
    size: u64,
    offset: u64,
    fingerprint: String,
    metadata: Metadata,
}

impl Upload {
    /// Create an upload from any seekable stream.
    ///
    /// An empty fingerprint marks the upload as not resumable.
    pub fn new(
        stream: impl UploadStream + 'static,
        size: u64,
        metadata: Metadata,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            stream: Box::new(stream),
            size,
            offset: 0,
            fingerprint: fingerprint.into(),
            metadata,
        }
    }

    /// In-memory upload without fingerprint
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let size = bytes.len() as u64;
        Self::new(io::Cursor::new(bytes), size, Metadata::new(), "")
    }

    /// Upload a file from disk.
    ///
    /// The fingerprint is `name-size-mtime`, and the file name is sent as
    /// `filename` metadata.
    pub async fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        let info = file.metadata().await?;

        if info.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{}' is a directory", path.display()),
            ));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let size = info.len();
        let modified: DateTime<Utc> = info.modified()?.into();

        let fingerprint = format!("{}-{}-{}", name, size, modified.to_rfc3339());

        let mut metadata = Metadata::new();
        metadata.insert("filename".to_string(), name);

        Ok(Self::new(file, size, metadata, fingerprint))
    }

    /// Add a metadata entry (before the upload is handed to a client).
    ///
    /// Keys must be non-empty and free of spaces and commas; otherwise
    /// creating the upload fails with `TusError::InvalidMetadataKey`.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace the fingerprint
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes acknowledged by the server
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Whether the upload can be resumed through a store
    pub fn is_resumable(&self) -> bool {
        !self.fingerprint.is_empty()
    }

    pub fn finished(&self) -> bool {
        self.offset == self.size
    }

    /// Progress in percent (0-100)
    pub fn progress(&self) -> u64 {
        percent(self.offset, self.size)
    }

    /// Value of the `Upload-Metadata` header
    pub fn encoded_metadata(&self) -> crate::error::Result<String> {
        encode_metadata(&self.metadata)
    }

    /// Point-in-time copy for progress subscribers
    pub fn snapshot(&self) -> UploadProgress {
        UploadProgress {
            offset: self.offset,
            size: self.size,
            fingerprint: self.fingerprint.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Record the offset acknowledged by the server
    pub(crate) fn update_progress(&mut self, offset: u64) {
        debug_assert!(offset <= self.size);
        self.offset = offset;
    }

    /// Read the chunk starting at `offset`, at most `chunk_size` bytes.
    ///
    /// Fills the buffer until `chunk_size` bytes, the declared size or end
    /// of stream is reached, so only the final chunk is ever short.
    pub(crate) async fn read_chunk(&mut self, offset: u64, chunk_size: usize) -> io::Result<Vec<u8>> {
        let want = (self.size.saturating_sub(offset)).min(chunk_size as u64);

        self.stream.seek(SeekFrom::Start(offset)).await?;

        let mut data = Vec::with_capacity(want as usize);
        (&mut self.stream).take(want).read_to_end(&mut data).await?;

        if data.is_empty() && want > 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended at {} of {} bytes", offset, self.size),
            ));
        }

        Ok(data)
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("size", &self.size)
            .field("offset", &self.offset)
            .field("fingerprint", &self.fingerprint)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Progress Snapshot
// ============================================================================

/// Upload state published to progress subscribers after each chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub offset: u64,
    pub size: u64,
    pub fingerprint: String,
    pub metadata: Metadata,
}

impl UploadProgress {
    pub fn finished(&self) -> bool {
        self.offset == self.size
    }

    /// Progress in percent (0-100)
    pub fn progress(&self) -> u64 {
        percent(self.offset, self.size)
    }
}

fn percent(offset: u64, size: u64) -> u64 {
    if size == 0 {
        return 100;
    }
    offset.saturating_mul(100) / size
}
