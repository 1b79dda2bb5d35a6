//! Uploader
//!
//! Drives the chunk loop for one upload resource:
//!
//! ```text
//! Active --(offset == size)--> Finished
//!    \----(abort)------------> Aborted
//! ```
//!
//! Chunks are strictly sequential: chunk N+1 is read only after the server
//! acknowledged chunk N. Abort is checked at every chunk boundary and also
//! cancels the request in flight. Neither terminal state is ever left; a
//! resumed upload gets a new `Uploader`.
//!
//! # Progress
//!
//! Every acknowledged chunk raises a single-slot signal. A background task
//! drains it and forwards the snapshot to each subscriber, in subscription
//! order. Subscriber channels are bounded by the caller, and a full channel
//! blocks publication of the next chunk rather than dropping events: a
//! subscriber that stops reading stalls the upload.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client::Client;
use crate::error::{Result, TusError};
use crate::upload::{Upload, UploadProgress};

/// Uploader lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploaderState {
    Active,
    Finished,
    Aborted,
}

type Subscribers = Arc<Mutex<Vec<mpsc::Sender<UploadProgress>>>>;

// ============================================================================
// Abort Handle
// ============================================================================

/// Cloneable, thread-safe handle that aborts one uploader.
///
/// Aborting is idempotent and never affects other uploaders of the same
/// client.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    token: CancellationToken,
}

impl AbortHandle {
    pub fn abort(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!("Abort requested");
        }
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    async fn aborted(&self) {
        self.token.cancelled().await
    }
}

// ============================================================================
// Uploader
// ============================================================================

pub struct Uploader {
    client: Client,
    url: Url,
    upload: Upload,
    abort: AbortHandle,
    subscribers: Subscribers,
    notify: mpsc::Sender<UploadProgress>,
}

impl Uploader {
    /// Bind an upload (already positioned at its starting offset) to a
    /// resource URL. Must be called inside a tokio runtime.
    pub(crate) fn new(client: Client, url: Url, upload: Upload) -> Self {
        let (notify, signals) = mpsc::channel(1);
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));

        tokio::spawn(broadcast_progress(signals, subscribers.clone()));

        Self {
            client,
            url,
            upload,
            abort: AbortHandle::default(),
            subscribers,
            notify,
        }
    }

    /// Subscribe to progress updates.
    ///
    /// The channel must be drained; see the module docs on backpressure.
    pub fn subscribe(&self, sender: mpsc::Sender<UploadProgress>) {
        self.subscribers.lock().push(sender);
    }

    /// Handle for aborting from other tasks while `upload()` runs
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Abort the upload; the stored URL is kept so it can be resumed
    pub fn abort(&self) {
        self.abort.abort();
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    /// Resource URL of this upload
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Bytes acknowledged by the server
    pub fn offset(&self) -> u64 {
        self.upload.offset()
    }

    pub fn is_finished(&self) -> bool {
        self.upload.finished()
    }

    pub fn state(&self) -> UploaderState {
        if self.is_finished() {
            UploaderState::Finished
        } else if self.is_aborted() {
            UploaderState::Aborted
        } else {
            UploaderState::Active
        }
    }

    pub fn upload_ref(&self) -> &Upload {
        &self.upload
    }

    /// Give the upload back, e.g. to resume it with a new uploader
    pub fn into_upload(self) -> Upload {
        self.upload
    }

    /// Upload the remaining body.
    ///
    /// Returns `Ok` only once the server acknowledged the full size, and
    /// `TusError::Aborted` if aborted before that.
    pub async fn upload(&mut self) -> Result<()> {
        while !self.is_finished() {
            if self.is_aborted() {
                tracing::info!(
                    upload_url = %self.url,
                    offset = self.offset(),
                    size = self.upload.size(),
                    "Upload aborted"
                );
                return Err(TusError::Aborted);
            }
            self.upload_chunk().await?;
        }

        self.client.forget(&self.upload).await?;

        tracing::info!(
            upload_url = %self.url,
            size = self.upload.size(),
            "Upload completed"
        );

        Ok(())
    }

    /// Transfer a single chunk starting at the current offset
    pub async fn upload_chunk(&mut self) -> Result<()> {
        if self.is_finished() {
            return Ok(());
        }
        if self.is_aborted() {
            return Err(TusError::Aborted);
        }

        let offset = self.upload.offset();
        let size = self.upload.size();
        let chunk_size = self.client.config().chunk_size;

        let data = self.upload.read_chunk(offset, chunk_size).await?;
        let sent = data.len() as u64;

        let request = self.client.upload_chunk(&self.url, data, offset);
        let result = tokio::select! {
            biased;
            _ = self.abort.aborted() => return Err(TusError::Aborted),
            result = request => result,
        };

        let new_offset = match result {
            Ok(new_offset) => new_offset,
            // A failure racing an abort is still an abort
            Err(_) if self.is_aborted() => return Err(TusError::Aborted),
            Err(e) => return Err(e),
        };

        if new_offset <= offset || new_offset > size {
            return Err(TusError::InvalidHeader {
                header: "Upload-Offset",
                url: self.url.to_string(),
                value: format!(
                    "{} (sent {} bytes at offset {} of {})",
                    new_offset, sent, offset, size
                ),
            });
        }

        self.upload.update_progress(new_offset);

        tracing::debug!(
            upload_url = %self.url,
            offset = new_offset,
            size = size,
            chunk = sent,
            "Chunk acknowledged"
        );

        let snapshot = self.upload.snapshot();
        tokio::select! {
            biased;
            _ = self.abort.aborted() => {}
            _ = self.notify.send(snapshot) => {}
        }

        Ok(())
    }
}

impl std::fmt::Debug for Uploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("url", &self.url.as_str())
            .field("upload", &self.upload)
            .field("state", &self.state())
            .finish()
    }
}

/// Forward each progress signal to all subscribers, in order
async fn broadcast_progress(mut signals: mpsc::Receiver<UploadProgress>, subscribers: Subscribers) {
    while let Some(progress) = signals.recv().await {
        let targets: Vec<_> = subscribers.lock().clone();
        let mut dropped = false;

        for target in &targets {
            if target.send(progress.clone()).await.is_err() {
                dropped = true;
            }
        }

        if dropped {
            subscribers.lock().retain(|s| !s.is_closed());
            tracing::warn!("Dropped closed progress subscriber");
        }
    }
}
