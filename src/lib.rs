//! tus Client Library
//!
//! Resumable uploads over HTTP, following the tus 1.0.0 protocol. A file
//! or byte stream is sent to the server in chunks; if the transfer is
//! interrupted it picks up again at the last offset the server
//! acknowledged instead of starting over.
//!
//! # Example
//!
//! ```no_run
//! use tus_client::{Client, Config, Upload};
//!
//! # async fn run() -> tus_client::Result<()> {
//! let client = Client::new("http://localhost:1080/files/", Config::default())?;
//! let upload = Upload::from_file("video.mp4").await?;
//!
//! let mut uploader = client.create_upload(upload).await?;
//! uploader.upload().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - `client`: resource creation, resume probing, chunk requests
//! - `uploader`: per-upload chunk loop, abort and progress
//! - `upload`: the byte source being transferred
//! - `store`: fingerprint -> upload URL persistence
//! - `transport`: the HTTP capability the client is built on

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod store;
pub mod transport;
pub mod upload;
pub mod uploader;

#[cfg(test)]
mod testing;

pub use client::{resolve_location_url, Client};
pub use config::{ClientSettings, Config};
pub use error::{Result, TusError};
pub use protocol::{DEFAULT_CHUNK_SIZE, PROTOCOL_VERSION};
pub use store::{MemoryStore, SqliteStore, Store, StoreError};
pub use transport::{HttpClient, HttpRequest, HttpResponse, ReqwestTransport, TransportError};
pub use upload::{Metadata, Upload, UploadProgress};
pub use uploader::{AbortHandle, Uploader, UploaderState};
