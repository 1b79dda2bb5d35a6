//! tus Client
//!
//! Resolves an [`Upload`] to a resource URL on the server and a starting
//! offset, then hands both to an [`Uploader`]:
//!
//! 1. With resume enabled and a fingerprint set, a stored URL is probed
//!    with HEAD; a live resource resumes at the server's offset.
//! 2. Otherwise a new resource is created with POST and its `Location`
//!    is recorded in the store.
//!
//! Chunk transfers are issued on behalf of the uploader. The client keeps
//! no per-upload state and can be cloned into as many tasks as needed.

use std::sync::Arc;

use url::Url;

use crate::config::Config;
use crate::error::{Result, TusError};
use crate::protocol::{header, parse_offset, OFFSET_OCTET_STREAM, PROTOCOL_VERSION};
use crate::store::Store;
use crate::transport::{
    HeaderValue, HttpClient, HttpRequest, HttpResponse, Method, ReqwestTransport, StatusCode,
};
use crate::upload::Upload;
use crate::uploader::Uploader;

// ============================================================================
// Client
// ============================================================================

/// tus protocol client
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    endpoint: Url,
    config: Config,
    http: Arc<dyn HttpClient>,
}

impl Client {
    /// Create a client for a creation endpoint using the default transport
    pub fn new(endpoint: &str, config: Config) -> Result<Self> {
        Self::with_http_client(endpoint, config, Arc::new(ReqwestTransport::new()))
    }

    /// Create a client with a custom transport
    pub fn with_http_client(
        endpoint: &str,
        config: Config,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self> {
        config.validate()?;
        let endpoint = Url::parse(endpoint)?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                endpoint,
                config,
                http,
            }),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    // ========================================================================
    // Upload Resolution
    // ========================================================================

    /// Create an upload resource, resuming a stored one when possible.
    ///
    /// A stored URL whose resource is gone (403/404/410) is dropped from
    /// the store and a fresh resource is created instead.
    pub async fn create_upload(&self, mut upload: Upload) -> Result<Uploader> {
        if let Some(store) = self.resume_store(&upload) {
            if let Some((url, offset)) = self.resolve_stored(store, &upload).await? {
                tracing::info!(
                    upload_url = %url,
                    offset = offset,
                    size = upload.size(),
                    "Resuming upload"
                );
                upload.update_progress(offset);
                return Ok(Uploader::new(self.clone(), url, upload));
            }
        }

        let url = self.create_resource(&upload).await?;

        if let Some(store) = self.resume_store(&upload) {
            store.set(upload.fingerprint(), url.as_str()).await?;
        }

        tracing::info!(
            upload_url = %url,
            size = upload.size(),
            resumable = self.resume_store(&upload).is_some(),
            "Created upload"
        );

        Ok(Uploader::new(self.clone(), url, upload))
    }

    /// Resume a previously created upload.
    ///
    /// Unlike [`create_upload`](Self::create_upload) this never creates a
    /// new resource: a missing or expired stored URL is `NotFound`.
    pub async fn resume_upload(&self, mut upload: Upload) -> Result<Uploader> {
        if !self.inner.config.resume {
            return Err(TusError::ResumeNotEnabled);
        }
        if !upload.is_resumable() {
            return Err(TusError::FingerprintNotSet);
        }
        let store = self.resume_store(&upload).ok_or(TusError::ResumeNotEnabled)?;

        let (url, offset) = self
            .resolve_stored(store, &upload)
            .await?
            .ok_or_else(|| TusError::NotFound(upload.fingerprint().to_string()))?;

        tracing::info!(
            upload_url = %url,
            offset = offset,
            size = upload.size(),
            "Resuming upload"
        );

        upload.update_progress(offset);
        Ok(Uploader::new(self.clone(), url, upload))
    }

    /// Store used for this upload, if it participates in resuming
    fn resume_store(&self, upload: &Upload) -> Option<&Arc<dyn Store>> {
        if !self.inner.config.resume || !upload.is_resumable() {
            return None;
        }
        self.inner.config.store.as_ref()
    }

    /// Look up and probe the stored URL for an upload.
    ///
    /// Returns `None` (after dropping the entry) when nothing usable is
    /// stored: an unparsable URL, a resource that is gone, or one whose
    /// offset is past the size of this upload.
    async fn resolve_stored(
        &self,
        store: &Arc<dyn Store>,
        upload: &Upload,
    ) -> Result<Option<(Url, u64)>> {
        let fingerprint = upload.fingerprint();

        let Some(stored) = store.get(fingerprint).await? else {
            return Ok(None);
        };

        let url = match Url::parse(&stored) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(
                    fingerprint = %fingerprint,
                    stored = %stored,
                    error = %e,
                    "Dropping unparsable stored upload URL"
                );
                store.delete(fingerprint).await?;
                return Ok(None);
            }
        };

        match self.upload_offset(&url).await? {
            Some(offset) if offset > upload.size() => {
                tracing::warn!(
                    fingerprint = %fingerprint,
                    upload_url = %url,
                    offset = offset,
                    size = upload.size(),
                    "Stored upload is ahead of the local source"
                );
                store.delete(fingerprint).await?;
                Ok(None)
            }
            Some(offset) => Ok(Some((url, offset))),
            None => {
                tracing::warn!(
                    fingerprint = %fingerprint,
                    upload_url = %url,
                    "Stored upload no longer exists on server"
                );
                store.delete(fingerprint).await?;
                Ok(None)
            }
        }
    }

    /// Forget the stored URL of a completed upload
    pub(crate) async fn forget(&self, upload: &Upload) -> Result<()> {
        if let Some(store) = self.resume_store(upload) {
            store.delete(upload.fingerprint()).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Protocol Requests
    // ========================================================================

    /// POST a new upload resource and return its absolute URL
    async fn create_resource(&self, upload: &Upload) -> Result<Url> {
        let endpoint = &self.inner.endpoint;
        let mut request = self.request(Method::POST, endpoint.clone());
        set_header(&mut request, "content-length", "0")?;
        set_header(&mut request, header::UPLOAD_LENGTH, &upload.size().to_string())?;

        let metadata = upload.encoded_metadata()?;
        if !metadata.is_empty() {
            set_header(&mut request, header::UPLOAD_METADATA, &metadata)?;
        }

        let response = self.inner.http.send(request).await?;

        match response.status {
            StatusCode::CREATED => {
                let location = response.header_str(header::LOCATION).ok_or_else(|| {
                    TusError::InvalidHeader {
                        header: "Location",
                        url: endpoint.to_string(),
                        value: String::new(),
                    }
                })?;
                Ok(resolve_location_url(endpoint, location)?)
            }
            StatusCode::PRECONDITION_FAILED => Err(version_mismatch(endpoint, &response)),
            StatusCode::PAYLOAD_TOO_LARGE => Err(TusError::TooLarge {
                url: endpoint.to_string(),
                size: upload.size(),
            }),
            status => Err(unexpected_status(Method::POST, endpoint, status)),
        }
    }

    /// HEAD an upload resource; `None` when the resource is gone
    async fn upload_offset(&self, url: &Url) -> Result<Option<u64>> {
        let request = self.request(Method::HEAD, url.clone());
        let response = self.inner.http.send(request).await?;

        match response.status {
            StatusCode::OK => offset_header(url, &response).map(Some),
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND | StatusCode::GONE => Ok(None),
            StatusCode::PRECONDITION_FAILED => Err(version_mismatch(url, &response)),
            status => Err(unexpected_status(Method::HEAD, url, status)),
        }
    }

    /// Send one chunk at `offset`; returns the server's new offset
    pub(crate) async fn upload_chunk(&self, url: &Url, body: Vec<u8>, offset: u64) -> Result<u64> {
        let config = &self.inner.config;
        let method = if config.override_patch_method {
            Method::POST
        } else {
            Method::PATCH
        };

        let size = body.len();
        let mut request = self.request(method.clone(), url.clone());
        set_header(&mut request, "content-type", OFFSET_OCTET_STREAM)?;
        set_header(&mut request, "content-length", &size.to_string())?;
        set_header(&mut request, header::UPLOAD_OFFSET, &offset.to_string())?;
        if config.override_patch_method {
            set_header(&mut request, header::METHOD_OVERRIDE, "PATCH")?;
        }
        request.body = body;

        let response = self.inner.http.send(request).await?;

        match response.status {
            StatusCode::NO_CONTENT => offset_header(url, &response),
            StatusCode::CONFLICT => Err(TusError::Conflict {
                url: url.to_string(),
                offset,
            }),
            StatusCode::PRECONDITION_FAILED => Err(version_mismatch(url, &response)),
            StatusCode::PAYLOAD_TOO_LARGE => Err(TusError::TooLarge {
                url: url.to_string(),
                size: offset + size as u64,
            }),
            status => Err(unexpected_status(method, url, status)),
        }
    }

    /// Base request carrying configured headers and the protocol version
    fn request(&self, method: Method, url: Url) -> HttpRequest {
        let mut request = HttpRequest::new(method, url);
        request.headers.extend(self.inner.config.headers.clone());
        request.headers.insert(
            header::TUS_RESUMABLE,
            HeaderValue::from_static(PROTOCOL_VERSION),
        );
        request
    }
}

// ============================================================================
// Location Resolution
// ============================================================================

/// Resolve a `Location` header against the URL of the request that
/// produced it.
///
/// - absolute URL: used unchanged
/// - `//host/path`: takes the scheme of `base`
/// - `/path`: takes scheme, host and port of `base`
/// - `path`: appended to the path of `base`
pub fn resolve_location_url(base: &Url, location: &str) -> std::result::Result<Url, url::ParseError> {
    match Url::parse(location) {
        Ok(url) => return Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {}
        Err(e) => return Err(e),
    }

    if location.starts_with("//") {
        return Url::parse(&format!("{}:{}", base.scheme(), location));
    }

    if location.starts_with('/') {
        return base.join(location);
    }

    let path = format!("{}/{}", base.path().trim_end_matches('/'), location);
    base.join(&path)
}

// ============================================================================
// Helpers
// ============================================================================

fn set_header(request: &mut HttpRequest, name: &'static str, value: &str) -> Result<()> {
    let header_value = HeaderValue::from_str(value).map_err(|_| TusError::InvalidRequestHeader {
        name: name.to_string(),
        value: value.to_string(),
    })?;
    request.headers.insert(name, header_value);
    Ok(())
}

fn offset_header(url: &Url, response: &HttpResponse) -> Result<u64> {
    let raw = response.header_str(header::UPLOAD_OFFSET).unwrap_or_default();
    parse_offset(raw).ok_or_else(|| TusError::InvalidHeader {
        header: "Upload-Offset",
        url: url.to_string(),
        value: raw.to_string(),
    })
}

fn version_mismatch(url: &Url, response: &HttpResponse) -> TusError {
    TusError::VersionMismatch {
        url: url.to_string(),
        client_version: PROTOCOL_VERSION,
        server_versions: response
            .header_str(header::TUS_VERSION)
            .unwrap_or("unknown")
            .to_string(),
    }
}

fn unexpected_status(method: Method, url: &Url, status: StatusCode) -> TusError {
    TusError::UnexpectedStatus {
        method: method.to_string(),
        url: url.to_string(),
        status: status.as_u16(),
    }
}
