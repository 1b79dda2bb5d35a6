//! Test doubles: an in-memory tus server and a call-counting store

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use crate::protocol::{header, parse_offset, OFFSET_OCTET_STREAM, PROTOCOL_VERSION};
use crate::store::{MemoryStore, Store, StoreError};
use crate::transport::{
    HeaderMap, HeaderValue, HttpClient, HttpRequest, HttpResponse, Method, StatusCode,
    TransportError,
};

pub const ENDPOINT: &str = "http://tus.test/files/";

// ============================================================================
// Fake Server
// ============================================================================

/// Request as received by the fake server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body_len: usize,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Debug, Default)]
struct FakeUpload {
    length: u64,
    offset: u64,
    data: Vec<u8>,
    gone: Option<StatusCode>,
}

#[derive(Debug)]
struct FakeState {
    uploads: HashMap<String, FakeUpload>,
    next_id: u64,
    requests: Vec<RecordedRequest>,
    chunk_lengths: Vec<usize>,
    version: String,
    max_size: Option<u64>,
    relative_locations: bool,
    retain_data: bool,
    corrupt_offsets: bool,
    ack_limit: Option<u64>,
    reported_offset: Option<u64>,
    stall_after: Option<usize>,
    patches_served: usize,
    fail_next: Option<(Method, StatusCode)>,
    drop_next: bool,
}

/// In-memory tus 1.0.0 server reachable through [`HttpClient`]
#[derive(Debug)]
pub struct FakeServer {
    state: Mutex<FakeState>,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                uploads: HashMap::new(),
                next_id: 1,
                requests: Vec::new(),
                chunk_lengths: Vec::new(),
                version: PROTOCOL_VERSION.to_string(),
                max_size: None,
                relative_locations: false,
                retain_data: true,
                corrupt_offsets: false,
                ack_limit: None,
                reported_offset: None,
                stall_after: None,
                patches_served: 0,
                fail_next: None,
                drop_next: false,
            }),
        })
    }

    // ------------------------------------------------------------------------
    // Behaviour switches
    // ------------------------------------------------------------------------

    /// Only accept this protocol version (412 otherwise)
    pub fn require_version(&self, version: &str) {
        self.state.lock().version = version.to_string();
    }

    pub fn set_max_size(&self, max: u64) {
        self.state.lock().max_size = Some(max);
    }

    /// Answer creation with `Location: <id>` instead of `/files/<id>`
    pub fn use_relative_locations(&self) {
        self.state.lock().relative_locations = true;
    }

    /// Track offsets only, for large uploads
    pub fn discard_data(&self) {
        self.state.lock().retain_data = false;
    }

    /// Answer HEAD and PATCH with an unparsable `Upload-Offset`
    pub fn corrupt_offsets(&self) {
        self.state.lock().corrupt_offsets = true;
    }

    /// Accept at most `bytes` per chunk request
    pub fn limit_ack(&self, bytes: u64) {
        self.state.lock().ack_limit = Some(bytes);
    }

    /// Acknowledge chunks with this `Upload-Offset`, whatever was stored
    pub fn report_offset(&self, offset: u64) {
        self.state.lock().reported_offset = Some(offset);
    }

    /// Never answer chunk requests after `served` were answered
    pub fn stall_after(&self, served: usize) {
        self.state.lock().stall_after = Some(served);
    }

    /// Answer the next request with this method with `status`
    pub fn fail_next(&self, method: Method, status: StatusCode) {
        self.state.lock().fail_next = Some((method, status));
    }

    /// Fail the next request at the transport level
    pub fn drop_next_connection(&self) {
        self.state.lock().drop_next = true;
    }

    /// Make an upload answer every request with `status`
    pub fn expire(&self, url: &Url, status: StatusCode) {
        let id = upload_id(url.as_str());
        if let Some(upload) = self.state.lock().uploads.get_mut(&id) {
            upload.gone = Some(status);
        }
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    pub fn requests_for(&self, method: Method) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method)
            .collect()
    }

    pub fn count(&self, method: Method) -> usize {
        self.requests_for(method).len()
    }

    /// Body lengths of all accepted chunk requests, in order
    pub fn chunk_lengths(&self) -> Vec<usize> {
        self.state.lock().chunk_lengths.clone()
    }

    /// Bytes received for an upload
    pub fn data(&self, url: &Url) -> Vec<u8> {
        let id = upload_id(url.as_str());
        self.state
            .lock()
            .uploads
            .get(&id)
            .map(|u| u.data.clone())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // Protocol
    // ------------------------------------------------------------------------

    fn handle(&self, request: HttpRequest) -> Option<Result<HttpResponse, TransportError>> {
        let mut state = self.state.lock();

        state.requests.push(RecordedRequest {
            method: request.method.clone(),
            url: request.url.to_string(),
            headers: request.headers.clone(),
            body_len: request.body.len(),
        });

        if std::mem::take(&mut state.drop_next) {
            return Some(Err(TransportError::Connection(
                "connection reset by peer".to_string(),
            )));
        }

        if let Some((method, status)) = state.fail_next.clone() {
            if method == request.method {
                state.fail_next = None;
                return Some(Ok(HttpResponse::new(status)));
            }
        }

        if request.header_str(header::TUS_RESUMABLE) != Some(state.version.as_str()) {
            let mut response = HttpResponse::new(StatusCode::PRECONDITION_FAILED);
            insert(&mut response, header::TUS_VERSION, &state.version);
            return Some(Ok(response));
        }

        let is_chunk = request.method == Method::PATCH
            || (request.method == Method::POST
                && request.header_str(header::METHOD_OVERRIDE) == Some("PATCH"));

        if request.method == Method::POST && !is_chunk {
            return Some(Ok(create(&mut state, &request)));
        }

        let id = upload_id(request.url.as_str());

        if request.method == Method::HEAD {
            return Some(Ok(head(&state, &id)));
        }

        if is_chunk {
            if let Some(limit) = state.stall_after {
                if state.patches_served >= limit {
                    return None;
                }
            }
            state.patches_served += 1;
            return Some(Ok(patch(&mut state, &id, &request)));
        }

        Some(Ok(HttpResponse::new(StatusCode::METHOD_NOT_ALLOWED)))
    }
}

#[async_trait]
impl HttpClient for FakeServer {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        match self.handle(request) {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}

fn create(state: &mut FakeState, request: &HttpRequest) -> HttpResponse {
    let Some(length) = request.header_str(header::UPLOAD_LENGTH).and_then(parse_offset) else {
        return HttpResponse::new(StatusCode::BAD_REQUEST);
    };

    if state.max_size.is_some_and(|max| length > max) {
        return HttpResponse::new(StatusCode::PAYLOAD_TOO_LARGE);
    }

    let id = state.next_id.to_string();
    state.next_id += 1;
    state.uploads.insert(
        id.clone(),
        FakeUpload {
            length,
            ..Default::default()
        },
    );

    let location = if state.relative_locations {
        id
    } else {
        format!("/files/{}", id)
    };

    let mut response = HttpResponse::new(StatusCode::CREATED);
    insert(&mut response, header::LOCATION, &location);
    response
}

fn head(state: &FakeState, id: &str) -> HttpResponse {
    let Some(upload) = state.uploads.get(id) else {
        return HttpResponse::new(StatusCode::NOT_FOUND);
    };
    if let Some(status) = upload.gone {
        return HttpResponse::new(status);
    }

    let mut response = HttpResponse::new(StatusCode::OK);
    offset_headers(&mut response, upload, state.corrupt_offsets);
    insert(&mut response, header::UPLOAD_LENGTH, &upload.length.to_string());
    response
}

fn patch(state: &mut FakeState, id: &str, request: &HttpRequest) -> HttpResponse {
    let corrupt = state.corrupt_offsets;
    let retain = state.retain_data;
    let ack_limit = state.ack_limit;
    let reported = state.reported_offset;

    if request.header_str("content-type") != Some(OFFSET_OCTET_STREAM) {
        return HttpResponse::new(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    let Some(upload) = state.uploads.get_mut(id) else {
        return HttpResponse::new(StatusCode::NOT_FOUND);
    };
    if let Some(status) = upload.gone {
        return HttpResponse::new(status);
    }

    let claimed = request.header_str(header::UPLOAD_OFFSET).and_then(parse_offset);
    if claimed != Some(upload.offset) {
        return HttpResponse::new(StatusCode::CONFLICT);
    }

    let mut accepted = request.body.len() as u64;
    if let Some(limit) = ack_limit {
        accepted = accepted.min(limit);
    }
    if upload.offset + accepted > upload.length {
        return HttpResponse::new(StatusCode::PAYLOAD_TOO_LARGE);
    }

    if retain {
        upload
            .data
            .extend_from_slice(&request.body[..accepted as usize]);
    }
    upload.offset += accepted;

    let mut response = HttpResponse::new(StatusCode::NO_CONTENT);
    offset_headers(&mut response, upload, corrupt);
    if let Some(offset) = reported {
        insert(&mut response, header::UPLOAD_OFFSET, &offset.to_string());
    }
    state.chunk_lengths.push(request.body.len());
    response
}

fn offset_headers(response: &mut HttpResponse, upload: &FakeUpload, corrupt: bool) {
    let value = if corrupt {
        "not-a-number".to_string()
    } else {
        upload.offset.to_string()
    };
    insert(response, header::UPLOAD_OFFSET, &value);
}

fn insert(response: &mut HttpResponse, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        response.headers.insert(name, value);
    }
}

fn upload_id(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

// ============================================================================
// Counting Store
// ============================================================================

/// Memory store that counts every call made through [`Store`]
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: MemoryStore,
    calls: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for CountingStore {
    async fn get(&self, fingerprint: &str) -> Result<Option<String>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(fingerprint).await
    }

    async fn set(&self, fingerprint: &str, url: &str) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.set(fingerprint, url).await
    }

    async fn delete(&self, fingerprint: &str) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(fingerprint).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}
