//! Transport-agnostic request/response contract.
//!
//! The protocol engine (§4.4) is deliberately not wired to a concrete HTTP
//! router — that glue is out of scope (§1). Instead it accepts an
//! [`IncomingRequest`] and produces an [`OutgoingResponse`]; any router,
//! hyper `Service`, or raw listener loop can drive it by translating to and
//! from these two types. See `demos/basic_server.rs` for a minimal example
//! binding.

use std::pin::Pin;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use tokio::io::AsyncRead;

/// A readable request body. Boxed so callers can plug in anything from an
/// in-memory cursor (tests) to a live hyper incoming-body adapter.
pub type BodyReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// A request as seen by the protocol engine, already stripped of whatever
/// framework wrapped it.
pub struct IncomingRequest {
    pub method: Method,
    /// Path segment(s) after the configured base path, already split.
    /// Empty for requests to the base path itself (e.g. `POST /files/`).
    pub path_tail: Vec<String>,
    pub headers: HeaderMap,
    pub remote_addr: Option<String>,
    pub body: Option<BodyReader>,
}

impl IncomingRequest {
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// The upload ID, if `path_tail` names exactly one resource.
    pub fn upload_id(&self) -> Option<&str> {
        match self.path_tail.as_slice() {
            [id] if !id.is_empty() => Some(id.as_str()),
            _ => None,
        }
    }
}

/// A response as produced by the protocol engine. Transport-agnostic: the
/// integrator decides how to write `status`/`headers`/`body` onto the wire.
pub struct OutgoingResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OutgoingResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        if let Ok(value) = http::HeaderValue::from_str(&value.into()) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}
