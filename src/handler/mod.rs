//! Protocol engine (§4.4): translates an [`IncomingRequest`] into
//! lock + storage + hook orchestration and produces an [`OutgoingResponse`],
//! enforcing the tus 1.0 protocol headers along the way.
//!
//! This module owns no transport. It is driven by whatever adapter
//! translates a real socket/framework request into [`IncomingRequest`] — see
//! `demos/basic_server.rs` for a minimal binding.

pub mod create;
pub mod delete;
pub mod get;
pub mod head;
pub mod options;
pub mod patch;

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use tracing::{instrument, warn};

use crate::composer::Composer;
use crate::config::TusdConfig;
use crate::error::{LockError, TusError, TusResult};
use crate::hooks::{HookEvent, HookHandler, HookResponse, HookType, HttpRequestInfo};
use crate::http_types::{IncomingRequest, OutgoingResponse};
use crate::lock::Locker;
use crate::model::FileInfo;

/// The only protocol version this engine speaks, per RFC draft §1.
pub const TUS_RESUMABLE: &str = "1.0.0";

/// The `Tus-Version` response: a comma-separated list of supported versions.
pub const TUS_VERSION_LIST: &str = "1.0.0";

/// Everything the protocol engine needs to serve requests: a composed
/// backend, a lock coordinator, and a hook dispatcher.
pub struct Handler {
    pub config: TusdConfig,
    pub composer: Composer,
    pub locker: Arc<dyn Locker>,
    pub hooks: Arc<dyn HookHandler>,
}

impl Handler {
    pub fn new(
        config: TusdConfig,
        composer: Composer,
        locker: Arc<dyn Locker>,
        hooks: Arc<dyn HookHandler>,
    ) -> Self {
        Self {
            config,
            composer,
            locker,
            hooks,
        }
    }

    /// Entry point driven by the transport adapter. Never panics: every
    /// failure collapses into an [`OutgoingResponse`] via the fixed
    /// error → status mapping (§7).
    #[instrument(skip(self, req), fields(method = %req.method))]
    pub async fn handle(&self, req: IncomingRequest) -> OutgoingResponse {
        if req.method != Method::OPTIONS {
            if let Err(status) = self.check_resumable_version(&req) {
                return self.with_common_headers(OutgoingResponse::new(status));
            }
        }

        let outcome = match req.method {
            Method::OPTIONS => options::handle(self, req).await,
            Method::POST => create::handle(self, req).await,
            Method::HEAD => head::handle(self, req).await,
            Method::PATCH => patch::handle(self, req).await,
            Method::DELETE => delete::handle(self, req).await,
            Method::GET => get::handle(self, req).await,
            _ => Err(TusError::MethodNotAllowed),
        };

        let response = outcome.unwrap_or_else(|err| self.error_response(err));
        self.with_common_headers(response)
    }

    fn check_resumable_version(&self, req: &IncomingRequest) -> Result<(), StatusCode> {
        match req.header_str("Tus-Resumable") {
            Some(TUS_RESUMABLE) => Ok(()),
            other => {
                warn!(
                    got = other.unwrap_or("<missing>"),
                    "unsupported or missing Tus-Resumable header"
                );
                Err(StatusCode::PRECONDITION_FAILED)
            }
        }
    }

    fn error_response(&self, err: TusError) -> OutgoingResponse {
        let status = err.status_code();
        let message = err.client_message();
        warn!(%status, %message, "request failed");
        if message.is_empty() {
            OutgoingResponse::new(status)
        } else {
            OutgoingResponse::new(status).with_body(message)
        }
    }

    fn with_common_headers(&self, resp: OutgoingResponse) -> OutgoingResponse {
        resp.with_header("Tus-Resumable", TUS_RESUMABLE)
            .with_header("Access-Control-Allow-Origin", "*")
            .with_header(
                "Access-Control-Expose-Headers",
                "Upload-Offset,Location,Upload-Length,Tus-Version,Tus-Resumable,\
                 Tus-Max-Size,Tus-Extension,Upload-Metadata,Upload-Defer-Length,Upload-Concat",
            )
    }

    pub(crate) fn location_for(&self, id: &str) -> String {
        format!("{}{id}", self.config.base_path)
    }
}

/// Request-header parsing shared by POST and deferred-length PATCH (§4.4
/// step 1, step 5): `Upload-Length: n` or `Upload-Defer-Length: 1`.
pub(crate) fn parse_length_headers(req: &IncomingRequest) -> TusResult<(u64, bool)> {
    if req.header_str("Upload-Defer-Length") == Some("1") {
        return Ok((0, true));
    }
    match req.header_str("Upload-Length") {
        Some(raw) => raw
            .parse::<u64>()
            .map(|n| (n, false))
            .map_err(|_| TusError::InvalidUploadLength),
        None => Err(TusError::InvalidUploadLength),
    }
}

pub(crate) fn request_info(req: &IncomingRequest) -> HttpRequestInfo {
    let mut headers = HashMap::new();
    for (name, value) in req.headers.iter() {
        if let Ok(v) = value.to_str() {
            headers.insert(name.as_str().to_string(), v.to_string());
        }
    }
    HttpRequestInfo {
        method: req.method.to_string(),
        uri: req.path_tail.join("/"),
        remote_addr: req.remote_addr.clone(),
        headers,
    }
}

pub(crate) fn build_hook_event(kind: HookType, info: &FileInfo, req: &IncomingRequest) -> HookEvent {
    HookEvent {
        kind,
        upload: info.clone(),
        http_request: request_info(req),
    }
}

/// Dispatches a post-* hook without making the response wait on it (§4.4
/// step 10 "fire-and-forget semantics with respect to the response"). Its
/// own invocation is still serialized per-upload by the lock coordinator for
/// any hook fired while the lease is held; this one fires after release, so
/// that guarantee doesn't apply to it specifically — only §4.3's "not in
/// parallel with itself for the same ID" is relevant, and post-create/
/// post-finish/post-terminate each fire at most once per request.
pub(crate) fn fire_and_forget(hooks: Arc<dyn HookHandler>, event: HookEvent) {
    tokio::spawn(async move {
        if let Err(e) = hooks.invoke(&event).await {
            warn!(hook = event.kind.name(), error = %e, "post-* hook failed");
        }
    });
}

/// Builds the error the engine returns when a `pre-*` hook rejects.
pub(crate) fn policy_rejection(verdict: HookResponse) -> TusError {
    let status = verdict
        .http_response
        .status_code
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::BAD_REQUEST);
    TusError::PolicyRejection {
        status,
        message: verdict.http_response.body,
        headers: verdict.http_response.headers.into_iter().collect(),
    }
}

pub(crate) fn lock_error_to_tus(err: LockError, id: &str) -> TusError {
    match err {
        LockError::Timeout { .. } => TusError::LockTimeout { id: id.to_string() },
        LockError::Contention { .. } => TusError::LockContention { id: id.to_string() },
        LockError::Backend(msg) => TusError::LockBackend(msg),
    }
}
