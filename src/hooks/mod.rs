//! Hook dispatch subsystem (§4.3).
//!
//! A [`HookHandler`] delivers one [`HookEvent`] to exactly one external
//! handler and interprets the resulting [`HookResponse`]. Three transports
//! are provided: [`subprocess::SubprocessHook`], [`http::HttpHook`] and
//! [`rpc::RpcHook`]. [`NullHookHandler`] is the always-succeed default so a
//! server can run with no external policy configured, and
//! [`metrics::MetricsHookHandler`] decorates any handler with
//! invocation/failure counters.

pub mod http;
pub mod metrics;
pub mod rpc;
pub mod subprocess;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HookError;
use crate::model::FileInfo;

/// The six points in the protocol state machine a hook can observe (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookType {
    PreCreate,
    PostCreate,
    PostReceive,
    PreFinish,
    PostFinish,
    PostTerminate,
}

impl HookType {
    /// Wire name, also used as the `Hook-Name` HTTP header value.
    pub fn name(self) -> &'static str {
        match self {
            HookType::PreCreate => "pre-create",
            HookType::PostCreate => "post-create",
            HookType::PostReceive => "post-receive",
            HookType::PreFinish => "pre-finish",
            HookType::PostFinish => "post-finish",
            HookType::PostTerminate => "post-terminate",
        }
    }

    /// Only `pre-*` hooks may fail the operation outright (§4.3 table).
    pub fn can_reject(self) -> bool {
        matches!(self, HookType::PreCreate | HookType::PreFinish)
    }

    /// A transport failure for these hook types is logged and counted,
    /// never propagated to the client (§4.3 "Invocation contract", §7) —
    /// everything except the two hooks that can reject outright.
    pub fn is_post(self) -> bool {
        !self.can_reject()
    }
}

/// The subset of the originating HTTP request forwarded to hook handlers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpRequestInfo {
    pub method: String,
    pub uri: String,
    pub remote_addr: Option<String>,
    pub headers: HashMap<String, String>,
}

/// Immutable tuple delivered to a hook handler (§3 "Hook event").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEvent {
    pub kind: HookType,
    pub upload: FileInfo,
    pub http_request: HttpRequestInfo,
}

/// The HTTP response a `pre-*` hook wants returned to the client instead of
/// the engine's own success response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookHttpResponse {
    pub status_code: Option<u16>,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// A hook handler's verdict (§3 "Hook response"). Only meaningful for
/// `pre-*` hook types; ignored for everything else.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookResponse {
    pub reject_upload: bool,
    pub stop_upload: bool,
    pub http_response: HookHttpResponse,
}

impl HookResponse {
    pub fn allow() -> Self {
        Self::default()
    }
}

/// A single hook transport (subprocess / HTTP / RPC all implement this the
/// same way). Invocation is synchronous: it blocks the protocol engine
/// until a response or transport failure (§4.3 "Invocation contract").
#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn invoke(&self, event: &HookEvent) -> Result<HookResponse, HookError>;
}

/// The default handler when no external policy is configured: every
/// invocation succeeds immediately with an empty, allowing response.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHookHandler;

#[async_trait]
impl HookHandler for NullHookHandler {
    async fn invoke(&self, _event: &HookEvent) -> Result<HookResponse, HookError> {
        Ok(HookResponse::allow())
    }
}
