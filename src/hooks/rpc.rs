//! RPC hook transport (§4.3, §6).
//!
//! The source spec leaves "a long-lived peer process over a local
//! transport" unspecified beyond "one method, `InvokeHook`". This
//! implementation frames one JSON object per line over a Unix domain
//! socket (TCP on platforms without one) — a minimal, inspectable stand-in
//! that satisfies the contract: send a request, read exactly one response,
//! retry a bounded number of times with linear backoff.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{instrument, warn};

use super::{HookEvent, HookHandler, HookResponse};
use crate::error::HookError;

#[derive(Debug, Clone, Serialize)]
struct RpcRequest<'a> {
    method: &'static str,
    event: &'a HookEvent,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    result: Option<HookResponse>,
}

/// Address of the long-lived peer this hook talks to.
#[derive(Debug, Clone)]
pub enum RpcAddr {
    #[cfg(unix)]
    Unix(std::path::PathBuf),
    Tcp(String),
}

#[derive(Debug, Clone)]
pub struct RpcHook {
    addr: RpcAddr,
    max_attempts: u32,
    backoff_step: Duration,
    timeout: Duration,
}

impl RpcHook {
    pub fn new(addr: RpcAddr) -> Self {
        Self {
            addr,
            max_attempts: 3,
            backoff_step: Duration::from_millis(200),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    async fn call_once(&self, request: &RpcRequest<'_>) -> Result<HookResponse, HookError> {
        let line = serde_json::to_string(request)
            .map_err(|e| HookError::Decode(format!("failed to encode RPC request: {e}")))?;

        let fut = async {
            let boxed_read: crate::http_types::BodyReader = match &self.addr {
                #[cfg(unix)]
                RpcAddr::Unix(path) => {
                    let stream = tokio::net::UnixStream::connect(path)
                        .await
                        .map_err(|e| HookError::Transport(format!("connect failed: {e}")))?;
                    let (read_half, mut write_half) = tokio::io::split(stream);
                    write_half
                        .write_all(format!("{line}\n").as_bytes())
                        .await
                        .map_err(|e| HookError::Transport(format!("write failed: {e}")))?;
                    Box::pin(read_half)
                }
                RpcAddr::Tcp(addr) => {
                    let stream = tokio::net::TcpStream::connect(addr)
                        .await
                        .map_err(|e| HookError::Transport(format!("connect failed: {e}")))?;
                    let (read_half, mut write_half) = tokio::io::split(stream);
                    write_half
                        .write_all(format!("{line}\n").as_bytes())
                        .await
                        .map_err(|e| HookError::Transport(format!("write failed: {e}")))?;
                    Box::pin(read_half)
                }
            };
            let mut reader = BufReader::new(boxed_read);

            let mut response_line = String::new();
            reader
                .read_line(&mut response_line)
                .await
                .map_err(|e| HookError::Transport(format!("read failed: {e}")))?;
            if response_line.is_empty() {
                return Err(HookError::Transport("peer closed without responding".to_string()));
            }

            let envelope: RpcEnvelope = serde_json::from_str(response_line.trim())
                .map_err(|e| HookError::Decode(format!("malformed RPC response: {e}")))?;

            if let Some(message) = envelope.error {
                return Err(HookError::Transport(message));
            }
            envelope
                .result
                .ok_or_else(|| HookError::Decode("RPC response had neither result nor error".to_string()))
        };

        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| HookError::Timeout)?
    }
}

#[async_trait]
impl HookHandler for RpcHook {
    #[instrument(skip(self, event), fields(hook = event.kind.name(), upload_id = %event.upload.id))]
    async fn invoke(&self, event: &HookEvent) -> Result<HookResponse, HookError> {
        let request = RpcRequest {
            method: "InvokeHook",
            event,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.call_once(&request).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.max_attempts => {
                    warn!(attempt, error = %e, "RPC hook call failed, retrying");
                    tokio::time::sleep(self.backoff_step * attempt).await;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
