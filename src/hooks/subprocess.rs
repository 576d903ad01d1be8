//! Subprocess hook transport (§4.3, §6).
//!
//! Executes a configured binary per hook invocation. The event is mirrored
//! into the environment (`TUS_ID`, `TUS_SIZE`, `TUS_OFFSET`) and serialized
//! as JSON on stdin. Exit code 0 means success; non-zero means rejection
//! (for `pre-*`) or stop (for `post-receive`). If `capture_stdout` is set,
//! stdout becomes the `HookHttpResponse` body.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{instrument, warn};

use super::{HookEvent, HookHandler, HookResponse};
use crate::error::HookError;

#[derive(Debug, Clone)]
pub struct SubprocessHook {
    pub binary: PathBuf,
    /// When true, the child's stdout becomes the rejection response body.
    pub capture_stdout: bool,
}

impl SubprocessHook {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            capture_stdout: true,
        }
    }
}

#[async_trait]
impl HookHandler for SubprocessHook {
    #[instrument(skip(self, event), fields(hook = event.kind.name(), upload_id = %event.upload.id))]
    async fn invoke(&self, event: &HookEvent) -> Result<HookResponse, HookError> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| HookError::Decode(format!("failed to encode hook event: {e}")))?;

        let mut child = Command::new(&self.binary)
            .env("TUS_ID", &event.upload.id)
            .env("TUS_SIZE", event.upload.size.to_string())
            .env("TUS_OFFSET", event.upload.offset.to_string())
            .env("HOOK_NAME", event.kind.name())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| HookError::Transport(format!("failed to spawn hook binary: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| HookError::Transport(format!("failed to write hook stdin: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| HookError::Transport(format!("failed to wait for hook process: {e}")))?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            if !event.kind.can_reject() {
                warn!(code, "post-* hook exited non-zero; ignoring per contract");
                if event.kind.name() == "post-receive" {
                    let mut response = HookResponse::allow();
                    response.stop_upload = true;
                    return Ok(response);
                }
                return Ok(HookResponse::allow());
            }
            let body = if self.capture_stdout {
                String::from_utf8_lossy(&output.stdout).into_owned()
            } else {
                String::from_utf8_lossy(&output.stderr).into_owned()
            };
            let _ = code;
            let mut response = HookResponse::default();
            response.reject_upload = true;
            response.http_response.status_code = Some(400);
            response.http_response.body = body;
            return Ok(response);
        }

        let mut response = HookResponse::allow();
        if self.capture_stdout && !output.stdout.is_empty() {
            response.http_response.body = String::from_utf8_lossy(&output.stdout).into_owned();
        }
        Ok(response)
    }
}
