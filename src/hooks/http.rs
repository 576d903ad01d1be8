//! HTTP hook transport (§4.3, §6).
//!
//! `POST`s the hook event as JSON to a configured endpoint with the
//! `Hook-Name` header set to the hook type's wire name, retrying with
//! linear backoff on transport failure. `2xx` is success; `4xx`/`5xx` is a
//! rejection whose body becomes the client-facing error message.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{instrument, warn};

use super::{HookEvent, HookHandler, HookResponse};
use crate::error::HookError;

#[derive(Debug, Clone)]
pub struct HttpHook {
    client: Client,
    endpoint: String,
    max_attempts: u32,
    backoff_step: Duration,
    /// Headers copied verbatim from the originating request into the hook
    /// POST (§4.3 "forwarded headers from the original request may be
    /// copied").
    forward_headers: Vec<String>,
}

impl HttpHook {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client builds with no custom TLS config"),
            endpoint: endpoint.into(),
            max_attempts: 3,
            backoff_step: Duration::from_millis(200),
            forward_headers: Vec::new(),
        }
    }

    pub fn forward_header(mut self, name: impl Into<String>) -> Self {
        self.forward_headers.push(name.into());
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }
}

#[async_trait]
impl HookHandler for HttpHook {
    #[instrument(skip(self, event), fields(hook = event.kind.name(), upload_id = %event.upload.id))]
    async fn invoke(&self, event: &HookEvent) -> Result<HookResponse, HookError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self
                .client
                .post(&self.endpoint)
                .header("Hook-Name", event.kind.name())
                .json(event);

            for name in &self.forward_headers {
                if let Some(value) = event.http_request.headers.get(name) {
                    request = request.header(name.as_str(), value.as_str());
                }
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(HookResponse::allow());
                    }
                    let body = response.text().await.unwrap_or_default();
                    let mut hook_response = HookResponse::default();
                    hook_response.reject_upload = true;
                    hook_response.http_response.status_code = Some(status.as_u16());
                    hook_response.http_response.body = body;
                    return Ok(hook_response);
                }
                Err(e) if attempt < self.max_attempts => {
                    warn!(attempt, error = %e, "hook HTTP request failed, retrying");
                    tokio::time::sleep(self.backoff_step * attempt).await;
                    continue;
                }
                Err(e) => return Err(HookError::Transport(e.to_string())),
            }
        }
    }
}
