//! `PATCH <base>/<id>` — chunk append (§4.4 "PATCH").
//!
//! Writes arrive in bounded sub-chunks (not the whole body in one
//! [`crate::storage::DataStore::write_chunk`] call) purely so the
//! post-receive hook can fire at the byte/time cadence configured in
//! [`crate::config::TusdConfig`] without the storage layer knowing anything
//! about hooks (§4.4 step 8, §9 "post-receive cadence").

use http::StatusCode;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tracing::instrument;

use crate::error::{TusError, TusResult};
use crate::hooks::HookType;
use crate::http_types::{BodyReader, IncomingRequest, OutgoingResponse};
use crate::model::FileInfo;

use super::Handler;

const PATCH_SUBCHUNK_SIZE: u64 = 256 * 1024;

#[instrument(skip(handler, req))]
pub async fn handle(handler: &Handler, mut req: IncomingRequest) -> TusResult<OutgoingResponse> {
    let id = req
        .upload_id()
        .ok_or_else(|| TusError::NotFound { id: String::new() })?
        .to_string();

    if req.header_str("Content-Type") != Some("application/offset+octet-stream") {
        return Err(TusError::InvalidContentType);
    }

    let offset: u64 = req
        .header_str("Upload-Offset")
        .ok_or(TusError::InvalidOffset)?
        .parse()
        .map_err(|_| TusError::InvalidOffset)?;

    let lock = handler
        .locker
        .lock(&id, handler.config.lease_ttl, handler.config.lock_acquire_timeout)
        .await
        .map_err(|e| super::lock_error_to_tus(e, &id))?;

    let result = patch_locked(handler, &mut req, &id, offset).await;
    lock.unlock().await;
    result
}

async fn patch_locked(
    handler: &Handler,
    req: &mut IncomingRequest,
    id: &str,
    offset: u64,
) -> TusResult<OutgoingResponse> {
    let mut info = handler.composer.store.get_info(id).await?;

    if info.is_final {
        return Err(TusError::ModifyFinal { id: id.to_string() });
    }
    if offset != info.offset {
        return Err(TusError::MismatchOffset {
            given: offset,
            actual: info.offset,
        });
    }

    if let Some(raw) = req.header_str("Upload-Length") {
        if !info.size_is_deferred {
            // Allowed exactly once, while the upload is still deferred
            // (SPEC_FULL §9); a non-deferred upload already has a fixed
            // size, so a second declaration is a client error.
            return Err(TusError::LengthAlreadyDeclared);
        }
        let declared: u64 = raw.parse().map_err(|_| TusError::InvalidUploadLength)?;
        let declarer = handler
            .composer
            .length_declarer()
            .ok_or(TusError::UnsupportedExtension("creation-defer-length"))?;
        declarer.declare_length(id, declared).await?;
        info = handler.composer.store.get_info(id).await?;
    }

    let remaining = if info.size_is_deferred {
        None
    } else {
        Some(info.size - info.offset)
    };

    if let (Some(remaining), Some(content_length)) = (
        remaining,
        req.header_str("Content-Length").and_then(|v| v.parse::<u64>().ok()),
    ) {
        if content_length > remaining {
            return Err(TusError::SizeExceeded {
                size: content_length,
                max: remaining,
            });
        }
    }

    let mut body = req.body.take().ok_or(TusError::MissingBody)?;
    let stop_requested = stream_chunks(handler, req, id, &info, &mut body, remaining).await?;

    if stop_requested {
        if let Some(terminater) = handler.composer.terminater() {
            let _ = terminater.terminate(id).await;
        }
        return Err(TusError::StoppedByHook);
    }

    let final_info = handler.composer.store.get_info(id).await?;
    let mut resp = OutgoingResponse::new(StatusCode::NO_CONTENT)
        .with_header("Upload-Offset", final_info.offset.to_string());
    if final_info.size_is_deferred {
        resp = resp.with_header("Upload-Defer-Length", "1");
    }

    if final_info.is_complete() {
        let pre_finish = super::build_hook_event(HookType::PreFinish, &final_info, req);
        let verdict = handler.hooks.invoke(&pre_finish).await?;
        if verdict.reject_upload {
            return Err(super::policy_rejection(verdict));
        }
        handler.composer.store.finish_upload(id).await?;
        super::fire_and_forget(
            handler.hooks.clone(),
            super::build_hook_event(HookType::PostFinish, &final_info, req),
        );
    }

    Ok(resp)
}

/// Streams `body` into the store in bounded sub-chunks, firing the
/// post-receive hook at the configured cadence. Returns `true` if a
/// post-receive hook requested the upload be stopped.
async fn stream_chunks(
    handler: &Handler,
    req: &IncomingRequest,
    id: &str,
    info: &FileInfo,
    body: &mut BodyReader,
    remaining: Option<u64>,
) -> TusResult<bool> {
    let mut current_offset = info.offset;
    let mut total_written: u64 = 0;
    let mut bytes_since_hook: u64 = 0;
    let mut last_hook_fire = Instant::now();

    loop {
        if let Some(limit) = remaining {
            if total_written >= limit {
                break;
            }
        }

        let chunk_cap = match remaining {
            Some(limit) => PATCH_SUBCHUNK_SIZE.min(limit - total_written),
            None => PATCH_SUBCHUNK_SIZE,
        };

        let sub_reader: BodyReader = Box::pin(AsyncReadExt::take(&mut *body, chunk_cap));
        let written = handler.composer.store.write_chunk(id, current_offset, sub_reader).await?;
        current_offset += written;
        total_written += written;
        bytes_since_hook += written;

        if written == 0 {
            break;
        }

        let due_by_bytes = bytes_since_hook >= handler.config.post_receive_bytes;
        let due_by_time = last_hook_fire.elapsed() >= handler.config.post_receive_interval;
        let at_end = remaining.map(|limit| total_written >= limit).unwrap_or(false) || written < chunk_cap;

        if (due_by_bytes || due_by_time) && !at_end {
            let mut progress = info.clone();
            progress.offset = current_offset;
            let event = super::build_hook_event(HookType::PostReceive, &progress, req);
            if let Ok(verdict) = handler.hooks.invoke(&event).await {
                if verdict.stop_upload {
                    return Ok(true);
                }
            }
            bytes_since_hook = 0;
            last_hook_fire = Instant::now();
        }

        if written < chunk_cap {
            break;
        }
    }

    Ok(false)
}
