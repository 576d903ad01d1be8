//! `GET <base>/<id>` — content serving. Not part of the tus 1.0 core
//! protocol (§4.4 "extension, not part of spec"); advertised only when the
//! configured backend implements [`crate::storage::ContentServer`].

use http::StatusCode;
use tokio::io::AsyncReadExt;

use crate::error::{StorageError, TusError, TusResult};
use crate::http_types::{IncomingRequest, OutgoingResponse};

use super::Handler;

pub async fn handle(handler: &Handler, req: IncomingRequest) -> TusResult<OutgoingResponse> {
    let id = req
        .upload_id()
        .ok_or_else(|| TusError::NotFound { id: String::new() })?
        .to_string();

    if !handler.composer.supports_content_serving() {
        return Err(TusError::UnsupportedExtension("content-serving"));
    }

    // GET takes the lock to serialize against concurrent termination
    // (§4.4 "Concurrency tie-breakers").
    let lock = handler
        .locker
        .lock(&id, handler.config.lease_ttl, handler.config.lock_acquire_timeout)
        .await
        .map_err(|e| super::lock_error_to_tus(e, &id))?;

    let result = get_locked(handler, &id).await;
    lock.unlock().await;
    result
}

async fn get_locked(handler: &Handler, id: &str) -> TusResult<OutgoingResponse> {
    let info = handler.composer.store.get_info(id).await?;
    let mut reader = handler.composer.store.get_reader(id).await?;

    let mut buf = Vec::with_capacity(info.offset as usize);
    reader
        .read_to_end(&mut buf)
        .await
        .map_err(|source| StorageError::Io {
            source,
            path: std::path::PathBuf::new(),
        })?;

    Ok(OutgoingResponse::new(StatusCode::OK)
        .with_header("Content-Length", buf.len().to_string())
        .with_body(buf))
}
