//! `HEAD <base>/<id>` — progress/metadata lookup (§4.4 "HEAD").
//!
//! Does not take the lock: per §4.4 "Concurrency tie-breakers", OPTIONS and
//! HEAD read unlocked, accepting that `Offset` may trail a concurrent
//! in-flight write by one chunk.

use http::StatusCode;

use crate::error::{TusError, TusResult};
use crate::metadata::encode_upload_metadata;
use crate::http_types::{IncomingRequest, OutgoingResponse};

use super::Handler;

pub async fn handle(handler: &Handler, req: IncomingRequest) -> TusResult<OutgoingResponse> {
    let id = req
        .upload_id()
        .ok_or_else(|| TusError::NotFound { id: String::new() })?;
    let info = handler.composer.store.get_info(id).await?;

    let mut resp = OutgoingResponse::new(StatusCode::NO_CONTENT)
        .with_header("Upload-Offset", info.offset.to_string())
        .with_header("Cache-Control", "no-store");

    if info.size_is_deferred {
        resp = resp.with_header("Upload-Defer-Length", "1");
    } else {
        resp = resp.with_header("Upload-Length", info.size.to_string());
    }

    if !info.metadata.is_empty() {
        resp = resp.with_header("Upload-Metadata", encode_upload_metadata(&info.metadata));
    }

    if info.is_partial {
        resp = resp.with_header("Upload-Concat", "partial");
    } else if info.is_final {
        let urls: Vec<String> = info
            .partial_uploads
            .iter()
            .map(|part_id| handler.location_for(part_id))
            .collect();
        resp = resp.with_header("Upload-Concat", format!("final; {}", urls.join(" ")));
    }

    Ok(resp)
}
