//! `POST <base>` — upload creation (§4.4 "Creation").

use http::StatusCode;
use tracing::instrument;

use crate::concat::{parse_upload_concat, UploadConcat};
use crate::error::{TusError, TusResult};
use crate::hooks::HookType;
use crate::http_types::{IncomingRequest, OutgoingResponse};
use crate::metadata::{encode_upload_metadata, parse_upload_metadata};
use crate::model::{new_upload_id, FileInfo};

use super::Handler;

#[instrument(skip(handler, req))]
pub async fn handle(handler: &Handler, mut req: IncomingRequest) -> TusResult<OutgoingResponse> {
    let concat = match req.header_str("Upload-Concat") {
        Some(raw) => Some(parse_upload_concat(raw)?),
        None => None,
    };
    let is_final = matches!(concat, Some(UploadConcat::Final(_)));

    if is_final && req.header_str("Upload-Length").is_some() {
        return Err(TusError::FinalUploadHasLength);
    }

    let (size, deferred) = if is_final {
        (0, false)
    } else {
        super::parse_length_headers(&req)?
    };

    if let Some(max) = handler.config.max_size {
        if size > max {
            return Err(TusError::SizeExceeded { size, max });
        }
    }

    let metadata = req
        .header_str("Upload-Metadata")
        .map(parse_upload_metadata)
        .unwrap_or_default();

    let mut info = FileInfo::new(new_upload_id());
    info.size = size;
    info.size_is_deferred = deferred;
    info.metadata = metadata;

    let mut partial_infos = Vec::new();
    match &concat {
        Some(UploadConcat::Partial) => info.is_partial = true,
        Some(UploadConcat::Final(ids)) => {
            info.is_final = true;
            info.partial_uploads = ids.clone();
            for id in ids {
                let part = handler.composer.store.get_info(id).await?;
                if !part.is_partial || part.is_final {
                    return Err(TusError::InvalidConcat(format!(
                        "{id} is not a partial upload and cannot be concatenated"
                    )));
                }
                if !part.is_complete() {
                    return Err(TusError::UploadNotFinished { id: id.clone() });
                }
                partial_infos.push(part);
            }
            info.size = partial_infos.iter().map(|p| p.size).sum();
        }
        None => {}
    }

    let pre_create = super::build_hook_event(HookType::PreCreate, &info, &req);
    let verdict = handler.hooks.invoke(&pre_create).await?;
    if verdict.reject_upload {
        return Err(super::policy_rejection(verdict));
    }

    let mut info = handler.composer.store.new_upload(info).await?;

    if info.is_final {
        let concater = handler
            .composer
            .concater()
            .ok_or(TusError::UnsupportedExtension("concatenation"))?;
        concater.concat_uploads(&info.id, &partial_infos).await?;
        info = handler.composer.store.get_info(&info.id).await?;
    } else if let Some(body) = req.body.take() {
        // Initial creation carrying data in the same request (§4.4 step 8).
        let written = handler.composer.store.write_chunk(&info.id, 0, body).await?;
        info.offset = written;
    }

    let location = handler.location_for(&info.id);
    let mut resp = OutgoingResponse::new(StatusCode::CREATED)
        .with_header("Location", location)
        .with_header("Upload-Offset", info.offset.to_string());

    if !info.metadata.is_empty() {
        resp = resp.with_header("Upload-Metadata", encode_upload_metadata(&info.metadata));
    }

    super::fire_and_forget(
        handler.hooks.clone(),
        super::build_hook_event(HookType::PostCreate, &info, &req),
    );

    if info.is_complete() {
        let pre_finish = super::build_hook_event(HookType::PreFinish, &info, &req);
        let verdict = handler.hooks.invoke(&pre_finish).await?;
        if verdict.reject_upload {
            return Err(super::policy_rejection(verdict));
        }
        handler.composer.store.finish_upload(&info.id).await?;
        super::fire_and_forget(
            handler.hooks.clone(),
            super::build_hook_event(HookType::PostFinish, &info, &req),
        );
    }

    Ok(resp)
}
