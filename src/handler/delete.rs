//! `DELETE <base>/<id>` — termination (§4.4 "DELETE").

use http::StatusCode;

use crate::error::{TusError, TusResult};
use crate::hooks::HookType;
use crate::http_types::{IncomingRequest, OutgoingResponse};

use super::Handler;

pub async fn handle(handler: &Handler, req: IncomingRequest) -> TusResult<OutgoingResponse> {
    let id = req
        .upload_id()
        .ok_or_else(|| TusError::NotFound { id: String::new() })?
        .to_string();

    let lock = handler
        .locker
        .lock(&id, handler.config.lease_ttl, handler.config.lock_acquire_timeout)
        .await
        .map_err(|e| super::lock_error_to_tus(e, &id))?;

    let result = delete_locked(handler, &req, &id).await;
    lock.unlock().await;
    result
}

async fn delete_locked(handler: &Handler, req: &IncomingRequest, id: &str) -> TusResult<OutgoingResponse> {
    let info = handler.composer.store.get_info(id).await?;

    let terminater = handler
        .composer
        .terminater()
        .ok_or(TusError::UnsupportedExtension("termination"))?;
    terminater.terminate(id).await?;

    super::fire_and_forget(
        handler.hooks.clone(),
        super::build_hook_event(HookType::PostTerminate, &info, req),
    );

    Ok(OutgoingResponse::new(StatusCode::NO_CONTENT))
}
