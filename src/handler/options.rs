//! `OPTIONS *` — capability advertisement (§4.4 "Request routing").

use http::StatusCode;

use crate::error::TusResult;
use crate::http_types::{IncomingRequest, OutgoingResponse};

use super::Handler;

pub async fn handle(handler: &Handler, _req: IncomingRequest) -> TusResult<OutgoingResponse> {
    let mut resp = OutgoingResponse::new(StatusCode::NO_CONTENT)
        .with_header("Tus-Version", super::TUS_VERSION_LIST)
        .with_header("Tus-Extension", handler.composer.tus_extension_header());

    if let Some(max) = handler.config.max_size {
        resp = resp.with_header("Tus-Max-Size", max.to_string());
    }

    Ok(resp)
}
