//! Black-box end-to-end scenarios driving [`tusd::Handler`] directly through
//! its transport-agnostic request/response contract. No TCP socket is
//! opened; the filesystem backend is rooted in a fresh `tempfile::tempdir()`
//! per test.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderMap, HeaderValue, Method, StatusCode};

use tusd::composer::compose_uniform_backend;
use tusd::error::HookError;
use tusd::hooks::{HookEvent, HookHandler, HookHttpResponse, HookResponse, NullHookHandler};
use tusd::lock::local::new_local_locker;
use tusd::storage::filesystem::FilesystemStore;
use tusd::{Handler, IncomingRequest, TusdConfig};

fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        headers.insert(
            http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    headers
}

fn request(method: Method, path_tail: &[&str], headers: HeaderMap, body: Option<&[u8]>) -> IncomingRequest {
    IncomingRequest {
        method,
        path_tail: path_tail.iter().map(|s| s.to_string()).collect(),
        headers,
        remote_addr: None,
        body: body.map(|b| Box::pin(Cursor::new(b.to_vec())) as tusd::BodyReader),
    }
}

async fn new_handler() -> (Arc<Handler>, tempfile::TempDir) {
    new_handler_with_hooks(Arc::new(NullHookHandler)).await
}

async fn new_handler_with_hooks(hooks: Arc<dyn HookHandler>) -> (Arc<Handler>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FilesystemStore::new(dir.path()).await.unwrap());
    let composer = compose_uniform_backend(store);
    let handler = Arc::new(Handler::new(
        TusdConfig::default(),
        composer,
        Arc::new(new_local_locker()),
        hooks,
    ));
    (handler, dir)
}

fn extract_id(location: &str) -> String {
    location.rsplit('/').next().unwrap().to_string()
}

#[tokio::test]
async fn simple_resumable_upload_round_trip() {
    let (handler, _dir) = new_handler().await;

    let create = request(
        Method::POST,
        &[],
        header_map(&[("Tus-Resumable", "1.0.0"), ("Upload-Length", "11")]),
        None,
    );
    let resp = handler.handle(create).await;
    assert_eq!(resp.status, StatusCode::CREATED);
    let location = resp.headers.get("Location").unwrap().to_str().unwrap().to_string();
    let id = extract_id(&location);

    let patch1 = request(
        Method::PATCH,
        &[&id],
        header_map(&[
            ("Tus-Resumable", "1.0.0"),
            ("Upload-Offset", "0"),
            ("Content-Type", "application/offset+octet-stream"),
        ]),
        Some(b"hello"),
    );
    let resp = handler.handle(patch1).await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);
    assert_eq!(resp.headers.get("Upload-Offset").unwrap(), "5");

    let head = request(
        Method::HEAD,
        &[&id],
        header_map(&[("Tus-Resumable", "1.0.0")]),
        None,
    );
    let resp = handler.handle(head).await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);
    assert_eq!(resp.headers.get("Upload-Offset").unwrap(), "5");
    assert_eq!(resp.headers.get("Upload-Length").unwrap(), "11");

    let patch2 = request(
        Method::PATCH,
        &[&id],
        header_map(&[
            ("Tus-Resumable", "1.0.0"),
            ("Upload-Offset", "5"),
            ("Content-Type", "application/offset+octet-stream"),
        ]),
        Some(b" world"),
    );
    let resp = handler.handle(patch2).await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);
    assert_eq!(resp.headers.get("Upload-Offset").unwrap(), "11");

    let get = request(Method::GET, &[&id], header_map(&[("Tus-Resumable", "1.0.0")]), None);
    let resp = handler.handle(get).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(&resp.body[..], b"hello world");
}

#[tokio::test]
async fn offset_mismatch_is_rejected_without_state_change() {
    let (handler, _dir) = new_handler().await;

    let create = request(
        Method::POST,
        &[],
        header_map(&[("Tus-Resumable", "1.0.0"), ("Upload-Length", "11")]),
        None,
    );
    let resp = handler.handle(create).await;
    let location = resp.headers.get("Location").unwrap().to_str().unwrap().to_string();
    let id = extract_id(&location);

    let patch = request(
        Method::PATCH,
        &[&id],
        header_map(&[
            ("Tus-Resumable", "1.0.0"),
            ("Upload-Offset", "0"),
            ("Content-Type", "application/offset+octet-stream"),
        ]),
        Some(b"hello"),
    );
    handler.handle(patch).await;

    let bad_patch = request(
        Method::PATCH,
        &[&id],
        header_map(&[
            ("Tus-Resumable", "1.0.0"),
            ("Upload-Offset", "3"),
            ("Content-Type", "application/offset+octet-stream"),
        ]),
        Some(b"xyz"),
    );
    let resp = handler.handle(bad_patch).await;
    assert_eq!(resp.status, StatusCode::CONFLICT);

    let head = request(Method::HEAD, &[&id], header_map(&[("Tus-Resumable", "1.0.0")]), None);
    let resp = handler.handle(head).await;
    assert_eq!(resp.headers.get("Upload-Offset").unwrap(), "5");
}

async fn create_and_complete_partial(handler: &Handler, body: &[u8]) -> String {
    let create = request(
        Method::POST,
        &[],
        header_map(&[
            ("Tus-Resumable", "1.0.0"),
            ("Upload-Length", &body.len().to_string()),
            ("Upload-Concat", "partial"),
        ]),
        None,
    );
    let resp = handler.handle(create).await;
    let location = resp.headers.get("Location").unwrap().to_str().unwrap().to_string();
    let id = extract_id(&location);

    let patch = request(
        Method::PATCH,
        &[&id],
        header_map(&[
            ("Tus-Resumable", "1.0.0"),
            ("Upload-Offset", "0"),
            ("Content-Type", "application/offset+octet-stream"),
        ]),
        Some(body),
    );
    let resp = handler.handle(patch).await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);
    id
}

#[tokio::test]
async fn concatenation_assembles_completed_partials() {
    let (handler, _dir) = new_handler().await;

    let a = create_and_complete_partial(&handler, b"abc").await;
    let b = create_and_complete_partial(&handler, b"def").await;

    let concat_header = format!("final; /files/{a} /files/{b}");
    let create_final = request(
        Method::POST,
        &[],
        header_map(&[("Tus-Resumable", "1.0.0"), ("Upload-Concat", &concat_header)]),
        None,
    );
    let resp = handler.handle(create_final).await;
    assert_eq!(resp.status, StatusCode::CREATED);
    let location = resp.headers.get("Location").unwrap().to_str().unwrap().to_string();
    let final_id = extract_id(&location);

    let head = request(
        Method::HEAD,
        &[&final_id],
        header_map(&[("Tus-Resumable", "1.0.0")]),
        None,
    );
    let resp = handler.handle(head).await;
    assert_eq!(resp.headers.get("Upload-Length").unwrap(), "6");
    assert_eq!(resp.headers.get("Upload-Offset").unwrap(), "6");
    assert!(resp.headers.get("Upload-Concat").unwrap().to_str().unwrap().starts_with("final;"));

    let get = request(Method::GET, &[&final_id], header_map(&[("Tus-Resumable", "1.0.0")]), None);
    let resp = handler.handle(get).await;
    assert_eq!(&resp.body[..], b"abcdef");
}

#[derive(Debug, Default)]
struct RejectingHook;

#[async_trait]
impl HookHandler for RejectingHook {
    async fn invoke(&self, event: &HookEvent) -> Result<HookResponse, HookError> {
        if matches!(event.kind, tusd::hooks::HookType::PreCreate) {
            return Ok(HookResponse {
                reject_upload: true,
                stop_upload: false,
                http_response: HookHttpResponse {
                    status_code: Some(400),
                    headers: Default::default(),
                    body: "no filename".to_string(),
                },
            });
        }
        Ok(HookResponse::allow())
    }
}

#[tokio::test]
async fn pre_create_rejection_prevents_upload_creation() {
    let (handler, _dir) = new_handler_with_hooks(Arc::new(RejectingHook)).await;

    let create = request(
        Method::POST,
        &[],
        header_map(&[("Tus-Resumable", "1.0.0"), ("Upload-Length", "10")]),
        None,
    );
    let resp = handler.handle(create).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(&resp.body[..], b"no filename");
    assert!(resp.headers.get("Location").is_none());
}

#[tokio::test]
async fn deferred_length_is_resolved_on_patch() {
    let (handler, _dir) = new_handler().await;

    let create = request(
        Method::POST,
        &[],
        header_map(&[("Tus-Resumable", "1.0.0"), ("Upload-Defer-Length", "1")]),
        None,
    );
    let resp = handler.handle(create).await;
    assert_eq!(resp.status, StatusCode::CREATED);
    let location = resp.headers.get("Location").unwrap().to_str().unwrap().to_string();
    let id = extract_id(&location);

    let patch = request(
        Method::PATCH,
        &[&id],
        header_map(&[
            ("Tus-Resumable", "1.0.0"),
            ("Upload-Offset", "0"),
            ("Upload-Length", "5"),
            ("Content-Type", "application/offset+octet-stream"),
        ]),
        Some(b"hello"),
    );
    let resp = handler.handle(patch).await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);
    assert!(resp.headers.get("Upload-Defer-Length").is_none());

    let head = request(Method::HEAD, &[&id], header_map(&[("Tus-Resumable", "1.0.0")]), None);
    let resp = handler.handle(head).await;
    assert_eq!(resp.headers.get("Upload-Length").unwrap(), "5");
    assert_eq!(resp.headers.get("Upload-Offset").unwrap(), "5");
}

#[tokio::test]
async fn missing_tus_resumable_header_is_rejected() {
    let (handler, _dir) = new_handler().await;
    let create = request(Method::POST, &[], header_map(&[("Upload-Length", "5")]), None);
    let resp = handler.handle(create).await;
    assert_eq!(resp.status, StatusCode::PRECONDITION_FAILED);
}
