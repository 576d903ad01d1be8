//! Minimal binding of the protocol engine to a raw TCP listener, speaking
//! just enough HTTP/1.1 to demonstrate the tus 1.0 request surface end to
//! end. Not a production HTTP stack — request parsing here is line-based
//! and single-shot; a real deployment would bind [`tusd::Handler`] to a
//! framework like hyper or axum instead.

use std::sync::Arc;

use http::{HeaderMap, HeaderValue, Method};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::EnvFilter;

use tusd::composer::compose_uniform_backend;
use tusd::hooks::NullHookHandler;
use tusd::lock::local::new_local_locker;
use tusd::storage::filesystem::FilesystemStore;
use tusd::{Composer, Handler, IncomingRequest, TusdConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let store = Arc::new(FilesystemStore::new("./data").await?);
    let composer: Composer = compose_uniform_backend(store);
    let config = TusdConfig::default();
    let handler = Arc::new(Handler::new(
        config,
        composer,
        Arc::new(new_local_locker()),
        Arc::new(NullHookHandler),
    ));

    let listener = TcpListener::bind("127.0.0.1:1080").await?;
    tracing::info!("listening on http://127.0.0.1:1080/files/");

    loop {
        let (stream, _) = listener.accept().await?;
        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(e) = serve(stream, handler).await {
                tracing::warn!(error = %e, "connection error");
            }
        });
    }
}

async fn serve(stream: TcpStream, handler: Arc<Handler>) -> anyhow::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let mut parts = request_line.split_whitespace();
    let method: Method = parts.next().unwrap_or("GET").parse()?;
    let target = parts.next().unwrap_or("/").to_string();

    let mut headers = HeaderMap::new();
    let mut content_length: u64 = 0;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            }
            if let Ok(header_value) = HeaderValue::from_str(value) {
                headers.insert(
                    http::HeaderName::from_bytes(name.trim().as_bytes())?,
                    header_value,
                );
            }
        }
    }

    let path_tail: Vec<String> = target
        .trim_start_matches("/files/")
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let body = if content_length > 0 {
        let mut buf = vec![0u8; content_length as usize];
        reader.read_exact(&mut buf).await?;
        Some(Box::pin(std::io::Cursor::new(buf)) as tusd::BodyReader)
    } else {
        None
    };

    let req = IncomingRequest {
        method,
        path_tail,
        headers,
        remote_addr: None,
        body,
    };

    let resp = handler.handle(req).await;

    let mut out = format!(
        "HTTP/1.1 {} {}\r\n",
        resp.status.as_u16(),
        resp.status.canonical_reason().unwrap_or("")
    );
    for (name, value) in resp.headers.iter() {
        out.push_str(name.as_str());
        out.push_str(": ");
        out.push_str(value.to_str().unwrap_or(""));
        out.push_str("\r\n");
    }
    out.push_str(&format!("Content-Length: {}\r\n\r\n", resp.body.len()));

    write_half.write_all(out.as_bytes()).await?;
    write_half.write_all(&resp.body).await?;
    write_half.flush().await?;
    Ok(())
}
