//! HTTP surface: preview pages plus the WebSocket upgrade.
//!
//! Routes:
//!
//! | Path | Response |
//! |------|----------|
//! | `/` | `viewer.html` |
//! | `/export` | `export.html` |
//! | `/print` | `print.html` |
//! | anything else | same path under the templates directory |
//!
//! A request carrying a WebSocket upgrade is accepted on any path and
//! becomes a [`Connection`].

// ============================================================================
// Imports
// ============================================================================

use std::path::Path;

use axum::Router;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Request, State, WebSocketUpgrade};
use axum::middleware::{self, Next};
use axum::response::Response;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::relay::RelayHandle;

use super::Connection;

// ============================================================================
// Router
// ============================================================================

/// Builds the site router over `templates`, upgrading WebSocket requests
/// into relay connections.
pub fn site_router(templates: &Path, relay: RelayHandle) -> Router {
    Router::new()
        .route_service("/", ServeFile::new(templates.join("viewer.html")))
        .route_service("/export", ServeFile::new(templates.join("export.html")))
        .route_service("/print", ServeFile::new(templates.join("print.html")))
        .fallback_service(ServeDir::new(templates))
        .layer(middleware::from_fn_with_state(relay, accept_websocket))
        .layer(TraceLayer::new_for_http())
}

/// Takes over upgrade requests; everything else continues to the pages.
async fn accept_websocket(
    State(relay): State<RelayHandle>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    request: Request,
    next: Next,
) -> Response {
    let Ok(ws) = upgrade else {
        return next.run(request).await;
    };

    debug!(uri = %request.uri(), "WebSocket upgrade");

    ws.on_upgrade(move |socket| async move {
        match Connection::spawn(socket, relay) {
            Ok(connection) => {
                debug!(client_id = %connection.client_id(), "WebSocket connection established");
            }
            Err(e) => warn!(error = %e, "Relay stopped, dropping WebSocket"),
        }
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::SocketAddr;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as ClientMessage;

    use crate::relay::RelayEvent;

    async fn serve(templates: &Path) -> (SocketAddr, mpsc::UnboundedReceiver<RelayEvent>) {
        let (relay, rx) = RelayHandle::channel();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let router = site_router(templates, relay);

        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        (addr, rx)
    }

    /// Reads one response head and its `Content-Length` body.
    async fn read_response(stream: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut byte = [0u8; 1];

        while !raw.ends_with(b"\r\n\r\n") {
            let n = stream.read(&mut byte).await.expect("read head");
            assert!(n > 0, "connection closed mid-head");
            raw.push(byte[0]);
        }

        let head = String::from_utf8(raw).expect("utf-8 head");
        let length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .map_or(0, |(_, value)| value.trim().parse::<usize>().expect("length"));

        let mut body = vec![0u8; length];
        stream.read_exact(&mut body).await.expect("read body");

        head + &String::from_utf8(body).expect("utf-8 body")
    }

    async fn fetch(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.expect("connect");
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.expect("write");

        timeout(Duration::from_secs(5), read_response(&mut stream))
            .await
            .expect("response in time")
    }

    fn templates() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("viewer.html"), "<p>viewer</p>").expect("write");
        std::fs::write(dir.path().join("export.html"), "<p>export</p>").expect("write");
        std::fs::write(dir.path().join("print.html"), "<p>print</p>").expect("write");
        std::fs::write(dir.path().join("style.css"), "body{}").expect("write");
        dir
    }

    #[tokio::test]
    async fn test_page_routes() {
        let dir = templates();
        let (addr, _rx) = serve(dir.path()).await;

        for (path, body) in [
            ("/", "<p>viewer</p>"),
            ("/export", "<p>export</p>"),
            ("/print", "<p>print</p>"),
        ] {
            let response = fetch(addr, path).await;
            assert!(response.starts_with("HTTP/1.1 200"), "{path}: {response}");
            assert!(response.ends_with(body), "{path}: {response}");
        }
    }

    #[tokio::test]
    async fn test_fallback_serves_templates_dir() {
        let dir = templates();
        let (addr, _rx) = serve(dir.path()).await;

        let response = fetch(addr, "/style.css").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("body{}"));

        let missing = fetch(addr, "/missing.js").await;
        assert!(missing.starts_with("HTTP/1.1 404"));
    }

    #[tokio::test]
    async fn test_upgrade_accepted_on_any_path() {
        let dir = templates();
        let (addr, mut rx) = serve(dir.path()).await;

        for path in ["/", "/print", "/anything/else"] {
            let (mut client, response) = connect_async(format!("ws://{addr}{path}"))
                .await
                .expect("upgrade");
            assert_eq!(response.status(), 101);

            // Holding the handle keeps the connection's outbound queue open.
            let (client_id, _handle) = match timeout(Duration::from_secs(5), rx.recv()).await {
                Ok(Some(RelayEvent::Connected { client_id, handle })) => (client_id, handle),
                other => panic!("{path}: expected Connected, got {other:?}"),
            };

            client.send(ClientMessage::text("ping")).await.expect("send");
            client.close(None).await.expect("close");
            let _ = client.next().await;

            // Drain until this client's disconnect.
            loop {
                match timeout(Duration::from_secs(5), rx.recv()).await {
                    Ok(Some(RelayEvent::Disconnected { client_id: gone })) if gone == client_id => {
                        break;
                    }
                    Ok(Some(_)) => {}
                    other => panic!("{path}: expected Disconnected, got {other:?}"),
                }
            }
        }
    }

    #[tokio::test]
    async fn test_upgrade_after_page_on_same_connection() {
        let dir = templates();
        let (addr, mut rx) = serve(dir.path()).await;
        let mut stream = TcpStream::connect(addr).await.expect("connect");

        stream
            .write_all(b"GET /print HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .expect("write page request");
        let page = timeout(Duration::from_secs(5), read_response(&mut stream))
            .await
            .expect("page in time");
        assert!(page.starts_with("HTTP/1.1 200"), "{page}");

        stream
            .write_all(
                b"GET / HTTP/1.1\r\n\
                  Host: localhost\r\n\
                  Connection: Upgrade\r\n\
                  Upgrade: websocket\r\n\
                  Sec-WebSocket-Version: 13\r\n\
                  Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
            )
            .await
            .expect("write upgrade request");
        let upgrade = timeout(Duration::from_secs(5), read_response(&mut stream))
            .await
            .expect("upgrade in time");
        assert!(upgrade.starts_with("HTTP/1.1 101"), "{upgrade}");

        assert!(matches!(
            timeout(Duration::from_secs(5), rx.recv()).await,
            Ok(Some(RelayEvent::Connected { .. }))
        ));
    }
}
