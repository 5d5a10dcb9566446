//! WebSocket connection and event loop.
//!
//! Each preview page gets one connection task. The task:
//!
//! - Forwards incoming text frames to the relay task, in arrival order
//! - Writes outgoing frames queued by the relay
//! - Reports the disconnect when either side goes away
//!
//! The connection holds no relay state of its own.

// ============================================================================
// Imports
// ============================================================================

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::ClientId;
use crate::relay::{ClientHandle, Outbound, RelayHandle};

// ============================================================================
// Connection
// ============================================================================

/// A registered WebSocket client and its I/O task.
#[derive(Debug)]
pub struct Connection {
    client_id: ClientId,
    task: JoinHandle<()>,
}

impl Connection {
    /// Registers the socket with the relay and spawns its event loop.
    ///
    /// Registration is sent before the loop starts, so the relay always
    /// sees `Connected` ahead of the client's first frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the relay task has stopped.
    pub fn spawn(socket: WebSocket, relay: RelayHandle) -> Result<Self> {
        let client_id = ClientId::next();
        let (handle, outbound_rx) = ClientHandle::channel();

        relay.connected(client_id, handle)?;

        let task = tokio::spawn(Self::run_event_loop(
            client_id,
            socket,
            outbound_rx,
            relay,
        ));

        Ok(Self { client_id, task })
    }

    /// Returns the relay identity of this client.
    #[inline]
    #[must_use]
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Waits for the event loop to finish.
    pub async fn closed(self) {
        let _ = self.task.await;
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        client_id: ClientId,
        socket: WebSocket,
        mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
        relay: RelayHandle,
    ) {
        let (mut ws_write, mut ws_read) = socket.split();

        loop {
            tokio::select! {
                // Incoming frames from the page
                message = ws_read.next() => {
                    match message {
                        Some(Ok(WsMessage::Text(text))) => {
                            trace!(%client_id, bytes = text.len(), "Frame received");
                            if relay.frame(client_id, text).is_err() {
                                debug!(%client_id, "Relay gone, closing connection");
                                let _ = ws_write.close().await;
                                break;
                            }
                        }

                        Some(Ok(WsMessage::Close(_))) => {
                            debug!(%client_id, "WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            let e = Error::from(e);
                            warn!(%client_id, error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!(%client_id, "WebSocket stream ended");
                            break;
                        }

                        // Binary frames carry nothing; pings are answered by the socket
                        Some(Ok(_)) => {}
                    }
                }

                // Frames queued by the relay
                outbound = outbound_rx.recv() => {
                    match outbound {
                        Some(Outbound::Text(text)) => {
                            if let Err(e) = ws_write.send(WsMessage::Text(text)).await {
                                debug!(%client_id, error = %e, "Send failed, dropping client");
                                break;
                            }
                        }

                        Some(Outbound::Close) | None => {
                            debug!(%client_id, "Close requested");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        // Closes the handle held by the registry before the relay hears about it.
        drop(outbound_rx);
        let _ = relay.disconnected(client_id);

        debug!(%client_id, "Event loop terminated");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use axum::Router;
    use axum::extract::WebSocketUpgrade;
    use axum::extract::ws::Utf8Bytes;
    use axum::routing::any;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message as ClientMessage;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

    use crate::relay::RelayEvent;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    /// Serves one upgrade route that hands sockets to `Connection::spawn`.
    async fn connect(relay: RelayHandle) -> Client {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let router = Router::new().route(
            "/",
            any(move |ws: WebSocketUpgrade| async move {
                ws.on_upgrade(move |socket| async move {
                    let _ = Connection::spawn(socket, relay);
                })
            }),
        );
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        let (client, _) = connect_async(format!("ws://{addr}/")).await.expect("connect");
        client
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<RelayEvent>) -> RelayEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event in time")
            .expect("relay channel open")
    }

    async fn connected(rx: &mut mpsc::UnboundedReceiver<RelayEvent>) -> (ClientId, ClientHandle) {
        match next_event(rx).await {
            RelayEvent::Connected { client_id, handle } => (client_id, handle),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_frames_reach_relay_in_order() {
        let (relay, mut rx) = RelayHandle::channel();
        let mut client = connect(relay).await;

        // The handle stays alive for the whole test; dropping it would end the loop.
        let (id, _handle) = connected(&mut rx).await;

        client.send(ClientMessage::text("first")).await.expect("send");
        client.send(ClientMessage::text("second")).await.expect("send");

        for expected in ["first", "second"] {
            match next_event(&mut rx).await {
                RelayEvent::Frame { client_id, text } => {
                    assert_eq!(client_id, id);
                    assert_eq!(text.as_str(), expected);
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_outbound_frames_are_written() {
        let (relay, mut rx) = RelayHandle::channel();
        let mut client = connect(relay).await;
        let (_, handle) = connected(&mut rx).await;

        assert!(handle.send_text(Utf8Bytes::from_static(r#"{"type":"requestSvg"}"#)));

        let received = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("frame in time")
            .expect("stream open")
            .expect("frame ok");
        assert_eq!(received, ClientMessage::text(r#"{"type":"requestSvg"}"#));
    }

    #[tokio::test]
    async fn test_remote_close_reports_disconnect() {
        let (relay, mut rx) = RelayHandle::channel();
        let mut client = connect(relay).await;
        let (id, handle) = connected(&mut rx).await;

        client.close(None).await.expect("close");

        assert!(matches!(
            next_event(&mut rx).await,
            RelayEvent::Disconnected { client_id } if client_id == id
        ));
        assert!(!handle.is_open());
    }

    #[tokio::test]
    async fn test_dropped_handle_closes_socket() {
        let (relay, mut rx) = RelayHandle::channel();
        let mut client = connect(relay).await;
        let (id, handle) = connected(&mut rx).await;

        drop(handle);

        assert!(matches!(
            next_event(&mut rx).await,
            RelayEvent::Disconnected { client_id } if client_id == id
        ));
        let closing = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("close in time");
        assert!(matches!(closing, Some(Ok(ClientMessage::Close(_))) | None | Some(Err(_))));
    }
}
