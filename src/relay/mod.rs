//! Message relay and export coordination.
//!
//! A single relay task owns all mutable relay state and handles events one
//! at a time, so none of it needs a lock.
//!
//! # Architecture
//!
//! ```text
//!  connection tasks ──┐                      ┌──► ClientRegistry ──► pages
//!  (one per page)     │                      │
//!                     ├──► RelayEvent ──► Relay ──► ExportCoordinator ──► files
//!  host bridge ───────┘   (mpsc, FIFO)       │
//!  (stdin lines)                             └──► HostOutput ──► stdout
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `registry` | Connected client set and broadcast |
//! | `router` | Tag-based routing of client messages |
//! | `export` | Export correlation and artifact writing |
//! | `host` | stdin bridge and stdout event writer |

// ============================================================================
// Submodules
// ============================================================================

/// Export correlation and artifact writing.
pub mod export;

/// stdin bridge and stdout event writer.
pub mod host;

/// Connected client set and broadcast.
pub mod registry;

/// Tag-based routing of client messages.
pub mod router;

// ============================================================================
// Re-exports
// ============================================================================

pub use export::{ExportCoordinator, ExportRequest, FailedExport, render_artifact};
pub use host::{HostOutput, run_host_bridge};
pub use registry::{ClientHandle, ClientRegistry, Outbound};
pub use router::{Route, route};

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use axum::extract::ws::Utf8Bytes;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ClientId, ExportId};
use crate::protocol::Message;

// ============================================================================
// Constants
// ============================================================================

/// Characters of document content shown in logs.
const CONTENT_PREVIEW_CHARS: usize = 50;

// ============================================================================
// RelayEvent
// ============================================================================

/// Input to the relay task.
#[derive(Debug)]
pub enum RelayEvent {
    /// A page finished the WebSocket handshake.
    Connected {
        /// New client identity.
        client_id: ClientId,
        /// Queue toward the page.
        handle: ClientHandle,
    },
    /// A page sent a text frame.
    Frame {
        /// Sender.
        client_id: ClientId,
        /// Raw frame text.
        text: Utf8Bytes,
    },
    /// A page's connection ended.
    Disconnected {
        /// Departed client.
        client_id: ClientId,
    },
    /// The host sent a valid JSON line.
    Host {
        /// Trimmed line to broadcast.
        text: Utf8Bytes,
    },
    /// Close every page and stop the relay task.
    Shutdown,
}

// ============================================================================
// RelayHandle
// ============================================================================

/// Cloneable sender into the relay task.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::UnboundedSender<RelayEvent>,
}

impl RelayHandle {
    /// Creates a handle and the receiver a [`Relay`] runs on.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RelayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Sends an event to the relay.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the relay task has stopped.
    #[inline]
    pub fn send(&self, event: RelayEvent) -> Result<()> {
        self.tx.send(event).map_err(|_| Error::ConnectionClosed)
    }

    /// Announces a new client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the relay task has stopped.
    pub fn connected(&self, client_id: ClientId, handle: ClientHandle) -> Result<()> {
        self.send(RelayEvent::Connected { client_id, handle })
    }

    /// Forwards a client frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the relay task has stopped.
    pub fn frame(&self, client_id: ClientId, text: Utf8Bytes) -> Result<()> {
        self.send(RelayEvent::Frame { client_id, text })
    }

    /// Announces a departed client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the relay task has stopped.
    pub fn disconnected(&self, client_id: ClientId) -> Result<()> {
        self.send(RelayEvent::Disconnected { client_id })
    }

    /// Forwards a host line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the relay task has stopped.
    pub fn host(&self, text: Utf8Bytes) -> Result<()> {
        self.send(RelayEvent::Host { text })
    }

    /// Asks the relay task to stop.
    pub fn shutdown(&self) {
        let _ = self.send(RelayEvent::Shutdown);
    }
}

// ============================================================================
// Relay
// ============================================================================

/// Relay state: connected clients, pending exports and the host channel.
#[derive(Debug)]
pub struct Relay {
    registry: ClientRegistry,
    exports: ExportCoordinator,
    host: HostOutput,
}

impl Relay {
    /// Creates a relay. `export_timeout` of `None` disables export expiry.
    #[must_use]
    pub fn new(host: HostOutput, export_timeout: Option<Duration>) -> Self {
        Self {
            registry: ClientRegistry::new(),
            exports: ExportCoordinator::new(export_timeout),
            host,
        }
    }

    /// Spawns the relay task.
    #[must_use]
    pub fn spawn(self) -> (RelayHandle, JoinHandle<()>) {
        let (handle, rx) = RelayHandle::channel();
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    /// Returns the client registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Returns the export coordinator.
    #[inline]
    #[must_use]
    pub fn exports(&self) -> &ExportCoordinator {
        &self.exports
    }

    /// Processes events until shutdown or until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RelayEvent>) {
        debug!("Relay task started");

        loop {
            let deadline = self.exports.next_deadline();

            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(RelayEvent::Shutdown) | None => break,
                        Some(event) => self.handle(event).await,
                    }
                }

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.expire_exports(Instant::now());
                }
            }
        }

        self.registry.close_all();
        debug!("Relay task terminated");
    }

    /// Applies one event.
    pub async fn handle(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Connected { client_id, handle } => {
                self.registry.register(client_id, handle);
                info!(%client_id, "Client connected");
            }
            RelayEvent::Frame { client_id, text } => {
                self.on_client_frame(client_id, &text).await;
            }
            RelayEvent::Disconnected { client_id } => {
                self.registry.unregister(client_id);
                for failed in self.exports.client_gone(client_id) {
                    self.report_failure(failed);
                }
                info!(%client_id, "Client disconnected");
            }
            RelayEvent::Host { text } => {
                let delivered = self.registry.broadcast(&text);
                debug!(delivered, "Host message broadcast");
            }
            RelayEvent::Shutdown => {
                self.registry.close_all();
            }
        }
    }

    /// Fails every export whose deadline has passed.
    pub fn expire_exports(&mut self, now: Instant) {
        for failed in self.exports.expire(now) {
            self.report_failure(failed);
        }
    }
}

// ============================================================================
// Relay - Client Messages
// ============================================================================

impl Relay {
    /// Handles one frame from a page.
    async fn on_client_frame(&mut self, client_id: ClientId, text: &str) {
        let parsed = Message::parse(text);

        if matches!(parsed, Ok(None)) {
            debug!(%client_id, "Received empty message, ignoring");
            return;
        }

        // The oldest pending export on this channel claims the frame.
        let parsed = match self.exports.take_pending(client_id) {
            Some(export_id) => match self.resolve_export(export_id, parsed).await {
                Some(unclaimed) => unclaimed,
                None => return,
            },
            None => parsed,
        };

        let message = match parsed {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(e) => {
                warn!(%client_id, error = %e, message = %text, "Error processing message");
                return;
            }
        };

        debug!(%client_id, kind = message.kind(), "Received message");
        Self::log_details(&message);

        match route(message) {
            Route::ToHost(event) => self.host.emit(event),
            Route::Broadcast => {
                let frame = Utf8Bytes::from(text.trim().to_string());
                let delivered = self.registry.broadcast(&frame);
                debug!(%client_id, delivered, "Content broadcast");
            }
            Route::Export { format, path } => {
                self.start_export(ExportRequest { format, path });
            }
            Route::Ignore => {
                debug!(%client_id, "Message not handled from clients, ignoring");
            }
        }
    }

    /// Debug output for message payloads worth seeing in logs.
    fn log_details(message: &Message) {
        match message {
            Message::Content { content } => {
                let preview: String = content.chars().take(CONTENT_PREVIEW_CHARS).collect();
                debug!(preview = %preview, len = content.len(), "Received content");
            }
            Message::Click {
                tune_number: Some(tune_number),
                classes,
                ..
            } => {
                debug!(tune_number, ?classes, "Click details");
            }
            _ => {}
        }
    }
}

// ============================================================================
// Relay - Export
// ============================================================================

impl Relay {
    /// Asks every open page for a snapshot.
    fn start_export(&mut self, request: ExportRequest) {
        let recipients = self.registry.open_clients();
        let path = request.path.clone();

        if let Err(e) = self.exports.begin(request, &recipients, Instant::now()) {
            warn!(path = %path.display(), error = %e, "Export could not start");
            self.host.emit(Message::export_error(&e));
            return;
        }

        let frame = match Message::RequestSvg.to_json() {
            Ok(json) => Utf8Bytes::from(json),
            Err(e) => {
                error!(error = %e, "Failed to serialize requestSvg");
                return;
            }
        };

        for client_id in recipients {
            if !self.registry.send_to(client_id, frame.clone()) {
                debug!(%client_id, "requestSvg not delivered");
            }
        }
    }

    /// Resolves a pending export with the frame that arrived for it.
    ///
    /// Returns the parse result back if the frame should still be routed.
    async fn resolve_export(
        &mut self,
        export_id: ExportId,
        parsed: Result<Option<Message>>,
    ) -> Option<Result<Option<Message>>> {
        let Some(path) = self.exports.request(export_id).map(|r| r.path.clone()) else {
            return Some(parsed);
        };

        let content = match parsed {
            Ok(Some(Message::SvgExport { content })) if !content.trim().is_empty() => content,
            Ok(Some(Message::SvgExport { .. })) => {
                self.fail_export(export_id, Error::export(path, "svgExport had no content"));
                return None;
            }
            Ok(Some(other)) => {
                let reason = format!("expected svgExport response, got {}", other.kind());
                self.fail_export(export_id, Error::export(path, reason));
                return Some(Ok(Some(other)));
            }
            Ok(None) => return Some(Ok(None)),
            Err(e) => {
                let reason = format!("unreadable SVG response: {e}");
                self.fail_export(export_id, Error::export(path, reason));
                return Some(Err(e));
            }
        };

        if let Some(request) = self.exports.finish(export_id) {
            self.complete_export(request, &content).await;
        }
        None
    }

    /// Writes the artifact and reports the outcome to the host.
    async fn complete_export(&mut self, request: ExportRequest, svg: &str) {
        let ExportRequest { format, path } = request;
        let artifact = render_artifact(format, svg);

        match export::write_artifact(&path, &artifact).await {
            Ok(()) => {
                info!(%format, path = %path.display(), bytes = artifact.len(), "Export written");
                self.host.emit(Message::export_complete(format, path));
            }
            Err(e) => {
                error!(%format, error = %e, "Error exporting file");
                self.host.emit(Message::export_error(&e));
            }
        }
    }

    /// Records a failed attempt, reporting if it was the last one.
    fn fail_export(&mut self, export_id: ExportId, error: Error) {
        if let Some(failed) = self.exports.fail_attempt(export_id, error) {
            self.report_failure(failed);
        }
    }

    /// Prints `exportError` for an export that will not complete.
    fn report_failure(&self, failed: FailedExport) {
        let FailedExport { request, error } = failed;
        warn!(
            format = %request.format,
            path = %request.path.display(),
            error = %error,
            "Export failed"
        );
        self.host.emit(Message::export_error(&error));
    }
}

// ============================================================================
// Tests
// ============================================================================
