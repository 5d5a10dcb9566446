//! Listening socket and server lifecycle.
//!
//! # Lifecycle
//!
//! 1. [`RelayServer::bind`] binds one TCP port and spawns the relay task
//! 2. axum serves the preview pages and upgrades WebSocket requests on the
//!    same port
//! 3. [`RelayServer::attach_host`] starts feeding host lines to the relay
//! 4. [`RelayServer::shutdown`] stops serving and closes every client

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::io::AsyncBufRead;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::error::Result;
use crate::relay::{HostOutput, Relay, RelayHandle, run_host_bridge};

use super::site_router;

// ============================================================================
// Constants
// ============================================================================

/// Time open HTTP connections get to finish during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// ============================================================================
// RelayServer
// ============================================================================

/// A bound relay: HTTP/WebSocket server and relay task.
///
/// # Example
///
/// ```ignore
/// let config = RelayConfig::builder().port(0).build()?;
/// let (host, _writer) = HostOutput::spawn_writer(tokio::io::stdout());
/// let server = RelayServer::bind(config, host).await?;
/// println!("Preview at {}", server.http_url());
/// ```
#[derive(Debug)]
pub struct RelayServer {
    local_addr: SocketAddr,
    relay: RelayHandle,
    stop_tx: oneshot::Sender<()>,
    serve_task: JoinHandle<()>,
    relay_task: JoinHandle<()>,
}

impl RelayServer {
    /// Binds the listener and starts every background task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if binding fails.
    pub async fn bind(config: RelayConfig, host: HostOutput) -> Result<Self> {
        let listener = TcpListener::bind(config.socket_addr()).await?;
        let local_addr = listener.local_addr()?;

        debug!(%local_addr, "Relay listener bound");

        if !config.templates_dir.is_dir() {
            warn!(
                templates = %config.templates_dir.display(),
                "Templates directory not found, pages will return 404"
            );
        }

        let (relay, relay_task) = Relay::new(host, config.export_timeout).spawn();
        let router = site_router(&config.templates_dir, relay.clone());

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let serve_task = tokio::spawn(async move {
            let stopped = async {
                let _ = stop_rx.await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(stopped)
                .await
            {
                error!(error = %e, "HTTP server stopped");
            }
        });

        info!(port = local_addr.port(), "Relay server started");

        Ok(Self {
            local_addr,
            relay,
            stop_tx,
            serve_task,
            relay_task,
        })
    }

    /// Returns the port the server is bound to.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the local socket address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the WebSocket URL for this server.
    ///
    /// Format: `ws://{host}:{port}`
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.display_addr())
    }

    /// Returns the base HTTP URL for this server.
    ///
    /// Format: `http://{host}:{port}`
    #[must_use]
    pub fn http_url(&self) -> String {
        format!("http://{}", self.display_addr())
    }

    /// Returns a handle into the relay task.
    #[inline]
    #[must_use]
    pub fn relay(&self) -> RelayHandle {
        self.relay.clone()
    }

    /// Spawns the host bridge on `reader`.
    pub fn attach_host<R>(&self, reader: R) -> JoinHandle<()>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let relay = self.relay.clone();
        tokio::spawn(async move {
            match run_host_bridge(reader, relay).await {
                Ok(()) => debug!("Host bridge finished"),
                Err(e) if e.is_connection_error() => debug!("Host bridge stopped with the relay"),
                Err(e) => warn!(error = %e, "Host bridge stopped"),
            }
        })
    }

    /// Stops serving, closes every client and stops the relay task.
    pub async fn shutdown(self) {
        info!("Relay server shutting down");

        let Self {
            relay,
            stop_tx,
            mut serve_task,
            relay_task,
            ..
        } = self;

        let _ = stop_tx.send(());
        relay.shutdown();
        let _ = relay_task.await;

        if timeout(SHUTDOWN_GRACE, &mut serve_task).await.is_err() {
            debug!("HTTP connections still open, aborting");
            serve_task.abort();
        }

        info!("Relay server shutdown complete");
    }

    /// Address with unspecified IPs shown as loopback.
    fn display_addr(&self) -> SocketAddr {
        if self.local_addr.ip().is_unspecified() {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.local_addr.port())
        } else {
            self.local_addr
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
