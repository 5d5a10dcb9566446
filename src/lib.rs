//! Preview Relay - local bridge between a host process and preview pages.
//!
//! The relay sits between three parties:
//!
//! - **Host process**: writes JSON lines on the relay's stdin, reads JSON
//!   events from its stdout
//! - **Preview pages**: browser tabs connected over WebSocket
//! - **Static site**: the preview pages themselves, served over HTTP on the
//!   same port
//!
//! It also runs the export protocol: a page asks for an export, the relay
//! asks every page for a fresh SVG snapshot, writes the first usable answer
//! to disk and reports the outcome to the host.
//!
//! # Architecture
//!
//! Key design principles:
//!
//! - One relay task owns all client and export state; connections and the
//!   host bridge talk to it through a FIFO channel
//! - Host lines are broadcast verbatim; client messages are parsed and routed
//! - Export waits are queued correlation entries, never blocked tasks
//!
//! # Quick Start
//!
//! ```no_run
//! use preview_relay::{HostOutput, RelayConfig, RelayServer, Result};
//! use tokio::io::BufReader;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = RelayConfig::builder().port(8088).build()?;
//!     let (host, _writer) = HostOutput::spawn_writer(tokio::io::stdout());
//!
//!     let server = RelayServer::bind(config, host).await?;
//!     server.attach_host(BufReader::new(tokio::io::stdin()));
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | [`RelayConfig`] and its builder |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | [`ClientId`] and [`ExportId`] |
//! | [`protocol`] | JSON message types |
//! | [`relay`] | Relay task, routing, export coordination, host bridge |
//! | [`transport`] | Server, WebSocket upgrade, HTTP pages |

// ============================================================================
// Modules
// ============================================================================

/// Relay configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for clients and exports.
pub mod identifiers;

/// JSON message types exchanged with pages and the host.
pub mod protocol;

/// Relay task and its collaborators.
pub mod relay;

/// Network transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::{RelayConfig, RelayConfigBuilder};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ClientId, ExportId};

// Protocol types
pub use protocol::{ExportFormat, Message};

// Relay types
pub use relay::{HostOutput, Relay, RelayEvent, RelayHandle};

// Transport types
pub use transport::RelayServer;
