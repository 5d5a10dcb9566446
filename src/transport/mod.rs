//! Network transport layer.
//!
//! One TCP port serves both preview pages and their WebSocket channel.
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────────────────────┐
//!  Browser page ─────► │  axum (TcpListener)          │
//!                      │  accept_websocket middleware │
//!                      └──────┬─────────────────┬─────┘
//!             WebSocketUpgrade│                 │ plain GET
//!                             ▼                 ▼
//!                      ┌────────────┐   ┌────────────────────┐
//!                      │ Connection │   │ ServeFile/ServeDir │
//!                      │ event loop │   └────────────────────┘
//!                      └─────┬──────┘
//!                            │ RelayEvent
//!                            ▼
//!                       relay task
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket connection and event loop |
//! | `http` | Page router and WebSocket upgrade |
//! | `server` | Listener binding and lifecycle |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

/// Preview pages and WebSocket upgrade.
pub mod http;

/// Listening socket and server lifecycle.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::Connection;
pub use http::site_router;
pub use server::RelayServer;
