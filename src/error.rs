//! Error types for the preview relay.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use preview_relay::{Message, Result};
//!
//! fn example(frame: &str) -> Result<()> {
//!     if let Some(message) = Message::parse(frame)? {
//!         println!("received {}", message.kind());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::InvalidMessage`] |
//! | Export | [`Error::Export`], [`Error::ExportTimeout`], [`Error::NoClients`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when relay configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Relay task is no longer running.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// JSON parsed but did not match any known message shape.
    ///
    /// Covers unknown `type` tags and missing required fields.
    #[error("Invalid message: {message}")]
    InvalidMessage {
        /// Description of the shape mismatch.
        message: String,
    },

    // ========================================================================
    // Export Errors
    // ========================================================================
    /// Export attempt failed.
    ///
    /// The display text is what the host receives in `exportError`.
    #[error("Failed to export {}: {message}", path.display())]
    Export {
        /// Target path of the export.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// No client answered the export before its deadline.
    #[error("Export to {} timed out after {timeout_ms}ms", path.display())]
    ExportTimeout {
        /// Target path of the export.
        path: PathBuf,
        /// Milliseconds waited before giving up.
        timeout_ms: u64,
    },

    /// Export requested while no client was connected to render it.
    #[error("No connected client can render the export to {}", path.display())]
    NoClients {
        /// Target path of the export.
        path: PathBuf,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON syntax error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] axum::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid message error.
    #[inline]
    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::InvalidMessage {
            message: message.into(),
        }
    }

    /// Creates an export error.
    #[inline]
    pub fn export(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Export {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an export timeout error.
    #[inline]
    pub fn export_timeout(path: impl Into<PathBuf>, timeout_ms: u64) -> Self {
        Self::ExportTimeout {
            path: path.into(),
            timeout_ms,
        }
    }

    /// Creates a no-clients error.
    #[inline]
    pub fn no_clients(path: impl Into<PathBuf>) -> Self {
        Self::NoClients { path: path.into() }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::WebSocket(_))
    }
}

// ============================================================================
// Tests
// ============================================================================
