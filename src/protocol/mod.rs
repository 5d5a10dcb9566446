//! WebSocket protocol message types.
//!
//! This module defines the JSON messages exchanged between preview pages,
//! the relay and the host process.
//!
//! # Protocol Overview
//!
//! | Path | Carrier | Messages |
//! |------|---------|----------|
//! | page → relay | WebSocket text frame | `click`, `svgExport`, `requestExport`, `content` |
//! | relay → page | WebSocket text frame | `requestSvg`, broadcast `content`/`config` |
//! | host → relay | stdin line | anything, broadcast verbatim |
//! | relay → host | stdout line | `click`, `svgExport`, `exportComplete`, `exportError` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | Tagged message enum and parsing |

// ============================================================================
// Submodules
// ============================================================================

/// Tagged message enum and parsing.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use message::{ExportFormat, Message};
