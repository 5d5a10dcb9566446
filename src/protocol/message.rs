//! Wire message schema.
//!
//! Every frame exchanged with a preview page, and every line printed to the
//! host, is one JSON object tagged by its `type` field.
//!
//! # Message Types
//!
//! | `type` | Direction | Fields |
//! |--------|-----------|--------|
//! | `click` | client → host | `startChar`, `endChar` |
//! | `svgExport` | client → host / export | `content` |
//! | `requestExport` | client → relay | `format`, `path` |
//! | `content` | client → all clients | `content` |
//! | `config` | host → all clients | `config` |
//! | `requestSvg` | relay → client | none |
//! | `exportComplete` | relay → host | `format`, `path` |
//! | `exportError` | relay → host | `error` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_json::error::Category;

use crate::error::{Error, Result};

// ============================================================================
// ExportFormat
// ============================================================================

/// Artifact format requested by `requestExport`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Raw SVG markup.
    Svg,
    /// SVG embedded in a standalone HTML page.
    Html,
}

impl ExportFormat {
    /// Returns the wire spelling of the format.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Html => "html",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Message
// ============================================================================

/// A message on the wire, discriminated by `type`.
///
/// Unknown fields are ignored on input. Optional fields are omitted on
/// output when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    /// User selected a range of source text in the preview.
    #[serde(rename_all = "camelCase")]
    Click {
        /// Start offset of the selection.
        start_char: i64,
        /// End offset of the selection.
        end_char: i64,
        /// Index of the tune the selection belongs to.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tune_number: Option<i64>,
        /// CSS classes of the clicked element.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        classes: Option<Vec<String>>,
    },

    /// Rendered SVG snapshot from a preview page.
    SvgExport {
        /// SVG markup.
        content: String,
    },

    /// Request to persist the current preview.
    RequestExport {
        /// Artifact format.
        format: ExportFormat,
        /// Destination file.
        path: PathBuf,
    },

    /// Current document content, echoed to every page.
    Content {
        /// Document source.
        content: String,
    },

    /// Configuration pushed by the host.
    Config {
        /// Opaque configuration object.
        config: Map<String, Value>,
    },

    /// Ask a page to reply with an `svgExport`.
    RequestSvg,

    /// Export finished.
    ExportComplete {
        /// Artifact format.
        format: ExportFormat,
        /// Written file.
        path: PathBuf,
    },

    /// Export failed.
    ExportError {
        /// Human-readable failure description.
        error: String,
    },
}

// ============================================================================
// Message - Constructors
// ============================================================================

impl Message {
    /// Creates the click event forwarded to the host.
    ///
    /// Only the selection range is carried.
    #[inline]
    #[must_use]
    pub fn click(start_char: i64, end_char: i64) -> Self {
        Self::Click {
            start_char,
            end_char,
            tune_number: None,
            classes: None,
        }
    }

    /// Creates an `svgExport` event.
    #[inline]
    #[must_use]
    pub fn svg_export(content: impl Into<String>) -> Self {
        Self::SvgExport {
            content: content.into(),
        }
    }

    /// Creates an `exportComplete` event.
    #[inline]
    #[must_use]
    pub fn export_complete(format: ExportFormat, path: impl Into<PathBuf>) -> Self {
        Self::ExportComplete {
            format,
            path: path.into(),
        }
    }

    /// Creates an `exportError` event from the failure that caused it.
    #[inline]
    #[must_use]
    pub fn export_error(error: &Error) -> Self {
        Self::ExportError {
            error: error.to_string(),
        }
    }
}

// ============================================================================
// Message - Parsing
// ============================================================================

impl Message {
    /// Parses one inbound frame or line.
    ///
    /// Input is trimmed first. Whitespace-only input yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the input is not valid JSON
    /// - [`Error::InvalidMessage`] if the JSON has an unknown `type` or
    ///   misses a required field
    pub fn parse(raw: &str) -> Result<Option<Self>> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        serde_json::from_str(trimmed).map(Some).map_err(|e| match e.classify() {
            Category::Data => Error::invalid_message(e.to_string()),
            Category::Io | Category::Syntax | Category::Eof => Error::Json(e),
        })
    }

    /// Serializes to a single-line JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if a path is not valid UTF-8.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Returns the `type` tag of this message.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Click { .. } => "click",
            Self::SvgExport { .. } => "svgExport",
            Self::RequestExport { .. } => "requestExport",
            Self::Content { .. } => "content",
            Self::Config { .. } => "config",
            Self::RequestSvg => "requestSvg",
            Self::ExportComplete { .. } => "exportComplete",
            Self::ExportError { .. } => "exportError",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
