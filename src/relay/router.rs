//! Classification of inbound client messages.
//!
//! Routing is a pure function of the message tag. The relay applies the
//! returned [`Route`]; nothing here touches sockets or files.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;

use crate::protocol::{ExportFormat, Message};

// ============================================================================
// Route
// ============================================================================

/// What the relay should do with one client message.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Print this event on the host output channel.
    ToHost(Message),
    /// Send the received frame verbatim to every open client.
    Broadcast,
    /// Start an export.
    Export {
        /// Requested artifact format.
        format: ExportFormat,
        /// Destination file.
        path: PathBuf,
    },
    /// Drop the message.
    Ignore,
}

// ============================================================================
// Routing
// ============================================================================

/// Maps a client message to its handler.
///
/// Messages that only make sense in the other direction (`config`,
/// `requestSvg`, `exportComplete`, `exportError`) are ignored.
#[must_use]
pub fn route(message: Message) -> Route {
    match message {
        Message::Click {
            start_char,
            end_char,
            ..
        } => Route::ToHost(Message::click(start_char, end_char)),
        Message::SvgExport { content } => Route::ToHost(Message::svg_export(content)),
        Message::Content { .. } => Route::Broadcast,
        Message::RequestExport { format, path } => Route::Export { format, path },
        Message::Config { .. }
        | Message::RequestSvg
        | Message::ExportComplete { .. }
        | Message::ExportError { .. } => Route::Ignore,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Message {
        Message::parse(raw).expect("parse").expect("non-empty")
    }

    #[test]
    fn test_click_goes_to_host_without_extras() {
        let route = route(parse(
            r#"{"type":"click","startChar":5,"endChar":9,"tuneNumber":0,"classes":["abcjs-note"]}"#,
        ));
        assert_eq!(route, Route::ToHost(Message::click(5, 9)));
    }

    #[test]
    fn test_svg_export_goes_to_host() {
        let route = route(parse(r#"{"type":"svgExport","content":"<svg/>"}"#));
        assert_eq!(route, Route::ToHost(Message::svg_export("<svg/>")));
    }

    #[test]
    fn test_content_is_broadcast() {
        let route = route(parse(r#"{"type":"content","content":"X:1\nK:C\nCDEF|"}"#));
        assert_eq!(route, Route::Broadcast);
    }

    #[test]
    fn test_request_export_goes_to_coordinator() {
        let route = route(parse(
            r#"{"type":"requestExport","format":"svg","path":"/tmp/out.svg"}"#,
        ));
        assert_eq!(
            route,
            Route::Export {
                format: ExportFormat::Svg,
                path: PathBuf::from("/tmp/out.svg"),
            }
        );
    }

    #[test]
    fn test_server_side_messages_are_ignored() {
        let inbound = [
            r#"{"type":"config","config":{"theme":"dark"}}"#,
            r#"{"type":"requestSvg"}"#,
            r#"{"type":"exportComplete","format":"html","path":"/x"}"#,
            r#"{"type":"exportError","error":"nope"}"#,
        ];

        for raw in inbound {
            assert_eq!(route(parse(raw)), Route::Ignore, "{raw}");
        }
    }
}
