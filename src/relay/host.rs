//! Bridge to the controlling host process.
//!
//! The host writes newline-delimited JSON on the relay's stdin; each valid
//! line is broadcast verbatim to every preview page. In the other
//! direction, the relay prints one JSON event per line on stdout.
//! stdout carries nothing else, so operator logs must go to stderr.

// ============================================================================
// Imports
// ============================================================================

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use axum::extract::ws::Utf8Bytes;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::protocol::Message;

use super::RelayHandle;

// ============================================================================
// HostOutput
// ============================================================================

/// Event channel toward the host process.
///
/// Cloneable; all clones feed the same writer.
#[derive(Debug, Clone)]
pub struct HostOutput {
    tx: mpsc::UnboundedSender<Message>,
}

impl HostOutput {
    /// Creates an output and the receiver that observes its events.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Creates an output whose events are written as JSON lines to `writer`.
    pub fn spawn_writer<W>(writer: W) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (output, rx) = Self::channel();
        let task = tokio::spawn(write_events(rx, writer));
        (output, task)
    }

    /// Queues one event for the host.
    pub fn emit(&self, event: Message) {
        trace!(kind = event.kind(), "Host event queued");
        if self.tx.send(event).is_err() {
            warn!("Host output closed, event dropped");
        }
    }
}

/// Drains events into `writer`, one line each, flushing after every line.
async fn write_events<W>(mut rx: mpsc::UnboundedReceiver<Message>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = rx.recv().await {
        let mut line = match event.to_json() {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, kind = event.kind(), "Failed to serialize host event");
                continue;
            }
        };
        line.push('\n');

        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        };

        if let Err(e) = written.await {
            warn!(error = %e, "Host output write failed, stopping writer");
            break;
        }
    }

    debug!("Host writer terminated");
}

// ============================================================================
// Host Input
// ============================================================================

/// Validates one host input line.
///
/// Returns the trimmed line ready to broadcast, or `None` for a blank line.
///
/// # Errors
///
/// Returns [`Error::Json`](crate::Error::Json) if the line is not valid JSON.
pub fn host_frame(line: &str) -> Result<Option<Utf8Bytes>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value = serde_json::from_str(trimmed)?;
    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("?");
    debug!(kind, "Host message received");

    Ok(Some(Utf8Bytes::from(trimmed.to_string())))
}

/// Reads host lines until end of input and hands each valid one to the relay.
///
/// Bad lines are logged and skipped.
///
/// # Errors
///
/// - [`Error::Io`](crate::Error::Io) if reading the input fails
/// - [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) if the relay has shut down
pub async fn run_host_bridge<R>(mut reader: R, relay: RelayHandle) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            debug!("Host input closed");
            return Ok(());
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Host input is not UTF-8, line skipped");
                continue;
            }
        };

        match host_frame(line) {
            Ok(Some(frame)) => relay.host(frame)?,
            Ok(None) => {}
            Err(e) => warn!(error = %e, line = %line.trim(), "Error processing host input"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, BufReader};

    use crate::error::Error;
    use crate::protocol::ExportFormat;
    use crate::relay::RelayEvent;

    #[test]
    fn test_host_frame_is_verbatim() {
        let frame = host_frame("  {\"type\":\"config\",\"config\":{\"theme\":\"dark\"}}\n")
            .expect("valid")
            .expect("non-empty");

        assert_eq!(
            frame.as_str(),
            r#"{"type":"config","config":{"theme":"dark"}}"#
        );
    }

    #[test]
    fn test_host_frame_blank_is_none() {
        assert!(host_frame(" \t\r\n").expect("valid").is_none());
    }

    #[test]
    fn test_host_frame_rejects_invalid_json() {
        let err = host_frame("{\"type\":").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[tokio::test]
    async fn test_bridge_skips_bad_lines() {
        let (relay, mut rx) = RelayHandle::channel();
        let input = b"{\"type\":\"config\",\"config\":{}}\nnot json\n\n\xff\xfe\n{\"type\":\"content\",\"content\":\"A\"}";

        run_host_bridge(BufReader::new(&input[..]), relay)
            .await
            .expect("bridge runs to end of input");

        let mut frames = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                RelayEvent::Host { text } => frames.push(text.as_str().to_string()),
                other => panic!("unexpected event: {other:?}"),
            }
        }

        assert_eq!(
            frames,
            vec![
                r#"{"type":"config","config":{}}"#.to_string(),
                r#"{"type":"content","content":"A"}"#.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_bridge_stops_when_relay_gone() {
        let (relay, rx) = RelayHandle::channel();
        drop(rx);

        let err = run_host_bridge(BufReader::new(&b"{}\n"[..]), relay)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_writer_prints_json_lines() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (output, task) = HostOutput::spawn_writer(client);

        output.emit(Message::click(5, 9));
        output.emit(Message::export_complete(ExportFormat::Svg, "/tmp/out.svg"));
        drop(output);
        task.await.expect("writer task");

        let mut printed = String::new();
        server.read_to_string(&mut printed).await.expect("read");

        assert_eq!(
            printed,
            "{\"type\":\"click\",\"startChar\":5,\"endChar\":9}\n\
             {\"type\":\"exportComplete\",\"format\":\"svg\",\"path\":\"/tmp/out.svg\"}\n"
        );
    }
}
