//! Two-phase export coordination.
//!
//! An export starts when a page sends `requestExport`. The relay asks every
//! open page for an SVG snapshot and queues one pending entry per page. The
//! next message a page sends resolves its oldest entry.
//!
//! # Correlation
//!
//! ```text
//! requestExport ──► ExportId ──┬─► client-1 queue: [.., id]
//!                              ├─► client-2 queue: [.., id]
//!                              └─► deadline (optional)
//! ```
//!
//! The first usable `svgExport` for an ID writes the artifact and retires
//! the ID, so the sibling entries on other pages are skipped. An ID is
//! reported as failed only once every entry for it has failed, or when its
//! deadline passes.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ClientId, ExportId};
use crate::protocol::ExportFormat;

// ============================================================================
// Artifact
// ============================================================================

/// Title of the HTML wrapper page.
pub const HTML_EXPORT_TITLE: &str = "ABC Export";

/// Builds the file contents for an export.
///
/// `svg` returns the markup unchanged; `html` embeds it in a minimal page.
#[must_use]
pub fn render_artifact(format: ExportFormat, svg: &str) -> String {
    match format {
        ExportFormat::Svg => svg.to_string(),
        ExportFormat::Html => format!(
            "<!DOCTYPE html>\n\
             <html>\n\
             <head>\n  \
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n  \
             <title>{HTML_EXPORT_TITLE}</title>\n\
             </head>\n\
             <body>\n  \
             {svg}\n\
             </body>\n\
             </html>"
        ),
    }
}

/// Writes an artifact, replacing any existing file.
///
/// # Errors
///
/// Returns [`Error::Export`] if the file cannot be written.
pub async fn write_artifact(path: &Path, contents: &str) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| Error::export(path, e.to_string()))
}

// ============================================================================
// ExportRequest
// ============================================================================

/// Format and destination of one export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    /// Artifact format.
    pub format: ExportFormat,
    /// Destination file.
    pub path: PathBuf,
}

/// An export that will not complete, with the reason to report.
#[derive(Debug)]
pub struct FailedExport {
    /// The abandoned request.
    pub request: ExportRequest,
    /// Why it failed.
    pub error: Error,
}

// ============================================================================
// ExportCoordinator
// ============================================================================

/// Bookkeeping for one in-flight export.
#[derive(Debug)]
struct ExportState {
    request: ExportRequest,
    deadline: Option<Instant>,
    /// Pending entries not yet resolved.
    outstanding: usize,
}

/// Correlation table from client channels to pending exports.
#[derive(Debug)]
pub struct ExportCoordinator {
    timeout: Option<Duration>,
    exports: FxHashMap<ExportId, ExportState>,
    queues: FxHashMap<ClientId, VecDeque<ExportId>>,
}

impl ExportCoordinator {
    /// Creates a coordinator. `None` disables export deadlines.
    #[must_use]
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            exports: FxHashMap::default(),
            queues: FxHashMap::default(),
        }
    }

    /// Returns the number of exports still waiting for a snapshot.
    #[inline]
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.exports.len()
    }

    /// Returns the number of live entries queued on one client.
    #[must_use]
    pub fn pending_for(&self, client_id: ClientId) -> usize {
        self.queues.get(&client_id).map_or(0, |queue| {
            queue
                .iter()
                .filter(|id| self.exports.contains_key(id))
                .count()
        })
    }

    /// Returns the request behind an export ID, if it is still in flight.
    #[must_use]
    pub fn request(&self, export_id: ExportId) -> Option<&ExportRequest> {
        self.exports.get(&export_id).map(|state| &state.request)
    }

    /// Registers an export and queues one entry on each recipient.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoClients`] if `recipients` is empty.
    pub fn begin(
        &mut self,
        request: ExportRequest,
        recipients: &[ClientId],
        now: Instant,
    ) -> Result<ExportId> {
        if recipients.is_empty() {
            return Err(Error::no_clients(&request.path));
        }

        let export_id = ExportId::generate();
        for client_id in recipients {
            self.queues.entry(*client_id).or_default().push_back(export_id);
        }

        debug!(
            %export_id,
            format = %request.format,
            path = %request.path.display(),
            recipients = recipients.len(),
            "Export started"
        );

        self.exports.insert(
            export_id,
            ExportState {
                request,
                deadline: self.timeout.and_then(|timeout| now.checked_add(timeout)),
                outstanding: recipients.len(),
            },
        );

        Ok(export_id)
    }

    /// Pops the oldest live entry queued on a client.
    ///
    /// Entries whose export already finished are discarded on the way.
    pub fn take_pending(&mut self, client_id: ClientId) -> Option<ExportId> {
        let queue = self.queues.get_mut(&client_id)?;

        let mut found = None;
        while let Some(export_id) = queue.pop_front() {
            if self.exports.contains_key(&export_id) {
                found = Some(export_id);
                break;
            }
        }

        if queue.is_empty() {
            self.queues.remove(&client_id);
        }
        found
    }

    /// Retires an export after a snapshot arrived for it.
    pub fn finish(&mut self, export_id: ExportId) -> Option<ExportRequest> {
        self.retire(export_id).map(|state| state.request)
    }

    /// Records one failed entry.
    ///
    /// Returns the failure to report once no entry for the export remains.
    pub fn fail_attempt(&mut self, export_id: ExportId, error: Error) -> Option<FailedExport> {
        let state = self.exports.get_mut(&export_id)?;
        state.outstanding = state.outstanding.saturating_sub(1);

        if state.outstanding > 0 {
            debug!(%export_id, remaining = state.outstanding, error = %error, "Export attempt failed");
            return None;
        }

        let state = self.retire(export_id)?;
        Some(FailedExport {
            request: state.request,
            error,
        })
    }

    /// Drops every entry queued on a client that disconnected.
    pub fn client_gone(&mut self, client_id: ClientId) -> Vec<FailedExport> {
        let Some(queue) = self.queues.remove(&client_id) else {
            return Vec::new();
        };

        queue
            .into_iter()
            .filter_map(|export_id| {
                let path = self.request(export_id)?.path.clone();
                let error = Error::export(path, "client disconnected before sending SVG");
                self.fail_attempt(export_id, error)
            })
            .collect()
    }

    /// Returns the earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.exports.values().filter_map(|state| state.deadline).min()
    }

    /// Retires every export whose deadline is at or before `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<FailedExport> {
        let expired: Vec<ExportId> = self
            .exports
            .iter()
            .filter(|(_, state)| state.deadline.is_some_and(|deadline| deadline <= now))
            .map(|(id, _)| *id)
            .collect();

        let timeout_ms = self.timeout_ms();

        expired
            .into_iter()
            .filter_map(|export_id| self.retire(export_id))
            .map(|state| {
                warn!(path = %state.request.path.display(), timeout_ms, "Export expired");
                FailedExport {
                    error: Error::export_timeout(&state.request.path, timeout_ms),
                    request: state.request,
                }
            })
            .collect()
    }

    /// Configured timeout in whole milliseconds, saturating at `u64::MAX`.
    fn timeout_ms(&self) -> u64 {
        self.timeout.map_or(0, |timeout| {
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
        })
    }

    /// Removes an export and every entry still queued for it.
    fn retire(&mut self, export_id: ExportId) -> Option<ExportState> {
        let state = self.exports.remove(&export_id)?;

        self.queues.retain(|_, queue| {
            queue.retain(|id| *id != export_id);
            !queue.is_empty()
        });

        Some(state)
    }
}

// ============================================================================
// Tests
// ============================================================================
