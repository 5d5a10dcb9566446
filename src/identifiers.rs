//! Type-safe identifiers for relay entities.
//!
//! Newtype wrappers keep client channel IDs and export IDs from being
//! mixed up in the correlation tables.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

// ============================================================================
// ClientId
// ============================================================================

/// Counter backing [`ClientId::next`]. Starts at 1 so 0 is never issued.
static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one connected WebSocket client channel.
///
/// Process-unique and never reused, so a stale ID can't alias a newer
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    /// Allocates the next client ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

// ============================================================================
// ExportId
// ============================================================================

/// Identity of one `requestExport`, shared by every pending entry it fans
/// out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExportId(Uuid);

impl ExportId {
    /// Generates a new random export ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ExportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
