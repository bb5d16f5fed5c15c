//! Session counters.
//!
//! Two kinds: [`WireCounters`] tracks raw bytes moved over the stream and is
//! shared between the concurrent reader and writer sub-tasks of a session;
//! [`SyncCounters`] tallies the semantic work one side performed and is the
//! six-`u32` trailer the responder sends before the session ends.

use std::sync::atomic::{AtomicU64, Ordering};

/// Bytes read from and written to the peer stream.
///
/// Updated with relaxed atomic adds from both halves of the duplex; the
/// totals are only reported after the session is joined, so no stronger
/// ordering is required.
#[derive(Debug, Default)]
pub struct WireCounters {
    read: AtomicU64,
    written: AtomicU64,
}

impl WireCounters {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_read(&self, n: u64) {
        self.read.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_written(&self, n: u64) {
        self.written.fetch_add(n, Ordering::Relaxed);
    }

    /// Total bytes read from the peer.
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.read.load(Ordering::Relaxed)
    }

    /// Total bytes written to the peer.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

/// What one side of a session changed, in wire order.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SyncCounters {
    /// Messages whose tag set was rewritten.
    pub tag_changes: u32,
    /// Files materialized locally by copy or rename instead of transfer.
    pub moves_copies: u32,
    /// Duplicate files removed during reconciliation.
    pub duplicate_files: u32,
    /// Messages adopted for the first time.
    pub new_messages: u32,
    /// Messages removed by the deletion phase.
    pub deleted_messages: u32,
    /// File bodies accepted from the peer.
    pub new_files: u32,
}

impl SyncCounters {
    /// Wire size: six big-endian `u32` values.
    pub const WIRE_LEN: usize = 24;

    /// Returns true when no work was performed.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Encodes the counters in wire order.
    #[must_use]
    pub fn to_wire(&self) -> [u8; Self::WIRE_LEN] {
        let mut out = [0u8; Self::WIRE_LEN];
        for (slot, value) in out.chunks_exact_mut(4).zip([
            self.tag_changes,
            self.moves_copies,
            self.duplicate_files,
            self.new_messages,
            self.deleted_messages,
            self.new_files,
        ]) {
            slot.copy_from_slice(&value.to_be_bytes());
        }
        out
    }

    /// Decodes counters from wire order.
    #[must_use]
    pub fn from_wire(buf: &[u8; Self::WIRE_LEN]) -> Self {
        let field = |i: usize| {
            let mut word = [0u8; 4];
            word.copy_from_slice(&buf[i * 4..i * 4 + 4]);
            u32::from_be_bytes(word)
        };
        Self {
            tag_changes: field(0),
            moves_copies: field(1),
            duplicate_files: field(2),
            new_messages: field(3),
            deleted_messages: field(4),
            new_files: field(5),
        }
    }
}

impl std::fmt::Display for SyncCounters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} new messages, {} new files, {} files copied/moved, {} files deleted, {} messages with tag changes, {} messages deleted",
            self.new_messages,
            self.new_files,
            self.moves_copies,
            self.duplicate_files,
            self.tag_changes,
            self.deleted_messages,
        )
    }
}
