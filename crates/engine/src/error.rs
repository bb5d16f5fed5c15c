//! Common error type for the synchronization core.

use std::io;
use std::path::PathBuf;

use protocol::ProtocolError;
use store::StoreError;
use thiserror::Error;

/// Fatal conditions that abort a session.
///
/// Everything here stops the run; recoverable conditions (lookup misses,
/// duplicate adds) are logged and skipped where they occur.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Wire-level failure, including the peer closing the stream.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Store-level failure, including a corrupt bookmark file.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Local filesystem failure outside the store.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Sidecar metadata failed to encode or decode.
    #[error("malformed sidecar metadata: {0}")]
    SidecarJson(#[from] serde_json::Error),

    /// The bookmark names a different store generation; the local database
    /// was rebuilt and there is no safe incremental base.
    #[error(
        "last sync with UUID {stored}, but the store has UUID {current}; \
         delete the sync state file to sync from scratch"
    )]
    BookmarkUuidMismatch {
        /// UUID recorded at the last sync.
        stored: String,
        /// UUID the store reports now.
        current: String,
    },

    /// The bookmark revision is ahead of the store.
    #[error("last sync revision {stored} is newer than the store revision {current}")]
    BookmarkFromFuture {
        /// Revision recorded at the last sync.
        stored: u64,
        /// Revision the store reports now.
        current: u64,
    },

    /// A received file body did not hash to the digest the peer advertised.
    #[error("received {name} with digest {actual}, expected {expected}")]
    HashMismatch {
        /// Root-relative name of the file.
        name: String,
        /// Digest the peer's change set promised.
        expected: String,
        /// Digest of the bytes actually received.
        actual: String,
    },

    /// A transfer destination exists with different content; a concurrent
    /// writer produced divergent data.
    #[error("refusing to overwrite {path} with different content")]
    OverwriteConflict {
        /// The conflicting destination.
        path: PathBuf,
    },

    /// Local and remote file sets for one message share no names; the
    /// databases diverged beyond safe automatic handling.
    #[error("local/remote file set disjoint for message {id}")]
    DivergentFileSet {
        /// The affected message.
        id: String,
    },

    /// The peer asked for a file this side no longer has.
    #[error("peer requested missing local file {path}")]
    MissingSource {
        /// The absent path.
        path: PathBuf,
    },
}
