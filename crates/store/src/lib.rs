#![deny(unsafe_code)]

//! The tag/message database behind the synchronizer.
//!
//! The engine only ever talks to the [`Store`] trait: a keyed collection of
//! messages, each carrying a tag set and one or more maildir files, with a
//! monotonic revision counter selecting what changed since a bookmark.
//! [`IndexStore`] is the concrete backend: a self-contained index over a
//! maildir tree, persisted as a JSON snapshot under `<root>/.notmuch/`.

pub mod maildir;
pub mod state;

mod index;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub use index::IndexStore;
pub use state::{bookmark_path, SyncState};

use protocol::MessageRecord;
use thiserror::Error;

/// Identity of a store at one point in time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Revision {
    /// Monotonically non-decreasing mutation counter.
    pub rev: u64,
    /// Identity of this store instance; changes when the store is rebuilt.
    pub uuid: String,
}

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure underneath the store.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted index snapshot failed to parse.
    #[error("corrupt index snapshot at {path}: {source}")]
    CorruptIndex {
        /// Snapshot location.
        path: PathBuf,
        /// Parse failure.
        source: serde_json::Error,
    },

    /// The index snapshot failed to serialize.
    #[error("failed to encode index snapshot: {0}")]
    EncodeIndex(#[from] serde_json::Error),

    /// A path handed to the store does not live under its root.
    #[error("path {path} is outside the store root")]
    OutsideRoot {
        /// The offending path.
        path: PathBuf,
    },

    /// The referenced message is absent (or a ghost).
    #[error("no such message: {id}")]
    UnknownMessage {
        /// The id that failed to resolve.
        id: String,
    },

    /// The sync bookmark file exists but does not parse.
    #[error("sync state file {path} corrupted, delete it to sync from scratch")]
    CorruptBookmark {
        /// Bookmark location.
        path: PathBuf,
    },
}

/// Abstract contract the synchronization core requires.
///
/// Mutating operations are self-contained write windows; implementations
/// serialize writers internally and callers never hold a write lock across
/// long I/O. Ghost messages (index entries without files) are invisible
/// through every reading operation.
pub trait Store {
    /// Current revision and instance identity.
    fn revision(&self) -> Revision;

    /// Absolute maildir root this store indexes.
    fn root(&self) -> &Path;

    /// Every live message whose last modification is strictly newer than
    /// `rev`, with current tags and per-file content digests. `0` yields
    /// every live message.
    fn messages_since(&mut self, rev: u64) -> Result<Vec<(String, MessageRecord)>, StoreError>;

    /// Ids of all live messages.
    fn all_ids(&self) -> Vec<String>;

    /// Tags and root-relative file names of a live message.
    fn find(&self, id: &str) -> Option<(BTreeSet<String>, Vec<String>)>;

    /// Atomically replaces the tag set of a live message and rewrites the
    /// maildir flag letters of its files to match.
    fn set_tags(&mut self, id: &str, tags: &BTreeSet<String>) -> Result<(), StoreError>;

    /// Ingests a maildir file, linking it to the message with the matching
    /// Message-ID. Returns the id and whether that message was already
    /// present.
    fn add_file(&mut self, path: &Path) -> Result<(String, bool), StoreError>;

    /// Detaches a file from its message; removing the last file leaves a
    /// ghost. Unknown paths are ignored.
    fn remove_file(&mut self, path: &Path) -> Result<(), StoreError>;

    /// Canonical content digest of a file, cached per `(mtime, size)`.
    fn fingerprint(&mut self, path: &Path) -> Result<String, StoreError>;
}
