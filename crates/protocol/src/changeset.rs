//! Change-set model and its JSON wire encoding.
//!
//! A change set maps each message id to the tags and files that side
//! currently holds for it. On the wire it is a JSON object keyed by the
//! stringified id:
//!
//! ```text
//! { "<id>": { "tags": ["inbox", ...],
//!             "files": [{ "name": "cur/a.mail", "sha": "<hex64>" }, ...] } }
//! ```
//!
//! Decoding validates everything that crosses the trust boundary: ids must
//! be non-empty, tags non-empty and NUL-free, file names safe relative
//! paths, and digests 64 hex characters.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// One on-disk copy of a message.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FileRecord {
    /// Path relative to the maildir root, forward-slash separated.
    pub name: String,
    /// Lower-case hex canonical content digest.
    pub sha: String,
}

/// Tags and files one side holds for a message.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct MessageRecord {
    /// Current tag set.
    pub tags: BTreeSet<String>,
    /// Current file copies; order is not significant.
    pub files: Vec<FileRecord>,
}

impl MessageRecord {
    /// Returns the file names of this record.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.name.as_str())
    }
}

/// Messages changed since the last recorded sync.
pub type ChangeSet = BTreeMap<String, MessageRecord>;

/// Serializes a change set to its JSON wire form.
///
/// # Errors
///
/// Returns an error when serialization fails.
pub fn encode_changeset(changes: &ChangeSet) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(changes)?)
}

/// Parses and validates a change set received from the peer.
///
/// # Errors
///
/// Returns an error on malformed JSON or on any entry that violates the
/// data model.
pub fn decode_changeset(data: &[u8]) -> Result<ChangeSet, ProtocolError> {
    let changes: ChangeSet = serde_json::from_slice(data)?;
    for (id, record) in &changes {
        if id.is_empty() {
            return Err(ProtocolError::InvalidEntry {
                id: id.clone(),
                reason: "empty message id",
            });
        }
        for tag in &record.tags {
            if tag.is_empty() || tag.contains('\0') {
                return Err(ProtocolError::InvalidEntry {
                    id: id.clone(),
                    reason: "invalid tag",
                });
            }
        }
        for file in &record.files {
            validate_rel_path(&file.name)?;
            if file.sha.len() != 64 || !file.sha.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(ProtocolError::InvalidEntry {
                    id: id.clone(),
                    reason: "invalid content digest",
                });
            }
        }
    }
    Ok(changes)
}

/// Rejects paths that could escape the store root.
///
/// # Errors
///
/// Returns [`ProtocolError::UnsafePath`] for empty, absolute, or
/// `..`-containing paths.
pub fn validate_rel_path(name: &str) -> Result<(), ProtocolError> {
    let unsafe_path = name.is_empty()
        || name.starts_with('/')
        || name.contains('\0')
        || name.split('/').any(|part| part == ".." || part.is_empty());
    if unsafe_path {
        return Err(ProtocolError::UnsafePath {
            name: name.to_string(),
        });
    }
    Ok(())
}
