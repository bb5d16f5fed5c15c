//! Durable last-sync bookmark.
//!
//! One file per peer, named for the peer's UUID, holding the local
//! revision and the local store UUID as the ASCII string `"<rev> <uuid>"`.
//! The file is replaced with a rename so a crash never exposes a partial
//! bookmark.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::StoreError;

/// The `(rev, uuid)` pair recorded after a successful sync.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SyncState {
    /// Local store revision at checkpoint time.
    pub rev: u64,
    /// Local store UUID at checkpoint time.
    pub uuid: String,
}

/// Returns the bookmark path for syncs with the peer identified by
/// `peer_uuid`.
pub fn bookmark_path(root: &Path, peer_uuid: &str) -> PathBuf {
    root.join(".notmuch").join(format!("notmuch-sync-{peer_uuid}"))
}

/// Loads a bookmark, if one exists.
///
/// Trailing CR/LF is trimmed before parsing. A file that does not parse as
/// `"<rev> <uuid>"` is reported as [`StoreError::CorruptBookmark`]; callers
/// abort and advise deleting the file.
///
/// # Errors
///
/// Returns an error on unreadable or corrupt files. A missing file is
/// `Ok(None)`.
pub fn load(path: &Path) -> Result<Option<SyncState>, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let trimmed = raw.trim_end_matches(['\r', '\n']);
    let corrupt = || StoreError::CorruptBookmark {
        path: path.to_path_buf(),
    };

    let (rev, uuid) = trimmed.split_once(' ').ok_or_else(corrupt)?;
    let rev: u64 = rev.parse().map_err(|_| corrupt())?;
    if uuid.is_empty() || uuid.contains(' ') {
        return Err(corrupt());
    }

    Ok(Some(SyncState {
        rev,
        uuid: uuid.to_string(),
    }))
}

/// Writes a bookmark atomically (temp file + rename in the same directory).
///
/// # Errors
///
/// Returns an error when the directory cannot be created or the file
/// cannot be persisted.
pub fn save(path: &Path, state: &SyncState) -> Result<(), StoreError> {
    let dir = path.parent().ok_or_else(|| StoreError::OutsideRoot {
        path: path.to_path_buf(),
    })?;
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    write!(tmp, "{} {}", state.rev, state.uuid)?;
    tmp.persist(path).map_err(|err| StoreError::Io(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn bookmark_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = bookmark_path(dir.path(), "peer-uuid");
        assert!(load(&path).unwrap().is_none());

        let state = SyncState {
            rev: 42,
            uuid: "123e4567-e89b-42d3-a456-426614174000".to_string(),
        };
        save(&path, &state).unwrap();
        assert_eq!(load(&path).unwrap(), Some(state));
    }

    #[test]
    fn bookmark_tolerates_trailing_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bookmark");
        fs::write(&path, "7 some-uuid\r\n").unwrap();

        let state = load(&path).unwrap().unwrap();
        assert_eq!(state.rev, 7);
        assert_eq!(state.uuid, "some-uuid");
    }

    #[test]
    fn corrupt_bookmark_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bookmark");

        for content in ["123abc", "abc def", "1 two three", ""] {
            fs::write(&path, content).unwrap();
            assert!(
                matches!(load(&path), Err(StoreError::CorruptBookmark { .. })),
                "content {content:?} should be corrupt"
            );
        }
    }

    #[test]
    fn bookmark_path_is_per_peer() {
        let root = Path::new("/mail");
        assert_eq!(
            bookmark_path(root, "abc"),
            Path::new("/mail/.notmuch/notmuch-sync-abc")
        );
    }
}
