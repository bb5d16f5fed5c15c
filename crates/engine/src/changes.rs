//! Incremental change-set computation.

use std::path::Path;

use protocol::ChangeSet;
use store::{state, Store, SyncState};
use tracing::info;

use crate::error::SyncError;

/// Loads and validates the bookmark for the current peer.
///
/// Runs before any mutation so an incompatible bookmark aborts the session
/// untouched: a UUID mismatch means the local database was rebuilt, a
/// revision from the future means the file is corrupt, and an unparseable
/// file surfaces as such from the store layer.
///
/// # Errors
///
/// Returns a fatal [`SyncError`] for any incompatible bookmark.
pub fn load_bookmark<S: Store>(store: &S, path: &Path) -> Result<Option<SyncState>, SyncError> {
    let Some(previous) = state::load(path)? else {
        info!("no previous sync state, syncing from scratch");
        return Ok(None);
    };

    let current = store.revision();
    if previous.uuid != current.uuid {
        return Err(SyncError::BookmarkUuidMismatch {
            stored: previous.uuid,
            current: current.uuid,
        });
    }
    if previous.rev > current.rev {
        return Err(SyncError::BookmarkFromFuture {
            stored: previous.rev,
            current: current.rev,
        });
    }

    info!(
        previous = previous.rev,
        current = current.rev,
        "computing changes since last sync"
    );
    Ok(Some(previous))
}

/// Computes the change set: every live message modified after the bookmark
/// revision, or every live message when there is no previous state.
///
/// # Errors
///
/// Propagates store failures.
pub fn build_changeset<S: Store>(
    store: &mut S,
    previous: Option<&SyncState>,
) -> Result<ChangeSet, SyncError> {
    let since = previous.map_or(0, |state| state.rev);
    Ok(store.messages_since(since)?.into_iter().collect())
}
