//! Tag merging.

use protocol::ChangeSet;
use store::Store;
use tracing::{debug, info};

use crate::error::SyncError;

/// Applies the peer's tag changes to the local store.
///
/// For every message in the remote change set the resulting tag set is the
/// remote tags, unioned with the local change-set tags when both sides
/// touched the message concurrently. Union is the only commutative,
/// associative, idempotent merge that never drops a tag, and both peers run
/// the same rule, so they converge without a clock. Messages absent locally
/// are skipped; they are adopted with their tags during file transfer.
///
/// Returns the number of messages whose tag set actually changed.
///
/// # Errors
///
/// Propagates store failures.
pub fn merge_tags<S: Store>(
    store: &mut S,
    local: &ChangeSet,
    remote: &ChangeSet,
) -> Result<u32, SyncError> {
    let mut changed = 0;

    for (id, theirs) in remote {
        let mut tags = theirs.tags.clone();
        if let Some(mine) = local.get(id) {
            tags.extend(mine.tags.iter().cloned());
        }

        let Some((current, _)) = store.find(id) else {
            debug!(id = %id, "message not present locally, tags arrive with adoption");
            continue;
        };

        if current != tags {
            info!(id = %id, ?tags, "updating tags");
            store.set_tags(id, &tags)?;
            changed += 1;
        }
    }

    Ok(changed)
}
