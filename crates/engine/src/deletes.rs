//! Coordinated whole-message deletion.
//!
//! The responder streams every id it holds; only the initiator diffs the
//! two populations, which halves the bandwidth. Ids present on exactly one
//! side are removed there (subject to the `deleted`-tag check), and both
//! sides additionally expunge messages that carry the `deleted` tag after
//! the merge, so tagging a message `deleted` on either peer removes it
//! everywhere in a single run.

use std::fs;

use protocol::{WireReader, WireWriter};
use store::Store;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::DELETED_TAG;

/// Sentinel tag used to bump a retained message's revision so the peer
/// re-propagates it on the next run.
const KEEP_SENTINEL: &str = "nm-sync-keep";

/// Runs the deletion phase on the initiator side.
///
/// Receives the responder's full id list, sends back the ids the responder
/// must drop, and applies local deletions. With `require_deleted_tag` a
/// candidate lacking the `deleted` tag survives and its revision is bumped
/// so the next sync restores it on the peer.
///
/// Returns the number of messages deleted locally.
///
/// # Errors
///
/// Fatal on stream or store failure.
pub async fn deletion_initiator<S, R, W>(
    store: &mut S,
    reader: &mut WireReader<R>,
    writer: &mut WireWriter<W>,
    require_deleted_tag: bool,
) -> Result<u32, SyncError>
where
    S: Store,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let local_ids: Vec<String> = store.all_ids();
    let remote_ids = reader.read_name_list().await?;
    info!(
        local = local_ids.len(),
        remote = remote_ids.len(),
        "comparing message populations"
    );

    let local_set: std::collections::BTreeSet<&str> =
        local_ids.iter().map(String::as_str).collect();
    let remote_set: std::collections::BTreeSet<&str> =
        remote_ids.iter().map(String::as_str).collect();

    let delete_remote: Vec<String> = remote_set
        .difference(&local_set)
        .map(|id| id.to_string())
        .collect();
    writer.write_name_list(&delete_remote).await?;

    let mut deleted = 0;
    for id in local_set.difference(&remote_set) {
        if delete_message(store, id, require_deleted_tag)? {
            deleted += 1;
        }
    }
    deleted += expunge_tagged(store)?;
    Ok(deleted)
}

/// Runs the deletion phase on the responder side.
///
/// Sends the full local id list, then applies the deletions the initiator
/// chose, with the same tag check and sentinel bump as the initiator.
///
/// # Errors
///
/// Fatal on stream or store failure.
pub async fn deletion_responder<S, R, W>(
    store: &mut S,
    reader: &mut WireReader<R>,
    writer: &mut WireWriter<W>,
    require_deleted_tag: bool,
) -> Result<u32, SyncError>
where
    S: Store,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let local_ids = store.all_ids();
    writer.write_name_list(&local_ids).await?;

    let doomed = reader.read_name_list().await?;
    let mut deleted = 0;
    for id in &doomed {
        if delete_message(store, id, require_deleted_tag)? {
            deleted += 1;
        }
    }
    deleted += expunge_tagged(store)?;
    Ok(deleted)
}

/// Removes every live message currently tagged `deleted`.
fn expunge_tagged<S: Store>(store: &mut S) -> Result<u32, SyncError> {
    let mut deleted = 0;
    for id in store.all_ids() {
        let tagged = store
            .find(&id)
            .is_some_and(|(tags, _)| tags.contains(DELETED_TAG));
        if tagged && delete_message(store, &id, false)? {
            deleted += 1;
        }
    }
    Ok(deleted)
}

/// Deletes one message: every file leaves the store and the filesystem.
///
/// Absent or ghost ids are skipped. Returns whether a deletion happened.
fn delete_message<S: Store>(
    store: &mut S,
    id: &str,
    require_deleted_tag: bool,
) -> Result<bool, SyncError> {
    let Some((tags, files)) = store.find(id) else {
        debug!(id = %id, "deletion candidate already gone");
        return Ok(false);
    };

    if require_deleted_tag && !tags.contains(DELETED_TAG) {
        warn!(id = %id, "scheduled for deletion but not tagged '{DELETED_TAG}', keeping");
        // A no-op tag write bumps the revision, so the next change set
        // carries this message back to the peer that dropped it.
        let mut bumped = tags.clone();
        bumped.insert(KEEP_SENTINEL.to_string());
        store.set_tags(id, &bumped)?;
        store.set_tags(id, &tags)?;
        return Ok(false);
    }

    info!(id = %id, files = files.len(), "deleting message");
    let root = store.root().to_path_buf();
    for name in files {
        let path = root.join(&name);
        store.remove_file(&path)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(file = %name, "file already unlinked");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeSet;
    use std::sync::Arc;

    use protocol::WireCounters;
    use store::IndexStore;
    use tempfile::TempDir;

    fn write_mail(dir: &TempDir, rel: &str, id: &str) {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, format!("Message-ID: <{id}>\n\nbody\n")).unwrap();
    }

    fn tag_set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|t| t.to_string()).collect()
    }

    async fn run_phase(
        store_a: &mut IndexStore,
        store_b: &mut IndexStore,
        require_tag: bool,
    ) -> (u32, u32) {
        let (a, b) = tokio::io::duplex(1 << 20);
        let (ar, aw) = tokio::io::split(a);
        let (br, bw) = tokio::io::split(b);
        let ca = Arc::new(WireCounters::new());
        let cb = Arc::new(WireCounters::new());
        let mut ra = WireReader::new(ar, ca.clone());
        let mut wa = WireWriter::new(aw, ca);
        let mut rb = WireReader::new(br, cb.clone());
        let mut wb = WireWriter::new(bw, cb);

        let (da, db) = tokio::join!(
            deletion_initiator(store_a, &mut ra, &mut wa, require_tag),
            deletion_responder(store_b, &mut rb, &mut wb, require_tag),
        );
        (da.unwrap(), db.unwrap())
    }

    #[tokio::test]
    async fn tagged_messages_are_expunged_on_both_sides() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        write_mail(&dir_a, "cur/d.mail", "d@x");
        write_mail(&dir_b, "cur/d.mail", "d@x");

        let mut store_a = IndexStore::open(dir_a.path()).unwrap();
        let mut store_b = IndexStore::open(dir_b.path()).unwrap();
        store_a
            .set_tags("d@x", &tag_set(&["deleted", "unread", "inbox"]))
            .unwrap();
        store_b
            .set_tags("d@x", &tag_set(&["deleted", "unread", "inbox"]))
            .unwrap();

        let (da, db) = run_phase(&mut store_a, &mut store_b, true).await;
        assert_eq!((da, db), (1, 1));
        assert!(store_a.find("d@x").is_none());
        assert!(store_b.find("d@x").is_none());
        assert!(!dir_a.path().join("cur/d.mail").exists());
        assert!(!dir_b.path().join("cur/d.mail").exists());
    }

    #[tokio::test]
    async fn one_sided_absence_deletes_the_tagged_copy() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        // Only B still holds the message, tagged for deletion.
        write_mail(&dir_b, "cur/d.mail", "d@x");

        let mut store_a = IndexStore::open(dir_a.path()).unwrap();
        let mut store_b = IndexStore::open(dir_b.path()).unwrap();
        store_b
            .set_tags("d@x", &tag_set(&["deleted", "inbox"]))
            .unwrap();

        let (da, db) = run_phase(&mut store_a, &mut store_b, true).await;
        assert_eq!((da, db), (0, 1));
        assert!(store_b.find("d@x").is_none());
    }

    #[tokio::test]
    async fn untagged_candidates_survive_and_bump_revision() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        write_mail(&dir_b, "cur/k.mail", "k@x");

        let mut store_a = IndexStore::open(dir_a.path()).unwrap();
        let mut store_b = IndexStore::open(dir_b.path()).unwrap();
        let before = store_b.revision().rev;

        let (da, db) = run_phase(&mut store_a, &mut store_b, true).await;
        assert_eq!((da, db), (0, 0));
        assert!(store_b.find("k@x").is_some());
        // The retained message re-enters the next change set.
        assert!(store_b.revision().rev > before);
        assert!(!store_b
            .messages_since(before)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unsafe_mode_deletes_untagged_candidates() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        write_mail(&dir_b, "cur/k.mail", "k@x");

        let mut store_a = IndexStore::open(dir_a.path()).unwrap();
        let mut store_b = IndexStore::open(dir_b.path()).unwrap();

        let (da, db) = run_phase(&mut store_a, &mut store_b, false).await;
        assert_eq!((da, db), (0, 1));
        assert!(store_b.find("k@x").is_none());
    }

    #[tokio::test]
    async fn matching_populations_delete_nothing() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        write_mail(&dir_a, "cur/m.mail", "m@x");
        write_mail(&dir_b, "cur/m.mail", "m@x");

        let mut store_a = IndexStore::open(dir_a.path()).unwrap();
        let mut store_b = IndexStore::open(dir_b.path()).unwrap();

        let (da, db) = run_phase(&mut store_a, &mut store_b, true).await;
        assert_eq!((da, db), (0, 0));
        assert!(store_a.find("m@x").is_some());
        assert!(store_b.find("m@x").is_some());
    }
}
