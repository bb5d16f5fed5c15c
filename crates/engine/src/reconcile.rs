//! Per-message file reconciliation against content hashes.
//!
//! Remote file names missing locally are first matched against local files
//! by canonical digest: an identical body under a different name is a
//! rename or copy and never crosses the wire. Only names with no local
//! match are queued for transfer. Messages untouched locally also shed
//! duplicate files the remote no longer has.

use std::collections::BTreeSet;
use std::fs;

use protocol::ChangeSet;
use store::Store;
use tracing::{debug, info, warn};

use crate::error::SyncError;

/// One file to request from the peer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchEntry {
    /// Message the file belongs to.
    pub id: String,
    /// Root-relative name to write it under.
    pub name: String,
    /// Digest the body must hash to.
    pub sha: String,
}

/// What reconciliation decided and already did.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// Files that must be fetched from the peer, in deterministic order.
    pub fetch: Vec<FetchEntry>,
    /// Files materialized by local rename or copy.
    pub moves_copies: u32,
    /// Duplicate files unlinked locally.
    pub duplicates_removed: u32,
}

/// Reconciles the local file population of every message in the remote
/// change set.
///
/// `aggressive_move` selects the tie-break when a message also changed
/// locally: the initiator renames anyway, the responder copies so a
/// concurrent local rename is never undone. Exactly one side runs with it
/// set, which keeps the outcome stable regardless of which peer acts
/// first.
///
/// # Errors
///
/// Fails on store or filesystem errors, and with
/// [`SyncError::DivergentFileSet`] when a message untouched locally shares
/// no file names with the remote copy.
pub fn reconcile_files<S: Store>(
    store: &mut S,
    local: &ChangeSet,
    remote: &ChangeSet,
    aggressive_move: bool,
) -> Result<ReconcileOutcome, SyncError> {
    let mut out = ReconcileOutcome::default();
    let root = store.root().to_path_buf();

    for (id, theirs) in remote {
        let Some((_, local_names)) = store.find(id) else {
            // Nothing local: adopt every remote copy through transfer.
            for file in &theirs.files {
                out.fetch.push(FetchEntry {
                    id: id.clone(),
                    name: file.name.clone(),
                    sha: file.sha.clone(),
                });
            }
            continue;
        };

        let remote_names: BTreeSet<&str> = theirs.names().collect();
        // Working view of the local population; digests fill in lazily.
        let mut working: Vec<(String, Option<String>)> =
            local_names.into_iter().map(|name| (name, None)).collect();

        let missing: Vec<_> = theirs
            .files
            .iter()
            .filter(|file| !working.iter().any(|(name, _)| *name == file.name))
            .collect();

        if !missing.is_empty() {
            for (name, sha) in &mut working {
                match store.fingerprint(&root.join(name.as_str())) {
                    Ok(digest) => *sha = Some(digest),
                    Err(err) => {
                        warn!(file = %name, error = %err, "cannot hash local file, skipping");
                    }
                }
            }

            for file in missing {
                let matched = working
                    .iter()
                    .position(|(_, sha)| sha.as_deref() == Some(file.sha.as_str()));
                let Some(src_idx) = matched else {
                    out.fetch.push(FetchEntry {
                        id: id.clone(),
                        name: file.name.clone(),
                        sha: file.sha.clone(),
                    });
                    continue;
                };

                let (src_name, src_sha) = working[src_idx].clone();
                let src_abs = root.join(&src_name);
                let dst_abs = root.join(&file.name);
                if let Some(parent) = dst_abs.parent() {
                    fs::create_dir_all(parent)?;
                }

                // The remote holding both names means this is a genuine
                // copy. A message with concurrent local changes is also
                // copied on the conservative side: the source name may be
                // a local rename the peer has not seen yet.
                let genuine_copy = remote_names.contains(src_name.as_str());
                let conservative = local.contains_key(id) && !aggressive_move;

                if genuine_copy || conservative {
                    info!(from = %src_name, to = %file.name, "copying");
                    fs::copy(&src_abs, &dst_abs)?;
                    store.add_file(&dst_abs)?;
                    working.push((file.name.clone(), src_sha));
                } else {
                    info!(from = %src_name, to = %file.name, "moving");
                    fs::rename(&src_abs, &dst_abs)?;
                    store.add_file(&dst_abs)?;
                    store.remove_file(&src_abs)?;
                    working[src_idx] = (file.name.clone(), src_sha);
                }
                out.moves_copies += 1;
            }
        }

        // Duplicate cleanup only applies when the message saw no
        // concurrent local change.
        if !local.contains_key(id) {
            let keep: Vec<bool> = working
                .iter()
                .map(|(name, _)| remote_names.contains(name.as_str()))
                .collect();
            if !keep.iter().any(|kept| *kept) {
                return Err(SyncError::DivergentFileSet { id: id.clone() });
            }
            for ((name, _), kept) in working.iter().zip(keep) {
                if kept {
                    continue;
                }
                debug!(file = %name, "removing duplicate");
                let abs = root.join(name);
                store.remove_file(&abs)?;
                fs::remove_file(&abs)?;
                out.duplicates_removed += 1;
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    use checksums::content_digest;
    use protocol::{FileRecord, MessageRecord};
    use store::IndexStore;
    use tempfile::TempDir;

    fn mail(id: &str, body: &str) -> String {
        format!("Message-ID: <{id}>\n\n{body}\n")
    }

    fn write_mail(dir: &TempDir, rel: &str, id: &str, body: &str) -> String {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let content = mail(id, body);
        fs::write(&path, &content).unwrap();
        content_digest(content.as_bytes())
    }

    fn remote_record(files: &[(&str, &str)]) -> MessageRecord {
        MessageRecord {
            tags: BTreeSet::new(),
            files: files
                .iter()
                .map(|(name, sha)| FileRecord {
                    name: name.to_string(),
                    sha: sha.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn absent_message_fetches_every_file() {
        let dir = TempDir::new().unwrap();
        let mut store = IndexStore::open(dir.path()).unwrap();

        let mut remote = ChangeSet::new();
        let sha = content_digest(b"whatever");
        remote.insert(
            "new@x".to_string(),
            remote_record(&[("cur/a.mail", &sha), ("cur/b.mail", &sha)]),
        );

        let out = reconcile_files(&mut store, &ChangeSet::new(), &remote, true).unwrap();
        assert_eq!(out.fetch.len(), 2);
        assert_eq!(out.moves_copies, 0);
        assert_eq!(out.fetch[0].name, "cur/a.mail");
        assert_eq!(out.fetch[0].sha, sha);
    }

    #[test]
    fn rename_is_replayed_as_a_move() {
        let dir = TempDir::new().unwrap();
        let sha = write_mail(&dir, "new/r.mail", "r@x", "same body");
        let mut store = IndexStore::open(dir.path()).unwrap();

        // The peer renamed its copy to cur/ and does not list new/r.mail.
        let mut remote = ChangeSet::new();
        remote.insert("r@x".to_string(), remote_record(&[("cur/r.mail", &sha)]));

        let out = reconcile_files(&mut store, &ChangeSet::new(), &remote, true).unwrap();
        assert!(out.fetch.is_empty());
        assert_eq!(out.moves_copies, 1);
        assert!(dir.path().join("cur/r.mail").exists());
        assert!(!dir.path().join("new/r.mail").exists());

        let (_, files) = store.find("r@x").unwrap();
        assert_eq!(files, vec!["cur/r.mail".to_string()]);
    }

    #[test]
    fn source_listed_on_remote_means_copy() {
        let dir = TempDir::new().unwrap();
        let sha = write_mail(&dir, "cur/c.mail", "c@x", "copied body");
        let mut store = IndexStore::open(dir.path()).unwrap();

        // The peer holds both names, so the source must survive.
        let mut remote = ChangeSet::new();
        remote.insert(
            "c@x".to_string(),
            remote_record(&[("cur/c.mail", &sha), ("archive/cur/c.mail", &sha)]),
        );

        let out = reconcile_files(&mut store, &ChangeSet::new(), &remote, true).unwrap();
        assert!(out.fetch.is_empty());
        assert_eq!(out.moves_copies, 1);
        assert!(dir.path().join("cur/c.mail").exists());
        assert!(dir.path().join("archive/cur/c.mail").exists());

        let (_, files) = store.find("c@x").unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn concurrent_local_change_copies_on_the_conservative_side() {
        let dir = TempDir::new().unwrap();
        let sha = write_mail(&dir, "new/m.mail", "m@x", "body");
        let mut store = IndexStore::open(dir.path()).unwrap();

        let mut remote = ChangeSet::new();
        remote.insert("m@x".to_string(), remote_record(&[("cur/m.mail", &sha)]));
        let mut local = ChangeSet::new();
        local.insert("m@x".to_string(), remote_record(&[("new/m.mail", &sha)]));

        let out = reconcile_files(&mut store, &local, &remote, false).unwrap();
        assert_eq!(out.moves_copies, 1);
        // Conservative: the local source is preserved.
        assert!(dir.path().join("new/m.mail").exists());
        assert!(dir.path().join("cur/m.mail").exists());

        // The aggressive side would have moved instead.
        let dir2 = TempDir::new().unwrap();
        let sha2 = write_mail(&dir2, "new/m.mail", "m@x", "body");
        let mut store2 = IndexStore::open(dir2.path()).unwrap();
        let mut remote2 = ChangeSet::new();
        remote2.insert("m@x".to_string(), remote_record(&[("cur/m.mail", &sha2)]));
        let mut local2 = ChangeSet::new();
        local2.insert("m@x".to_string(), remote_record(&[("new/m.mail", &sha2)]));

        let out2 = reconcile_files(&mut store2, &local2, &remote2, true).unwrap();
        assert_eq!(out2.moves_copies, 1);
        assert!(!dir2.path().join("new/m.mail").exists());
    }

    #[test]
    fn unmatched_digests_are_queued_for_fetch() {
        let dir = TempDir::new().unwrap();
        let _ = write_mail(&dir, "cur/a.mail", "a@x", "old body");
        let mut store = IndexStore::open(dir.path()).unwrap();

        let other_sha = content_digest(b"completely different");
        let local_sha = store
            .fingerprint(&dir.path().join("cur/a.mail"))
            .unwrap();
        let mut remote = ChangeSet::new();
        remote.insert(
            "a@x".to_string(),
            remote_record(&[("cur/a.mail", &local_sha), ("cur/b.mail", &other_sha)]),
        );

        let out = reconcile_files(&mut store, &ChangeSet::new(), &remote, true).unwrap();
        assert_eq!(out.moves_copies, 0);
        assert_eq!(out.fetch.len(), 1);
        assert_eq!(out.fetch[0].name, "cur/b.mail");
    }

    #[test]
    fn duplicates_not_on_remote_are_removed() {
        let dir = TempDir::new().unwrap();
        let sha = write_mail(&dir, "cur/keep.mail", "d@x", "body");
        let _ = write_mail(&dir, "cur/extra.mail", "d@x", "body");
        let mut store = IndexStore::open(dir.path()).unwrap();

        let mut remote = ChangeSet::new();
        remote.insert("d@x".to_string(), remote_record(&[("cur/keep.mail", &sha)]));

        let out = reconcile_files(&mut store, &ChangeSet::new(), &remote, true).unwrap();
        assert_eq!(out.duplicates_removed, 1);
        assert!(dir.path().join("cur/keep.mail").exists());
        assert!(!dir.path().join("cur/extra.mail").exists());

        let (_, files) = store.find("d@x").unwrap();
        assert_eq!(files, vec!["cur/keep.mail".to_string()]);
    }

    #[test]
    fn locally_changed_messages_keep_their_extra_files() {
        let dir = TempDir::new().unwrap();
        let sha = write_mail(&dir, "cur/keep.mail", "d@x", "body");
        let _ = write_mail(&dir, "cur/extra.mail", "d@x", "body");
        let mut store = IndexStore::open(dir.path()).unwrap();

        let mut remote = ChangeSet::new();
        remote.insert("d@x".to_string(), remote_record(&[("cur/keep.mail", &sha)]));
        let mut local = ChangeSet::new();
        local.insert("d@x".to_string(), remote_record(&[("cur/extra.mail", &sha)]));

        let out = reconcile_files(&mut store, &local, &remote, false).unwrap();
        assert_eq!(out.duplicates_removed, 0);
        assert!(dir.path().join("cur/extra.mail").exists());
    }

    #[test]
    fn fully_disjoint_file_sets_are_fatal() {
        let dir = TempDir::new().unwrap();
        let _ = write_mail(&dir, "cur/local.mail", "x@x", "local version");
        let mut store = IndexStore::open(dir.path()).unwrap();

        let foreign = content_digest(b"unrelated content");
        let mut remote = ChangeSet::new();
        remote.insert(
            "x@x".to_string(),
            remote_record(&[("cur/remote.mail", &foreign)]),
        );

        let err = reconcile_files(&mut store, &ChangeSet::new(), &remote, true).unwrap_err();
        assert!(matches!(err, SyncError::DivergentFileSet { .. }));
    }
}
