//! Self-contained index backend over a maildir tree.
//!
//! The index is a JSON snapshot at `<root>/.notmuch/index.json` holding the
//! store UUID, the revision counter, and per-message tags, file names, and
//! last-modified revisions. Opening the store reconciles the snapshot with
//! the tree: files that vanished are detached, unindexed mail is ingested.
//! Every mutation bumps the revision, stamps the touched message, and
//! persists the snapshot with a rename so readers never observe a torn
//! index.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ffi::OsStr;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use checksums::{content_digest, FingerprintCache};
use protocol::{FileRecord, MessageRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::{DirEntry, WalkDir};

use crate::maildir;
use crate::{Revision, Store, StoreError};

const INDEX_DIR: &str = ".notmuch";
const INDEX_FILE: &str = "index.json";

#[derive(Debug, Deserialize, Serialize)]
struct Snapshot {
    uuid: String,
    rev: u64,
    messages: BTreeMap<String, Entry>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
struct Entry {
    tags: BTreeSet<String>,
    files: Vec<String>,
    lastmod: u64,
}

impl Entry {
    fn is_ghost(&self) -> bool {
        self.files.is_empty()
    }
}

/// Concrete [`Store`] backend indexing a maildir tree.
pub struct IndexStore {
    root: PathBuf,
    snapshot: Snapshot,
    /// Root-relative file name to owning message id.
    by_file: HashMap<String, String>,
    cache: FingerprintCache,
    dirty: bool,
}

impl IndexStore {
    /// Opens (or creates) the store rooted at `root` and reconciles the
    /// index with the on-disk tree.
    ///
    /// # Errors
    ///
    /// Returns an error when the root is unusable or the snapshot is
    /// corrupt.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        fs::create_dir_all(root.as_ref())?;
        let root = root.as_ref().canonicalize()?;

        let index_path = root.join(INDEX_DIR).join(INDEX_FILE);
        let mut created = false;
        let snapshot = match fs::read(&index_path) {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|source| StoreError::CorruptIndex {
                path: index_path.clone(),
                source,
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                created = true;
                Snapshot {
                    uuid: Uuid::new_v4().to_string(),
                    rev: 0,
                    messages: BTreeMap::new(),
                }
            }
            Err(err) => return Err(err.into()),
        };

        let mut by_file = HashMap::new();
        for (id, entry) in &snapshot.messages {
            for name in &entry.files {
                by_file.insert(name.clone(), id.clone());
            }
        }

        let mut store = Self {
            root,
            snapshot,
            by_file,
            cache: FingerprintCache::new(),
            // A fresh snapshot is persisted even when the tree is empty,
            // pinning the store UUID for its lifetime.
            dirty: created,
        };
        store.refresh()?;
        Ok(store)
    }

    /// Brings the index in line with the maildir tree: detaches files that
    /// no longer exist and ingests mail the index has not seen.
    fn refresh(&mut self) -> Result<(), StoreError> {
        let on_disk = self.scan_tree()?;

        let stale: Vec<String> = self
            .by_file
            .keys()
            .filter(|name| !on_disk.contains(*name))
            .cloned()
            .collect();
        for name in stale {
            debug!(file = %name, "detaching vanished file");
            self.detach(&name);
        }

        for name in on_disk {
            if !self.by_file.contains_key(&name) {
                if let Err(err) = self.ingest(&name) {
                    warn!(file = %name, error = %err, "skipping unreadable mail file");
                }
            }
        }

        self.persist_if_dirty()
    }

    fn scan_tree(&self) -> Result<BTreeSet<String>, StoreError> {
        fn hidden(entry: &DirEntry) -> bool {
            entry.depth() > 0
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with('.'))
        }

        let mut found = BTreeSet::new();
        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| !hidden(e))
        {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let parent = entry
                .path()
                .parent()
                .and_then(Path::file_name)
                .and_then(OsStr::to_str);
            if !matches!(parent, Some("cur" | "new")) {
                continue;
            }
            if let Ok(rel) = self.rel_name(entry.path()) {
                found.insert(rel);
            }
        }
        Ok(found)
    }

    /// Links one on-disk file into the index without persisting.
    fn ingest(&mut self, rel: &str) -> Result<(String, bool), StoreError> {
        let data = fs::read(self.root.join(rel))?;
        let id = maildir::extract_message_id(&data)
            .unwrap_or_else(|| format!("nm-sha-{}", content_digest(&data)));

        let rev = self.snapshot.rev + 1;
        let entry = self.snapshot.messages.entry(id.clone()).or_default();
        let was_live = !entry.is_ghost();

        if entry.files.iter().any(|name| name == rel) {
            return Ok((id, true));
        }

        if !was_live {
            entry.tags = maildir::tags_for_name(rel);
        }
        entry.files.push(rel.to_string());
        entry.lastmod = rev;
        self.snapshot.rev = rev;
        self.by_file.insert(rel.to_string(), id.clone());
        self.dirty = true;
        Ok((id, was_live))
    }

    /// Unlinks one file name from the index without persisting. Unknown
    /// names are ignored.
    fn detach(&mut self, rel: &str) {
        let Some(id) = self.by_file.remove(rel) else {
            return;
        };
        let rev = self.snapshot.rev + 1;
        if let Some(entry) = self.snapshot.messages.get_mut(&id) {
            entry.files.retain(|name| name != rel);
            entry.lastmod = rev;
            self.snapshot.rev = rev;
            self.dirty = true;
        }
    }

    fn rel_name(&self, path: &Path) -> Result<String, StoreError> {
        let rel = path
            .strip_prefix(&self.root)
            .map_err(|_| StoreError::OutsideRoot {
                path: path.to_path_buf(),
            })?;
        rel.to_str()
            .map(str::to_string)
            .ok_or_else(|| StoreError::OutsideRoot {
                path: path.to_path_buf(),
            })
    }

    fn persist_if_dirty(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        let dir = self.root.join(INDEX_DIR);
        fs::create_dir_all(&dir)?;
        let raw = serde_json::to_vec_pretty(&self.snapshot)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&raw)?;
        tmp.persist(dir.join(INDEX_FILE))
            .map_err(|err| StoreError::Io(err.error))?;
        self.dirty = false;
        Ok(())
    }
}

impl Store for IndexStore {
    fn revision(&self) -> Revision {
        Revision {
            rev: self.snapshot.rev,
            uuid: self.snapshot.uuid.clone(),
        }
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn messages_since(&mut self, rev: u64) -> Result<Vec<(String, MessageRecord)>, StoreError> {
        let mut out = Vec::new();
        for (id, entry) in &self.snapshot.messages {
            if entry.lastmod <= rev || entry.is_ghost() {
                continue;
            }
            let mut files = Vec::with_capacity(entry.files.len());
            for name in &entry.files {
                match self.cache.digest_file(&self.root.join(name)) {
                    Ok(sha) => files.push(FileRecord {
                        name: name.clone(),
                        sha,
                    }),
                    Err(err) => {
                        warn!(file = %name, error = %err, "file vanished while hashing");
                    }
                }
            }
            if files.is_empty() {
                continue;
            }
            out.push((
                id.clone(),
                MessageRecord {
                    tags: entry.tags.clone(),
                    files,
                },
            ));
        }
        Ok(out)
    }

    fn all_ids(&self) -> Vec<String> {
        self.snapshot
            .messages
            .iter()
            .filter(|(_, entry)| !entry.is_ghost())
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn find(&self, id: &str) -> Option<(BTreeSet<String>, Vec<String>)> {
        let entry = self.snapshot.messages.get(id)?;
        if entry.is_ghost() {
            return None;
        }
        Some((entry.tags.clone(), entry.files.clone()))
    }

    fn set_tags(&mut self, id: &str, tags: &BTreeSet<String>) -> Result<(), StoreError> {
        let entry = self
            .snapshot
            .messages
            .get(id)
            .filter(|entry| !entry.is_ghost())
            .ok_or_else(|| StoreError::UnknownMessage { id: id.to_string() })?;

        let flags = maildir::flags_for_tags(tags);
        let renames: Vec<(String, String)> = entry
            .files
            .iter()
            .filter_map(|name| {
                let target = maildir::name_with_flags(name, &flags);
                (target != *name).then(|| (name.clone(), target))
            })
            .collect();

        if renames.is_empty() && entry.tags == *tags {
            return Ok(());
        }

        for (from, to) in &renames {
            let to_abs = self.root.join(to);
            if let Some(parent) = to_abs.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(self.root.join(from), to_abs)?;
        }

        let rev = self.snapshot.rev + 1;
        let entry = self
            .snapshot
            .messages
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownMessage { id: id.to_string() })?;
        entry.tags = tags.clone();
        for (from, to) in &renames {
            for name in &mut entry.files {
                if name == from {
                    *name = to.clone();
                }
            }
            self.by_file.remove(from);
            self.by_file.insert(to.clone(), id.to_string());
        }
        entry.lastmod = rev;
        self.snapshot.rev = rev;
        self.dirty = true;
        self.persist_if_dirty()
    }

    fn add_file(&mut self, path: &Path) -> Result<(String, bool), StoreError> {
        let rel = self.rel_name(path)?;
        let result = self.ingest(&rel)?;
        self.persist_if_dirty()?;
        Ok(result)
    }

    fn remove_file(&mut self, path: &Path) -> Result<(), StoreError> {
        let rel = self.rel_name(path)?;
        self.detach(&rel);
        self.persist_if_dirty()
    }

    fn fingerprint(&mut self, path: &Path) -> Result<String, StoreError> {
        Ok(self.cache.digest_file(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn mail(id: &str, body: &str) -> String {
        format!("From: sender@example.com\nMessage-ID: <{id}>\nSubject: test\n\n{body}\n")
    }

    fn write_mail(root: &Path, rel: &str, id: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, mail(id, body)).unwrap();
    }

    #[test]
    fn open_ingests_existing_mail() {
        let dir = TempDir::new().unwrap();
        write_mail(dir.path(), "cur/a.mail", "a@x", "hello");
        write_mail(dir.path(), "new/b.mail", "b@x", "world");

        let mut store = IndexStore::open(dir.path()).unwrap();
        assert_eq!(store.all_ids(), vec!["a@x", "b@x"]);
        assert!(store.revision().rev >= 2);

        let since = store.messages_since(0).unwrap();
        assert_eq!(since.len(), 2);
        let (_, record) = &since[0];
        assert_eq!(record.files[0].name, "cur/a.mail");
        assert_eq!(record.files[0].sha, content_digest(mail("a@x", "hello").as_bytes()));
    }

    #[test]
    fn uuid_survives_reopen_but_not_rebuild() {
        let dir = TempDir::new().unwrap();
        let first = IndexStore::open(dir.path()).unwrap().revision().uuid;
        let second = IndexStore::open(dir.path()).unwrap().revision().uuid;
        assert_eq!(first, second);

        fs::remove_dir_all(dir.path().join(".notmuch")).unwrap();
        let rebuilt = IndexStore::open(dir.path()).unwrap().revision().uuid;
        assert_ne!(first, rebuilt);
    }

    #[test]
    fn duplicate_message_id_links_to_one_message() {
        let dir = TempDir::new().unwrap();
        write_mail(dir.path(), "cur/one.mail", "dup@x", "same");
        let mut store = IndexStore::open(dir.path()).unwrap();

        write_mail(dir.path(), "cur/two.mail", "dup@x", "same");
        let (id, duplicate) = store.add_file(&dir.path().join("cur/two.mail")).unwrap();
        assert_eq!(id, "dup@x");
        assert!(duplicate);

        let (_, files) = store.find("dup@x").unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn adding_the_same_file_twice_is_idempotent() {
        let dir = TempDir::new().unwrap();
        write_mail(dir.path(), "cur/a.mail", "a@x", "x");
        let mut store = IndexStore::open(dir.path()).unwrap();
        let rev = store.revision().rev;

        let (_, duplicate) = store.add_file(&dir.path().join("cur/a.mail")).unwrap();
        assert!(duplicate);
        assert_eq!(store.revision().rev, rev);
    }

    #[test]
    fn removing_the_last_file_leaves_a_ghost() {
        let dir = TempDir::new().unwrap();
        write_mail(dir.path(), "cur/a.mail", "a@x", "x");
        let mut store = IndexStore::open(dir.path()).unwrap();

        store.remove_file(&dir.path().join("cur/a.mail")).unwrap();
        assert!(store.find("a@x").is_none());
        assert!(store.all_ids().is_empty());

        // The ghost is also invisible to change-set computation.
        assert!(store.messages_since(0).unwrap().is_empty());
    }

    #[test]
    fn set_tags_renames_files_to_match_flags() {
        let dir = TempDir::new().unwrap();
        write_mail(dir.path(), "new/a.mail", "a@x", "x");
        let mut store = IndexStore::open(dir.path()).unwrap();

        let tags: BTreeSet<String> = ["inbox", "flagged"].iter().map(|t| t.to_string()).collect();
        store.set_tags("a@x", &tags).unwrap();

        let (_, files) = store.find("a@x").unwrap();
        assert_eq!(files, vec!["cur/a.mail:2,FS".to_string()]);
        assert!(dir.path().join("cur/a.mail:2,FS").exists());
        assert!(!dir.path().join("new/a.mail").exists());
    }

    #[test]
    fn set_tags_bumps_revision_and_lastmod() {
        let dir = TempDir::new().unwrap();
        write_mail(dir.path(), "cur/a.mail", "a@x", "x");
        let mut store = IndexStore::open(dir.path()).unwrap();
        let before = store.revision().rev;

        let tags: BTreeSet<String> = ["archived"].iter().map(|t| t.to_string()).collect();
        store.set_tags("a@x", &tags).unwrap();
        assert!(store.revision().rev > before);

        let since = store.messages_since(before).unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].1.tags, tags);
    }

    #[test]
    fn set_tags_on_missing_message_fails() {
        let dir = TempDir::new().unwrap();
        let mut store = IndexStore::open(dir.path()).unwrap();
        let err = store.set_tags("ghost@x", &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, StoreError::UnknownMessage { .. }));
    }

    #[test]
    fn reopen_detects_externally_deleted_files() {
        let dir = TempDir::new().unwrap();
        write_mail(dir.path(), "cur/a.mail", "a@x", "x");
        {
            let _ = IndexStore::open(dir.path()).unwrap();
        }

        fs::remove_file(dir.path().join("cur/a.mail")).unwrap();
        let store = IndexStore::open(dir.path()).unwrap();
        assert!(store.find("a@x").is_none());
    }

    #[test]
    fn messages_without_id_header_get_a_digest_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cur/anon.mail");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "Subject: no id\n\nbody\n").unwrap();

        let store = IndexStore::open(dir.path()).unwrap();
        let ids = store.all_ids();
        assert_eq!(ids.len(), 1);
        assert!(ids[0].starts_with("nm-sha-"));
    }

    #[test]
    fn tmp_and_hidden_files_are_not_indexed() {
        let dir = TempDir::new().unwrap();
        write_mail(dir.path(), "cur/a.mail", "a@x", "x");
        fs::create_dir_all(dir.path().join("tmp")).unwrap();
        fs::write(dir.path().join("tmp/partial"), "x").unwrap();
        fs::write(dir.path().join(".mbsyncstate"), "state").unwrap();

        let store = IndexStore::open(dir.path()).unwrap();
        assert_eq!(store.all_ids(), vec!["a@x"]);
    }
}
