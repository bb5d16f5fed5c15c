//! Shared fixtures for the session integration tests.
//!
//! Each test wires two real [`IndexStore`]s through an in-memory duplex
//! stream and runs a complete initiator + responder session over it, so
//! the full wire protocol is exercised end to end.

#![allow(dead_code)] // Helpers are shared across several test binaries.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use engine::{run_initiator, run_responder, SyncError, SyncOptions, SyncReport};
use store::IndexStore;
use tempfile::TempDir;

/// One peer: a maildir root plus its open store.
pub struct Peer {
    pub dir: TempDir,
    pub store: IndexStore,
}

impl Peer {
    /// Creates an empty store.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create peer directory");
        let store = IndexStore::open(dir.path()).expect("open store");
        Self { dir, store }
    }

    /// Creates a store seeded with `(rel, id, body)` mail files.
    pub fn with_mail(mail: &[(&str, &str, &str)]) -> Self {
        let dir = TempDir::new().expect("create peer directory");
        for (rel, id, body) in mail {
            write_mail(dir.path(), rel, id, body);
        }
        let store = IndexStore::open(dir.path()).expect("open store");
        Self { dir, store }
    }

    /// Reopens the store, as a fresh process would.
    pub fn reopen(&mut self) {
        self.store = IndexStore::open(self.dir.path()).expect("reopen store");
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn tags_of(&self, id: &str) -> Option<BTreeSet<String>> {
        use store::Store;
        self.store.find(id).map(|(tags, _)| tags)
    }

    pub fn files_of(&self, id: &str) -> Option<Vec<String>> {
        use store::Store;
        self.store.find(id).map(|(_, files)| files)
    }

    pub fn set_tags(&mut self, id: &str, tags: &[&str]) {
        use store::Store;
        let tags: BTreeSet<String> = tags.iter().map(|t| t.to_string()).collect();
        self.store.set_tags(id, &tags).expect("set tags");
    }
}

/// Writes a mail file with the given Message-ID and body.
pub fn write_mail(root: &Path, rel: &str, id: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("mail file has a parent")).expect("create maildir");
    fs::write(&path, mail_content(id, body)).expect("write mail file");
}

/// The canonical content for a test message.
pub fn mail_content(id: &str, body: &str) -> String {
    format!("From: sender@example.com\nMessage-ID: <{id}>\nSubject: test\n\n{body}")
}

/// Runs one full session between the two peers and returns both results
/// (initiator first).
pub async fn sync(
    initiator: &mut Peer,
    responder: &mut Peer,
    options: &SyncOptions,
) -> (Result<SyncReport, SyncError>, Result<SyncReport, SyncError>) {
    let (a, b) = tokio::io::duplex(1 << 20);
    let (ar, aw) = tokio::io::split(a);
    let (br, bw) = tokio::io::split(b);
    tokio::join!(
        run_initiator(&mut initiator.store, ar, aw, options),
        run_responder(&mut responder.store, br, bw, options),
    )
}

/// Runs one session and unwraps both sides.
pub async fn sync_ok(
    initiator: &mut Peer,
    responder: &mut Peer,
    options: &SyncOptions,
) -> (SyncReport, SyncReport) {
    let (a, b) = sync(initiator, responder, options).await;
    (a.expect("initiator session"), b.expect("responder session"))
}

/// Tag-set literal.
pub fn tags(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|t| t.to_string()).collect()
}
