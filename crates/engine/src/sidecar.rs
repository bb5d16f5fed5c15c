//! Maildir-state sidecar exchange.
//!
//! IMAP synchronizers drop small state files (`.uidvalidity`,
//! `.mbsyncstate`) next to each maildir folder. They are opaque blobs
//! whose authoritative ordering is their modification time, so each run
//! simply ships the newer copy in each direction and overwrites the older
//! one unconditionally.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use protocol::changeset::validate_rel_path;
use protocol::{WireReader, WireWriter};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::SyncError;

/// Basenames that are treated as sidecar state.
const SIDECAR_NAMES: [&str; 2] = [".uidvalidity", ".mbsyncstate"];

/// Maps root-relative sidecar names to mtime seconds.
type SidecarMap = BTreeMap<String, u64>;

/// Runs the sidecar phase on the initiator side.
///
/// Receives the responder's map, decides what to pull (remote newer or
/// remote only) and push (local newer or local only), announces both
/// lists, then exchanges the bodies concurrently. Pulled files are
/// stamped with the responder's advertised mtime so the next comparison
/// sees both sides in agreement.
///
/// # Errors
///
/// Fatal on stream or filesystem failure.
pub async fn sidecar_initiator<R, W>(
    root: &Path,
    reader: &mut WireReader<R>,
    writer: &mut WireWriter<W>,
) -> Result<(), SyncError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let local = collect_sidecars(root)?;
    let remote: SidecarMap = serde_json::from_slice(&reader.read_frame().await?)?;
    for name in remote.keys() {
        validate_rel_path(name)?;
    }

    let pull: Vec<String> = remote
        .iter()
        .filter(|(name, &their_mtime)| match local.get(*name) {
            Some(&our_mtime) => their_mtime > our_mtime,
            None => true,
        })
        .map(|(name, _)| name.clone())
        .collect();
    let push: Vec<String> = local
        .iter()
        .filter(|(name, &our_mtime)| match remote.get(*name) {
            Some(&their_mtime) => our_mtime > their_mtime,
            None => true,
        })
        .map(|(name, _)| name.clone())
        .collect();

    info!(pull = pull.len(), push = push.len(), "exchanging sidecar state");
    writer.write_frame(&serde_json::to_vec(&pull)?).await?;
    writer.write_frame(&serde_json::to_vec(&push)?).await?;

    let send = async {
        for name in &push {
            let body = tokio::fs::read(root.join(name)).await?;
            writer.write_frame(&body).await?;
        }
        Ok::<(), SyncError>(())
    };
    let recv = async {
        for name in &pull {
            let body = reader.read_frame().await?;
            write_sidecar(root, name, &body).await?;
            if let Some(&mtime) = remote.get(name) {
                filetime::set_file_mtime(
                    root.join(name),
                    FileTime::from_unix_time(mtime as i64, 0),
                )?;
            }
        }
        Ok::<(), SyncError>(())
    };
    let (sent, received) = tokio::join!(send, recv);
    sent?;
    received
}

/// Runs the sidecar phase on the responder side.
///
/// Sends the local map, reads the pull list (names to send) and the push
/// list (names to receive), then exchanges the bodies concurrently.
///
/// # Errors
///
/// Fatal on stream or filesystem failure.
pub async fn sidecar_responder<R, W>(
    root: &Path,
    reader: &mut WireReader<R>,
    writer: &mut WireWriter<W>,
) -> Result<(), SyncError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let local = collect_sidecars(root)?;
    writer.write_frame(&serde_json::to_vec(&local)?).await?;

    let to_send: Vec<String> = serde_json::from_slice(&reader.read_frame().await?)?;
    let to_receive: Vec<String> = serde_json::from_slice(&reader.read_frame().await?)?;
    for name in to_send.iter().chain(&to_receive) {
        validate_rel_path(name)?;
    }

    let send = async {
        for name in &to_send {
            let body = tokio::fs::read(root.join(name)).await?;
            writer.write_frame(&body).await?;
        }
        Ok::<(), SyncError>(())
    };
    let recv = async {
        for name in &to_receive {
            let body = reader.read_frame().await?;
            write_sidecar(root, name, &body).await?;
        }
        Ok::<(), SyncError>(())
    };
    let (sent, received) = tokio::join!(send, recv);
    sent?;
    received
}

/// Enumerates sidecar files under the root with mtime seconds.
fn collect_sidecars(root: &Path) -> Result<SidecarMap, SyncError> {
    let mut map = SidecarMap::new();
    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".notmuch")
    {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !SIDECAR_NAMES.contains(&name) {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let Some(rel) = rel.to_str() else {
            continue;
        };
        let meta = entry.metadata().map_err(std::io::Error::from)?;
        let mtime = FileTime::from_last_modification_time(&meta);
        map.insert(rel.to_string(), mtime.unix_seconds().max(0) as u64);
    }
    debug!(files = map.len(), "collected sidecar state");
    Ok(map)
}

/// Overwrites a sidecar file unconditionally, via temp file + rename.
async fn write_sidecar(root: &Path, name: &str, body: &[u8]) -> Result<(), SyncError> {
    let dest = root.join(name);
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = partial_sidecar_path(&dest);
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, &dest).await?;
    Ok(())
}

fn partial_sidecar_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!("{name}.partial"))
}
