//! Symmetric file body exchange.
//!
//! Phase A swaps the request lists, phase B the bodies, both full duplex:
//! each peer sends what the other asked for while receiving what it asked
//! for itself, in the exact order the names traveled. Received bodies are
//! verified against the digest the change set promised before anything is
//! written, and writes go through a temp file plus rename so a crash never
//! leaves a torn mail file.

use std::path::{Path, PathBuf};

use checksums::content_digest;
use protocol::changeset::validate_rel_path;
use protocol::{ChangeSet, WireReader, WireWriter};
use store::Store;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::error::SyncError;
use crate::reconcile::FetchEntry;

/// What the receiving side adopted.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct TransferOutcome {
    /// Messages seen for the first time.
    pub new_messages: u32,
    /// File bodies accepted from the peer.
    pub new_files: u32,
}

/// Runs the two transfer phases against the peer.
///
/// `remote` provides the authoritative tag sets installed on messages
/// adopted here for the first time; that cannot race the tag merge, which
/// skipped ids it could not find locally.
///
/// # Errors
///
/// Fatal on stream failure, digest mismatch, an existing destination with
/// different content, or a requested file missing locally.
pub async fn transfer_files<S, R, W>(
    store: &mut S,
    reader: &mut WireReader<R>,
    writer: &mut WireWriter<W>,
    remote: &ChangeSet,
    fetch: &[FetchEntry],
) -> Result<TransferOutcome, SyncError>
where
    S: Store,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let root = store.root().to_path_buf();

    // Phase A: request lists, both directions at once.
    let wanted: Vec<String> = fetch.iter().map(|entry| entry.name.clone()).collect();
    info!(requesting = wanted.len(), "exchanging transfer lists");
    let (sent, to_send) = tokio::join!(writer.write_name_list(&wanted), reader.read_name_list());
    sent?;
    let to_send = to_send?;
    for name in &to_send {
        validate_rel_path(name)?;
    }

    // Phase B: bodies, both directions at once, in list order.
    info!(sending = to_send.len(), receiving = fetch.len(), "exchanging file bodies");
    let send_bodies = async {
        for name in &to_send {
            let path = root.join(name);
            let body = match tokio::fs::read(&path).await {
                Ok(body) => body,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    return Err(SyncError::MissingSource { path });
                }
                Err(err) => return Err(err.into()),
            };
            debug!(file = %name, bytes = body.len(), "sending body");
            writer.write_frame(&body).await?;
        }
        Ok::<(), SyncError>(())
    };
    let recv_bodies = async {
        let mut outcome = TransferOutcome::default();
        for entry in fetch {
            let body = reader.read_frame().await?;
            let digest = content_digest(&body);
            if digest != entry.sha {
                return Err(SyncError::HashMismatch {
                    name: entry.name.clone(),
                    expected: entry.sha.clone(),
                    actual: digest,
                });
            }

            let dest = root.join(&entry.name);
            write_verified(&dest, &body, &digest).await?;
            outcome.new_files += 1;

            let (id, duplicate) = store.add_file(&dest)?;
            if !duplicate {
                outcome.new_messages += 1;
                if let Some(record) = remote.get(&entry.id) {
                    // First file of a new message: its tags arrive with it.
                    store.set_tags(&id, &record.tags)?;
                }
            }
        }
        Ok::<TransferOutcome, SyncError>(outcome)
    };

    let (sent, outcome) = tokio::join!(send_bodies, recv_bodies);
    sent?;
    outcome
}

/// Writes `body` to `dest` atomically, tolerating an identical existing
/// file and refusing a divergent one.
async fn write_verified(dest: &Path, body: &[u8], digest: &str) -> Result<(), SyncError> {
    match tokio::fs::read(dest).await {
        Ok(existing) => {
            if content_digest(&existing) != digest {
                return Err(SyncError::OverwriteConflict {
                    path: dest.to_path_buf(),
                });
            }
            // Same content already on disk, nothing to write.
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let tmp = partial_path(dest);
            tokio::fs::write(&tmp, body).await?;
            tokio::fs::rename(&tmp, dest).await?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// Hidden sibling used while a body lands; hidden names are invisible to
/// the store's tree scan, so an interrupted write is never indexed.
fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.partial"))
}
