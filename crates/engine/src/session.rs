//! Session orchestration.
//!
//! Both roles walk the same phase sequence; the differences are confined
//! to the reconciliation tie-break, which deletion/sidecar variant runs,
//! and which direction the final counters travel. Every both-ways
//! exchange is two concurrent sub-tasks joined before the next phase.

use std::sync::Arc;

use protocol::{
    decode_changeset, encode_changeset, SyncCounters, WireCounters, WireReader, WireWriter,
};
use store::{bookmark_path, state, Store, SyncState};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::changes::{build_changeset, load_bookmark};
use crate::deletes::{deletion_initiator, deletion_responder};
use crate::error::SyncError;
use crate::reconcile::reconcile_files;
use crate::sidecar::{sidecar_initiator, sidecar_responder};
use crate::tags::merge_tags;
use crate::transfer::transfer_files;

/// Which optional phases a session runs.
#[derive(Clone, Copy, Debug)]
pub struct SyncOptions {
    /// Run the coordinated deletion phase.
    pub deletion: bool,
    /// In the deletion phase, only remove messages tagged `deleted`.
    pub require_deleted_tag: bool,
    /// Run the maildir-state sidecar phase.
    pub sidecar: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            deletion: false,
            require_deleted_tag: true,
            sidecar: false,
        }
    }
}

/// Outcome of one completed session.
#[derive(Debug)]
pub struct SyncReport {
    /// Work this side performed.
    pub local: SyncCounters,
    /// Work the peer reported; only the initiator receives this.
    pub remote: Option<SyncCounters>,
    /// Bytes read from the peer stream.
    pub bytes_read: u64,
    /// Bytes written to the peer stream.
    pub bytes_written: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Role {
    Initiator,
    Responder,
}

/// Drives a full session as the initiator (the side that spawned the
/// peer). Returns the local and remote counters.
///
/// # Errors
///
/// Any fatal [`SyncError`]; the bookmark survives only if the failure
/// happened after the checkpoint.
pub async fn run_initiator<S, R, W>(
    store: &mut S,
    read_half: R,
    write_half: W,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError>
where
    S: Store,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    run_session(store, read_half, write_half, options, Role::Initiator).await
}

/// Drives a full session as the responder (the spawned side, speaking
/// over its standard streams).
///
/// # Errors
///
/// Any fatal [`SyncError`].
pub async fn run_responder<S, R, W>(
    store: &mut S,
    read_half: R,
    write_half: W,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError>
where
    S: Store,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    run_session(store, read_half, write_half, options, Role::Responder).await
}

async fn run_session<S, R, W>(
    store: &mut S,
    read_half: R,
    write_half: W,
    options: &SyncOptions,
    role: Role,
) -> Result<SyncReport, SyncError>
where
    S: Store,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let wire = Arc::new(WireCounters::new());
    let mut reader = WireReader::new(read_half, wire.clone());
    let mut writer = WireWriter::new(write_half, wire.clone());
    let mut counters = SyncCounters::default();

    let revision = store.revision();
    debug!(uuid = %revision.uuid, rev = revision.rev, "exchanging store identities");
    let (sent, peer_uuid) = tokio::join!(writer.write_uuid(&revision.uuid), reader.read_uuid());
    sent?;
    let peer_uuid = peer_uuid?;

    // An incompatible bookmark aborts here, before any mutation.
    let state_path = bookmark_path(store.root(), &peer_uuid);
    let previous = load_bookmark(store, &state_path)?;

    let local_changes = build_changeset(store, previous.as_ref())?;
    info!(changed = local_changes.len(), "exchanging change sets");
    let encoded = encode_changeset(&local_changes)?;
    let (sent, received) = tokio::join!(writer.write_frame(&encoded), reader.read_frame());
    sent?;
    let remote_changes = decode_changeset(&received?)?;
    debug!(remote_changed = remote_changes.len(), "change sets exchanged");

    counters.tag_changes = merge_tags(store, &local_changes, &remote_changes)?;

    let reconciled = reconcile_files(
        store,
        &local_changes,
        &remote_changes,
        role == Role::Initiator,
    )?;
    counters.moves_copies = reconciled.moves_copies;
    counters.duplicate_files = reconciled.duplicates_removed;

    let transferred = transfer_files(
        store,
        &mut reader,
        &mut writer,
        &remote_changes,
        &reconciled.fetch,
    )
    .await?;
    counters.new_messages = transferred.new_messages;
    counters.new_files = transferred.new_files;

    // Checkpoint. Tag application and adoption advanced the revision, so
    // re-read it; the optional phases below are idempotent on replay.
    let now = store.revision();
    info!(rev = now.rev, "recording sync state");
    state::save(
        &state_path,
        &SyncState {
            rev: now.rev,
            uuid: now.uuid,
        },
    )?;

    if options.deletion {
        counters.deleted_messages = match role {
            Role::Initiator => {
                deletion_initiator(store, &mut reader, &mut writer, options.require_deleted_tag)
                    .await?
            }
            Role::Responder => {
                deletion_responder(store, &mut reader, &mut writer, options.require_deleted_tag)
                    .await?
            }
        };
    }

    if options.sidecar {
        match role {
            Role::Initiator => sidecar_initiator(store.root(), &mut reader, &mut writer).await?,
            Role::Responder => sidecar_responder(store.root(), &mut reader, &mut writer).await?,
        }
    }

    let remote = match role {
        Role::Initiator => Some(reader.read_counters().await?),
        Role::Responder => {
            writer.write_counters(&counters).await?;
            None
        }
    };

    Ok(SyncReport {
        local: counters,
        remote,
        bytes_read: wire.bytes_read(),
        bytes_written: wire.bytes_written(),
    })
}
