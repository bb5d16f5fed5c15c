#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! The synchronization core.
//!
//! One session walks both peers through the same sequence: exchange store
//! identities, exchange change sets, merge tags by union, reconcile file
//! populations against content hashes, transfer the bodies neither side
//! could produce locally, checkpoint the bookmark, then run the optional
//! deletion and sidecar phases. Every exchange that sends and receives is
//! two concurrent sub-tasks joined before the next phase, so neither side
//! can deadlock on a full write buffer.

mod changes;
mod deletes;
mod error;
mod reconcile;
mod session;
mod sidecar;
mod tags;
mod transfer;

pub use changes::{build_changeset, load_bookmark};
pub use deletes::{deletion_initiator, deletion_responder};
pub use error::SyncError;
pub use reconcile::{reconcile_files, FetchEntry, ReconcileOutcome};
pub use session::{run_initiator, run_responder, SyncOptions, SyncReport};
pub use sidecar::{sidecar_initiator, sidecar_responder};
pub use tags::merge_tags;
pub use transfer::{transfer_files, TransferOutcome};

/// Tag that marks a message for coordinated removal.
pub const DELETED_TAG: &str = "deleted";
