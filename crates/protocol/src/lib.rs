#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Wire protocol shared by both ends of a synchronization session.
//!
//! Everything that crosses the peer stream goes through this crate: the
//! framed-blob codec with its byte counters, the JSON change-set model, and
//! the six-counter trailer the responder sends before the session ends. All
//! multibyte integers are big-endian; a framed blob is a `u32` length
//! followed by that many bytes; UUIDs travel as an exact 36-byte ASCII
//! field without framing.

pub mod changeset;
pub mod codec;
pub mod counters;
pub mod error;

pub use changeset::{decode_changeset, encode_changeset, ChangeSet, FileRecord, MessageRecord};
pub use codec::{WireReader, WireWriter, MAX_FRAME_LEN, UUID_LEN};
pub use counters::{SyncCounters, WireCounters};
pub use error::ProtocolError;
