#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Content identity for mail files.
//!
//! Two copies of the same logical message must hash identically even when
//! one of them was retrieved separately and carries an `X-TUID:` tracking
//! line that an IMAP synchronizer appended after delivery. The digest
//! therefore removes the first such line before hashing; everything else is
//! hashed byte for byte.
//!
//! [`FingerprintCache`] layers a `(mtime, size)` keyed cache on top so that
//! the same on-disk file is not re-hashed across the phases of one run.

mod digest;
mod fingerprint;

pub use digest::{content_digest, TRACKING_PREFIX};
pub use fingerprint::FingerprintCache;
