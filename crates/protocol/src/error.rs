//! Error type for wire encoding and decoding.

use std::io;

use thiserror::Error;

/// Errors raised while talking to the peer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The underlying stream failed; includes EOF in the middle of a field.
    #[error("peer stream failure: {0}")]
    Io(#[from] io::Error),

    /// A frame length exceeded the sanity cap.
    #[error("frame of {got} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Advertised frame length.
        got: u64,
        /// Maximum accepted frame length.
        max: u64,
    },

    /// The 36-byte UUID field was not printable ASCII.
    #[error("peer sent a malformed store UUID")]
    MalformedUuid,

    /// A change-set or sidecar JSON body failed to parse.
    #[error("malformed JSON body from peer: {0}")]
    Json(#[from] serde_json::Error),

    /// A name on the wire was not valid UTF-8.
    #[error("peer sent a file name that is not UTF-8")]
    MalformedName,

    /// A relative path escaped the store root.
    #[error("peer sent an unsafe path {name:?}")]
    UnsafePath {
        /// The offending path.
        name: String,
    },

    /// A change-set entry was structurally invalid.
    #[error("invalid change-set entry for {id:?}: {reason}")]
    InvalidEntry {
        /// Message id of the offending entry.
        id: String,
        /// What was wrong with it.
        reason: &'static str,
    },
}
