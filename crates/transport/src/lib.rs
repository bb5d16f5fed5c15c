#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Peer transport for the synchronizer.
//!
//! The initiator reaches its responder through a spawned child process,
//! normally a remote shell such as `ssh -CTaxq host nm-sync` (or a fully
//! custom command), and talks to it over the child's standard input and
//! output. Standard error is collected separately and surfaced as
//! warnings at teardown so remote diagnostics are not lost.

mod command;
mod connection;
mod parse;

pub use command::PeerCommand;
pub use connection::PeerConnection;
pub use parse::{split_command, CommandParseError};

use thiserror::Error;

/// Errors raised while spawning or tearing down the peer process.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The configured command line could not be parsed.
    #[error(transparent)]
    Parse(#[from] CommandParseError),

    /// The child process could not be spawned or waited on.
    #[error("failed to run peer command {command:?}: {source}")]
    Spawn {
        /// The program that failed.
        command: String,
        /// Underlying failure.
        source: std::io::Error,
    },

    /// The peer exited with a non-zero status.
    #[error("peer exited with {status}{}", format_stderr(.stderr))]
    PeerFailed {
        /// Exit status of the child.
        status: std::process::ExitStatus,
        /// Captured standard error, if any.
        stderr: String,
    },
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}
