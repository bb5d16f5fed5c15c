//! Spawned responder process with duplex stdio streams.

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::warn;

use crate::TransportError;

/// A running responder, connected through its standard streams.
///
/// The stdin/stdout halves are taken by the caller and driven through the
/// wire codec; [`finish`](Self::finish) reaps the child, drains its
/// standard error, and fails on a non-zero exit.
#[derive(Debug)]
pub struct PeerConnection {
    child: Child,
    command: String,
}

impl PeerConnection {
    /// Spawns `argv` with piped standard streams.
    ///
    /// # Errors
    ///
    /// Returns an error when the process cannot be started.
    pub fn spawn(argv: Vec<String>) -> Result<Self, TransportError> {
        let command = argv.join(" ");
        let (program, args) = argv
            .split_first()
            .ok_or(TransportError::Parse(crate::CommandParseError::Empty))?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TransportError::Spawn {
                command: command.clone(),
                source,
            })?;

        Ok(Self { child, command })
    }

    /// Takes the stream halves connected to the responder.
    ///
    /// The writing half feeds the responder's stdin; the reading half is
    /// its stdout. Each can be taken once.
    pub fn streams(&mut self) -> Option<(ChildStdout, ChildStdin)> {
        let stdin = self.child.stdin.take()?;
        let stdout = self.child.stdout.take()?;
        Some((stdout, stdin))
    }

    /// Waits for the responder to exit, draining its standard error.
    ///
    /// Any stderr text is logged as a warning even on success. Dropping
    /// the taken stdin half beforehand closes the responder's input and
    /// lets it finish.
    ///
    /// # Errors
    ///
    /// Returns an error when waiting fails or the responder exited
    /// non-zero.
    pub async fn finish(mut self) -> Result<(), TransportError> {
        let mut stderr_text = String::new();
        if let Some(mut stderr) = self.child.stderr.take() {
            // Best effort; a vanished pipe is not an error here.
            let _ = stderr.read_to_string(&mut stderr_text).await;
        }

        let status = self
            .child
            .wait()
            .await
            .map_err(|source| TransportError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if !stderr_text.trim().is_empty() {
            warn!(peer = %self.command, "peer stderr: {}", stderr_text.trim());
        }

        if !status.success() {
            return Err(TransportError::PeerFailed {
                status,
                stderr: stderr_text,
            });
        }
        Ok(())
    }
}
