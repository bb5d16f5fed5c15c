//! Builder for the responder command line.

use crate::parse::split_command;
use crate::{connection::PeerConnection, TransportError};

/// Builder used to configure and spawn the responder process.
///
/// Two shapes are supported: a transport command (`ssh -CTaxq` style) that
/// receives `[user@]peer`, the responder binary path, and the forwarded
/// phase flags; or a fully custom command used verbatim.
#[derive(Clone, Debug)]
pub struct PeerCommand {
    transport_cmd: String,
    user: Option<String>,
    peer: Option<String>,
    path_on_peer: String,
    remote_cmd: Option<String>,
    enable_deletion: bool,
    unsafe_deletion: bool,
    enable_sidecar: bool,
}

impl Default for PeerCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerCommand {
    /// Creates a builder with the default transport (`ssh -CTaxq`) and
    /// responder path (`nm-sync`).
    #[must_use]
    pub fn new() -> Self {
        Self {
            transport_cmd: "ssh -CTaxq".to_string(),
            user: None,
            peer: None,
            path_on_peer: "nm-sync".to_string(),
            remote_cmd: None,
            enable_deletion: false,
            unsafe_deletion: false,
            enable_sidecar: false,
        }
    }

    /// Sets the remote host to connect to.
    pub fn peer(&mut self, peer: impl Into<String>) -> &mut Self {
        self.peer = Some(peer.into());
        self
    }

    /// Sets the identity handed to the transport as `user@peer`.
    pub fn user(&mut self, user: impl Into<String>) -> &mut Self {
        self.user = Some(user.into());
        self
    }

    /// Replaces the transport command template.
    pub fn transport_cmd(&mut self, cmd: impl Into<String>) -> &mut Self {
        self.transport_cmd = cmd.into();
        self
    }

    /// Sets the responder binary path used in the transport command.
    pub fn path_on_peer(&mut self, path: impl Into<String>) -> &mut Self {
        self.path_on_peer = path.into();
        self
    }

    /// Uses a fully custom spawn command, overriding everything else.
    pub fn remote_cmd(&mut self, cmd: impl Into<String>) -> &mut Self {
        self.remote_cmd = Some(cmd.into());
        self
    }

    /// Forwards `--enable-deletion` to the responder.
    pub fn enable_deletion(&mut self, enabled: bool) -> &mut Self {
        self.enable_deletion = enabled;
        self
    }

    /// Forwards `--unsafe-deletion` to the responder.
    pub fn unsafe_deletion(&mut self, enabled: bool) -> &mut Self {
        self.unsafe_deletion = enabled;
        self
    }

    /// Forwards `--enable-sidecar` to the responder.
    pub fn enable_sidecar(&mut self, enabled: bool) -> &mut Self {
        self.enable_sidecar = enabled;
        self
    }

    /// Returns the argv this builder resolves to.
    ///
    /// # Errors
    ///
    /// Returns an error when no peer and no custom command are configured,
    /// or when a command string fails to parse.
    pub fn build(&self) -> Result<Vec<String>, TransportError> {
        if let Some(custom) = &self.remote_cmd {
            return Ok(split_command(custom)?);
        }

        let peer = self
            .peer
            .as_deref()
            .ok_or(TransportError::Parse(crate::CommandParseError::Empty))?;

        let mut argv = split_command(&self.transport_cmd)?;
        let target = match &self.user {
            Some(user) => format!("{user}@{peer}"),
            None => peer.to_string(),
        };
        argv.push(target);
        argv.push(self.path_on_peer.clone());
        if self.enable_deletion {
            argv.push("--enable-deletion".to_string());
        }
        if self.unsafe_deletion {
            argv.push("--unsafe-deletion".to_string());
        }
        if self.enable_sidecar {
            argv.push("--enable-sidecar".to_string());
        }
        Ok(argv)
    }

    /// Spawns the responder and returns the connected streams.
    ///
    /// # Errors
    ///
    /// Returns an error when the command cannot be built or spawned.
    pub fn spawn(&self) -> Result<PeerConnection, TransportError> {
        PeerConnection::spawn(self.build()?)
    }
}
