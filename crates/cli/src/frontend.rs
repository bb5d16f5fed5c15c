//! Argument parsing and role dispatch.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use engine::{run_initiator, run_responder, SyncError, SyncOptions, SyncReport};
use logging::Verbosity;
use store::IndexStore;
use thiserror::Error;
use tracing::{error, info, warn};
use transport::{PeerCommand, TransportError};

/// Recognized command-line options.
#[derive(Debug, Parser)]
#[command(
    name = "nm-sync",
    version,
    about = "Synchronize notmuch-style mail stores between two hosts"
)]
pub struct Args {
    /// Remote host to connect to; without it this process runs as the
    /// responder on its standard streams
    #[arg(long)]
    pub remote_peer: Option<String>,

    /// Identity passed to the transport as user@host
    #[arg(long)]
    pub user: Option<String>,

    /// Command template for spawning the responder
    #[arg(long, default_value = "ssh -CTaxq")]
    pub transport_cmd: String,

    /// Responder binary path used in the transport command
    #[arg(long, default_value = "nm-sync")]
    pub path_on_peer: String,

    /// Fully custom spawn command; overrides the transport options
    #[arg(long)]
    pub remote_cmd: Option<String>,

    /// Increase verbosity, up to twice
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Disable all output, overrides --verbose
    #[arg(short, long)]
    pub quiet: bool,

    /// Synchronize whole-message deletions
    #[arg(long)]
    pub enable_deletion: bool,

    /// Delete without requiring the 'deleted' tag (implies
    /// --enable-deletion)
    #[arg(long)]
    pub unsafe_deletion: bool,

    /// Synchronize .mbsyncstate/.uidvalidity sidecar files
    #[arg(long)]
    pub enable_sidecar: bool,

    /// Maildir root of the local store
    #[arg(long, env = "NM_SYNC_ROOT")]
    pub mail_root: Option<PathBuf>,
}

impl Args {
    fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            deletion: self.enable_deletion || self.unsafe_deletion,
            require_deleted_tag: !self.unsafe_deletion,
            sidecar: self.enable_sidecar,
        }
    }

    fn is_initiator(&self) -> bool {
        self.remote_peer.is_some() || self.remote_cmd.is_some()
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("no mail root configured; pass --mail-root or set NM_SYNC_ROOT")]
    NoMailRoot,

    #[error(transparent)]
    Store(#[from] store::StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to start the async runtime: {0}")]
    Runtime(std::io::Error),
}

/// Parses `argv`, runs the selected role, and maps the outcome to an exit
/// code.
pub fn run<I, T>(argv: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = Args::parse_from(argv);
    logging::init(Verbosity::from_flags(args.quiet, args.verbose));

    match dispatch(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(args: &Args) -> Result<(), CliError> {
    let root = args.mail_root.clone().ok_or(CliError::NoMailRoot)?;
    let mut store = IndexStore::open(&root)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    if args.is_initiator() {
        runtime.block_on(initiate(args, &mut store))
    } else {
        runtime.block_on(respond(args, &mut store))
    }
}

async fn initiate(args: &Args, store: &mut IndexStore) -> Result<(), CliError> {
    let mut command = PeerCommand::new();
    command
        .transport_cmd(&args.transport_cmd)
        .path_on_peer(&args.path_on_peer)
        .enable_deletion(args.enable_deletion)
        .unsafe_deletion(args.unsafe_deletion)
        .enable_sidecar(args.enable_sidecar);
    if let Some(peer) = &args.remote_peer {
        command.peer(peer);
    }
    if let Some(user) = &args.user {
        command.user(user);
    }
    if let Some(remote_cmd) = &args.remote_cmd {
        command.remote_cmd(remote_cmd);
    }

    info!("connecting to peer");
    let mut connection = command.spawn()?;
    let Some((read_half, write_half)) = connection.streams() else {
        return Err(CliError::Transport(TransportError::Parse(
            transport::CommandParseError::Empty,
        )));
    };

    let result = run_initiator(store, read_half, write_half, &args.sync_options()).await;

    // Reap the responder either way; its stderr carries remote
    // diagnostics worth surfacing.
    let finish = connection.finish().await;
    let report = result?;
    finish?;

    print_summary(&report);
    Ok(())
}

async fn respond(args: &Args, store: &mut IndexStore) -> Result<(), CliError> {
    let report = run_responder(
        store,
        tokio::io::stdin(),
        tokio::io::stdout(),
        &args.sync_options(),
    )
    .await?;
    info!("responder done: {}", report.local);
    Ok(())
}

fn print_summary(report: &SyncReport) {
    info!("local:  {}", report.local);
    match &report.remote {
        Some(remote) => info!("remote: {}", remote),
        None => warn!("peer did not report counters"),
    }
    info!(
        "{}/{} bytes received from/sent to peer",
        report.bytes_read, report.bytes_written
    );
}
