#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Thin command-line frontend for the `nm-sync` binary.
//!
//! Parses the option surface, sets up logging, opens the local store, and
//! dispatches into one of the two roles: with `--remote-peer` or
//! `--remote-cmd` the process initiates a session against a spawned
//! responder; with neither it *is* the responder, speaking the wire
//! protocol over its own standard streams.

mod frontend;

pub use frontend::{run, Args};
