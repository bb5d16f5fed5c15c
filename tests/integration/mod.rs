//! Shared support code for the integration test binaries.

pub mod helpers;
