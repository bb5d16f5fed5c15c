#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Diagnostics setup shared by the initiator and responder front-ends.
//!
//! All human-facing output goes to standard error through `tracing`,
//! keeping standard output free: in responder mode stdout *is* the wire.
//! Verbosity maps the command-line surface (`--quiet`, repeated
//! `--verbose`) onto subscriber levels; quiet wins over any verbosity.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt;

/// How much diagnostic output the session emits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verbosity {
    /// No output at all; overrides any verbose setting.
    Quiet,
    /// Warnings and errors only (the default).
    Warnings,
    /// Per-phase progress.
    Info,
    /// Full protocol tracing.
    Debug,
}

impl Verbosity {
    /// Derives the verbosity from the command-line surface.
    #[must_use]
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            Self::Quiet
        } else {
            match verbose {
                0 => Self::Warnings,
                1 => Self::Info,
                _ => Self::Debug,
            }
        }
    }

    fn level_filter(self) -> LevelFilter {
        match self {
            Self::Quiet => LevelFilter::OFF,
            Self::Warnings => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
        }
    }
}

/// Installs the global stderr subscriber for this process.
///
/// Safe to call more than once; later calls keep the first subscriber.
pub fn init(verbosity: Verbosity) {
    let _ = fmt()
        .with_max_level(verbosity.level_filter())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_overrides_verbose() {
        assert_eq!(Verbosity::from_flags(true, 2), Verbosity::Quiet);
    }

    #[test]
    fn verbosity_scales_with_count() {
        assert_eq!(Verbosity::from_flags(false, 0), Verbosity::Warnings);
        assert_eq!(Verbosity::from_flags(false, 1), Verbosity::Info);
        assert_eq!(Verbosity::from_flags(false, 2), Verbosity::Debug);
        assert_eq!(Verbosity::from_flags(false, 9), Verbosity::Debug);
    }

    #[test]
    fn filters_match_levels() {
        assert_eq!(Verbosity::Quiet.level_filter(), LevelFilter::OFF);
        assert_eq!(Verbosity::Info.level_filter(), LevelFilter::INFO);
    }
}
