//! Error types for the qspif command line tool

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by the CLI commands
#[derive(Debug, Error)]
pub enum CliError {
    /// Reading an input file failed
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Flash driver error
    #[error("Flash error: {0} (code {code})", code = .0.code())]
    Flash(#[from] qspif_core::Error),

    /// Device configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] qspif_core::device::ConfigError),

    /// Progress bar template was rejected
    #[error("Progress display error: {0}")]
    Progress(#[from] indicatif::style::TemplateError),

    /// Read-back did not match what was programmed
    #[error("Verify failed at 0x{addr:08X}: expected 0x{expected:02X}, read 0x{actual:02X}")]
    VerifyMismatch { addr: u64, expected: u8, actual: u8 },

    /// Arguments are inconsistent with the device
    #[error("{0}")]
    InvalidArgument(String),
}
