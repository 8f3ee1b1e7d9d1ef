//! Error types for qspif-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate, together with the numeric codes of the block
//! device contract.

use core::fmt;

/// Block device return code: success
pub const CODE_OK: i32 = 0;
/// Block device return code: device specific error
pub const CODE_DEVICE_ERROR: i32 = -4001;
/// Block device return code: SFDP parsing failed
pub const CODE_PARSING_FAILED: i32 = -4002;
/// Block device return code: waiting for memory ready failed
pub const CODE_READY_FAILED: i32 = -4003;
/// Block device return code: write enable failed
pub const CODE_WREN_FAILED: i32 = -4004;

/// Details about an SFDP parsing failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailure {
    /// SFDP signature did not match "SFDP"
    BadSignature,
    /// SFDP or basic table major revision is not 1
    UnsupportedRevision {
        /// Major revision found
        major: u8,
    },
    /// Number of parameter headers is outside the supported range
    ImplausibleHeaderCount {
        /// Number of headers declared by the SFDP header
        count: usize,
    },
    /// No basic flash parameter table pointer was found
    MissingBasicTable,
    /// A parameter table is shorter than its mandatory part
    TableTooShort {
        /// Parameter ID of the table
        id: u16,
        /// Length in bytes available
        len: usize,
    },
    /// Basic table reports zero (or unrepresentable) density
    InvalidDensity,
    /// Sector map declares more regions than supported
    TooManyRegions {
        /// Region count declared by the map descriptor
        count: usize,
    },
    /// A region supports no erase type at all
    EmptyRegionBitfield {
        /// Region index
        region: usize,
    },
    /// A region bitfield selects an erase type slot that is not valid
    InvalidEraseType {
        /// Region index
        region: usize,
        /// Erase type slot index (0-3)
        slot: usize,
    },
    /// Regions do not add up to the device size
    RegionsDoNotCoverDevice {
        /// Sum of region sizes
        covered: u64,
        /// Device size from the basic table
        device: u64,
    },
    /// No map descriptor matches the detected configuration ID
    UnknownConfiguration {
        /// Detected configuration ID
        id: u8,
    },
    /// Sector map descriptor sequence is malformed
    MalformedSectorMap,
    /// Device needs 4-byte addressing but offers no way to enter it
    UnsupportedAddressing,
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Bus errors
    /// Bus driver reported a failed transaction
    BusTransferFailed,
    /// Requested I/O mode is not supported by the bus master
    IoModeNotSupported,

    // Protocol timing errors
    /// Write enable latch did not set after WREN
    WrenFailed,
    /// Device stayed busy beyond the ready timeout
    ReadyFailed,

    // Discovery errors
    /// SFDP tables could not be parsed
    ParsingFailed(ParseFailure),

    // Validation errors
    /// Device has not been initialized
    NotInitialized,
    /// Address or length is beyond the device size
    AddressOutOfBounds,
    /// Address or length is not aligned to the required granularity
    InvalidAlignment,
    /// Range cannot be decomposed into legal erase blocks
    NoEraseType,
    /// Provided buffer is too small for the operation
    BufferTooSmall,
}

impl Error {
    /// Numeric code of this error in the block device contract
    pub fn code(&self) -> i32 {
        match self {
            Self::ParsingFailed(_) => CODE_PARSING_FAILED,
            Self::ReadyFailed => CODE_READY_FAILED,
            Self::WrenFailed => CODE_WREN_FAILED,
            Self::BusTransferFailed
            | Self::IoModeNotSupported
            | Self::NotInitialized
            | Self::AddressOutOfBounds
            | Self::InvalidAlignment
            | Self::NoEraseType
            | Self::BufferTooSmall => CODE_DEVICE_ERROR,
        }
    }
}

/// Convert a result into the block device return code (0 on success)
pub fn to_code<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => CODE_OK,
        Err(e) => e.code(),
    }
}

impl From<ParseFailure> for Error {
    fn from(failure: ParseFailure) -> Self {
        Self::ParsingFailed(failure)
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadSignature => write!(f, "SFDP signature invalid"),
            Self::UnsupportedRevision { major } => {
                write!(f, "unsupported SFDP major revision {}", major)
            }
            Self::ImplausibleHeaderCount { count } => {
                write!(f, "implausible parameter header count {}", count)
            }
            Self::MissingBasicTable => write!(f, "basic flash parameter table missing"),
            Self::TableTooShort { id, len } => {
                write!(f, "parameter table 0x{:04X} too short ({} bytes)", id, len)
            }
            Self::InvalidDensity => write!(f, "invalid flash density"),
            Self::TooManyRegions { count } => write!(f, "too many sector regions ({})", count),
            Self::EmptyRegionBitfield { region } => {
                write!(f, "region {} supports no erase type", region)
            }
            Self::InvalidEraseType { region, slot } => {
                write!(
                    f,
                    "region {} references invalid erase type {}",
                    region,
                    slot + 1
                )
            }
            Self::RegionsDoNotCoverDevice { covered, device } => {
                write!(
                    f,
                    "regions cover {} bytes but device has {} bytes",
                    covered, device
                )
            }
            Self::UnknownConfiguration { id } => {
                write!(f, "no sector map for configuration ID {}", id)
            }
            Self::MalformedSectorMap => write!(f, "malformed sector map table"),
            Self::UnsupportedAddressing => write!(f, "no supported 4-byte address entry method"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BusTransferFailed => write!(f, "bus transfer failed"),
            Self::IoModeNotSupported => write!(f, "I/O mode not supported by bus master"),
            Self::WrenFailed => write!(f, "write enable failed"),
            Self::ReadyFailed => write!(f, "memory not ready (timeout)"),
            Self::ParsingFailed(failure) => write!(f, "SFDP parsing failed: {}", failure),
            Self::NotInitialized => write!(f, "device not initialized"),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
            Self::InvalidAlignment => write!(f, "invalid alignment"),
            Self::NoEraseType => write!(f, "no legal erase type for range"),
            Self::BufferTooSmall => write!(f, "buffer too small"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::WrenFailed.code(), CODE_WREN_FAILED);
        assert_eq!(Error::ReadyFailed.code(), CODE_READY_FAILED);
        assert_eq!(
            Error::ParsingFailed(ParseFailure::BadSignature).code(),
            CODE_PARSING_FAILED
        );
        // Validation errors collapse onto the generic device error
        assert_eq!(Error::InvalidAlignment.code(), CODE_DEVICE_ERROR);
        assert_eq!(Error::NotInitialized.code(), CODE_DEVICE_ERROR);

        assert_eq!(to_code(&Ok::<(), Error>(())), CODE_OK);
        assert_eq!(to_code::<()>(&Err(Error::ReadyFailed)), -4003);
    }
}
