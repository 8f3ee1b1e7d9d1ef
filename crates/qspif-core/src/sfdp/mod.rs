//! SFDP (Serial Flash Discoverable Parameters) parsing
//!
//! This module implements parsing of the SFDP structures defined by JEDEC
//! JESD216 that the block device needs at runtime:
//!
//! - The SFDP header and parameter headers, locating the mandatory Basic
//!   Flash Parameter Table and the optional Sector Map Table
//! - The Basic Flash Parameter Table (density, page size, erase types,
//!   fast read modes, quad enable and QPI sequences, 4-byte entry)
//! - The Sector Map Table (configuration detection commands and region maps)
//!
//! Parsers operate on immutable byte views with bounds checks on every
//! DWORD access; a short or malformed table is a parsing failure.
//!
//! # Usage
//!
//! ```ignore
//! use qspif_core::sfdp::{self, SfdpImage};
//!
//! let mut image = SfdpImage::new(&dump);
//! let tables = sfdp::parse_headers(&mut image)?;
//! let basic = sfdp::read_basic_table(&mut image, &tables.basic)?;
//! println!("Flash size: {} bytes", basic.density_bytes);
//! ```

mod basic;
mod header;
mod sector_map;
mod types;

pub use basic::*;
pub use header::*;
pub use sector_map::*;
pub use types::*;

use crate::error::Result;

/// Source of raw SFDP bytes
///
/// Implemented by the bus adapter (RDSFDP instruction) and by `SfdpImage`
/// for dumps held in memory.
pub trait SfdpReader {
    /// Read `buf.len()` bytes of SFDP space starting at `addr`
    fn read_sfdp(&mut self, addr: u32, buf: &mut [u8]) -> Result<()>;
}

/// SFDP space held in memory (e.g. a dump file)
///
/// Reads past the end return 0xFF, like an unprogrammed SFDP area.
#[derive(Debug, Clone, Copy)]
pub struct SfdpImage<'a> {
    data: &'a [u8],
}

impl<'a> SfdpImage<'a> {
    /// Wrap a raw SFDP dump
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl SfdpReader for SfdpImage<'_> {
    fn read_sfdp(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let start = addr as usize;
        buf.fill(0xFF);
        if start < self.data.len() {
            let end = core::cmp::min(start + buf.len(), self.data.len());
            buf[..end - start].copy_from_slice(&self.data[start..end]);
        }
        Ok(())
    }
}
