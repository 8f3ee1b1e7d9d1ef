//! qspif-core - SFDP-driven QSPI NOR flash block device
//!
//! This crate drives a serial NOR flash chip over a 1/2/4-wire command bus
//! without any per-part constants. Everything the driver needs to know about
//! the chip (density, page size, erase granularities, sector regions and
//! supported bus modes) is discovered at runtime from the chip's own SFDP
//! tables.
//!
//! # Features
//!
//! - `std` - Enable the mutex-guarded block device and TOML configuration
//!   loading (includes `alloc`)
//! - `alloc` - Enable heap allocation helpers
//!
//! Without `std` the parsers, geometry model, bus adapter and protocol
//! primitives are still available for use in embedded environments.
//!
//! # Example
//!
//! ```ignore
//! use qspif_core::device::{BlockDevice, DeviceConfig, QspifBlockDevice};
//!
//! fn erase_first_sector<M: qspif_core::bus::QspiMaster>(master: M) -> qspif_core::Result<()> {
//!     let device = QspifBlockDevice::new(master, DeviceConfig::default())?;
//!     device.init()?;
//!     let sector = device.erase_size_at(0);
//!     device.erase(0, sector)
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod bus;
#[cfg(feature = "std")]
pub mod device;
pub mod error;
pub mod geometry;
pub mod protocol;
pub mod sfdp;
pub mod spi;

pub use error::{Error, ParseFailure, Result};
