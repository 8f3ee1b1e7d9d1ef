//! SPI types and command structures
//!
//! This module provides types for representing QSPI transactions,
//! bus widths, and the JEDEC opcodes used by the driver.

mod address;
mod command;
mod io_mode;
pub mod opcodes;

pub use address::AddressWidth;
pub use command::SpiCommand;
pub use io_mode::{check_io_mode_supported, IoMode};
