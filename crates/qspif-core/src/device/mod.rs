//! Block device over an SFDP-described QSPI flash
//!
//! This module ties the parsers, the geometry model and the bus adapter
//! together into a thread-safe [`BlockDevice`] implementation.

mod block_device;
pub mod config;
pub mod negotiate;
mod qspif;
mod sequencer;

pub use block_device::BlockDevice;
pub use config::{ConfigError, DeviceConfig};
pub use negotiate::Negotiated;
pub use qspif::QspifBlockDevice;
pub use sequencer::{Operation, Sequencer, SequencerState};
