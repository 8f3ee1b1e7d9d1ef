//! Bus master traits and the command adapter
//!
//! This module defines the trait a physical QSPI bus driver implements
//! (`QspiMaster`) and the `BusAdapter` that turns logical read, program,
//! erase and register operations into width-aware bus commands.

mod adapter;
mod traits;

pub use adapter::{BusAdapter, BusConfig};
pub use traits::*;
