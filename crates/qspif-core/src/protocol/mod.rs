//! Protocol implementations
//!
//! This module contains the JEDEC SPI25 control sequences (status polling,
//! write enable, soft reset, address mode switching) shared by the mode
//! negotiator and the operation sequencer.

mod spi25;

pub use spi25::*;
