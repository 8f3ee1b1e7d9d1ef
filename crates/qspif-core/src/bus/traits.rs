//! Bus master trait definitions

use crate::error::Result;
use crate::spi::SpiCommand;
use bitflags::bitflags;

bitflags! {
    /// QSPI master feature flags
    ///
    /// These flags indicate which multi-line transfer modes the bus
    /// driver can perform.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SpiFeatures: u32 {
        /// Can read two bits at once (1-1-2 mode)
        const DUAL_IN        = 1 << 0;
        /// Can transfer two bits at once (1-2-2 mode)
        const DUAL_IO        = 1 << 1;
        /// Can send commands with dual I/O (2-2-2 mode)
        const DPI            = 1 << 2;
        /// Can read four bits at once (1-1-4 mode)
        const QUAD_IN        = 1 << 3;
        /// Can transfer four bits at once (1-4-4 mode)
        const QUAD_IO        = 1 << 4;
        /// Can send commands with quad I/O (4-4-4 mode)
        const QPI            = 1 << 5;

        /// Shorthand for dual mode (both DUAL_IN and DUAL_IO)
        const DUAL = Self::DUAL_IN.bits() | Self::DUAL_IO.bits();
        /// Shorthand for quad mode (both QUAD_IN and QUAD_IO)
        const QUAD = Self::QUAD_IN.bits() | Self::QUAD_IO.bits();
    }
}

impl Default for SpiFeatures {
    fn default() -> Self {
        SpiFeatures::empty()
    }
}

/// Clock polarity mode of the QSPI bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ClockMode {
    /// CPOL=0, CPHA=0
    #[default]
    Mode0,
    /// CPOL=1, CPHA=1
    Mode3,
}

/// QSPI master trait
///
/// This trait represents the physical bus driver: it performs one
/// instruction + optional address + optional data transaction at a time,
/// using the lane widths given by the command's `io_mode`.
///
/// ## Example: hardware QSPI peripheral
///
/// ```ignore
/// impl QspiMaster for MyQspi {
///     fn features(&self) -> SpiFeatures {
///         SpiFeatures::DUAL | SpiFeatures::QUAD | SpiFeatures::QPI
///     }
///
///     fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()> {
///         self.peripheral.configure_format(
///             cmd.io_mode.cmd_lines(),
///             cmd.io_mode.addr_lines(),
///             cmd.io_mode.data_lines(),
///             cmd.dummy_cycles,
///         );
///         self.peripheral.transfer(cmd)
///     }
///     // ...
/// }
/// ```
pub trait QspiMaster {
    /// Get the multi-line modes supported by this bus master
    fn features(&self) -> SpiFeatures;

    /// Get the maximum number of bytes that can be read in a single transaction
    fn max_read_len(&self) -> usize;

    /// Get the maximum number of bytes that can be written in a single transaction
    fn max_write_len(&self) -> usize;

    /// Execute a single bus transaction
    ///
    /// The command contains all the information needed for the transaction:
    /// - `opcode`: The instruction byte
    /// - `address`: Optional address (with width)
    /// - `io_mode`: Lines used by the instruction, address and data phases
    /// - `dummy_cycles`: Number of dummy (and mode) clock cycles after address
    /// - `write_data`: Data to write after the header
    /// - `read_buf`: Buffer to read data into
    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()>;

    /// Set the bus clock polarity and frequency
    fn configure_clock(&mut self, mode: ClockMode, frequency_hz: u32) -> Result<()>;

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);
}

#[cfg(feature = "alloc")]
impl<M: QspiMaster + ?Sized> QspiMaster for alloc::boxed::Box<M> {
    fn features(&self) -> SpiFeatures {
        (**self).features()
    }

    fn max_read_len(&self) -> usize {
        (**self).max_read_len()
    }

    fn max_write_len(&self) -> usize {
        (**self).max_write_len()
    }

    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()> {
        (**self).execute(cmd)
    }

    fn configure_clock(&mut self, mode: ClockMode, frequency_hz: u32) -> Result<()> {
        (**self).configure_clock(mode, frequency_hz)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}
