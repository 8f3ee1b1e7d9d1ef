//! SPI I/O modes

use core::fmt;

/// I/O mode for SPI transactions
///
/// Represents how many lines are used for the instruction, address and data
/// phases of a transaction, from single-wire to quad-wire modes. Variants
/// are declared slowest first so that `Ord` follows throughput.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum IoMode {
    /// Standard SPI: 1-1-1 (cmd, addr, data all on single line)
    #[default]
    Single,
    /// Dual Output: 1-1-2 (data phase on 2 lines)
    DualOut,
    /// Dual I/O: 1-2-2 (addr and data on 2 lines)
    DualIo,
    /// DPI mode: 2-2-2 (everything on 2 lines)
    Dpi,
    /// Quad Output: 1-1-4 (data phase on 4 lines)
    QuadOut,
    /// Quad I/O: 1-4-4 (addr and data on 4 lines)
    QuadIo,
    /// QPI mode: 4-4-4 (everything on 4 lines)
    Qpi,
}

impl IoMode {
    /// Returns the number of data lines used for the command phase
    pub const fn cmd_lines(&self) -> u8 {
        match self {
            Self::Single | Self::DualOut | Self::DualIo | Self::QuadOut | Self::QuadIo => 1,
            Self::Dpi => 2,
            Self::Qpi => 4,
        }
    }

    /// Returns the number of data lines used for the address phase
    pub const fn addr_lines(&self) -> u8 {
        match self {
            Self::Single | Self::DualOut | Self::QuadOut => 1,
            Self::DualIo | Self::Dpi => 2,
            Self::QuadIo | Self::Qpi => 4,
        }
    }

    /// Returns the number of data lines used for the data phase
    pub const fn data_lines(&self) -> u8 {
        match self {
            Self::Single => 1,
            Self::DualOut | Self::DualIo | Self::Dpi => 2,
            Self::QuadOut | Self::QuadIo | Self::Qpi => 4,
        }
    }

    /// Returns true if this mode requires the quad enable bit to be set
    pub const fn requires_quad(&self) -> bool {
        matches!(self, Self::QuadOut | Self::QuadIo | Self::Qpi)
    }

    /// Returns true if the instruction phase itself is multi-line
    ///
    /// In these modes every command (not only reads) must be sent with the
    /// same widths.
    pub const fn is_full_width(&self) -> bool {
        matches!(self, Self::Dpi | Self::Qpi)
    }
}

impl fmt::Display for IoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.cmd_lines(),
            self.addr_lines(),
            self.data_lines()
        )
    }
}

use crate::bus::SpiFeatures;
use crate::error::{Error, Result};

/// Check if a bus master supports the requested I/O mode
///
/// Returns `Ok(())` if the mode is supported, or `Err(IoModeNotSupported)` if not.
pub fn check_io_mode_supported(mode: IoMode, features: SpiFeatures) -> Result<()> {
    let required = match mode {
        IoMode::Single => return Ok(()),
        IoMode::DualOut => SpiFeatures::DUAL_IN,
        IoMode::DualIo => SpiFeatures::DUAL_IO,
        IoMode::Dpi => SpiFeatures::DPI,
        IoMode::QuadOut => SpiFeatures::QUAD_IN,
        IoMode::QuadIo => SpiFeatures::QUAD_IO,
        IoMode::Qpi => SpiFeatures::QPI,
    };

    if features.contains(required) {
        Ok(())
    } else {
        Err(Error::IoModeNotSupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_widths() {
        assert_eq!(IoMode::QuadIo.cmd_lines(), 1);
        assert_eq!(IoMode::QuadIo.addr_lines(), 4);
        assert_eq!(IoMode::Qpi.cmd_lines(), 4);
        assert_eq!(IoMode::DualOut.addr_lines(), 1);
        assert_eq!(IoMode::DualOut.data_lines(), 2);
    }

    #[test]
    fn test_display() {
        let mut s = heapless::String::<8>::new();
        core::fmt::write(&mut s, format_args!("{}", IoMode::QuadIo)).unwrap();
        assert_eq!(s.as_str(), "1-4-4");
    }

    #[test]
    fn test_check_supported() {
        assert!(check_io_mode_supported(IoMode::Single, SpiFeatures::empty()).is_ok());
        assert_eq!(
            check_io_mode_supported(IoMode::Qpi, SpiFeatures::QUAD),
            Err(Error::IoModeNotSupported)
        );
        assert!(check_io_mode_supported(IoMode::QuadOut, SpiFeatures::QUAD).is_ok());
    }
}
