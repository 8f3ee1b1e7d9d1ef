//! Block device trait
//!
//! This module provides the `BlockDevice` trait: the capability interface
//! that storage consumers program against. `QspifBlockDevice` implements
//! it on top of a QSPI bus; tests and other backends can substitute their
//! own implementation.

use crate::error::Result;

/// Synchronous block device
///
/// All methods take `&self` so a device can be shared between threads;
/// implementations serialize access internally.
///
/// # Example
///
/// ```ignore
/// use qspif_core::device::BlockDevice;
///
/// fn rewrite_first_block<D: BlockDevice>(device: &D, data: &[u8]) -> qspif_core::Result<()> {
///     let block = device.erase_size_at(0);
///     device.erase(0, block)?;
///     device.program(0, data)
/// }
/// ```
pub trait BlockDevice {
    /// Discover the device and bring it into its operating mode
    ///
    /// Calling `init` on an initialized device does nothing.
    fn init(&self) -> Result<()>;

    /// Leave the operating mode and forget the discovered state
    ///
    /// Safe to call on a device that was never initialized.
    fn deinit(&self) -> Result<()>;

    /// Read `buf.len()` bytes starting at `addr`
    ///
    /// # Errors
    /// * `NotInitialized` - If `init` has not succeeded
    /// * `AddressOutOfBounds` - If the read extends beyond the device
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()>;

    /// Program `data` at `addr`
    ///
    /// The target must already be erased; this is not checked.
    ///
    /// # Errors
    /// * `InvalidAlignment` - If `addr` or `data.len()` is not a multiple
    ///   of `program_size()`
    /// * `WrenFailed` / `ReadyFailed` - If the chip does not respond
    fn program(&self, addr: u64, data: &[u8]) -> Result<()>;

    /// Erase `[addr, addr + len)`
    ///
    /// The range must decompose into erase blocks legal in the regions it
    /// covers. An invalid range fails before any erase is issued.
    fn erase(&self, addr: u64, len: u64) -> Result<()>;

    /// Read granularity in bytes (0 before init)
    fn read_size(&self) -> u64;

    /// Program granularity in bytes (0 before init)
    fn program_size(&self) -> u64;

    /// Erase size legal everywhere on the device (0 if none or before init)
    fn erase_size(&self) -> u64;

    /// Smallest erase size legal at `addr` (0 before init)
    fn erase_size_at(&self, addr: u64) -> u64;

    /// Total size in bytes (0 before init)
    fn size(&self) -> u64;

    /// Check if a range lies inside the device
    fn is_valid_range(&self, addr: u64, len: u64) -> bool {
        addr.checked_add(len).is_some_and(|end| end <= self.size())
    }
}
