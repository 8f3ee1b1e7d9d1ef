//! Standard JEDEC SPI flash opcodes
//!
//! This module defines the SPI flash command opcodes used by the SFDP
//! driven block device. Read, program and erase opcodes are normally taken
//! from the SFDP tables at runtime; the constants here are the JEDEC
//! defaults and the fixed control instructions.

// ============================================================================
// Write control
// ============================================================================

/// Write Enable - required before any write/erase operation
pub const WREN: u8 = 0x06;
/// Write Disable - clears WEL bit in status register
pub const WRDI: u8 = 0x04;

// ============================================================================
// Status register operations
// ============================================================================

/// Read Status Register 1
pub const RDSR: u8 = 0x05;
/// Read Status Register 2
pub const RDSR2: u8 = 0x35;
/// Read Status Register 2 (QE bit 7 variant)
pub const RDSR2_ALT: u8 = 0x3F;
/// Write Status Register 1 (optionally followed by SR2)
pub const WRSR: u8 = 0x01;
/// Write Status Register 2
pub const WRSR2: u8 = 0x31;
/// Write Status Register 2 (QE bit 7 variant)
pub const WRSR2_ALT: u8 = 0x3E;

// ============================================================================
// Configuration registers
// ============================================================================

/// Read any register / volatile enhanced configuration register
pub const RDAR: u8 = 0x65;
/// Write volatile enhanced configuration register
pub const WRVECR: u8 = 0x61;
/// Write any register
pub const WRAR: u8 = 0x71;
/// Address of the configuration register holding the QPI bit (RDAR/WRAR)
pub const CR2V_QPI_ADDR: u32 = 0x80_0003;
/// Read latency of RDAR for volatile registers
pub const RDAR_DUMMY_CYCLES: u8 = 8;

// ============================================================================
// Read / program defaults
// ============================================================================

/// Read Data (single I/O, no dummy cycles)
pub const READ: u8 = 0x03;
/// Page Program with 3-byte address
pub const PP: u8 = 0x02;
/// Sector Erase 4KB (legacy default)
pub const SE_20: u8 = 0x20;

// ============================================================================
// Address mode control
// ============================================================================

/// Enter 4-Byte Address Mode
pub const EN4B: u8 = 0xB7;
/// Exit 4-Byte Address Mode
pub const EX4B: u8 = 0xE9;

// ============================================================================
// QPI mode control
// ============================================================================

/// Enter QPI Mode
pub const EQIO: u8 = 0x38;
/// Enter QPI Mode (alternate instruction)
pub const EQIO_ALT: u8 = 0x35;
/// Exit QPI Mode
pub const RSTQIO: u8 = 0xFF;
/// Exit QPI Mode (alternate instruction)
pub const RSTQIO_ALT: u8 = 0xF5;

// ============================================================================
// Software Reset
// ============================================================================

/// Reset Enable
pub const RSTEN: u8 = 0x66;
/// Reset Device
pub const RST: u8 = 0x99;

// ============================================================================
// SFDP (Serial Flash Discoverable Parameters)
// ============================================================================

/// Read SFDP (JEDEC JESD216)
pub const RDSFDP: u8 = 0x5A;
/// Dummy cycles required by RDSFDP
pub const RDSFDP_DUMMY_CYCLES: u8 = 8;

// ============================================================================
// Status register bit definitions
// ============================================================================

/// Status Register 1: Write In Progress / Busy
pub const SR1_WIP: u8 = 0x01;
/// Status Register 1: Write Enable Latch
pub const SR1_WEL: u8 = 0x02;
/// Status Register 1: Quad Enable (QER 010b)
pub const SR1_QE_BIT6: u8 = 0x40;
/// Status Register 2: Quad Enable (QER 001b, 100b, 101b, 110b)
pub const SR2_QE_BIT1: u8 = 0x02;
/// Status Register 2: Quad Enable (QER 011b)
pub const SR2_QE_BIT7: u8 = 0x80;

/// CR2V bit enabling QPI (RDAR/WRAR sequence)
pub const CR2V_QPI: u8 = 0x40;
/// VECR bit that must be cleared to enable quad protocol
pub const VECR_QUAD_N: u8 = 0x80;
