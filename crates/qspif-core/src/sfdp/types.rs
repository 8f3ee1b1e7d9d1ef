//! SFDP type definitions
//!
//! Types representing SFDP structures as defined by JEDEC JESD216.

use bitflags::bitflags;

/// SFDP signature magic value ("SFDP" in little-endian)
pub const SFDP_SIGNATURE: u32 = 0x50444653;

/// Maximum number of parameter headers accepted
pub const MAX_PARAMETER_HEADERS: usize = 16;

/// Maximum parameter table size in bytes read from the chip
pub const MAX_PARAMETER_TABLE_SIZE: usize = 1024;

/// Basic Flash Parameter Table ID
pub const PARAM_ID_BASIC: u16 = 0xFF00;
/// Sector Map Parameter Table ID
pub const PARAM_ID_SECTOR_MAP: u16 = 0xFF81;

// ============================================================================
// SFDP Revision
// ============================================================================

/// SFDP revision information
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct SfdpRevision {
    /// Major revision number
    pub major: u8,
    /// Minor revision number
    pub minor: u8,
}

impl SfdpRevision {
    /// Create a new revision
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Check if this revision is at least the specified version
    pub fn at_least(&self, major: u8, minor: u8) -> bool {
        *self >= Self::new(major, minor)
    }
}

impl core::fmt::Display for SfdpRevision {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// ============================================================================
// SFDP Header
// ============================================================================

/// SFDP header structure (first 8 bytes at address 0x00)
#[derive(Debug, Clone, Copy, Default)]
pub struct SfdpHeader {
    /// SFDP signature (should be 0x50444653)
    pub signature: u32,
    /// SFDP revision
    pub revision: SfdpRevision,
    /// Number of parameter headers (0-based, so actual count is nph + 1)
    pub nph: u8,
    /// Access protocol (0xFF for legacy)
    pub access_protocol: u8,
}

impl SfdpHeader {
    /// Parse SFDP header from raw bytes
    pub fn parse(data: &[u8; 8]) -> Self {
        Self {
            signature: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            revision: SfdpRevision {
                minor: data[4],
                major: data[5],
            },
            nph: data[6],
            access_protocol: data[7],
        }
    }

    /// Check if the signature is valid
    pub fn is_valid(&self) -> bool {
        self.signature == SFDP_SIGNATURE
    }

    /// Get the number of parameter headers
    pub fn num_param_headers(&self) -> usize {
        (self.nph as usize) + 1
    }
}

// ============================================================================
// Parameter Header
// ============================================================================

/// Parameter header structure (8 bytes each, starting at address 0x08)
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterHeader {
    /// Parameter ID (MSB << 8 | LSB)
    pub id: u16,
    /// Parameter table revision
    pub revision: SfdpRevision,
    /// Parameter table length in DWORDs
    pub length_dwords: u8,
    /// Parameter table pointer (24-bit byte address)
    pub table_pointer: u32,
}

impl ParameterHeader {
    /// Parse a parameter header from raw bytes
    pub fn parse(data: &[u8; 8]) -> Self {
        Self {
            id: ((data[7] as u16) << 8) | (data[0] as u16),
            revision: SfdpRevision {
                minor: data[1],
                major: data[2],
            },
            length_dwords: data[3],
            table_pointer: u32::from_le_bytes([data[4], data[5], data[6], 0]),
        }
    }

    /// Get the table length in bytes
    pub fn length_bytes(&self) -> usize {
        (self.length_dwords as usize) * 4
    }

    /// Where the table described by this header lives
    pub fn location(&self) -> TableLocation {
        TableLocation {
            addr: self.table_pointer,
            len: self.length_bytes(),
            revision: self.revision,
        }
    }
}

/// Address, size and revision of a parameter table in SFDP space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableLocation {
    /// Byte address of the table
    pub addr: u32,
    /// Length of the table in bytes
    pub len: usize,
    /// Table revision
    pub revision: SfdpRevision,
}

/// Tables located by the header parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SfdpTables {
    /// SFDP header revision
    pub revision: SfdpRevision,
    /// Basic Flash Parameter Table (mandatory)
    pub basic: TableLocation,
    /// Sector Map Table (optional)
    pub sector_map: Option<TableLocation>,
}

// ============================================================================
// Fast Read Parameters
// ============================================================================

/// Parameters for a fast read command
///
/// Contains the opcode, number of mode clocks, and number of dummy/wait
/// cycles needed for a specific fast read mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FastReadParams {
    /// Instruction opcode (0x00 if not supported)
    pub opcode: u8,
    /// Number of mode clock cycles
    pub mode_clocks: u8,
    /// Number of dummy/wait clock cycles before valid output
    pub dummy_clocks: u8,
}

impl FastReadParams {
    /// Create new fast read parameters
    pub const fn new(opcode: u8, mode_clocks: u8, dummy_clocks: u8) -> Self {
        Self {
            opcode,
            mode_clocks,
            dummy_clocks,
        }
    }

    /// Check if this fast read mode has a usable instruction
    pub fn is_supported(&self) -> bool {
        self.opcode != 0x00 && self.opcode != 0xFF
    }

    /// Mode plus dummy cycles clocked between address and data
    pub fn wait_cycles(&self) -> u8 {
        self.mode_clocks + self.dummy_clocks
    }

    /// Parse from DWORD high half
    ///
    /// Layout: [31:24] instruction, [23:21] mode clocks, [20:16] dummy clocks
    pub fn from_high_half(dword: u32) -> Self {
        Self::from_low_half(dword >> 16)
    }

    /// Parse from DWORD low half
    ///
    /// Layout: [15:8] instruction, [7:5] mode clocks, [4:0] dummy clocks
    pub fn from_low_half(dword: u32) -> Self {
        let opcode = ((dword >> 8) & 0xFF) as u8;
        let mode_clocks = ((dword >> 5) & 0x07) as u8;
        let dummy_clocks = (dword & 0x1F) as u8;

        if opcode == 0x00 {
            Self::default()
        } else {
            Self::new(opcode, mode_clocks, dummy_clocks)
        }
    }
}

// ============================================================================
// Address Mode
// ============================================================================

/// Flash addressing mode (BFPT DWORD 1 bits [18:17])
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    /// 3-byte addressing only (up to 16 MiB)
    #[default]
    ThreeByteOnly,
    /// 3-byte default, can switch to 4-byte
    ThreeOrFourByte,
    /// 4-byte addressing only
    FourByteOnly,
}

impl AddressMode {
    /// Parse from BFPT DWORD 1 bits [18:17]
    pub fn from_bfpt(value: u8) -> Self {
        match value & 0x03 {
            0b01 => Self::ThreeOrFourByte,
            0b10 => Self::FourByteOnly,
            // 00b, and the reserved 11b
            _ => Self::ThreeByteOnly,
        }
    }
}

// ============================================================================
// Quad Enable (QE) Requirements
// ============================================================================

/// Quad Enable bit location and the instructions that access it
///
/// Decoded from the QER field of BFPT DWORD 15 bits [22:20].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuadEnableMethod {
    /// Device has no QE bit (QER 000b)
    #[default]
    None,
    /// QE is bit 1 of SR2, set by writing SR1 and SR2 with 01h
    /// (QER 001b, 100b, 101b); SR2 read with 35h
    Sr2Bit1WriteBoth,
    /// QE is bit 6 of SR1, written with 01h (QER 010b)
    Sr1Bit6,
    /// QE is bit 7 of SR2, written with 3Eh and read with 3Fh (QER 011b)
    Sr2Bit7,
    /// QE is bit 1 of SR2, written alone with 31h (QER 110b)
    Sr2Bit1WriteSr2,
}

impl QuadEnableMethod {
    /// Parse from BFPT DWORD 15 bits [22:20]
    pub fn from_bfpt(value: u8) -> Self {
        match value & 0x07 {
            0b001 | 0b100 | 0b101 => Self::Sr2Bit1WriteBoth,
            0b010 => Self::Sr1Bit6,
            0b011 => Self::Sr2Bit7,
            0b110 => Self::Sr2Bit1WriteSr2,
            _ => Self::None,
        }
    }

    /// Check if a QE bit has to be set for quad modes
    pub fn is_needed(&self) -> bool {
        !matches!(self, Self::None)
    }
}

bitflags! {
    /// 4-4-4 mode enable sequences (BFPT DWORD 15 bits [8:4])
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct QpiEnableSequences: u8 {
        /// Set QE per QER, then issue 38h
        const QE_THEN_38 = 1 << 0;
        /// Issue 38h
        const ISSUE_38 = 1 << 1;
        /// Issue 35h
        const ISSUE_35 = 1 << 2;
        /// Read-modify-write bit 6 of CR2V at 800003h with 65h/71h
        const CR2V_BIT6 = 1 << 3;
        /// Read-modify-write VECR with 65h/61h, clearing bit 7
        const VECR_BIT7 = 1 << 4;
    }
}

bitflags! {
    /// 4-4-4 mode disable sequences (BFPT DWORD 15 bits [3:0])
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct QpiDisableSequences: u8 {
        /// Issue FFh
        const ISSUE_FF = 1 << 0;
        /// Issue F5h
        const ISSUE_F5 = 1 << 1;
        /// Read-modify-write bit 6 of CR2V at 800003h with 65h/71h
        const CR2V_BIT6 = 1 << 2;
        /// Soft reset (66h/99h)
        const SOFT_RESET = 1 << 3;
    }
}

bitflags! {
    /// Methods to enter 4-byte address mode (BFPT DWORD 16 bits [31:24])
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FourByteEntryMethods: u8 {
        /// Issue B7h
        const INSTR_B7 = 1 << 0;
        /// Issue WREN, then B7h
        const WREN_INSTR_B7 = 1 << 1;
        /// 8-bit volatile extended address register
        const EXT_ADDR_REG = 1 << 2;
        /// 8-bit volatile bank register
        const BANK_REG = 1 << 3;
        /// 16-bit non-volatile configuration register
        const NV_CONFIG_REG = 1 << 4;
        /// Dedicated 4-byte address instruction set
        const DEDICATED_INSTRUCTIONS = 1 << 5;
        /// Always operates in 4-byte address mode
        const ALWAYS_4BYTE = 1 << 6;
    }
}
