//! Basic Flash Parameter Table parsing

use super::header::read_table;
use super::types::*;
use super::SfdpReader;
use crate::error::{ParseFailure, Result};
use crate::geometry::{EraseType, EraseTypes, MAX_ERASE_TYPES};
use crate::spi::{opcodes, AddressWidth, IoMode};

/// Mandatory part of the table (JESD216, 9 DWORDs)
pub const BASIC_TABLE_MIN_LEN: usize = 36;

/// Largest table read from the chip (JESD216F, 23 DWORDs)
pub const BASIC_TABLE_MAX_LEN: usize = 92;

/// Default page size when DWORD 11 is absent
pub const DEFAULT_PAGE_SIZE: u32 = 256;

/// Little-endian DWORD view of a parameter table
#[derive(Debug, Clone, Copy)]
pub struct Dwords<'a> {
    data: &'a [u8],
}

impl<'a> Dwords<'a> {
    /// Wrap raw table bytes
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// DWORD `n` (1-based, as numbered by JESD216), if present
    pub fn get(&self, n: usize) -> Option<u32> {
        let offset = n.checked_sub(1)? * 4;
        let bytes = self.data.get(offset..offset + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Number of complete DWORDs
    pub fn len(&self) -> usize {
        self.data.len() / 4
    }

    /// Check if the table holds no complete DWORD
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A read mode the chip advertises, with its instruction parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadModeCandidate {
    /// Bus lines per phase
    pub mode: IoMode,
    /// Instruction, mode and dummy clocks
    pub params: FastReadParams,
}

/// Decoded Basic Flash Parameter Table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BasicFlashParams {
    /// Table revision
    pub revision: SfdpRevision,
    /// Device size in bytes
    pub density_bytes: u64,
    /// Page program size in bytes
    pub page_size: u32,
    /// Supported address widths
    pub address_mode: AddressMode,
    /// Legacy 4 KiB erase instruction from DWORD 1, if supported
    pub legacy_4k_opcode: Option<u8>,
    /// Erase type slots (DWORDs 8-9)
    pub erase_types: EraseTypes,
    /// 1-1-2 fast read
    pub fast_read_112: Option<FastReadParams>,
    /// 1-2-2 fast read
    pub fast_read_122: Option<FastReadParams>,
    /// 2-2-2 fast read
    pub fast_read_222: Option<FastReadParams>,
    /// 1-1-4 fast read
    pub fast_read_114: Option<FastReadParams>,
    /// 1-4-4 fast read
    pub fast_read_144: Option<FastReadParams>,
    /// 4-4-4 fast read
    pub fast_read_444: Option<FastReadParams>,
    /// Quad Enable bit handling
    pub quad_enable: QuadEnableMethod,
    /// Ways to enter 4-4-4 mode
    pub qpi_enable: QpiEnableSequences,
    /// Ways to leave 4-4-4 mode
    pub qpi_disable: QpiDisableSequences,
    /// Ways to enter 4-byte address mode
    pub four_byte_entry: FourByteEntryMethods,
}

impl BasicFlashParams {
    /// Decode the table bytes
    ///
    /// Fails if the mandatory 9 DWORDs are missing or the density is zero
    /// or not addressable with 32 bits.
    pub fn parse(data: &[u8], revision: SfdpRevision) -> Result<Self> {
        let dw = Dwords::new(data);
        if data.len() < BASIC_TABLE_MIN_LEN {
            return Err(ParseFailure::TableTooShort {
                id: PARAM_ID_BASIC,
                len: data.len(),
            }
            .into());
        }

        // Mandatory DWORDs are present past the length check
        let dword = |n: usize| dw.get(n).unwrap_or(0);

        let mut params = Self {
            revision,
            page_size: DEFAULT_PAGE_SIZE,
            ..Default::default()
        };

        // DWORD 1: 4K erase, address bytes, fast read support flags
        let dw1 = dword(1);
        if dw1 & 0x03 == 0x01 {
            params.legacy_4k_opcode = Some(((dw1 >> 8) & 0xFF) as u8);
        }
        params.address_mode = AddressMode::from_bfpt(((dw1 >> 17) & 0x03) as u8);

        // DWORD 2: density
        params.density_bytes = parse_density(dword(2))?;

        // DWORDs 3-7: fast read instructions, each gated by its support flag
        let dw3 = dword(3);
        let dw4 = dword(4);
        let dw5 = dword(5);
        params.fast_read_144 = supported(dw1 & (1 << 21) != 0, FastReadParams::from_low_half(dw3));
        params.fast_read_114 = supported(dw1 & (1 << 22) != 0, FastReadParams::from_high_half(dw3));
        params.fast_read_112 = supported(dw1 & (1 << 16) != 0, FastReadParams::from_low_half(dw4));
        params.fast_read_122 = supported(dw1 & (1 << 20) != 0, FastReadParams::from_high_half(dw4));
        params.fast_read_222 = supported(dw5 & (1 << 0) != 0, FastReadParams::from_high_half(dword(6)));
        params.fast_read_444 = supported(dw5 & (1 << 4) != 0, FastReadParams::from_high_half(dword(7)));

        // DWORDs 8-9: erase types
        params.erase_types = parse_erase_types(dword(8), dword(9));
        params.reconcile_4k_erase();

        // DWORD 11 (JESD216A+): page size
        if let Some(dw11) = dw.get(11) {
            let exp = (dw11 >> 4) & 0x0F;
            if exp > 0 {
                params.page_size = 1 << exp;
            }
        }

        // DWORDs 15-16 (JESD216B+): QE, QPI sequences, 4-byte entry
        if let (Some(dw15), Some(dw16)) = (dw.get(15), dw.get(16)) {
            params.quad_enable = QuadEnableMethod::from_bfpt(((dw15 >> 20) & 0x07) as u8);
            params.qpi_enable = QpiEnableSequences::from_bits_truncate(((dw15 >> 4) & 0x1F) as u8);
            params.qpi_disable = QpiDisableSequences::from_bits_truncate((dw15 & 0x0F) as u8);
            params.four_byte_entry = FourByteEntryMethods::from_bits_truncate((dw16 >> 24) as u8);
        }

        log::debug!(
            "Basic table rev {}: {} bytes, page {}, QE {:?}",
            revision,
            params.density_bytes,
            params.page_size,
            params.quad_enable
        );

        Ok(params)
    }

    /// Make the 4 KiB erase type and the legacy opcode agree
    ///
    /// A 4 KiB slot takes precedence over the DWORD 1 instruction. Without
    /// any erase type slot the legacy 4 KiB erase becomes slot 1.
    fn reconcile_4k_erase(&mut self) {
        let Some(legacy) = self.legacy_4k_opcode else {
            return;
        };

        match self.erase_types.find_size(4096).and_then(|s| self.erase_types.get(s)) {
            Some(et) if et.opcode != legacy => {
                log::warn!(
                    "4 KiB erase opcode 0x{:02X} differs from legacy 0x{:02X}, using erase type",
                    et.opcode,
                    legacy
                );
                self.legacy_4k_opcode = Some(et.opcode);
            }
            Some(_) => {}
            None if self.erase_types.is_empty() => {
                self.erase_types.set(0, Some(EraseType::new(legacy, 4096)));
            }
            None => {}
        }
    }

    /// Read modes in priority order, fastest first
    ///
    /// QPI (4-4-4) > 1-4-4 > 1-1-4 > 2-2-2 > 1-2-2 > 1-1-2 > 1-1-1. The
    /// single-line READ (03h) is always the last entry.
    pub fn read_mode_candidates(&self) -> heapless::Vec<ReadModeCandidate, 7> {
        let ordered = [
            (IoMode::Qpi, self.fast_read_444),
            (IoMode::QuadIo, self.fast_read_144),
            (IoMode::QuadOut, self.fast_read_114),
            (IoMode::Dpi, self.fast_read_222),
            (IoMode::DualIo, self.fast_read_122),
            (IoMode::DualOut, self.fast_read_112),
            (
                IoMode::Single,
                Some(FastReadParams::new(opcodes::READ, 0, 0)),
            ),
        ];

        ordered
            .into_iter()
            .filter_map(|(mode, params)| params.map(|params| ReadModeCandidate { mode, params }))
            .collect()
    }

    /// Check if the device is too large for 3-byte addresses
    pub fn needs_4byte_addressing(&self) -> bool {
        self.density_bytes > AddressWidth::ThreeByte.max_size()
            || self.address_mode == AddressMode::FourByteOnly
    }
}

/// Read and decode the Basic Flash Parameter Table
pub fn read_basic_table<R: SfdpReader>(
    reader: &mut R,
    location: &TableLocation,
) -> Result<BasicFlashParams> {
    let mut buf = [0u8; BASIC_TABLE_MAX_LEN];
    let len = read_table(reader, location, &mut buf)?;
    BasicFlashParams::parse(&buf[..len], location.revision)
}

fn supported(flag: bool, params: FastReadParams) -> Option<FastReadParams> {
    (flag && params.is_supported()).then_some(params)
}

/// Decode DWORD 2 into bytes
fn parse_density(dword: u32) -> Result<u64> {
    let value = (dword & 0x7FFF_FFFF) as u64;
    let bytes = if dword & (1 << 31) == 0 {
        // Bits 30:0 hold the density in bits minus one
        (value + 1) / 8
    } else if (3..=35).contains(&value) {
        // 2^N bits
        1u64 << (value - 3)
    } else {
        0
    };

    if bytes == 0 || bytes > (1 << 32) {
        return Err(ParseFailure::InvalidDensity.into());
    }
    Ok(bytes)
}

/// Decode DWORDs 8 and 9 into the four erase type slots
fn parse_erase_types(dword8: u32, dword9: u32) -> EraseTypes {
    let mut types = EraseTypes::default();
    let raw = (dword8 as u64) | ((dword9 as u64) << 32);

    for slot in 0..MAX_ERASE_TYPES {
        let field = (raw >> (slot * 16)) & 0xFFFF;
        let size_exp = (field & 0xFF) as u8;
        let opcode = (field >> 8) as u8;
        types.set(slot, EraseType::from_sfdp(size_exp, opcode));
    }

    types
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    /// MX25L6436E basic table (16 DWORDs)
    const MX25L6436E: [u8; 64] = [
        0xE5, 0x20, 0xF1, 0xFF, // DWORD 1
        0xFF, 0xFF, 0xFF, 0x03, // DWORD 2: 64 Mbit
        0x44, 0xEB, 0x08, 0x6B, // DWORD 3
        0x08, 0x3B, 0x04, 0xBB, // DWORD 4
        0xFE, 0xFF, 0xFF, 0xFF, // DWORD 5
        0xFF, 0xFF, 0x00, 0xFF, // DWORD 6
        0xFF, 0xFF, 0x00, 0xFF, // DWORD 7
        0x0C, 0x20, 0x0F, 0x52, // DWORD 8
        0x10, 0xD8, 0x00, 0xFF, // DWORD 9
        0xFF, 0xFF, 0xFF, 0xFF, // DWORD 10
        0x81, 0x00, 0x00, 0x00, // DWORD 11: 256 byte pages
        0xFF, 0xFF, 0xFF, 0xFF, // DWORD 12
        0xFF, 0xFF, 0xFF, 0xFF, // DWORD 13
        0xFF, 0xFF, 0xFF, 0xFF, // DWORD 14
        0x00, 0x00, 0x20, 0x00, // DWORD 15: QER 010b
        0x00, 0x00, 0x00, 0x00, // DWORD 16
    ];

    #[test]
    fn test_parse_mx25l6436e() {
        let params = BasicFlashParams::parse(&MX25L6436E, SfdpRevision::new(1, 0)).unwrap();

        assert_eq!(params.density_bytes, 8 * 1024 * 1024);
        assert_eq!(params.page_size, 256);
        assert_eq!(params.legacy_4k_opcode, Some(0x20));
        assert_eq!(params.address_mode, AddressMode::ThreeByteOnly);
        assert_eq!(params.quad_enable, QuadEnableMethod::Sr1Bit6);
        assert!(!params.needs_4byte_addressing());

        assert_eq!(params.erase_types.get(0), Some(EraseType::new(0x20, 4096)));
        assert_eq!(params.erase_types.get(1), Some(EraseType::new(0x52, 32768)));
        assert_eq!(params.erase_types.get(2), Some(EraseType::new(0xD8, 65536)));
        assert_eq!(params.erase_types.get(3), None);

        assert_eq!(params.fast_read_144, Some(FastReadParams::new(0xEB, 2, 4)));
        assert_eq!(params.fast_read_114, Some(FastReadParams::new(0x6B, 0, 8)));
        assert_eq!(params.fast_read_112, Some(FastReadParams::new(0x3B, 0, 8)));
        assert_eq!(params.fast_read_122, Some(FastReadParams::new(0xBB, 0, 4)));
        assert_eq!(params.fast_read_222, None);
        assert_eq!(params.fast_read_444, None);
    }

    #[test]
    fn test_read_mode_priority() {
        let params = BasicFlashParams::parse(&MX25L6436E, SfdpRevision::new(1, 0)).unwrap();
        let modes: heapless::Vec<IoMode, 7> = params
            .read_mode_candidates()
            .iter()
            .map(|c| c.mode)
            .collect();
        assert_eq!(
            modes.as_slice(),
            &[
                IoMode::QuadIo,
                IoMode::QuadOut,
                IoMode::DualIo,
                IoMode::DualOut,
                IoMode::Single
            ]
        );
    }

    #[test]
    fn test_table_too_short() {
        assert_eq!(
            BasicFlashParams::parse(&MX25L6436E[..32], SfdpRevision::new(1, 0)),
            Err(Error::ParsingFailed(ParseFailure::TableTooShort {
                id: PARAM_ID_BASIC,
                len: 32
            }))
        );
    }

    #[test]
    fn test_rev_1_0_table_defaults() {
        // Only the 9 mandatory DWORDs: no page size, no QER
        let params = BasicFlashParams::parse(&MX25L6436E[..36], SfdpRevision::new(1, 0)).unwrap();
        assert_eq!(params.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(params.quad_enable, QuadEnableMethod::None);
    }

    #[test]
    fn test_density_formats() {
        assert_eq!(parse_density(0x03FF_FFFF), Ok(8 * 1024 * 1024));
        // 2^31 bits = 256 MiB
        assert_eq!(parse_density(0x8000_001F), Ok(256 * 1024 * 1024));
        assert_eq!(
            parse_density(0x8000_0002),
            Err(Error::ParsingFailed(ParseFailure::InvalidDensity))
        );
        assert_eq!(
            parse_density(0x8000_0040),
            Err(Error::ParsingFailed(ParseFailure::InvalidDensity))
        );
        assert_eq!(
            parse_density(0x0000_0000),
            Err(Error::ParsingFailed(ParseFailure::InvalidDensity))
        );
    }

    #[test]
    fn test_4k_slot_overrides_legacy_opcode() {
        let mut table = MX25L6436E;
        table[1] = 0x21; // legacy 4K opcode
        let params = BasicFlashParams::parse(&table, SfdpRevision::new(1, 0)).unwrap();
        assert_eq!(params.legacy_4k_opcode, Some(0x20));
    }

    #[test]
    fn test_legacy_4k_fills_empty_slots() {
        let mut table = MX25L6436E;
        table[28..36].fill(0x00);
        let params = BasicFlashParams::parse(&table, SfdpRevision::new(1, 0)).unwrap();
        assert_eq!(params.erase_types.get(0), Some(EraseType::new(0x20, 4096)));
        assert_eq!(params.erase_types.valid_mask().bits(), 0b0001);
    }

    #[test]
    fn test_dwords_bounds() {
        let dw = Dwords::new(&[1, 0, 0, 0, 2, 0]);
        assert_eq!(dw.get(0), None);
        assert_eq!(dw.get(1), Some(1));
        assert_eq!(dw.get(2), None);
        assert_eq!(dw.len(), 1);
    }
}
