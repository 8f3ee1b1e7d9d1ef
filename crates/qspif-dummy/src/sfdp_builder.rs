//! SFDP image synthesis
//!
//! Builds SFDP images from known parameters so that parser and device
//! tests can compare what they decode against what was encoded.

use qspif_core::geometry::EraseTypeMask;
use qspif_core::sfdp::{
    AddressMode, DetectionAddress, FastReadParams, FourByteEntryMethods, QpiDisableSequences,
    QpiEnableSequences, QuadEnableMethod, PARAM_ID_BASIC, PARAM_ID_SECTOR_MAP, SFDP_SIGNATURE,
};
use qspif_core::spi::IoMode;

/// Where the basic table is placed in the image
const BASIC_TABLE_ADDR: usize = 0x40;

/// Builder for Sector Map Parameter Tables
#[derive(Debug, Clone, Default)]
pub struct SectorMapBuilder {
    commands: Vec<[u32; 2]>,
    maps: Vec<(u8, Vec<(u64, EraseTypeMask)>)>,
}

impl SectorMapBuilder {
    /// Start an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a configuration detection command
    pub fn detection(
        mut self,
        opcode: u8,
        address_width: DetectionAddress,
        dummy_cycles: Option<u8>,
        read_mask: u8,
        address: u32,
    ) -> Self {
        let width = match address_width {
            DetectionAddress::None => 0b00,
            DetectionAddress::ThreeByte => 0b01,
            DetectionAddress::FourByte => 0b10,
            DetectionAddress::Current => 0b11,
        };
        let latency = dummy_cycles.map_or(0x0F, |d| (d & 0x0F) as u32);
        let header = ((read_mask as u32) << 24) | (width << 22) | (latency << 16) | ((opcode as u32) << 8);
        self.commands.push([header, address]);
        self
    }

    /// Add a configuration map
    ///
    /// Region sizes must be multiples of 256 bytes.
    pub fn map(mut self, config_id: u8, regions: &[(u64, EraseTypeMask)]) -> Self {
        self.maps.push((config_id, regions.to_vec()));
        self
    }

    /// Encode the table as DWORDs
    pub fn dwords(&self) -> Vec<u32> {
        let mut out = Vec::new();

        let last_command = self.commands.len().saturating_sub(1);
        for (i, [header, address]) in self.commands.iter().enumerate() {
            let end = u32::from(i == last_command);
            out.push(header | end);
            out.push(*address);
        }

        let last_map = self.maps.len().saturating_sub(1);
        for (i, (config_id, regions)) in self.maps.iter().enumerate() {
            let count = regions.len().saturating_sub(1) as u32;
            let end = u32::from(i == last_map);
            out.push((count << 16) | ((*config_id as u32) << 8) | 0b10 | end);
            for (size, mask) in regions {
                let units = (size / 256).saturating_sub(1) as u32;
                out.push((units << 8) | mask.bits() as u32);
            }
        }

        out
    }
}

/// Builder for complete SFDP images
#[derive(Debug, Clone)]
pub struct SfdpImageBuilder {
    density_bytes: u64,
    page_size: u32,
    legacy_4k: Option<u8>,
    erase_types: [Option<(u8, u32)>; 4],
    fast_reads: Vec<(IoMode, FastReadParams)>,
    address_mode: AddressMode,
    quad_enable: QuadEnableMethod,
    qpi_enable: QpiEnableSequences,
    qpi_disable: QpiDisableSequences,
    four_byte_entry: FourByteEntryMethods,
    basic_dwords: usize,
    sector_map: Option<SectorMapBuilder>,
}

impl SfdpImageBuilder {
    /// Start a device of `density_bytes` with 256 byte pages and no erase types
    pub fn new(density_bytes: u64) -> Self {
        Self {
            density_bytes,
            page_size: 256,
            legacy_4k: None,
            erase_types: [None; 4],
            fast_reads: Vec::new(),
            address_mode: AddressMode::ThreeByteOnly,
            quad_enable: QuadEnableMethod::None,
            qpi_enable: QpiEnableSequences::empty(),
            qpi_disable: QpiDisableSequences::empty(),
            four_byte_entry: FourByteEntryMethods::empty(),
            basic_dwords: 16,
            sector_map: None,
        }
    }

    /// A 16 MiB quad SPI NOR with 4/32/64 KiB erase and 1-1-2/1-2-2/1-1-4/1-4-4 reads
    pub fn generic_16m() -> Self {
        Self::new(16 * 1024 * 1024)
            .legacy_4k_erase(0x20)
            .erase_type(0, 0x20, 4096)
            .erase_type(1, 0x52, 32 * 1024)
            .erase_type(2, 0xD8, 64 * 1024)
            .fast_read(IoMode::DualOut, FastReadParams::new(0x3B, 0, 8))
            .fast_read(IoMode::DualIo, FastReadParams::new(0xBB, 0, 4))
            .fast_read(IoMode::QuadOut, FastReadParams::new(0x6B, 0, 8))
            .fast_read(IoMode::QuadIo, FastReadParams::new(0xEB, 2, 4))
            .quad_enable(QuadEnableMethod::Sr2Bit1WriteBoth)
    }

    /// Set the page size
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Advertise the legacy 4 KiB erase instruction in DWORD 1
    pub fn legacy_4k_erase(mut self, opcode: u8) -> Self {
        self.legacy_4k = Some(opcode);
        self
    }

    /// Fill erase type `slot` (0-3)
    pub fn erase_type(mut self, slot: usize, opcode: u8, size: u32) -> Self {
        if let Some(s) = self.erase_types.get_mut(slot) {
            *s = Some((opcode, size));
        }
        self
    }

    /// Advertise a fast read mode
    pub fn fast_read(mut self, mode: IoMode, params: FastReadParams) -> Self {
        self.fast_reads.retain(|(m, _)| *m != mode);
        self.fast_reads.push((mode, params));
        self
    }

    /// Set the address bytes field of DWORD 1
    pub fn address_mode(mut self, mode: AddressMode) -> Self {
        self.address_mode = mode;
        self
    }

    /// Set the Quad Enable requirement
    pub fn quad_enable(mut self, method: QuadEnableMethod) -> Self {
        self.quad_enable = method;
        self
    }

    /// Set the 4-4-4 enable and disable sequences
    pub fn qpi_sequences(mut self, enable: QpiEnableSequences, disable: QpiDisableSequences) -> Self {
        self.qpi_enable = enable;
        self.qpi_disable = disable;
        self
    }

    /// Set the 4-byte address entry methods
    pub fn four_byte_entry(mut self, methods: FourByteEntryMethods) -> Self {
        self.four_byte_entry = methods;
        self
    }

    /// Number of basic table DWORDs to emit (at least 9)
    pub fn basic_dwords(mut self, count: usize) -> Self {
        self.basic_dwords = count.max(9);
        self
    }

    /// Attach a sector map table
    pub fn sector_map(mut self, map: SectorMapBuilder) -> Self {
        self.sector_map = Some(map);
        self
    }

    /// Device size
    pub fn density_bytes(&self) -> u64 {
        self.density_bytes
    }

    /// Encode the Basic Flash Parameter Table
    pub fn basic_table(&self) -> Vec<u32> {
        let read = |mode: IoMode| {
            self.fast_reads
                .iter()
                .find(|(m, _)| *m == mode)
                .map(|(_, p)| *p)
        };
        let half = |p: Option<FastReadParams>| -> u32 {
            p.map_or(0, |p| {
                ((p.opcode as u32) << 8) | (((p.mode_clocks & 0x07) as u32) << 5) | (p.dummy_clocks & 0x1F) as u32
            })
        };
        let flag = |mode: IoMode, bit: u32| -> u32 {
            if read(mode).is_some() {
                1 << bit
            } else {
                0
            }
        };

        let mut dw = vec![0u32; self.basic_dwords];

        // DWORD 1
        let (erase_4k, opcode_4k) = match self.legacy_4k {
            Some(op) => (0b01, op),
            None => (0b11, 0xFF),
        };
        let address_bits = match self.address_mode {
            AddressMode::ThreeByteOnly => 0b00,
            AddressMode::ThreeOrFourByte => 0b01,
            AddressMode::FourByteOnly => 0b10,
        };
        dw[0] = 0xFF80_0000
            | erase_4k
            | ((opcode_4k as u32) << 8)
            | flag(IoMode::DualOut, 16)
            | (address_bits << 17)
            | flag(IoMode::DualIo, 20)
            | flag(IoMode::QuadIo, 21)
            | flag(IoMode::QuadOut, 22);

        // DWORD 2
        let bits = self.density_bytes * 8;
        dw[1] = if bits <= 1 << 31 {
            (bits - 1) as u32
        } else {
            (1 << 31) | bits.trailing_zeros()
        };

        // DWORDs 3-7
        dw[2] = (half(read(IoMode::QuadOut)) << 16) | half(read(IoMode::QuadIo));
        dw[3] = (half(read(IoMode::DualIo)) << 16) | half(read(IoMode::DualOut));
        dw[4] = 0xFFFF_FFEE | flag(IoMode::Dpi, 0) | flag(IoMode::Qpi, 4);
        dw[5] = (half(read(IoMode::Dpi)) << 16) | 0xFFFF;
        dw[6] = (half(read(IoMode::Qpi)) << 16) | 0xFFFF;

        // DWORDs 8-9
        for (slot, et) in self.erase_types.iter().enumerate() {
            let field = et.map_or(0, |(op, size)| ((op as u32) << 8) | size.trailing_zeros());
            dw[7 + slot / 2] |= field << ((slot % 2) * 16);
        }

        // DWORD 11
        if self.basic_dwords >= 11 {
            dw[10] = self.page_size.trailing_zeros() << 4;
        }

        // DWORDs 15-16
        if self.basic_dwords >= 16 {
            let qer: u32 = match self.quad_enable {
                QuadEnableMethod::None => 0b000,
                QuadEnableMethod::Sr2Bit1WriteBoth => 0b100,
                QuadEnableMethod::Sr1Bit6 => 0b010,
                QuadEnableMethod::Sr2Bit7 => 0b011,
                QuadEnableMethod::Sr2Bit1WriteSr2 => 0b110,
            };
            dw[14] = (qer << 20) | ((self.qpi_enable.bits() as u32) << 4) | self.qpi_disable.bits() as u32;
            dw[15] = (self.four_byte_entry.bits() as u32) << 24;
        }

        dw
    }

    /// Encode the complete SFDP image
    pub fn build(&self) -> Vec<u8> {
        let basic = self.basic_table();
        let map = self.sector_map.as_ref().map(|m| m.dwords());

        let map_addr = BASIC_TABLE_ADDR + basic.len() * 4;
        let total = map_addr + map.as_ref().map_or(0, |m| m.len() * 4);
        let mut image = vec![0xFF; total];

        let nph = u8::from(map.is_some());
        image[..4].copy_from_slice(&SFDP_SIGNATURE.to_le_bytes());
        image[4..8].copy_from_slice(&[0x06, 0x01, nph, 0xFF]);

        let header = |id: u16, len: usize, addr: usize| -> [u8; 8] {
            let ptr = (addr as u32).to_le_bytes();
            [id as u8, 0x06, 0x01, len as u8, ptr[0], ptr[1], ptr[2], (id >> 8) as u8]
        };
        image[8..16].copy_from_slice(&header(PARAM_ID_BASIC, basic.len(), BASIC_TABLE_ADDR));

        for (i, d) in basic.iter().enumerate() {
            let at = BASIC_TABLE_ADDR + i * 4;
            image[at..at + 4].copy_from_slice(&d.to_le_bytes());
        }

        if let Some(map) = map {
            image[16..24].copy_from_slice(&header(PARAM_ID_SECTOR_MAP, map.len(), map_addr));
            for (i, d) in map.iter().enumerate() {
                let at = map_addr + i * 4;
                image[at..at + 4].copy_from_slice(&d.to_le_bytes());
            }
        }

        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qspif_core::geometry::EraseType;
    use qspif_core::sfdp::{self, SectorMapTable, SfdpImage};

    #[test]
    fn test_basic_table_round_trip() {
        let builder = SfdpImageBuilder::generic_16m()
            .page_size(512)
            .fast_read(IoMode::Qpi, FastReadParams::new(0xEB, 2, 6))
            .qpi_sequences(QpiEnableSequences::ISSUE_38, QpiDisableSequences::ISSUE_FF);
        let image = builder.build();
        let mut reader = SfdpImage::new(&image);

        let tables = sfdp::parse_headers(&mut reader).unwrap();
        assert!(tables.sector_map.is_none());
        let params = sfdp::read_basic_table(&mut reader, &tables.basic).unwrap();

        assert_eq!(params.density_bytes, 16 * 1024 * 1024);
        assert_eq!(params.page_size, 512);
        assert_eq!(params.legacy_4k_opcode, Some(0x20));
        assert_eq!(params.erase_types.get(1), Some(EraseType::new(0x52, 32 * 1024)));
        assert_eq!(params.erase_types.get(3), None);
        assert_eq!(params.fast_read_144, Some(FastReadParams::new(0xEB, 2, 4)));
        assert_eq!(params.fast_read_444, Some(FastReadParams::new(0xEB, 2, 6)));
        assert_eq!(params.fast_read_222, None);
        assert_eq!(params.quad_enable, QuadEnableMethod::Sr2Bit1WriteBoth);
        assert_eq!(params.qpi_enable, QpiEnableSequences::ISSUE_38);
        assert_eq!(params.qpi_disable, QpiDisableSequences::ISSUE_FF);
    }

    #[test]
    fn test_large_density_uses_power_of_two_form() {
        let image = SfdpImageBuilder::new(512 * 1024 * 1024)
            .erase_type(0, 0xDC, 64 * 1024)
            .build();
        let mut reader = SfdpImage::new(&image);
        let tables = sfdp::parse_headers(&mut reader).unwrap();
        let params = sfdp::read_basic_table(&mut reader, &tables.basic).unwrap();
        assert_eq!(params.density_bytes, 512 * 1024 * 1024);
        assert!(params.needs_4byte_addressing());
    }

    #[test]
    fn test_sector_map_round_trip() {
        let map = SectorMapBuilder::new()
            .detection(0x65, DetectionAddress::ThreeByte, Some(8), 0x04, 0x80_0004)
            .map(0, &[(1024 * 1024, EraseTypeMask::TYPE_3)])
            .map(
                1,
                &[
                    (32 * 1024, EraseTypeMask::TYPE_1),
                    (992 * 1024, EraseTypeMask::TYPE_3),
                ],
            );
        let image = SfdpImageBuilder::new(1024 * 1024)
            .erase_type(0, 0x20, 4096)
            .erase_type(2, 0xD8, 64 * 1024)
            .sector_map(map)
            .build();

        let mut reader = SfdpImage::new(&image);
        let tables = sfdp::parse_headers(&mut reader).unwrap();
        let table: SectorMapTable =
            sfdp::read_sector_map(&mut reader, &tables.sector_map.unwrap()).unwrap();

        assert_eq!(table.commands.len(), 1);
        assert_eq!(table.commands[0].address, 0x80_0004);
        assert_eq!(table.maps.len(), 2);
        let regions = table.select(Some(1)).unwrap().region_map().unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions.as_slice()[0].boundary, 32 * 1024);
        assert_eq!(regions.total_size(), 1024 * 1024);
    }
}
