//! Sector Map Parameter Table parsing
//!
//! The table is a sequence of descriptors. Configuration detection
//! commands come first (DWORD 1 bit 1 clear), followed by configuration
//! map descriptors (bit 1 set), each followed by its region DWORDs. Bit 0
//! marks the last descriptor of the table.

use super::basic::Dwords;
use super::header::read_table;
use super::types::*;
use super::SfdpReader;
use crate::error::{ParseFailure, Result};
use crate::geometry::{EraseTypeMask, RegionMap, MAX_REGIONS};

/// Maximum detection commands accepted
pub const MAX_DETECTION_COMMANDS: usize = 8;

/// Maximum configuration maps accepted
pub const MAX_CONFIGURATION_MAPS: usize = 8;

/// Address phase of a detection command (DWORD 1 bits [23:22])
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionAddress {
    /// No address phase
    None,
    /// 3-byte address
    ThreeByte,
    /// 4-byte address
    FourByte,
    /// Whatever width the device currently uses
    Current,
}

/// A configuration detection command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionCommand {
    /// Read instruction
    pub opcode: u8,
    /// Dummy cycles, or `None` when the read latency is variable
    pub dummy_cycles: Option<u8>,
    /// Address phase
    pub address_width: DetectionAddress,
    /// Mask applied to the returned byte
    pub read_mask: u8,
    /// Register address
    pub address: u32,
}

/// Region layout of one configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationMap {
    /// Configuration ID this map applies to
    pub config_id: u8,
    /// Region sizes and erase type bitfields in address order
    pub regions: heapless::Vec<(u64, EraseTypeMask), MAX_REGIONS>,
}

impl ConfigurationMap {
    /// Build the region map
    pub fn region_map(&self) -> Result<RegionMap> {
        RegionMap::from_sizes(self.regions.iter().copied())
    }
}

/// Decoded Sector Map Parameter Table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectorMapTable {
    /// Detection commands in table order
    pub commands: heapless::Vec<DetectionCommand, MAX_DETECTION_COMMANDS>,
    /// Configuration maps in table order
    pub maps: heapless::Vec<ConfigurationMap, MAX_CONFIGURATION_MAPS>,
}

const DESCRIPTOR_END: u32 = 1 << 0;
const DESCRIPTOR_MAP: u32 = 1 << 1;

impl SectorMapTable {
    /// Decode the table bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        let dw = Dwords::new(data);
        if dw.len() < 2 {
            return Err(ParseFailure::TableTooShort {
                id: PARAM_ID_SECTOR_MAP,
                len: data.len(),
            }
            .into());
        }

        let mut table = Self::default();
        let mut n = 1;

        loop {
            let header = dw.get(n).ok_or(ParseFailure::MalformedSectorMap)?;

            if header & DESCRIPTOR_MAP == 0 {
                if !table.maps.is_empty() {
                    // Commands must precede all maps
                    return Err(ParseFailure::MalformedSectorMap.into());
                }
                let address = dw.get(n + 1).ok_or(ParseFailure::MalformedSectorMap)?;
                table
                    .commands
                    .push(parse_command(header, address))
                    .map_err(|_| ParseFailure::MalformedSectorMap)?;
                n += 2;
            } else {
                let count = ((header >> 16) & 0xFF) as usize + 1;
                if count > MAX_REGIONS {
                    return Err(ParseFailure::TooManyRegions { count }.into());
                }

                let mut map = ConfigurationMap {
                    config_id: ((header >> 8) & 0xFF) as u8,
                    regions: heapless::Vec::new(),
                };
                for i in 0..count {
                    let region = dw.get(n + 1 + i).ok_or(ParseFailure::MalformedSectorMap)?;
                    let size = (((region >> 8) as u64) + 1) * 256;
                    let erase_types = EraseTypeMask::from_bits_truncate((region & 0x0F) as u8);
                    // Bounded by the count check above
                    let _ = map.regions.push((size, erase_types));
                }
                table
                    .maps
                    .push(map)
                    .map_err(|_| ParseFailure::MalformedSectorMap)?;
                n += 1 + count;
            }

            if header & DESCRIPTOR_END != 0 && header & DESCRIPTOR_MAP != 0 {
                break;
            }
        }

        if table.maps.is_empty() {
            return Err(ParseFailure::MalformedSectorMap.into());
        }

        log::debug!(
            "Sector map: {} detection commands, {} maps",
            table.commands.len(),
            table.maps.len()
        );

        Ok(table)
    }

    /// Run the detection commands and fold the results into an ID
    ///
    /// `read` executes one command and returns the byte read. Each command
    /// contributes one bit, the first command ending up as the most
    /// significant. Returns `None` if the table has no detection commands.
    pub fn detect<F>(&self, mut read: F) -> Result<Option<u8>>
    where
        F: FnMut(&DetectionCommand) -> Result<u8>,
    {
        if self.commands.is_empty() {
            return Ok(None);
        }

        let mut id = 0u8;
        for cmd in &self.commands {
            let value = read(cmd)?;
            id = (id << 1) | u8::from(value & cmd.read_mask != 0);
        }

        log::debug!("Detected sector map configuration ID {}", id);
        Ok(Some(id))
    }

    /// Pick the map for a detected configuration
    ///
    /// Without detection the first map applies.
    pub fn select(&self, config_id: Option<u8>) -> Result<&ConfigurationMap> {
        let map = match config_id {
            None => self.maps.first(),
            Some(id) => self.maps.iter().find(|m| m.config_id == id),
        };
        map.ok_or_else(|| {
            ParseFailure::UnknownConfiguration {
                id: config_id.unwrap_or(0),
            }
            .into()
        })
    }
}

fn parse_command(header: u32, address: u32) -> DetectionCommand {
    let latency = ((header >> 16) & 0x0F) as u8;
    let address_width = match (header >> 22) & 0x03 {
        0b00 => DetectionAddress::None,
        0b01 => DetectionAddress::ThreeByte,
        0b10 => DetectionAddress::FourByte,
        _ => DetectionAddress::Current,
    };

    DetectionCommand {
        opcode: ((header >> 8) & 0xFF) as u8,
        dummy_cycles: (latency != 0x0F).then_some(latency),
        address_width,
        read_mask: (header >> 24) as u8,
        address,
    }
}

/// Read and decode the Sector Map Parameter Table
pub fn read_sector_map<R: SfdpReader>(
    reader: &mut R,
    location: &TableLocation,
) -> Result<SectorMapTable> {
    let mut buf = [0u8; MAX_PARAMETER_TABLE_SIZE];
    let len = read_table(reader, location, &mut buf)?;
    SectorMapTable::parse(&buf[..len])
}
