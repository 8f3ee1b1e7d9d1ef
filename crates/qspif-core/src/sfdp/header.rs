//! SFDP header and parameter header parsing

use super::types::*;
use super::SfdpReader;
use crate::error::{ParseFailure, Result};

/// Read the SFDP header and locate the parameter tables
///
/// Fails with `ParsingFailed` on a bad signature, a major revision other
/// than 1, an implausible header count or when no usable Basic Flash
/// Parameter Table header exists. When several basic table headers are
/// present the highest revision with major 1 is used.
pub fn parse_headers<R: SfdpReader>(reader: &mut R) -> Result<SfdpTables> {
    let mut buf = [0u8; 8];
    reader.read_sfdp(0, &mut buf)?;
    let header = SfdpHeader::parse(&buf);

    if !header.is_valid() {
        log::debug!("SFDP signature 0x{:08X} invalid", header.signature);
        return Err(ParseFailure::BadSignature.into());
    }
    if header.revision.major != 1 {
        return Err(ParseFailure::UnsupportedRevision {
            major: header.revision.major,
        }
        .into());
    }

    let count = header.num_param_headers();
    if count > MAX_PARAMETER_HEADERS {
        return Err(ParseFailure::ImplausibleHeaderCount { count }.into());
    }

    log::debug!("SFDP revision {}, {} parameter headers", header.revision, count);

    let mut basic: Option<TableLocation> = None;
    let mut sector_map = None;

    for i in 0..count {
        let addr = 0x08 + (i as u32) * 8;
        reader.read_sfdp(addr, &mut buf)?;
        let param = ParameterHeader::parse(&buf);

        log::trace!(
            "Parameter header {}: ID 0x{:04X}, rev {}, {} bytes at 0x{:06X}",
            i,
            param.id,
            param.revision,
            param.length_bytes(),
            param.table_pointer
        );

        match param.id {
            PARAM_ID_BASIC if param.revision.major == 1 => {
                let better = basic.map_or(true, |b| param.revision > b.revision);
                if better {
                    basic = Some(param.location());
                }
            }
            PARAM_ID_BASIC => {
                log::warn!(
                    "Ignoring basic table with unsupported revision {}",
                    param.revision
                );
            }
            PARAM_ID_SECTOR_MAP if sector_map.is_none() => {
                sector_map = Some(param.location());
            }
            _ => {}
        }
    }

    let basic = basic.ok_or(ParseFailure::MissingBasicTable)?;

    Ok(SfdpTables {
        revision: header.revision,
        basic,
        sector_map,
    })
}

/// Read a parameter table into `buf`, returning the number of bytes read
///
/// Tables longer than `buf` are truncated.
pub fn read_table<R: SfdpReader>(
    reader: &mut R,
    location: &TableLocation,
    buf: &mut [u8],
) -> Result<usize> {
    let len = core::cmp::min(location.len, buf.len());
    reader.read_sfdp(location.addr, &mut buf[..len])?;
    Ok(len)
}
