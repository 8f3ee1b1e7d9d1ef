//! Command implementations

mod inspect;
mod plan_erase;
mod simulate;

pub use inspect::run_inspect;
pub use plan_erase::run_plan_erase;
pub use simulate::run_simulate;

use crate::cli::ImageArgs;
use crate::error::CliError;
use qspif_core::geometry::{DeviceGeometry, RegionMap};
use qspif_core::sfdp::{self, BasicFlashParams, SectorMapTable, SfdpImage, SfdpTables};
use qspif_dummy::SfdpImageBuilder;

/// SFDP image with its decoded tables
pub struct DecodedImage {
    pub tables: SfdpTables,
    pub basic: BasicFlashParams,
    pub sector_map: Option<SectorMapTable>,
}

/// Load the SFDP image named on the command line, or the built-in profile
pub fn load_image(args: &ImageArgs) -> Result<Vec<u8>, CliError> {
    match &args.image {
        Some(path) => std::fs::read(path).map_err(|source| CliError::Io {
            path: path.clone(),
            source,
        }),
        None => {
            log::info!("No SFDP image given, using the built-in 16 MiB profile");
            Ok(SfdpImageBuilder::generic_16m().build())
        }
    }
}

/// Decode all tables the block device uses
pub fn decode_image(data: &[u8]) -> Result<DecodedImage, CliError> {
    let mut reader = SfdpImage::new(data);
    let tables = sfdp::parse_headers(&mut reader)?;
    let basic = sfdp::read_basic_table(&mut reader, &tables.basic)?;
    let sector_map = tables
        .sector_map
        .map(|location| sfdp::read_sector_map(&mut reader, &location))
        .transpose()?;

    Ok(DecodedImage {
        tables,
        basic,
        sector_map,
    })
}

impl DecodedImage {
    /// Geometry for a sector map configuration (first map if `None`)
    pub fn geometry(&self, config_id: Option<u8>) -> Result<DeviceGeometry, CliError> {
        let regions = match &self.sector_map {
            Some(table) => table.select(config_id)?.region_map()?,
            None => RegionMap::single(self.basic.density_bytes, self.basic.erase_types.valid_mask()),
        };
        Ok(DeviceGeometry::new(
            self.basic.density_bytes,
            self.basic.page_size,
            self.basic.erase_types,
            regions,
        )?)
    }
}

/// Format a byte count with a binary unit
pub fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{} MiB", bytes / MIB)
    } else if bytes >= KIB && bytes % KIB == 0 {
        format!("{} KiB", bytes / KIB)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(16 * 1024 * 1024), "16 MiB");
        assert_eq!(format_size(68 * 1024), "68 KiB");
        assert_eq!(format_size(300), "300 B");
    }

    #[test]
    fn test_builtin_geometry() {
        let data = load_image(&ImageArgs::default()).unwrap();
        let decoded = decode_image(&data).unwrap();
        let geometry = decoded.geometry(None).unwrap();
        assert_eq!(geometry.size, 16 * 1024 * 1024);
        assert_eq!(geometry.min_common_erase_size, 4096);
    }
}
