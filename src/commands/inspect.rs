//! Inspect command implementation

use super::{decode_image, format_size, load_image, DecodedImage};
use crate::cli::ImageArgs;
use crate::error::CliError;
use qspif_core::geometry::DeviceGeometry;
use qspif_core::sfdp::{DetectionAddress, SectorMapTable};

/// Run the inspect command
pub fn run_inspect(args: &ImageArgs) -> Result<(), CliError> {
    let data = load_image(args)?;
    let decoded = decode_image(&data)?;

    print_basic(&decoded);
    if let Some(table) = &decoded.sector_map {
        print_sector_map(table);
    }

    let geometry = decoded.geometry(args.config_id)?;
    print_geometry(&geometry);
    Ok(())
}

fn print_basic(decoded: &DecodedImage) {
    let basic = &decoded.basic;

    println!("SFDP revision:      {}", decoded.tables.revision);
    println!(
        "Basic table:        rev {} at 0x{:X}, {} bytes",
        decoded.tables.basic.revision, decoded.tables.basic.addr, decoded.tables.basic.len
    );
    println!("Density:            {}", format_size(basic.density_bytes));
    println!("Page size:          {} bytes", basic.page_size);
    println!("Address mode:       {:?}", basic.address_mode);
    if let Some(op) = basic.legacy_4k_opcode {
        println!("Legacy 4K erase:    0x{:02X}", op);
    }
    println!("Quad enable:        {:?}", basic.quad_enable);
    println!("QPI enable:         {:?}", basic.qpi_enable);
    println!("QPI disable:        {:?}", basic.qpi_disable);
    println!("4-byte entry:       {:?}", basic.four_byte_entry);

    println!();
    println!("Erase types:");
    for (slot, erase) in basic.erase_types.iter() {
        println!(
            "  Type {}: opcode 0x{:02X}, {}",
            slot + 1,
            erase.opcode,
            format_size(erase.size as u64)
        );
    }

    println!();
    println!("Read modes (fastest first):");
    for candidate in basic.read_mode_candidates() {
        println!(
            "  {:<6} opcode 0x{:02X}, {} mode + {} dummy clocks",
            candidate.mode.to_string(),
            candidate.params.opcode,
            candidate.params.mode_clocks,
            candidate.params.dummy_clocks
        );
    }
}

fn print_sector_map(table: &SectorMapTable) {
    println!();
    println!("Sector map detection:");
    if table.commands.is_empty() {
        println!("  (none, first map applies)");
    }
    for cmd in &table.commands {
        let address = match cmd.address_width {
            DetectionAddress::None => "no address".to_string(),
            DetectionAddress::ThreeByte => format!("3-byte 0x{:06X}", cmd.address),
            DetectionAddress::FourByte => format!("4-byte 0x{:08X}", cmd.address),
            DetectionAddress::Current => format!("current width 0x{:08X}", cmd.address),
        };
        let latency = cmd
            .dummy_cycles
            .map_or_else(|| "variable".to_string(), |d| d.to_string());
        println!(
            "  opcode 0x{:02X}, {}, latency {}, mask 0x{:02X}",
            cmd.opcode, address, latency, cmd.read_mask
        );
    }

    for map in &table.maps {
        println!("Configuration {}:", map.config_id);
        let mut start = 0u64;
        for (size, mask) in &map.regions {
            println!(
                "  0x{:08X}..0x{:08X}  {:>8}  {:?}",
                start,
                start + size,
                format_size(*size),
                mask
            );
            start += size;
        }
    }
}

fn print_geometry(geometry: &DeviceGeometry) {
    println!();
    println!("Regions:");
    for (i, region) in geometry.regions.iter().enumerate() {
        let smallest = geometry.erase_size_at(region.start());
        println!(
            "  {}: 0x{:08X}..0x{:08X}  smallest erase {}",
            i,
            region.start(),
            region.boundary,
            format_size(smallest)
        );
    }

    match geometry.min_common_erase_size {
        0 => println!("Uniform erase size: none"),
        size => println!("Uniform erase size: {}", format_size(size)),
    }
}
