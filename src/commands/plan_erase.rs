//! Plan-erase command implementation

use super::{decode_image, format_size, load_image};
use crate::cli::ImageArgs;
use crate::error::CliError;

/// Run the plan-erase command
pub fn run_plan_erase(args: &ImageArgs, start: u64, length: u64) -> Result<(), CliError> {
    let data = load_image(args)?;
    let geometry = decode_image(&data)?.geometry(args.config_id)?;

    let plan = geometry.plan_erase(start, length)?;
    println!(
        "Erasing 0x{:08X}..0x{:08X} ({}):",
        start,
        start + length,
        format_size(length)
    );

    let mut count = 0;
    for step in plan {
        println!(
            "  0x{:08X}  opcode 0x{:02X}  {:>8}  region {}",
            step.addr,
            step.opcode,
            format_size(step.size as u64),
            step.region
        );
        count += 1;
    }
    println!("{} erase instruction(s)", count);

    Ok(())
}
