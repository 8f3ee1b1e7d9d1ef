//! Simulate command implementation
//!
//! Drives the block device against the in-memory emulator, which is useful
//! for checking how a chip's SFDP tables will be interpreted before any
//! hardware is involved.

use super::{format_size, load_image};
use crate::cli::ImageArgs;
use crate::error::CliError;
use indicatif::{ProgressBar, ProgressStyle};
use qspif_core::device::{BlockDevice, DeviceConfig, QspifBlockDevice};
use qspif_dummy::{DummyConfig, DummyQspiFlash};
use std::path::Path;
use std::time::Duration;

/// Bytes transferred per progress update
const CHUNK_SIZE: u64 = 4096;

/// Run the simulate command
pub fn run_simulate(
    args: &ImageArgs,
    config: Option<&Path>,
    start: u64,
    length: u64,
    registers: &[(u32, u8)],
) -> Result<(), CliError> {
    let data = load_image(args)?;
    if args.config_id.is_some() {
        log::warn!("--config-id is ignored, the device detects its configuration");
    }

    let device_config = match config {
        Some(path) => DeviceConfig::load(path)?,
        None => DeviceConfig::default(),
    };

    let chip = DummyQspiFlash::new(DummyConfig::from_sfdp(data)?);
    let handle = chip.handle();
    for &(addr, value) in registers {
        handle.set_register(addr, value);
    }

    let device = QspifBlockDevice::new(chip, device_config)?;
    device.init()?;
    print_summary(&device);

    if length == 0 || !device.is_valid_range(start, length) {
        return Err(CliError::InvalidArgument(format!(
            "Range 0x{:X}+0x{:X} is outside the {} device",
            start,
            length,
            format_size(device.size())
        )));
    }
    let page = device.program_size();
    if start % page != 0 || length % page != 0 {
        return Err(CliError::InvalidArgument(format!(
            "Start and length must be multiples of the {} byte page",
            page
        )));
    }

    erase_with_progress(&device, start, length)?;
    let pattern: Vec<u8> = (0..length).map(|i| (i as u8) ^ 0xA5).collect();
    program_with_progress(&device, start, &pattern)?;
    verify(&device, start, &pattern)?;

    device.deinit()?;
    println!(
        "Simulation passed: {} bus transactions",
        handle.transactions().len()
    );
    Ok(())
}

fn print_summary(device: &QspifBlockDevice<DummyQspiFlash>) {
    println!("Device size:   {}", format_size(device.size()));
    println!("Page size:     {} bytes", device.program_size());
    match device.erase_size() {
        0 => println!("Erase size:    not uniform"),
        size => println!("Erase size:    {}", format_size(size)),
    }
    if let Some(id) = device.config_id() {
        println!("Sector map:    configuration {}", id);
    }
    if let Some(bus) = device.bus_config() {
        println!(
            "Read mode:     {} opcode 0x{:02X} ({} wait cycles), {}-byte addresses",
            bus.read_mode,
            bus.read_opcode,
            bus.read_dummy_cycles,
            bus.address_width.bytes()
        );
    }
}

fn erase_with_progress(
    device: &QspifBlockDevice<DummyQspiFlash>,
    start: u64,
    length: u64,
) -> Result<(), CliError> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(format!(
        "Erasing {} at 0x{:08X}...",
        format_size(length),
        start
    ));
    pb.enable_steady_tick(Duration::from_millis(100));

    let result = device.erase(start, length);
    pb.finish_and_clear();
    result?;

    println!("Erased {} bytes starting at 0x{:08X}", length, start);
    Ok(())
}

fn program_with_progress(
    device: &QspifBlockDevice<DummyQspiFlash>,
    start: u64,
    data: &[u8],
) -> Result<(), CliError> {
    let pb = ProgressBar::new(data.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) Programming")?
            .progress_chars("#>-"),
    );

    // Pages are powers of two, so this stays page aligned
    let step = CHUNK_SIZE.max(device.program_size());
    for (i, chunk) in data.chunks(step as usize).enumerate() {
        device.program(start + i as u64 * step, chunk)?;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_with_message("done");
    Ok(())
}

fn verify(
    device: &QspifBlockDevice<DummyQspiFlash>,
    start: u64,
    expected: &[u8],
) -> Result<(), CliError> {
    let mut buf = vec![0u8; CHUNK_SIZE as usize];

    for (i, want) in expected.chunks(CHUNK_SIZE as usize).enumerate() {
        let addr = start + i as u64 * CHUNK_SIZE;
        let got = &mut buf[..want.len()];
        device.read(addr, got)?;

        if let Some(pos) = got.iter().zip(want).position(|(a, b)| a != b) {
            return Err(CliError::VerifyMismatch {
                addr: addr + pos as u64,
                expected: want[pos],
                actual: got[pos],
            });
        }
    }

    println!("Verified {} bytes", expected.len());
    Ok(())
}
