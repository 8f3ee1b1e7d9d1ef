//! Block device behaviour against the emulated chip

use std::thread;

use qspif_core::device::{BlockDevice, DeviceConfig, QspifBlockDevice, SequencerState};
use qspif_core::error::{self, Error, ParseFailure};
use qspif_core::geometry::EraseTypeMask;
use qspif_core::protocol::PollConfig;
use qspif_core::sfdp::{
    AddressMode, DetectionAddress, FastReadParams, FourByteEntryMethods, QpiDisableSequences,
    QpiEnableSequences,
};
use qspif_core::spi::{opcodes, AddressWidth, IoMode};

use super::*;

const MIB: u64 = 1024 * 1024;

fn config() -> DeviceConfig {
    DeviceConfig {
        poll: PollConfig {
            poll_delay_us: 0,
            ready_timeout_us: 32,
            wren_max_polls: 4,
        },
        ..Default::default()
    }
}

fn device_for(builder: &SfdpImageBuilder) -> (QspifBlockDevice<DummyQspiFlash>, DummyHandle) {
    let chip = DummyQspiFlash::from_builder(builder).unwrap();
    let handle = chip.handle();
    (QspifBlockDevice::new(chip, config()).unwrap(), handle)
}

fn device() -> (QspifBlockDevice<DummyQspiFlash>, DummyHandle) {
    device_for(&SfdpImageBuilder::generic_16m())
}

fn large_builder(entry: FourByteEntryMethods) -> SfdpImageBuilder {
    SfdpImageBuilder::new(32 * MIB)
        .legacy_4k_erase(0x20)
        .erase_type(0, 0x20, 4096)
        .erase_type(1, 0xD8, 64 * 1024)
        .address_mode(AddressMode::ThreeOrFourByte)
        .four_byte_entry(entry)
}

fn erase_ops(handle: &DummyHandle) -> Vec<(u8, Option<u32>)> {
    handle
        .transactions()
        .iter()
        .filter(|t| matches!(t.opcode, 0x20 | 0x52 | 0xD8))
        .map(|t| (t.opcode, t.address))
        .collect()
}

#[test]
fn test_init_discovers_geometry() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (dev, handle) = device();
    dev.init().unwrap();

    assert_eq!(dev.size(), 16 * MIB);
    assert_eq!(dev.read_size(), 1);
    assert_eq!(dev.program_size(), 256);
    assert_eq!(dev.erase_size(), 4096);
    assert_eq!(dev.erase_size_at(0x123000), 4096);
    assert_eq!(dev.config_id(), None);

    let bus = dev.bus_config().unwrap();
    assert_eq!(bus.read_mode, IoMode::QuadIo);
    assert_eq!(bus.read_opcode, 0xEB);
    assert_eq!(bus.read_dummy_cycles, 6);
    assert_eq!(bus.address_width, AddressWidth::ThreeByte);
    assert!(handle.quad_enabled());
}

#[test]
fn test_accessors_before_init() {
    let (dev, handle) = device();

    assert_eq!(dev.size(), 0);
    assert_eq!(dev.read_size(), 0);
    assert_eq!(dev.program_size(), 0);
    assert_eq!(dev.erase_size(), 0);
    assert_eq!(dev.erase_size_at(0), 0);
    assert!(!dev.is_valid_range(0, 1));

    let mut buf = [0u8; 4];
    assert_eq!(dev.read(0, &mut buf), Err(Error::NotInitialized));
    assert_eq!(dev.erase(0, 4096), Err(Error::NotInitialized));
    assert!(handle.transactions().is_empty());

    // Deinit of a fresh device is a no-op
    assert_eq!(dev.deinit(), Ok(()));
}

#[test]
fn test_init_is_idempotent() {
    let (dev, handle) = device();
    dev.init().unwrap();
    handle.clear_transactions();

    dev.init().unwrap();
    assert!(handle.transactions().is_empty());
}

#[test]
fn test_erase_program_read() {
    let (dev, handle) = device();
    dev.init().unwrap();
    handle.write_data(0x10000, &[0x00; 4096]);

    dev.erase(0x10000, 4096).unwrap();
    let data: Vec<u8> = (0..512).map(|i| (i % 251) as u8).collect();
    dev.program(0x10000, &data).unwrap();

    let mut buf = vec![0u8; 1024];
    dev.read(0x10000, &mut buf).unwrap();
    assert_eq!(&buf[..512], &data[..]);
    assert!(buf[512..].iter().all(|&b| b == 0xFF));

    let reads: Vec<_> = handle
        .transactions()
        .into_iter()
        .filter(|t| t.opcode == 0xEB)
        .collect();
    // 256 byte transfer limit
    assert_eq!(reads.len(), 4);
    assert!(reads.iter().all(|t| t.io_mode == IoMode::QuadIo));
    assert_eq!(dev.sequencer_state(), SequencerState::Idle);
}

#[test]
fn test_erase_uses_largest_blocks() {
    let (dev, handle) = device();
    dev.init().unwrap();
    handle.clear_transactions();

    dev.erase(0, 68 * 1024).unwrap();
    assert_eq!(
        erase_ops(&handle),
        vec![(0xD8, Some(0)), (0x20, Some(0x10000))]
    );

    handle.clear_transactions();
    dev.erase(0x9000, 0x17000).unwrap();
    assert_eq!(
        erase_ops(&handle),
        vec![
            (0x20, Some(0x9000)),
            (0x20, Some(0xA000)),
            (0x20, Some(0xB000)),
            (0x20, Some(0xC000)),
            (0x20, Some(0xD000)),
            (0x20, Some(0xE000)),
            (0x20, Some(0xF000)),
            (0xD8, Some(0x10000)),
        ]
    );
}

#[test]
fn test_invalid_erase_issues_nothing() {
    let (dev, handle) = device();
    dev.init().unwrap();
    handle.clear_transactions();

    let unaligned = dev.erase(0x800, 4096);
    assert_eq!(unaligned, Err(Error::InvalidAlignment));
    assert_eq!(error::to_code(&unaligned), error::CODE_DEVICE_ERROR);
    assert_eq!(dev.erase(0, 0x1800), Err(Error::NoEraseType));
    assert_eq!(dev.erase(16 * MIB - 4096, 8192), Err(Error::AddressOutOfBounds));
    assert!(handle.transactions().is_empty());

    assert_eq!(dev.erase(0x1000, 0), Ok(()));
}

#[test]
fn test_program_requires_page_alignment() {
    let (dev, handle) = device();
    dev.init().unwrap();
    handle.clear_transactions();

    assert_eq!(dev.program(0x80, &[0u8; 256]), Err(Error::InvalidAlignment));
    assert_eq!(dev.program(0, &[0u8; 100]), Err(Error::InvalidAlignment));
    assert_eq!(
        dev.program(16 * MIB, &[0u8; 256]),
        Err(Error::AddressOutOfBounds)
    );
    assert!(handle.transactions().is_empty());
}

#[test]
fn test_read_out_of_range() {
    let (dev, _handle) = device();
    dev.init().unwrap();

    let mut buf = [0u8; 16];
    assert_eq!(dev.read(16 * MIB - 8, &mut buf), Err(Error::AddressOutOfBounds));
    assert_eq!(dev.read(u64::MAX, &mut buf), Err(Error::AddressOutOfBounds));
    assert_eq!(dev.read(16 * MIB - 16, &mut buf), Ok(()));
}

#[test]
fn test_ready_timeout_and_recovery() {
    let (dev, handle) = device();
    dev.init().unwrap();

    handle.set_never_ready(true);
    let result = dev.program(0, &[0x5A; 256]);
    assert_eq!(result, Err(Error::ReadyFailed));
    assert_eq!(error::to_code(&result), error::CODE_READY_FAILED);
    assert_eq!(dev.sequencer_state(), SequencerState::Failed);

    handle.set_never_ready(false);
    dev.erase(0x1000, 4096).unwrap();
    dev.program(0x1000, &[0xA5; 256]).unwrap();
    assert_eq!(dev.sequencer_state(), SequencerState::Idle);
    assert_eq!(handle.read_data(0x1000, 256), vec![0xA5; 256]);
}

#[test]
fn test_write_enable_failure() {
    let (dev, handle) = device();
    dev.init().unwrap();
    handle.clear_transactions();
    handle.set_stuck_wel(true);

    let result = dev.erase(0, 4096);
    assert_eq!(result, Err(Error::WrenFailed));
    assert_eq!(error::to_code(&result), error::CODE_WREN_FAILED);
    assert!(erase_ops(&handle).is_empty());
    assert_eq!(dev.sequencer_state(), SequencerState::Failed);
}

#[test]
fn test_concurrent_programs_do_not_interleave() {
    let (dev, handle) = device();
    dev.init().unwrap();
    dev.erase(0, 64 * 1024).unwrap();
    handle.clear_transactions();

    thread::scope(|s| {
        for t in 0..4u8 {
            let dev = &dev;
            s.spawn(move || {
                for page in 0..8u64 {
                    let addr = (t as u64 * 8 + page) * 256;
                    dev.program(addr, &[t; 256]).unwrap();
                }
            });
        }
    });

    let log = handle.transactions();
    let mut programs = 0;
    for (i, tx) in log.iter().enumerate() {
        if tx.opcode != opcodes::WREN {
            continue;
        }
        // WREN, WEL poll, PP and the ready polls belong to one caller
        let end = log[i + 1..]
            .iter()
            .position(|t| t.opcode == opcodes::WREN)
            .map_or(log.len(), |p| i + 1 + p);
        assert!(log[i..end].iter().all(|t| t.thread == tx.thread));
        programs += 1;
    }
    assert_eq!(programs, 32);

    for t in 0..4u8 {
        let start = t as usize * 8 * 256;
        assert_eq!(handle.read_data(start, 8 * 256), vec![t; 8 * 256]);
    }
}

#[test]
fn test_quad_enable_fallback() {
    let (dev, handle) = device();
    handle.set_qe_not_sticky(true);
    dev.init().unwrap();

    let bus = dev.bus_config().unwrap();
    assert_eq!(bus.read_mode, IoMode::DualIo);
    assert_eq!(bus.read_opcode, 0xBB);
    assert!(!handle.quad_enabled());

    handle.write_data(0x200, &[0x42; 4]);
    let mut buf = [0u8; 4];
    dev.read(0x200, &mut buf).unwrap();
    assert_eq!(buf, [0x42; 4]);
}

#[test]
fn test_configured_read_mode_limit() {
    let chip = DummyQspiFlash::from_builder(&SfdpImageBuilder::generic_16m()).unwrap();
    let handle = chip.handle();
    let dev = QspifBlockDevice::new(
        chip,
        DeviceConfig {
            max_read_mode: Some(IoMode::DualOut),
            ..config()
        },
    )
    .unwrap();
    dev.init().unwrap();

    assert_eq!(dev.bus_config().unwrap().read_mode, IoMode::DualOut);
    // No quad mode was attempted
    assert!(!handle.quad_enabled());
}

fn qpi_builder(enable: QpiEnableSequences, disable: QpiDisableSequences) -> SfdpImageBuilder {
    SfdpImageBuilder::generic_16m()
        .fast_read(IoMode::Qpi, FastReadParams::new(0xEB, 2, 4))
        .qpi_sequences(enable, disable)
}

fn check_qpi_session(builder: SfdpImageBuilder, exit_opcode: u8) {
    let (dev, handle) = device_for(&builder);
    dev.init().unwrap();

    assert!(handle.is_qpi());
    assert_eq!(dev.bus_config().unwrap().read_mode, IoMode::Qpi);

    dev.erase(0, 4096).unwrap();
    dev.program(0, &[0x3C; 256]).unwrap();
    let mut buf = [0u8; 256];
    dev.read(0, &mut buf).unwrap();
    assert_eq!(buf, [0x3C; 256]);

    handle.clear_transactions();
    dev.deinit().unwrap();
    assert!(!handle.is_qpi());
    assert!(handle.opcodes().contains(&exit_opcode));
    assert_eq!(dev.size(), 0);
}

#[test]
fn test_qpi_with_instruction_sequences() {
    check_qpi_session(
        qpi_builder(QpiEnableSequences::QE_THEN_38, QpiDisableSequences::ISSUE_FF),
        opcodes::RSTQIO,
    );
}

#[test]
fn test_qpi_with_configuration_register() {
    check_qpi_session(
        qpi_builder(QpiEnableSequences::CR2V_BIT6, QpiDisableSequences::CR2V_BIT6),
        opcodes::WRAR,
    );
}

#[test]
fn test_qpi_with_vecr_and_reset_exit() {
    check_qpi_session(
        qpi_builder(QpiEnableSequences::VECR_BIT7, QpiDisableSequences::SOFT_RESET),
        opcodes::RST,
    );
}

#[test]
fn test_four_byte_addressing() {
    let (dev, handle) = device_for(&large_builder(FourByteEntryMethods::INSTR_B7));
    dev.init().unwrap();

    assert!(handle.is_four_byte());
    assert_eq!(dev.size(), 32 * MIB);
    assert_eq!(dev.bus_config().unwrap().address_width, AddressWidth::FourByte);

    let top = 31 * MIB;
    dev.erase(top, 4096).unwrap();
    dev.program(top, &[0x77; 256]).unwrap();
    assert_eq!(handle.read_data(top as usize, 256), vec![0x77; 256]);

    handle.clear_transactions();
    dev.deinit().unwrap();
    assert_eq!(handle.opcodes(), vec![opcodes::EX4B]);
    assert!(!handle.is_four_byte());
}

#[test]
fn test_four_byte_entry_with_write_enable() {
    let (dev, handle) = device_for(&large_builder(FourByteEntryMethods::WREN_INSTR_B7));
    dev.init().unwrap();
    assert!(handle.is_four_byte());
}

#[test]
fn test_four_byte_without_entry_method() {
    let (dev, _handle) = device_for(&large_builder(FourByteEntryMethods::empty()));

    assert_eq!(
        dev.init(),
        Err(Error::ParsingFailed(ParseFailure::UnsupportedAddressing))
    );
    assert_eq!(dev.size(), 0);
}

#[test]
fn test_sector_map_detection() {
    let uniform = EraseTypeMask::TYPE_1 | EraseTypeMask::TYPE_2 | EraseTypeMask::TYPE_3;
    let map = SectorMapBuilder::new()
        .detection(opcodes::RDAR, DetectionAddress::ThreeByte, Some(8), 0x08, 0x80_0004)
        .map(0, &[(16 * MIB, uniform)])
        .map(
            1,
            &[
                (64 * 1024, EraseTypeMask::TYPE_1),
                (16 * MIB - 128 * 1024, EraseTypeMask::TYPE_3),
                (64 * 1024, EraseTypeMask::TYPE_1),
            ],
        );
    let (dev, handle) = device_for(&SfdpImageBuilder::generic_16m().sector_map(map));
    handle.set_register(0x80_0004, 0x08);
    dev.init().unwrap();

    assert_eq!(dev.config_id(), Some(1));
    assert_eq!(dev.regions().unwrap().len(), 3);
    assert_eq!(dev.erase_size(), 0);
    assert_eq!(dev.erase_size_at(0), 4096);
    assert_eq!(dev.erase_size_at(0x10000), 64 * 1024);
    assert_eq!(dev.erase_size_at(16 * MIB - 1), 4096);

    handle.clear_transactions();
    assert_eq!(dev.erase(0x10000, 4096), Err(Error::NoEraseType));
    assert!(handle.transactions().is_empty());

    dev.erase(0xE000, 0x12000).unwrap();
    assert_eq!(
        erase_ops(&handle),
        vec![
            (0x20, Some(0xE000)),
            (0x20, Some(0xF000)),
            (0xD8, Some(0x10000)),
        ]
    );
}

#[test]
fn test_sector_map_default_configuration() {
    let map = SectorMapBuilder::new()
        .detection(opcodes::RDAR, DetectionAddress::ThreeByte, Some(8), 0x08, 0x80_0004)
        .map(0, &[(16 * MIB, EraseTypeMask::TYPE_1 | EraseTypeMask::TYPE_3)])
        .map(1, &[(16 * MIB, EraseTypeMask::TYPE_3)]);
    let (dev, _handle) = device_for(&SfdpImageBuilder::generic_16m().sector_map(map));
    dev.init().unwrap();

    assert_eq!(dev.config_id(), Some(0));
    assert_eq!(dev.erase_size(), 4096);
}

#[test]
fn test_bad_signature_leaves_device_uninitialized() {
    let mut config = DummyConfig::from_sfdp(SfdpImageBuilder::generic_16m().build()).unwrap();
    config.sfdp[0] = 0x00;
    let dev = QspifBlockDevice::new(DummyQspiFlash::new(config), self::config()).unwrap();

    let result = dev.init();
    assert_eq!(result, Err(Error::ParsingFailed(ParseFailure::BadSignature)));
    assert_eq!(error::to_code(&result), error::CODE_PARSING_FAILED);
    assert_eq!(dev.size(), 0);

    let mut buf = [0u8; 1];
    assert_eq!(dev.read(0, &mut buf), Err(Error::NotInitialized));
}

#[test]
fn test_bus_failure_during_init() {
    let (dev, handle) = device();
    handle.set_fail_transfers(true);
    assert_eq!(dev.init(), Err(Error::BusTransferFailed));

    handle.set_fail_transfers(false);
    dev.init().unwrap();
    assert_eq!(dev.size(), 16 * MIB);
}

#[test]
fn test_reinit_after_deinit() {
    let (dev, _handle) = device();
    dev.init().unwrap();
    dev.deinit().unwrap();

    let mut buf = [0u8; 4];
    assert_eq!(dev.read(0, &mut buf), Err(Error::NotInitialized));

    dev.init().unwrap();
    dev.read(0, &mut buf).unwrap();
    assert_eq!(buf, [0xFF; 4]);
}
