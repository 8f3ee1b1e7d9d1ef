//! Bus mode negotiation
//!
//! Runs once at the end of initialization: selects the address width,
//! walks the read mode candidates fastest first, performs the quad enable
//! and QPI entry sequences the chip advertises, and commits the result to
//! the bus adapter.

use super::config::DeviceConfig;
use crate::bus::{BusAdapter, BusConfig, QspiMaster};
use crate::error::{Error, ParseFailure, Result};
use crate::protocol::{self, PollConfig};
use crate::sfdp::{
    AddressMode, BasicFlashParams, DetectionAddress, DetectionCommand, FourByteEntryMethods,
    QpiDisableSequences, QpiEnableSequences, QuadEnableMethod, ReadModeCandidate,
};
use crate::spi::{check_io_mode_supported, opcodes, AddressWidth, IoMode};

/// Outcome of the negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    /// Bus format committed to the adapter
    pub bus: BusConfig,
    /// 4-byte mode was entered by command and must be left on deinit
    pub four_byte_entered: bool,
    /// The chip was switched to QPI
    pub qpi_entered: bool,
}

/// Negotiate and apply the bus format
pub fn negotiate<M: QspiMaster>(
    bus: &mut BusAdapter<M>,
    params: &BasicFlashParams,
    config: &DeviceConfig,
) -> Result<Negotiated> {
    let poll = &config.poll;
    let (address_width, four_byte_entered) = select_addressing(bus, params, poll)?;
    let features = bus.master().features();

    let mut quad_enabled = false;
    let mut chosen: Option<(ReadModeCandidate, bool)> = None;

    for candidate in params.read_mode_candidates() {
        let mode = candidate.mode;

        if config.max_read_mode.is_some_and(|max| mode > max) {
            log::trace!("Read mode {} above configured limit", mode);
            continue;
        }
        if check_io_mode_supported(mode, features).is_err() {
            log::trace!("Read mode {} not supported by bus master", mode);
            continue;
        }
        if mode == IoMode::Dpi {
            // The basic table defines no 2-2-2 entry sequence
            log::debug!("Skipping 2-2-2 read: no standard enable sequence");
            continue;
        }

        if mode.requires_quad() && !quad_enabled {
            match set_quad_enable(bus, params.quad_enable, poll) {
                Ok(true) => quad_enabled = true,
                Ok(false) | Err(Error::WrenFailed) => {
                    log::warn!("Quad enable bit did not stick, falling back from {}", mode);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        if mode == IoMode::Qpi {
            if !enter_qpi(bus, params.qpi_enable, poll)? {
                log::debug!("No usable QPI enable sequence");
                continue;
            }
            chosen = Some((candidate, true));
        } else {
            chosen = Some((candidate, false));
        }
        break;
    }

    // Single READ is always a candidate and never gated
    let (candidate, qpi_entered) = chosen.ok_or(Error::IoModeNotSupported)?;

    let cfg = BusConfig {
        read_mode: candidate.mode,
        address_width,
        read_dummy_cycles: candidate.params.wait_cycles(),
        read_opcode: candidate.params.opcode,
        program_opcode: opcodes::PP,
        erase_opcode: params.legacy_4k_opcode.unwrap_or(opcodes::SE_20),
    };
    bus.configure(cfg);

    log::debug!(
        "Negotiated read {} (0x{:02X}), {}-byte addresses",
        cfg.read_mode,
        cfg.read_opcode,
        address_width.bytes()
    );

    Ok(Negotiated {
        bus: cfg,
        four_byte_entered,
        qpi_entered,
    })
}

/// Pick the address width, entering 4-byte mode if needed
fn select_addressing<M: QspiMaster>(
    bus: &mut BusAdapter<M>,
    params: &BasicFlashParams,
    poll: &PollConfig,
) -> Result<(AddressWidth, bool)> {
    if !params.needs_4byte_addressing() {
        return Ok((AddressWidth::ThreeByte, false));
    }

    let methods = params.four_byte_entry;
    if params.address_mode == AddressMode::FourByteOnly
        || methods.contains(FourByteEntryMethods::ALWAYS_4BYTE)
    {
        return Ok((AddressWidth::FourByte, false));
    }
    if methods.contains(FourByteEntryMethods::INSTR_B7) {
        protocol::enter_4byte_mode(bus)?;
    } else if methods.contains(FourByteEntryMethods::WREN_INSTR_B7) {
        protocol::set_write_enable(bus, poll)?;
        protocol::enter_4byte_mode(bus)?;
    } else {
        log::error!("Device needs 4-byte addresses but has no supported entry method");
        return Err(ParseFailure::UnsupportedAddressing.into());
    }

    log::debug!("Entered 4-byte address mode");
    Ok((AddressWidth::FourByte, true))
}

/// Register access used to set the Quad Enable bit
struct QeAccess {
    read: u8,
    write: u8,
    bit: u8,
    /// The write carries SR1 followed by the QE register
    with_sr1: bool,
}

impl QeAccess {
    fn for_method(method: QuadEnableMethod) -> Option<Self> {
        let access = match method {
            QuadEnableMethod::None => return None,
            QuadEnableMethod::Sr1Bit6 => Self {
                read: opcodes::RDSR,
                write: opcodes::WRSR,
                bit: opcodes::SR1_QE_BIT6,
                with_sr1: false,
            },
            QuadEnableMethod::Sr2Bit1WriteBoth => Self {
                read: opcodes::RDSR2,
                write: opcodes::WRSR,
                bit: opcodes::SR2_QE_BIT1,
                with_sr1: true,
            },
            QuadEnableMethod::Sr2Bit7 => Self {
                read: opcodes::RDSR2_ALT,
                write: opcodes::WRSR2_ALT,
                bit: opcodes::SR2_QE_BIT7,
                with_sr1: false,
            },
            QuadEnableMethod::Sr2Bit1WriteSr2 => Self {
                read: opcodes::RDSR2,
                write: opcodes::WRSR2,
                bit: opcodes::SR2_QE_BIT1,
                with_sr1: false,
            },
        };
        Some(access)
    }
}

/// Set the Quad Enable bit and verify it by read-back
///
/// Returns `Ok(false)` if the bit does not read back as set.
pub fn set_quad_enable<M: QspiMaster>(
    bus: &mut BusAdapter<M>,
    method: QuadEnableMethod,
    poll: &PollConfig,
) -> Result<bool> {
    let Some(access) = QeAccess::for_method(method) else {
        return Ok(true);
    };

    let value = protocol::read_register(bus, access.read)?;
    if value & access.bit != 0 {
        return Ok(true);
    }

    log::debug!("Setting quad enable ({:?})", method);
    if access.with_sr1 {
        let sr1 = protocol::read_status1(bus)?;
        protocol::write_register(bus, access.write, &[sr1, value | access.bit], poll)?;
    } else {
        protocol::write_register(bus, access.write, &[value | access.bit], poll)?;
    }

    let readback = protocol::read_register(bus, access.read)?;
    Ok(readback & access.bit != 0)
}

/// Switch the chip to 4-4-4 mode
///
/// Uses the first advertised sequence. The quad enable bit must already
/// be set. Returns `Ok(false)` if no sequence is advertised.
pub fn enter_qpi<M: QspiMaster>(
    bus: &mut BusAdapter<M>,
    sequences: QpiEnableSequences,
    poll: &PollConfig,
) -> Result<bool> {
    if sequences.intersects(QpiEnableSequences::QE_THEN_38 | QpiEnableSequences::ISSUE_38) {
        bus.send_general(opcodes::EQIO, &[], &mut [])?;
    } else if sequences.contains(QpiEnableSequences::ISSUE_35) {
        bus.send_general(opcodes::EQIO_ALT, &[], &mut [])?;
    } else if sequences.contains(QpiEnableSequences::CR2V_BIT6) {
        let value = read_cr2v(bus)?;
        write_cr2v(bus, value | opcodes::CR2V_QPI, poll)?;
    } else if sequences.contains(QpiEnableSequences::VECR_BIT7) {
        let value = protocol::read_register(bus, opcodes::RDAR)?;
        protocol::set_write_enable(bus, poll)?;
        bus.send_general(opcodes::WRVECR, &[value & !opcodes::VECR_QUAD_N], &mut [])?;
    } else {
        return Ok(false);
    }

    log::debug!("Entered QPI mode");
    Ok(true)
}

/// Leave 4-4-4 mode with the first advertised disable sequence
///
/// Must be called while the adapter is still configured for QPI.
pub fn exit_qpi<M: QspiMaster>(
    bus: &mut BusAdapter<M>,
    sequences: QpiDisableSequences,
    poll: &PollConfig,
) -> Result<()> {
    if sequences.contains(QpiDisableSequences::ISSUE_FF) {
        bus.send_general(opcodes::RSTQIO, &[], &mut [])
    } else if sequences.contains(QpiDisableSequences::ISSUE_F5) {
        bus.send_general(opcodes::RSTQIO_ALT, &[], &mut [])
    } else if sequences.contains(QpiDisableSequences::CR2V_BIT6) {
        let value = read_cr2v(bus)?;
        write_cr2v(bus, value & !opcodes::CR2V_QPI, poll)
    } else if sequences.contains(QpiDisableSequences::SOFT_RESET) {
        bus.send_general(opcodes::RSTEN, &[], &mut [])?;
        bus.send_general(opcodes::RST, &[], &mut [])
    } else {
        log::warn!("No QPI disable sequence advertised, chip stays in QPI");
        Ok(())
    }
}

fn read_cr2v<M: QspiMaster>(bus: &mut BusAdapter<M>) -> Result<u8> {
    let mut value = [0u8; 1];
    bus.send_addressed(
        opcodes::RDAR,
        opcodes::CR2V_QPI_ADDR,
        AddressWidth::ThreeByte,
        opcodes::RDAR_DUMMY_CYCLES,
        &[],
        &mut value,
    )?;
    Ok(value[0])
}

/// Volatile write: takes effect at once, so the bus width may change
/// before a status poll could be issued
fn write_cr2v<M: QspiMaster>(bus: &mut BusAdapter<M>, value: u8, poll: &PollConfig) -> Result<()> {
    protocol::set_write_enable(bus, poll)?;
    bus.send_addressed(
        opcodes::WRAR,
        opcodes::CR2V_QPI_ADDR,
        AddressWidth::ThreeByte,
        0,
        &[value],
        &mut [],
    )
}

/// Execute a sector map detection command and return the byte read
pub fn read_detection_byte<M: QspiMaster>(
    bus: &mut BusAdapter<M>,
    cmd: &DetectionCommand,
) -> Result<u8> {
    let current = *bus.config();
    let dummy = cmd.dummy_cycles.unwrap_or(current.read_dummy_cycles);
    let width = match cmd.address_width {
        DetectionAddress::None => AddressWidth::None,
        DetectionAddress::ThreeByte => AddressWidth::ThreeByte,
        DetectionAddress::FourByte => AddressWidth::FourByte,
        DetectionAddress::Current => current.address_width,
    };

    let mut value = [0u8; 1];
    if width == AddressWidth::None {
        bus.send_general(cmd.opcode, &[], &mut value)?;
    } else {
        bus.send_addressed(cmd.opcode, cmd.address, width, dummy, &[], &mut value)?;
    }

    log::trace!(
        "Detection 0x{:02X} @0x{:08X}: 0x{:02X} & 0x{:02X}",
        cmd.opcode,
        cmd.address,
        value[0],
        cmd.read_mask
    );
    Ok(value[0])
}
