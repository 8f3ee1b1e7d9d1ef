//! qspif-dummy - Emulated QSPI NOR flash for testing
//!
//! This crate provides an in-memory flash chip that speaks the SPI NOR
//! command set over the `QspiMaster` interface, including SFDP, status
//! registers with WEL/WIP/QE, QPI and 4-byte address modes. Faults can be
//! injected through a [`DummyHandle`] while a device owns the emulator, and
//! every transaction is logged for ordering checks.
//!
//! [`SfdpImageBuilder`] synthesizes the SFDP image the emulator serves.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use qspif_core::bus::{ClockMode, QspiMaster, SpiFeatures};
use qspif_core::error::{Error, Result};
use qspif_core::sfdp::{self, AddressMode, FourByteEntryMethods, QuadEnableMethod, SfdpImage};
use qspif_core::spi::{opcodes, IoMode, SpiCommand};

mod sfdp_builder;

pub use sfdp_builder::{SectorMapBuilder, SfdpImageBuilder};

#[cfg(test)]
mod device_tests;

/// A read instruction the emulated chip accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOp {
    /// Instruction
    pub opcode: u8,
    /// Bus lines per phase
    pub mode: IoMode,
    /// Mode plus dummy cycles
    pub dummy_cycles: u8,
}

/// Configuration for the emulated chip
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// SFDP space contents
    pub sfdp: Vec<u8>,
    /// Array size in bytes
    pub size: usize,
    /// Page program size
    pub page_size: usize,
    /// Erase instructions and their block sizes
    pub erase_types: Vec<(u8, u32)>,
    /// Accepted read instructions
    pub reads: Vec<ReadOp>,
    /// Location of the Quad Enable bit
    pub quad_enable: QuadEnableMethod,
    /// Chip only accepts 4-byte addresses
    pub always_4byte: bool,
    /// Modes the emulated bus master offers
    pub features: SpiFeatures,
    /// Largest read per transaction
    pub max_read_len: usize,
    /// Largest write per transaction
    pub max_write_len: usize,
    /// Status reads reporting WIP after each program/erase/register write
    pub busy_polls: u32,
}

impl DummyConfig {
    /// Derive a chip matching an SFDP image
    pub fn from_sfdp(sfdp: Vec<u8>) -> Result<Self> {
        let mut reader = SfdpImage::new(&sfdp);
        let tables = sfdp::parse_headers(&mut reader)?;
        let params = sfdp::read_basic_table(&mut reader, &tables.basic)?;

        let mut reads = vec![ReadOp {
            opcode: opcodes::READ,
            mode: IoMode::Single,
            dummy_cycles: 0,
        }];
        reads.extend(
            params
                .read_mode_candidates()
                .iter()
                .filter(|c| c.mode != IoMode::Single)
                .map(|c| ReadOp {
                    opcode: c.params.opcode,
                    mode: c.mode,
                    dummy_cycles: c.params.wait_cycles(),
                }),
        );

        let mut erase_types: Vec<(u8, u32)> = params
            .erase_types
            .iter()
            .map(|(_, et)| (et.opcode, et.size))
            .collect();
        if let Some(op) = params.legacy_4k_opcode {
            if !erase_types.iter().any(|&(o, _)| o == op) {
                erase_types.push((op, 4096));
            }
        }

        Ok(Self {
            sfdp,
            size: params.density_bytes as usize,
            page_size: params.page_size as usize,
            erase_types,
            reads,
            quad_enable: params.quad_enable,
            always_4byte: params.address_mode == AddressMode::FourByteOnly
                || params.four_byte_entry.contains(FourByteEntryMethods::ALWAYS_4BYTE),
            features: SpiFeatures::all(),
            max_read_len: 256,
            max_write_len: 256,
            busy_polls: 1,
        })
    }
}

/// One logged bus transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Instruction
    pub opcode: u8,
    /// Address, if any
    pub address: Option<u32>,
    /// Bus lines per phase
    pub io_mode: IoMode,
    /// Bytes written after the header
    pub write_len: usize,
    /// Bytes read
    pub read_len: usize,
    /// Thread that issued the transaction
    pub thread: ThreadId,
}

#[derive(Debug, Default, Clone, Copy)]
struct Faults {
    never_ready: bool,
    stuck_wel: bool,
    qe_not_sticky: bool,
    fail_transfers: bool,
}

struct ChipState {
    config: DummyConfig,
    data: Vec<u8>,
    sr1: u8,
    sr2: u8,
    vecr: u8,
    cr2v: u8,
    registers: BTreeMap<u32, u8>,
    wel: bool,
    busy: u32,
    reset_enabled: bool,
    qpi: bool,
    four_byte: bool,
    faults: Faults,
    log: Vec<Transaction>,
}

impl ChipState {
    fn new(config: DummyConfig) -> Self {
        let data = vec![0xFF; config.size];
        let four_byte = config.always_4byte;
        Self {
            config,
            data,
            sr1: 0,
            sr2: 0,
            vecr: 0xFF,
            cr2v: 0,
            registers: BTreeMap::new(),
            wel: false,
            busy: 0,
            reset_enabled: false,
            qpi: false,
            four_byte,
            faults: Faults::default(),
            log: Vec::new(),
        }
    }

    fn quad_enabled(&self) -> bool {
        match self.config.quad_enable {
            QuadEnableMethod::None => true,
            QuadEnableMethod::Sr1Bit6 => self.sr1 & opcodes::SR1_QE_BIT6 != 0,
            QuadEnableMethod::Sr2Bit1WriteBoth | QuadEnableMethod::Sr2Bit1WriteSr2 => {
                self.sr2 & opcodes::SR2_QE_BIT1 != 0
            }
            QuadEnableMethod::Sr2Bit7 => self.sr2 & opcodes::SR2_QE_BIT7 != 0,
        }
    }

    fn status1(&mut self) -> u8 {
        let mut sr = self.sr1;
        if self.wel {
            sr |= opcodes::SR1_WEL;
        }
        if self.busy > 0 {
            if !self.faults.never_ready {
                self.busy -= 1;
            }
            sr |= opcodes::SR1_WIP;
        }
        sr
    }

    fn start_write_cycle(&mut self) {
        self.wel = false;
        self.busy = self.config.busy_polls;
    }

    fn write_status(&mut self, sr1: Option<u8>, sr2: Option<u8>) {
        if !self.wel {
            log::warn!("Status write without WEL ignored");
            return;
        }
        if let Some(v) = sr1 {
            self.sr1 = v & !(opcodes::SR1_WIP | opcodes::SR1_WEL);
        }
        if let Some(v) = sr2 {
            self.sr2 = v;
        }
        if self.faults.qe_not_sticky {
            match self.config.quad_enable {
                QuadEnableMethod::Sr1Bit6 => self.sr1 &= !opcodes::SR1_QE_BIT6,
                QuadEnableMethod::Sr2Bit7 => self.sr2 &= !opcodes::SR2_QE_BIT7,
                QuadEnableMethod::None => {}
                _ => self.sr2 &= !opcodes::SR2_QE_BIT1,
            }
        }
        self.start_write_cycle();
    }

    fn reset(&mut self) {
        log::debug!("Emulated chip reset");
        self.qpi = false;
        self.four_byte = self.config.always_4byte;
        self.wel = false;
        self.busy = 0;
        self.vecr = 0xFF;
        self.cr2v = 0;
    }

    fn array_address(&self, cmd: &SpiCommand<'_>) -> Result<usize> {
        let expected = if self.four_byte { 4 } else { 3 };
        match cmd.address {
            Some(addr) if cmd.address_width.bytes() == expected => Ok(addr as usize),
            _ => {
                log::warn!(
                    "Opcode 0x{:02X} sent with {} address bytes, chip expects {}",
                    cmd.opcode,
                    cmd.address_width.bytes(),
                    expected
                );
                Err(Error::BusTransferFailed)
            }
        }
    }

    fn handle_read(&mut self, op: ReadOp, cmd: &mut SpiCommand<'_>) -> Result<()> {
        if cmd.dummy_cycles != op.dummy_cycles {
            log::warn!(
                "Read 0x{:02X} with {} dummy cycles, chip expects {}",
                op.opcode,
                cmd.dummy_cycles,
                op.dummy_cycles
            );
            return Err(Error::BusTransferFailed);
        }
        let addr = self.array_address(cmd)?;
        if op.mode.requires_quad() && !self.quad_enabled() {
            // IO2/IO3 still act as WP#/HOLD#
            cmd.read_buf.fill(0xFF);
            return Ok(());
        }

        let len = cmd.read_buf.len();
        if addr + len > self.data.len() {
            return Err(Error::AddressOutOfBounds);
        }
        cmd.read_buf.copy_from_slice(&self.data[addr..addr + len]);
        Ok(())
    }

    fn handle_page_program(&mut self, cmd: &SpiCommand<'_>) -> Result<()> {
        let addr = self.array_address(cmd)?;
        if !self.wel {
            log::warn!("Page program without WEL ignored");
            return Ok(());
        }
        if addr >= self.data.len() {
            return Err(Error::AddressOutOfBounds);
        }

        let page = self.config.page_size;
        let base = addr - addr % page;
        // Data past the page end wraps to the page start
        for (i, &byte) in cmd.write_data.iter().enumerate() {
            let at = base + (addr % page + i) % page;
            self.data[at] &= byte;
        }

        self.start_write_cycle();
        Ok(())
    }

    fn handle_erase(&mut self, size: u32, cmd: &SpiCommand<'_>) -> Result<()> {
        let addr = self.array_address(cmd)?;
        if !self.wel {
            log::warn!("Erase without WEL ignored");
            return Ok(());
        }

        let size = size as usize;
        let aligned = addr & !(size - 1);
        if aligned + size > self.data.len() {
            return Err(Error::AddressOutOfBounds);
        }
        self.data[aligned..aligned + size].fill(0xFF);

        self.start_write_cycle();
        Ok(())
    }

    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()> {
        self.log.push(Transaction {
            opcode: cmd.opcode,
            address: cmd.address,
            io_mode: cmd.io_mode,
            write_len: cmd.write_data.len(),
            read_len: cmd.read_buf.len(),
            thread: thread::current().id(),
        });

        if self.faults.fail_transfers {
            return Err(Error::BusTransferFailed);
        }

        let lines = if self.qpi { 4 } else { 1 };
        if cmd.io_mode.cmd_lines() != lines {
            log::warn!(
                "Opcode 0x{:02X} sent as {} while chip expects {} line commands",
                cmd.opcode,
                cmd.io_mode,
                lines
            );
            cmd.read_buf.fill(0xFF);
            return Ok(());
        }

        if self.busy > 0 && cmd.opcode != opcodes::RDSR {
            log::warn!("Opcode 0x{:02X} ignored while busy", cmd.opcode);
            cmd.read_buf.fill(0xFF);
            return Ok(());
        }

        let reset_enabled = core::mem::take(&mut self.reset_enabled);

        match cmd.opcode {
            opcodes::RDSR => {
                let sr = self.status1();
                cmd.read_buf.fill(sr);
            }
            opcodes::RDSR2 if cmd.read_buf.is_empty() => {
                // 35h without data phase is the alternate QPI entry
                self.enter_qpi();
            }
            opcodes::RDSR2 | opcodes::RDSR2_ALT => cmd.read_buf.fill(self.sr2),
            opcodes::WREN => self.wel = !self.faults.stuck_wel,
            opcodes::WRDI => self.wel = false,
            opcodes::WRSR => {
                let sr1 = cmd.write_data.first().copied();
                let sr2 = cmd.write_data.get(1).copied();
                self.write_status(sr1, sr2);
            }
            opcodes::WRSR2 | opcodes::WRSR2_ALT => {
                let sr2 = cmd.write_data.first().copied();
                self.write_status(None, sr2);
            }
            opcodes::RDAR => {
                let value = match cmd.address {
                    None => self.vecr,
                    Some(opcodes::CR2V_QPI_ADDR) => self.cr2v,
                    Some(addr) => self.registers.get(&addr).copied().unwrap_or(0),
                };
                cmd.read_buf.fill(value);
            }
            opcodes::WRVECR if self.wel => {
                if let Some(&v) = cmd.write_data.first() {
                    self.vecr = v;
                    if v & opcodes::VECR_QUAD_N == 0 {
                        self.enter_qpi();
                    }
                }
                // Volatile registers update without a write cycle
                self.wel = false;
            }
            opcodes::WRAR if self.wel => {
                if let (Some(addr), Some(&v)) = (cmd.address, cmd.write_data.first()) {
                    if addr == opcodes::CR2V_QPI_ADDR {
                        self.cr2v = v;
                        if v & opcodes::CR2V_QPI != 0 {
                            self.enter_qpi();
                        } else {
                            self.qpi = false;
                        }
                    } else {
                        self.registers.insert(addr, v);
                    }
                }
                self.wel = false;
            }
            opcodes::WRVECR | opcodes::WRAR => log::warn!("Register write without WEL ignored"),
            opcodes::EQIO => self.enter_qpi(),
            opcodes::RSTQIO | opcodes::RSTQIO_ALT => self.qpi = false,
            opcodes::EN4B => self.four_byte = true,
            opcodes::EX4B => self.four_byte = self.config.always_4byte,
            opcodes::RSTEN => self.reset_enabled = true,
            opcodes::RST if reset_enabled => self.reset(),
            opcodes::RST => log::warn!("Reset without reset enable ignored"),
            opcodes::RDSFDP => {
                if cmd.dummy_cycles != opcodes::RDSFDP_DUMMY_CYCLES || cmd.address_width.bytes() != 3 {
                    return Err(Error::BusTransferFailed);
                }
                let mut image = SfdpImage::new(&self.config.sfdp);
                sfdp::SfdpReader::read_sfdp(&mut image, cmd.address.unwrap_or(0), cmd.read_buf)?;
            }
            opcodes::PP => self.handle_page_program(cmd)?,
            op => {
                let read = self
                    .config
                    .reads
                    .iter()
                    .find(|r| r.opcode == op && r.mode == cmd.io_mode)
                    .copied();
                let erase = self.config.erase_types.iter().find(|(o, _)| *o == op).copied();

                match (read, erase) {
                    (Some(read), _) => self.handle_read(read, cmd)?,
                    (None, Some((_, size))) if !cmd.has_read() => self.handle_erase(size, cmd)?,
                    _ => {
                        log::warn!("Unsupported opcode 0x{:02X} as {}", op, cmd.io_mode);
                        return Err(Error::BusTransferFailed);
                    }
                }
            }
        }

        Ok(())
    }

    fn enter_qpi(&mut self) {
        if self.quad_enabled() {
            self.qpi = true;
        } else {
            log::warn!("QPI entry refused: quad enable bit clear");
        }
    }
}

/// Emulated QSPI NOR flash
///
/// Implements `QspiMaster`, so it can be handed to a block device. Use
/// [`DummyQspiFlash::handle`] to inspect or perturb the chip afterwards.
pub struct DummyQspiFlash {
    state: Arc<Mutex<ChipState>>,
}

impl DummyQspiFlash {
    /// Create an erased chip
    pub fn new(config: DummyConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChipState::new(config))),
        }
    }

    /// Create a chip matching an SFDP image builder
    pub fn from_builder(builder: &SfdpImageBuilder) -> Result<Self> {
        Ok(Self::new(DummyConfig::from_sfdp(builder.build())?))
    }

    /// Shared handle to the chip state
    pub fn handle(&self) -> DummyHandle {
        DummyHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChipState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl QspiMaster for DummyQspiFlash {
    fn features(&self) -> SpiFeatures {
        self.lock().config.features
    }

    fn max_read_len(&self) -> usize {
        self.lock().config.max_read_len
    }

    fn max_write_len(&self) -> usize {
        self.lock().config.max_write_len
    }

    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()> {
        self.lock().execute(cmd)
    }

    fn configure_clock(&mut self, mode: ClockMode, frequency_hz: u32) -> Result<()> {
        log::trace!("Emulated bus clock {:?} at {} Hz", mode, frequency_hz);
        Ok(())
    }

    fn delay_us(&mut self, _us: u32) {
        // No delay needed for in-memory operations
    }
}

/// Inspection and fault injection handle for a [`DummyQspiFlash`]
#[derive(Clone)]
pub struct DummyHandle {
    state: Arc<Mutex<ChipState>>,
}

impl DummyHandle {
    fn lock(&self) -> MutexGuard<'_, ChipState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the transaction log
    pub fn transactions(&self) -> Vec<Transaction> {
        self.lock().log.clone()
    }

    /// Opcodes of the logged transactions
    pub fn opcodes(&self) -> Vec<u8> {
        self.lock().log.iter().map(|t| t.opcode).collect()
    }

    /// Forget all logged transactions
    pub fn clear_transactions(&self) {
        self.lock().log.clear();
    }

    /// Copy of `len` bytes of the array at `addr`
    pub fn read_data(&self, addr: usize, len: usize) -> Vec<u8> {
        let state = self.lock();
        let end = core::cmp::min(addr + len, state.data.len());
        state.data[addr.min(end)..end].to_vec()
    }

    /// Overwrite array contents
    pub fn write_data(&self, addr: usize, data: &[u8]) {
        let mut state = self.lock();
        let end = core::cmp::min(addr + data.len(), state.data.len());
        let start = addr.min(end);
        state.data[start..end].copy_from_slice(&data[..end - start]);
    }

    /// Let write cycles started from now on never finish
    ///
    /// Clearing the fault also completes a cycle that is stuck.
    pub fn set_never_ready(&self, never_ready: bool) {
        let mut state = self.lock();
        state.faults.never_ready = never_ready;
        if !never_ready {
            state.busy = 0;
        }
    }

    /// Make WREN have no effect
    pub fn set_stuck_wel(&self, stuck: bool) {
        self.lock().faults.stuck_wel = stuck;
    }

    /// Make writes to the Quad Enable bit have no effect
    pub fn set_qe_not_sticky(&self, not_sticky: bool) {
        self.lock().faults.qe_not_sticky = not_sticky;
    }

    /// Fail every transaction at the bus level
    pub fn set_fail_transfers(&self, fail: bool) {
        self.lock().faults.fail_transfers = fail;
    }

    /// Set a register readable with RDAR (65h) at `addr`
    pub fn set_register(&self, addr: u32, value: u8) {
        self.lock().registers.insert(addr, value);
    }

    /// Chip is in 4-4-4 mode
    pub fn is_qpi(&self) -> bool {
        self.lock().qpi
    }

    /// Chip decodes 4-byte addresses
    pub fn is_four_byte(&self) -> bool {
        self.lock().four_byte
    }

    /// Quad Enable bit is set
    pub fn quad_enabled(&self) -> bool {
        self.lock().quad_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qspif_core::bus::BusAdapter;
    use qspif_core::protocol::{self, PollConfig};

    fn flash() -> (BusAdapter<DummyQspiFlash>, DummyHandle) {
        let chip = DummyQspiFlash::from_builder(&SfdpImageBuilder::generic_16m()).unwrap();
        let handle = chip.handle();
        (BusAdapter::new(chip), handle)
    }

    #[test]
    fn test_read_write() {
        let (mut bus, _handle) = flash();
        let poll = PollConfig::default();

        let data = [0x12, 0x34, 0x56, 0x78];
        protocol::set_write_enable(&mut bus, &poll).unwrap();
        bus.send_program(0x1000, &data).unwrap();
        protocol::wait_ready(&mut bus, &poll).unwrap();

        let mut buf = [0u8; 4];
        bus.send_read(0x1000, &mut buf).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn test_erase() {
        let (mut bus, handle) = flash();
        let poll = PollConfig::default();
        handle.write_data(0, &[0u8; 8192]);

        protocol::set_write_enable(&mut bus, &poll).unwrap();
        bus.send_erase(0x20, 0x100).unwrap();
        protocol::wait_ready(&mut bus, &poll).unwrap();

        assert!(handle.read_data(0, 4096).iter().all(|&b| b == 0xFF));
        assert!(handle.read_data(4096, 4096).iter().all(|&b| b == 0x00));
    }

    #[test]
    fn test_program_without_wren_is_ignored() {
        let (mut bus, handle) = flash();
        bus.send_program(0, &[0x00; 4]).unwrap();
        assert_eq!(handle.read_data(0, 4), vec![0xFF; 4]);
    }

    #[test]
    fn test_sfdp_served() {
        let (mut bus, _handle) = flash();
        let tables = sfdp::parse_headers(&mut bus).unwrap();
        let params = sfdp::read_basic_table(&mut bus, &tables.basic).unwrap();
        assert_eq!(params.density_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn test_busy_blocks_commands() {
        let (mut bus, handle) = flash();
        let poll = PollConfig {
            poll_delay_us: 1,
            ready_timeout_us: 5,
            wren_max_polls: 1,
        };
        handle.set_never_ready(true);
        protocol::set_write_enable(&mut bus, &poll).unwrap();
        bus.send_program(0, &[0x00]).unwrap();
        assert_eq!(protocol::wait_ready(&mut bus, &poll), Err(Error::ReadyFailed));

        // Ignored while the cycle is stuck
        protocol::write_enable(&mut bus).unwrap();
        assert_eq!(
            protocol::read_status1(&mut bus).unwrap() & opcodes::SR1_WEL,
            0
        );

        handle.set_never_ready(false);
        assert_eq!(protocol::wait_ready(&mut bus, &poll), Ok(()));
        assert_eq!(handle.read_data(0, 1), vec![0x00]);
    }

    #[test]
    fn test_qpi_ignores_single_line_commands() {
        let (mut bus, handle) = flash();
        let poll = PollConfig::default();
        protocol::write_register(&mut bus, opcodes::WRSR, &[0x00, opcodes::SR2_QE_BIT1], &poll)
            .unwrap();
        assert!(handle.quad_enabled());

        bus.send_general(opcodes::EQIO, &[], &mut []).unwrap();
        assert!(handle.is_qpi());
        assert_eq!(protocol::read_status1(&mut bus).unwrap(), 0xFF);
    }

    #[test]
    fn test_four_byte_mode_checks_address_width() {
        let (mut bus, handle) = flash();
        protocol::enter_4byte_mode(&mut bus).unwrap();
        assert!(handle.is_four_byte());

        let mut buf = [0u8; 4];
        assert_eq!(bus.send_read(0, &mut buf), Err(Error::BusTransferFailed));
    }
}
