//! Bus Command Adapter
//!
//! Owns the bus master for the lifetime of the device and stamps every
//! logical operation with the currently negotiated bus format.

use super::{ClockMode, QspiMaster};
use crate::error::Result;
use crate::sfdp::SfdpReader;
use crate::spi::{opcodes, AddressWidth, IoMode, SpiCommand};

/// Negotiated bus format and active instruction codes
///
/// Mutated only during initialization (mode negotiation); held fixed while
/// data operations run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Lines used by each phase of a read
    pub read_mode: IoMode,
    /// Address width for memory array commands
    pub address_width: AddressWidth,
    /// Dummy plus mode cycles of the read instruction
    pub read_dummy_cycles: u8,
    /// Active read instruction
    pub read_opcode: u8,
    /// Active page program instruction
    pub program_opcode: u8,
    /// Legacy 4 KiB erase instruction
    pub erase_opcode: u8,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            read_mode: IoMode::Single,
            address_width: AddressWidth::ThreeByte,
            read_dummy_cycles: 0,
            read_opcode: opcodes::READ,
            program_opcode: opcodes::PP,
            erase_opcode: opcodes::SE_20,
        }
    }
}

impl BusConfig {
    /// I/O mode for every non-read command
    ///
    /// Plain SPI unless the chip was switched into a mode where the
    /// instruction phase itself is multi-line (DPI/QPI).
    pub fn command_mode(&self) -> IoMode {
        if self.read_mode.is_full_width() {
            self.read_mode
        } else {
            IoMode::Single
        }
    }
}

/// Translates logical operations into bus commands
pub struct BusAdapter<M> {
    master: M,
    config: BusConfig,
}

impl<M: QspiMaster> BusAdapter<M> {
    /// Wrap a bus master with the default 1-1-1 format
    pub fn new(master: M) -> Self {
        Self {
            master,
            config: BusConfig::default(),
        }
    }

    /// Current bus format
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Switch to a new bus format
    pub fn configure(&mut self, config: BusConfig) {
        log::debug!(
            "Bus format: read {} opcode 0x{:02X} dummy {}, {} address bytes, commands {}",
            config.read_mode,
            config.read_opcode,
            config.read_dummy_cycles,
            config.address_width.bytes(),
            config.command_mode()
        );
        self.config = config;
    }

    /// Access the underlying bus master
    pub fn master(&self) -> &M {
        &self.master
    }

    /// Mutable access to the underlying bus master
    pub fn master_mut(&mut self) -> &mut M {
        &mut self.master
    }

    /// Release the bus master
    pub fn into_master(self) -> M {
        self.master
    }

    /// Set clock polarity and frequency
    pub fn configure_clock(&mut self, mode: ClockMode, frequency_hz: u32) -> Result<()> {
        log::debug!("Bus clock: {:?} at {} Hz", mode, frequency_hz);
        self.master.configure_clock(mode, frequency_hz)
    }

    /// Delay for the specified number of microseconds
    pub fn delay_us(&mut self, us: u32) {
        self.master.delay_us(us)
    }

    /// Read memory array contents using the negotiated read mode
    pub fn send_read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let max_len = self.master.max_read_len().max(1);
        let cfg = self.config;
        let mut offset = 0;

        while offset < buf.len() {
            let chunk_len = core::cmp::min(max_len, buf.len() - offset);
            let chunk = &mut buf[offset..offset + chunk_len];
            let mut cmd = SpiCommand::read(
                cfg.read_opcode,
                cfg.address_width,
                addr + offset as u32,
                chunk,
            )
            .with_io_mode(cfg.read_mode)
            .with_dummy_cycles(cfg.read_dummy_cycles);
            self.master.execute(&mut cmd)?;
            offset += chunk_len;
        }

        Ok(())
    }

    /// Send a page program command
    ///
    /// `data` must not cross a page boundary and must fit the master's
    /// write length; the sequencer guarantees both.
    pub fn send_program(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        log::trace!("PROGRAM 0x{:08X} ({} bytes)", addr, data.len());
        let cfg = self.config;
        let mut cmd = SpiCommand::write(cfg.program_opcode, cfg.address_width, addr, data)
            .with_io_mode(cfg.command_mode());
        self.master.execute(&mut cmd)
    }

    /// Send an erase instruction for the block at `addr`
    pub fn send_erase(&mut self, opcode: u8, addr: u32) -> Result<()> {
        log::trace!("ERASE 0x{:02X} at 0x{:08X}", opcode, addr);
        let cfg = self.config;
        let mut cmd =
            SpiCommand::erase(opcode, cfg.address_width, addr).with_io_mode(cfg.command_mode());
        self.master.execute(&mut cmd)
    }

    /// Send a generic command without address
    pub fn send_general(&mut self, opcode: u8, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        let mode = self.config.command_mode();
        let mut cmd = SpiCommand {
            opcode,
            address: None,
            address_width: AddressWidth::None,
            io_mode: mode,
            dummy_cycles: 0,
            write_data: tx,
            read_buf: rx,
        };
        self.master.execute(&mut cmd)
    }

    /// Send a generic command with an explicit address and dummy phase
    pub fn send_addressed(
        &mut self,
        opcode: u8,
        address: u32,
        width: AddressWidth,
        dummy_cycles: u8,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<()> {
        let mode = self.config.command_mode();
        let mut cmd = SpiCommand {
            opcode,
            address: Some(address),
            address_width: width,
            io_mode: mode,
            dummy_cycles,
            write_data: tx,
            read_buf: rx,
        };
        self.master.execute(&mut cmd)
    }
}

impl<M: QspiMaster> SfdpReader for BusAdapter<M> {
    fn read_sfdp(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let max_len = self.master.max_read_len().max(1);
        let mode = self.config.command_mode();
        let mut offset = 0;

        while offset < buf.len() {
            let chunk_len = core::cmp::min(max_len, buf.len() - offset);
            let chunk = &mut buf[offset..offset + chunk_len];
            let mut cmd =
                SpiCommand::read(opcodes::RDSFDP, AddressWidth::ThreeByte, addr + offset as u32, chunk)
                    .with_io_mode(mode)
                    .with_dummy_cycles(opcodes::RDSFDP_DUMMY_CYCLES);
            self.master.execute(&mut cmd)?;
            offset += chunk_len;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SpiFeatures;

    /// Records (opcode, address, io_mode, dummy, read_len) of each transaction
    struct RecordingMaster {
        log: heapless::Vec<(u8, Option<u32>, IoMode, u8, usize), 16>,
    }

    impl QspiMaster for RecordingMaster {
        fn features(&self) -> SpiFeatures {
            SpiFeatures::all()
        }

        fn max_read_len(&self) -> usize {
            4
        }

        fn max_write_len(&self) -> usize {
            256
        }

        fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()> {
            cmd.read_buf.fill(0xA5);
            self.log
                .push((
                    cmd.opcode,
                    cmd.address,
                    cmd.io_mode,
                    cmd.dummy_cycles,
                    cmd.read_buf.len(),
                ))
                .map_err(|_| crate::Error::BusTransferFailed)
        }

        fn configure_clock(&mut self, _mode: ClockMode, _frequency_hz: u32) -> Result<()> {
            Ok(())
        }

        fn delay_us(&mut self, _us: u32) {}
    }

    fn adapter() -> BusAdapter<RecordingMaster> {
        BusAdapter::new(RecordingMaster {
            log: heapless::Vec::new(),
        })
    }

    #[test]
    fn test_read_is_chunked_with_read_format() {
        let mut bus = adapter();
        bus.configure(BusConfig {
            read_mode: IoMode::QuadIo,
            read_opcode: 0xEB,
            read_dummy_cycles: 6,
            ..Default::default()
        });

        let mut buf = [0u8; 10];
        bus.send_read(0x100, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0xA5));

        let log = &bus.master().log;
        assert_eq!(log.len(), 3);
        assert_eq!(log[0], (0xEB, Some(0x100), IoMode::QuadIo, 6, 4));
        assert_eq!(log[1], (0xEB, Some(0x104), IoMode::QuadIo, 6, 4));
        assert_eq!(log[2], (0xEB, Some(0x108), IoMode::QuadIo, 6, 2));
    }

    #[test]
    fn test_commands_stay_single_outside_qpi() {
        let mut bus = adapter();
        bus.configure(BusConfig {
            read_mode: IoMode::QuadOut,
            ..Default::default()
        });
        bus.send_erase(0xD8, 0x1_0000).unwrap();
        bus.send_general(opcodes::WREN, &[], &mut []).unwrap();

        let log = &bus.master().log;
        assert_eq!(log[0].2, IoMode::Single);
        assert_eq!(log[1].2, IoMode::Single);
    }

    #[test]
    fn test_qpi_applies_to_all_commands() {
        let mut bus = adapter();
        bus.configure(BusConfig {
            read_mode: IoMode::Qpi,
            ..Default::default()
        });
        bus.send_program(0, &[1, 2, 3]).unwrap();
        let mut sfdp = [0u8; 4];
        bus.read_sfdp(0, &mut sfdp).unwrap();

        let log = &bus.master().log;
        assert_eq!(log[0].2, IoMode::Qpi);
        assert_eq!(log[1], (opcodes::RDSFDP, Some(0), IoMode::Qpi, 8, 4));
    }
}
