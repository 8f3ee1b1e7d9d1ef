//! SPI25 protocol implementation
//!
//! This module implements the common SPI flash control sequences as
//! defined by JEDEC. All functions go through the `BusAdapter`, so they
//! follow the negotiated command width (single, DPI or QPI).

use crate::bus::{BusAdapter, QspiMaster};
use crate::error::{Error, Result};
use crate::spi::opcodes;

/// Bounded polling parameters for status register waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct PollConfig {
    /// Delay in microseconds between status register polls
    pub poll_delay_us: u32,
    /// Maximum time to wait for WIP to clear
    pub ready_timeout_us: u32,
    /// Number of status reads allowed for WEL to appear after WREN
    pub wren_max_polls: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        // 1ms polls for up to 10s covers the slowest 64KB+ block erases
        Self {
            poll_delay_us: 1_000,
            ready_timeout_us: 10_000_000,
            wren_max_polls: 10,
        }
    }
}

impl PollConfig {
    /// Number of status reads before giving up on WIP
    pub fn ready_polls(&self) -> u32 {
        if self.poll_delay_us > 0 {
            (self.ready_timeout_us / self.poll_delay_us).max(1)
        } else {
            self.ready_timeout_us.max(1)
        }
    }
}

/// Read a one byte status/configuration register
pub fn read_register<M: QspiMaster>(bus: &mut BusAdapter<M>, opcode: u8) -> Result<u8> {
    let mut buf = [0u8; 1];
    bus.send_general(opcode, &[], &mut buf)?;
    Ok(buf[0])
}

/// Read the status register 1
pub fn read_status1<M: QspiMaster>(bus: &mut BusAdapter<M>) -> Result<u8> {
    read_register(bus, opcodes::RDSR)
}

/// Send the Write Enable command
pub fn write_enable<M: QspiMaster>(bus: &mut BusAdapter<M>) -> Result<()> {
    bus.send_general(opcodes::WREN, &[], &mut [])
}

/// Check if a write or erase operation is in progress
pub fn is_busy<M: QspiMaster>(bus: &mut BusAdapter<M>) -> Result<bool> {
    let status = read_status1(bus)?;
    Ok(status & opcodes::SR1_WIP != 0)
}

/// Wait for the WIP (Write In Progress) bit to clear
///
/// Polls the status register until the Write In Progress bit clears or
/// the configured number of polls is exhausted, in which case
/// `Error::ReadyFailed` is returned. The caller must not assume the
/// operation completed in that case.
pub fn wait_ready<M: QspiMaster>(bus: &mut BusAdapter<M>, poll: &PollConfig) -> Result<()> {
    for _ in 0..poll.ready_polls() {
        if !is_busy(bus)? {
            return Ok(());
        }
        if poll.poll_delay_us > 0 {
            bus.delay_us(poll.poll_delay_us);
        }
    }

    log::error!("Device still busy after {} us", poll.ready_timeout_us);
    Err(Error::ReadyFailed)
}

/// Send WREN and confirm the Write Enable Latch is set
///
/// Returns `Error::WrenFailed` if WEL is not observed within
/// `wren_max_polls` status reads.
pub fn set_write_enable<M: QspiMaster>(bus: &mut BusAdapter<M>, poll: &PollConfig) -> Result<()> {
    write_enable(bus)?;

    for _ in 0..poll.wren_max_polls.max(1) {
        let status = read_status1(bus)?;
        if status & opcodes::SR1_WEL != 0 {
            return Ok(());
        }
        if poll.poll_delay_us > 0 {
            bus.delay_us(poll.poll_delay_us);
        }
    }

    log::error!("Write enable latch not set");
    Err(Error::WrenFailed)
}

/// Write a status/configuration register
///
/// Sends a verified WREN, the write instruction with `data`, and waits for
/// the write cycle to finish.
pub fn write_register<M: QspiMaster>(
    bus: &mut BusAdapter<M>,
    opcode: u8,
    data: &[u8],
    poll: &PollConfig,
) -> Result<()> {
    set_write_enable(bus, poll)?;
    bus.send_general(opcode, data, &mut [])?;
    wait_ready(bus, poll)
}

/// Send software reset sequence
///
/// Skipped (returns `Ok(false)`) while the device reports busy, since a
/// reset would abort the internal operation.
pub fn software_reset<M: QspiMaster>(bus: &mut BusAdapter<M>) -> Result<bool> {
    if is_busy(bus)? {
        log::debug!("Device busy, skipping soft reset");
        return Ok(false);
    }
    bus.send_general(opcodes::RSTEN, &[], &mut [])?;
    bus.send_general(opcodes::RST, &[], &mut [])?;
    // tRST is at most tens of microseconds on common parts
    bus.delay_us(100);
    Ok(true)
}

/// Enter 4-byte address mode
pub fn enter_4byte_mode<M: QspiMaster>(bus: &mut BusAdapter<M>) -> Result<()> {
    bus.send_general(opcodes::EN4B, &[], &mut [])
}

/// Exit 4-byte address mode
pub fn exit_4byte_mode<M: QspiMaster>(bus: &mut BusAdapter<M>) -> Result<()> {
    bus.send_general(opcodes::EX4B, &[], &mut [])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{ClockMode, SpiFeatures};
    use crate::spi::SpiCommand;

    /// Status register model: WIP stays set for `busy_reads` reads
    struct StatusMaster {
        busy_reads: u32,
        wel: bool,
        wel_sticks: bool,
        delays: u32,
    }

    impl QspiMaster for StatusMaster {
        fn features(&self) -> SpiFeatures {
            SpiFeatures::empty()
        }

        fn max_read_len(&self) -> usize {
            256
        }

        fn max_write_len(&self) -> usize {
            256
        }

        fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()> {
            match cmd.opcode {
                opcodes::WREN => {
                    self.wel = self.wel_sticks;
                }
                opcodes::RDSR => {
                    let mut sr = 0;
                    if self.busy_reads > 0 {
                        self.busy_reads -= 1;
                        sr |= opcodes::SR1_WIP;
                    }
                    if self.wel {
                        sr |= opcodes::SR1_WEL;
                    }
                    cmd.read_buf[0] = sr;
                }
                _ => {}
            }
            Ok(())
        }

        fn configure_clock(&mut self, _mode: ClockMode, _frequency_hz: u32) -> Result<()> {
            Ok(())
        }

        fn delay_us(&mut self, _us: u32) {
            self.delays += 1;
        }
    }

    fn bus(busy_reads: u32, wel_sticks: bool) -> BusAdapter<StatusMaster> {
        BusAdapter::new(StatusMaster {
            busy_reads,
            wel: false,
            wel_sticks,
            delays: 0,
        })
    }

    const POLL: PollConfig = PollConfig {
        poll_delay_us: 10,
        ready_timeout_us: 100,
        wren_max_polls: 3,
    };

    #[test]
    fn test_wait_ready_succeeds_within_budget() {
        let mut bus = bus(5, true);
        assert_eq!(wait_ready(&mut bus, &POLL), Ok(()));
        assert_eq!(bus.master().delays, 5);
    }

    #[test]
    fn test_wait_ready_times_out() {
        let mut bus = bus(u32::MAX, true);
        assert_eq!(wait_ready(&mut bus, &POLL), Err(Error::ReadyFailed));
        assert_eq!(bus.master().delays, POLL.ready_polls());
    }

    #[test]
    fn test_set_write_enable() {
        let mut ok = bus(0, true);
        assert_eq!(set_write_enable(&mut ok, &POLL), Ok(()));

        let mut stuck = bus(0, false);
        assert_eq!(set_write_enable(&mut stuck, &POLL), Err(Error::WrenFailed));
    }

    #[test]
    fn test_soft_reset_skipped_when_busy() {
        let mut busy = bus(1, true);
        assert_eq!(software_reset(&mut busy), Ok(false));

        let mut idle = bus(0, true);
        assert_eq!(software_reset(&mut idle), Ok(true));
    }

    #[test]
    fn test_ready_polls_never_zero() {
        let poll = PollConfig {
            poll_delay_us: 1000,
            ready_timeout_us: 10,
            wren_max_polls: 1,
        };
        assert_eq!(poll.ready_polls(), 1);
    }
}
