//! Program/erase sequencer
//!
//! Drives one write-type operation through the chip's handshake:
//!
//! ```text
//! Idle -> WriteEnablePending -> OperationIssued -> WaitReady -> Idle
//!                 |                     |               |
//!                 +---------------------+---------------+--> Failed
//! ```
//!
//! The caller holds the device lock for the whole sequence.

use crate::bus::{BusAdapter, QspiMaster};
use crate::error::Result;
use crate::protocol::{self, PollConfig};

/// Position in the write handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequencerState {
    /// No operation in flight
    #[default]
    Idle,
    /// WREN sent, waiting for WEL
    WriteEnablePending,
    /// Program or erase instruction sent
    OperationIssued,
    /// Polling WIP
    WaitReady,
    /// Last sequence failed
    Failed,
}

/// A write-type operation
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    /// Program `data` at `addr` (must not cross a page)
    Program {
        /// Target address
        addr: u32,
        /// Payload
        data: &'a [u8],
    },
    /// Erase the block at `addr` with `opcode`
    Erase {
        /// Erase instruction
        opcode: u8,
        /// Block address
        addr: u32,
    },
}

/// Runs write-type operations through the WREN / issue / wait handshake
#[derive(Debug, Default)]
pub struct Sequencer {
    state: SequencerState,
}

impl Sequencer {
    /// Create an idle sequencer
    pub fn new() -> Self {
        Self::default()
    }

    /// State after the last transition
    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Execute one operation
    ///
    /// A failure leaves the sequencer in `Failed`; the next call starts
    /// from `Idle` again.
    pub fn run<M: QspiMaster>(
        &mut self,
        bus: &mut BusAdapter<M>,
        poll: &PollConfig,
        op: Operation<'_>,
    ) -> Result<()> {
        self.state = SequencerState::Idle;
        match self.steps(bus, poll, op) {
            Ok(()) => {
                self.advance(SequencerState::Idle);
                Ok(())
            }
            Err(e) => {
                log::trace!("Sequencer failed in {:?}: {}", self.state, e);
                self.state = SequencerState::Failed;
                Err(e)
            }
        }
    }

    fn steps<M: QspiMaster>(
        &mut self,
        bus: &mut BusAdapter<M>,
        poll: &PollConfig,
        op: Operation<'_>,
    ) -> Result<()> {
        self.advance(SequencerState::WriteEnablePending);
        protocol::set_write_enable(bus, poll)?;

        self.advance(SequencerState::OperationIssued);
        match op {
            Operation::Program { addr, data } => bus.send_program(addr, data)?,
            Operation::Erase { opcode, addr } => bus.send_erase(opcode, addr)?,
        }

        self.advance(SequencerState::WaitReady);
        protocol::wait_ready(bus, poll)
    }

    fn advance(&mut self, next: SequencerState) {
        log::trace!("Sequencer {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
