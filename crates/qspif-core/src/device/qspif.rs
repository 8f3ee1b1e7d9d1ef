//! SFDP-driven QSPI flash block device

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::block_device::BlockDevice;
use super::config::DeviceConfig;
use super::negotiate::{self, Negotiated};
use super::sequencer::{Operation, Sequencer, SequencerState};
use crate::bus::{BusAdapter, BusConfig, QspiMaster};
use crate::error::{Error, Result};
use crate::geometry::{DeviceGeometry, RegionMap};
use crate::protocol;
use crate::sfdp::{self, BasicFlashParams};

/// State discovered by `init`
#[derive(Debug, Clone)]
struct Discovered {
    geometry: DeviceGeometry,
    params: BasicFlashParams,
    negotiated: Negotiated,
    config_id: Option<u8>,
}

struct Inner<M> {
    bus: BusAdapter<M>,
    sequencer: Sequencer,
    discovered: Option<Discovered>,
}

/// Block device backed by a serial NOR flash
///
/// Geometry, erase types and bus modes are discovered from the chip's SFDP
/// tables in [`BlockDevice::init`]. Every operation runs under a single
/// mutex held for its full duration, so concurrent callers never
/// interleave bus transactions.
pub struct QspifBlockDevice<M> {
    inner: Mutex<Inner<M>>,
    config: DeviceConfig,
}

impl<M: QspiMaster> QspifBlockDevice<M> {
    /// Take ownership of the bus and apply the clock configuration
    pub fn new(master: M, config: DeviceConfig) -> Result<Self> {
        let mut bus = BusAdapter::new(master);
        bus.configure_clock(config.clock_mode, config.frequency_hz)?;

        Ok(Self {
            inner: Mutex::new(Inner {
                bus,
                sequencer: Sequencer::new(),
                discovered: None,
            }),
            config,
        })
    }

    /// Construction parameters
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Negotiated bus format, if initialized
    pub fn bus_config(&self) -> Option<BusConfig> {
        self.lock().discovered.as_ref().map(|d| d.negotiated.bus)
    }

    /// Region layout, if initialized
    pub fn regions(&self) -> Option<RegionMap> {
        self.lock().discovered.as_ref().map(|d| d.geometry.regions.clone())
    }

    /// Full geometry, if initialized
    pub fn geometry(&self) -> Option<DeviceGeometry> {
        self.lock().discovered.as_ref().map(|d| d.geometry.clone())
    }

    /// Decoded basic parameter table, if initialized
    pub fn basic_params(&self) -> Option<BasicFlashParams> {
        self.lock().discovered.as_ref().map(|d| d.params)
    }

    /// Sector map configuration ID detected during init
    pub fn config_id(&self) -> Option<u8> {
        self.lock().discovered.as_ref().and_then(|d| d.config_id)
    }

    /// State of the program/erase handshake after the last operation
    pub fn sequencer_state(&self) -> SequencerState {
        self.lock().sequencer.state()
    }

    /// Release the bus master
    pub fn into_master(self) -> M {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .bus
            .into_master()
    }

    /// Run `f` with exclusive access to the bus master
    pub fn with_master<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        f(self.lock().bus.master_mut())
    }

    fn lock(&self) -> MutexGuard<'_, Inner<M>> {
        // Operations leave the bus in a consistent state on error
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn discover(&self, bus: &mut BusAdapter<M>) -> Result<Discovered> {
        let poll = &self.config.poll;
        bus.configure(BusConfig::default());

        if self.config.soft_reset && protocol::software_reset(bus)? {
            log::debug!("Soft reset issued");
        }
        protocol::wait_ready(bus, poll)?;

        let tables = sfdp::parse_headers(bus)?;
        let params = sfdp::read_basic_table(bus, &tables.basic)?;

        let (regions, config_id) = match tables.sector_map {
            Some(location) => {
                let table = sfdp::read_sector_map(bus, &location)?;
                let id = table.detect(|cmd| negotiate::read_detection_byte(bus, cmd))?;
                (table.select(id)?.region_map()?, id)
            }
            None => (
                RegionMap::single(params.density_bytes, params.erase_types.valid_mask()),
                None,
            ),
        };

        let geometry = DeviceGeometry::new(
            params.density_bytes,
            params.page_size,
            params.erase_types,
            regions,
        )?;
        let negotiated = negotiate::negotiate(bus, &params, &self.config)?;

        Ok(Discovered {
            geometry,
            params,
            negotiated,
            config_id,
        })
    }

    fn geometry_value(&self, f: impl FnOnce(&DeviceGeometry) -> u64) -> u64 {
        self.lock()
            .discovered
            .as_ref()
            .map_or(0, |d| f(&d.geometry))
    }
}

impl<M: QspiMaster> BlockDevice for QspifBlockDevice<M> {
    fn init(&self) -> Result<()> {
        let mut guard = self.lock();
        if guard.discovered.is_some() {
            return Ok(());
        }

        match self.discover(&mut guard.bus) {
            Ok(discovered) => {
                log::info!(
                    "QSPI flash: {} bytes, {} regions, read {}",
                    discovered.geometry.size,
                    discovered.geometry.regions.len(),
                    discovered.negotiated.bus.read_mode
                );
                guard.discovered = Some(discovered);
                Ok(())
            }
            Err(e) => {
                log::error!("QSPI flash init failed: {}", e);
                guard.bus.configure(BusConfig::default());
                Err(e)
            }
        }
    }

    fn deinit(&self) -> Result<()> {
        let mut guard = self.lock();
        let Some(discovered) = guard.discovered.take() else {
            return Ok(());
        };
        let poll = &self.config.poll;
        let bus = &mut guard.bus;

        let mut result = Ok(());
        if discovered.negotiated.qpi_entered {
            result = negotiate::exit_qpi(bus, discovered.params.qpi_disable, poll);
        }
        bus.configure(BusConfig {
            address_width: discovered.negotiated.bus.address_width,
            ..Default::default()
        });

        if discovered.negotiated.four_byte_entered {
            let exit = protocol::exit_4byte_mode(bus);
            result = result.and(exit);
        }
        bus.configure(BusConfig::default());
        result
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let mut guard = self.lock();
        let Inner { bus, discovered, .. } = &mut *guard;
        let discovered = discovered.as_ref().ok_or(Error::NotInitialized)?;
        discovered.geometry.check_range(addr, buf.len() as u64)?;

        if buf.is_empty() {
            return Ok(());
        }
        bus.send_read(addr as u32, buf)
    }

    fn program(&self, addr: u64, data: &[u8]) -> Result<()> {
        let mut guard = self.lock();
        let Inner {
            bus,
            sequencer,
            discovered,
        } = &mut *guard;
        let geometry = &discovered.as_ref().ok_or(Error::NotInitialized)?.geometry;

        let page = geometry.page_size as u64;
        if !addr.is_multiple_of(page) || !(data.len() as u64).is_multiple_of(page) {
            return Err(Error::InvalidAlignment);
        }
        geometry.check_range(addr, data.len() as u64)?;

        let chunk = core::cmp::min(geometry.page_size as usize, bus.master().max_write_len().max(1));
        let poll = &self.config.poll;

        for (i, piece) in data.chunks(chunk).enumerate() {
            let offset = addr + (i * chunk) as u64;
            sequencer.run(
                bus,
                poll,
                Operation::Program {
                    addr: offset as u32,
                    data: piece,
                },
            )?;
        }

        Ok(())
    }

    fn erase(&self, addr: u64, len: u64) -> Result<()> {
        let mut guard = self.lock();
        let Inner {
            bus,
            sequencer,
            discovered,
        } = &mut *guard;
        let geometry = &discovered.as_ref().ok_or(Error::NotInitialized)?.geometry;

        let plan = geometry.plan_erase(addr, len)?;
        let poll = &self.config.poll;

        for step in plan {
            log::trace!("Erase {} KiB at 0x{:08X}", step.size / 1024, step.addr);
            sequencer.run(
                bus,
                poll,
                Operation::Erase {
                    opcode: step.opcode,
                    addr: step.addr as u32,
                },
            )?;
        }

        Ok(())
    }

    fn read_size(&self) -> u64 {
        self.geometry_value(|_| 1)
    }

    fn program_size(&self) -> u64 {
        self.geometry_value(|g| g.page_size as u64)
    }

    fn erase_size(&self) -> u64 {
        self.geometry_value(|g| g.min_common_erase_size)
    }

    fn erase_size_at(&self, addr: u64) -> u64 {
        self.geometry_value(|g| g.erase_size_at(addr))
    }

    fn size(&self) -> u64 {
        self.geometry_value(|g| g.size)
    }
}
