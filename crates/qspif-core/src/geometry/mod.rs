//! Device geometry
//!
//! Erase types, address regions and the erase planner that splits a range
//! into the largest legal erase blocks without crossing region boundaries.

mod erase;
mod plan;
mod region;

pub use erase::*;
pub use plan::*;
pub use region::*;

use crate::error::{Error, Result};

/// Immutable geometry of an initialized device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceGeometry {
    /// Total size in bytes
    pub size: u64,
    /// Page program size in bytes
    pub page_size: u32,
    /// Smallest erase size legal in every region (0 if none)
    pub min_common_erase_size: u64,
    /// Erase type slots
    pub erase_types: EraseTypes,
    /// Address regions
    pub regions: RegionMap,
}

impl DeviceGeometry {
    /// Build and validate the geometry
    pub fn new(size: u64, page_size: u32, erase_types: EraseTypes, regions: RegionMap) -> Result<Self> {
        regions.validate(&erase_types, size)?;
        let min_common_erase_size = regions.min_common_erase_size(&erase_types);
        Ok(Self {
            size,
            page_size,
            min_common_erase_size,
            erase_types,
            regions,
        })
    }

    /// Smallest erase size legal at `addr` (0 if out of range)
    pub fn erase_size_at(&self, addr: u64) -> u64 {
        self.regions.erase_size_at(addr, &self.erase_types)
    }

    /// Check that `[addr, addr + len)` lies inside the device
    pub fn check_range(&self, addr: u64, len: u64) -> Result<()> {
        match addr.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(Error::AddressOutOfBounds),
        }
    }

    /// Split `[addr, addr + len)` into erase blocks
    ///
    /// The whole range is validated before the plan is returned, so
    /// iterating it never yields a partial decomposition.
    pub fn plan_erase(&self, addr: u64, len: u64) -> Result<ErasePlan<'_>> {
        self.check_range(addr, len)?;
        if len > 0 {
            let smallest = self.erase_size_at(addr);
            if smallest == 0 || !addr.is_multiple_of(smallest) {
                return Err(Error::InvalidAlignment);
            }
        }

        let plan = ErasePlan::new(&self.erase_types, &self.regions, addr, len)?;
        plan.clone().validate()?;
        Ok(plan)
    }
}
