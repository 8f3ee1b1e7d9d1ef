//! Erase planning

use super::erase::{EraseTypeMask, EraseTypes};
use super::region::RegionMap;
use crate::error::{Error, Result};

/// One erase command of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseStep {
    /// Block start address
    pub addr: u64,
    /// Block size in bytes
    pub size: u32,
    /// Erase instruction
    pub opcode: u8,
    /// Erase type slot the block uses
    pub slot: usize,
    /// Region the block lies in
    pub region: usize,
}

/// Greedy largest-fit decomposition of an erase range
///
/// Yields erase blocks in address order. Within a region the candidate set
/// only shrinks; it is reloaded from the region's bitfield whenever the
/// range crosses into the next region.
#[derive(Debug, Clone)]
pub struct ErasePlan<'a> {
    erase_types: &'a EraseTypes,
    regions: &'a RegionMap,
    offset: u64,
    end: u64,
    region: usize,
    bitfield: EraseTypeMask,
}

impl<'a> ErasePlan<'a> {
    /// Start a plan for `[addr, addr + len)`
    pub fn new(
        erase_types: &'a EraseTypes,
        regions: &'a RegionMap,
        addr: u64,
        len: u64,
    ) -> Result<Self> {
        let end = addr.checked_add(len).ok_or(Error::AddressOutOfBounds)?;
        let (region, bitfield) = if len == 0 {
            (0, EraseTypeMask::empty())
        } else {
            let region = regions.find_region(addr)?;
            (region, regions.as_slice()[region].erase_types)
        };

        Ok(Self {
            erase_types,
            regions,
            offset: addr,
            end,
            region,
            bitfield,
        })
    }

    /// Bytes not yet covered by the plan
    pub fn remaining(&self) -> u64 {
        self.end - self.offset
    }

    /// Compute the next step, or `None` once the range is covered
    pub fn next_step(&mut self) -> Result<Option<EraseStep>> {
        if self.offset >= self.end {
            return Ok(None);
        }

        let mut region = self
            .regions
            .get(self.region)
            .ok_or(Error::AddressOutOfBounds)?;
        while self.offset >= region.boundary {
            self.region += 1;
            region = self
                .regions
                .get(self.region)
                .ok_or(Error::AddressOutOfBounds)?;
            self.bitfield = region.erase_types;
        }

        let remaining = self.remaining();
        let slot = self
            .erase_types
            .next_largest_erase_type(&mut self.bitfield, remaining, self.offset, region.boundary)
            .ok_or(Error::NoEraseType)?;
        let erase_type = self.erase_types.get(slot).ok_or(Error::NoEraseType)?;

        let step = EraseStep {
            addr: self.offset,
            size: erase_type.size,
            opcode: erase_type.opcode,
            slot,
            region: self.region,
        };
        self.offset += erase_type.size as u64;
        Ok(Some(step))
    }

    /// Run the plan to completion, returning the number of steps
    pub fn validate(mut self) -> Result<usize> {
        let mut steps = 0;
        while self.next_step()?.is_some() {
            steps += 1;
        }
        Ok(steps)
    }
}

impl Iterator for ErasePlan<'_> {
    type Item = EraseStep;

    fn next(&mut self) -> Option<EraseStep> {
        self.next_step().ok().flatten()
    }
}
