//! Address regions and their legal erase types

use super::erase::{EraseTypeMask, EraseTypes};
use crate::error::{Error, ParseFailure, Result};

/// Maximum number of regions a device may declare
pub const MAX_REGIONS: usize = 10;

/// A contiguous address range sharing one set of erase types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Size of the region in bytes
    pub size: u64,
    /// Exclusive end address
    pub boundary: u64,
    /// Erase type slots legal in this region
    pub erase_types: EraseTypeMask,
}

impl Region {
    /// First address of the region
    pub fn start(&self) -> u64 {
        self.boundary - self.size
    }

    /// Check if `addr` lies inside this region
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start() && addr < self.boundary
    }
}

/// Ordered regions partitioning the device address space
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionMap {
    regions: heapless::Vec<Region, MAX_REGIONS>,
}

impl RegionMap {
    /// A single region covering `size` bytes
    pub fn single(size: u64, erase_types: EraseTypeMask) -> Self {
        let mut regions = heapless::Vec::new();
        // Capacity is at least one
        let _ = regions.push(Region {
            size,
            boundary: size,
            erase_types,
        });
        Self { regions }
    }

    /// Build consecutive regions from (size, erase types) pairs
    pub fn from_sizes<I>(sizes: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u64, EraseTypeMask)>,
    {
        let mut regions = heapless::Vec::new();
        let mut boundary = 0u64;
        let mut count = 0;

        for (size, erase_types) in sizes {
            count += 1;
            boundary += size;
            // Overflow is reported below with the full count
            let _ = regions.push(Region {
                size,
                boundary,
                erase_types,
            });
        }

        if count > MAX_REGIONS {
            return Err(ParseFailure::TooManyRegions { count }.into());
        }

        Ok(Self { regions })
    }

    /// Check the map against the erase types and the device size
    ///
    /// Every region must be non-empty, support at least one valid erase
    /// type and only reference valid slots; the regions must cover exactly
    /// `device_size` bytes.
    pub fn validate(&self, erase_types: &EraseTypes, device_size: u64) -> Result<()> {
        let valid = erase_types.valid_mask();

        for (i, region) in self.regions.iter().enumerate() {
            if region.erase_types.is_empty() {
                return Err(ParseFailure::EmptyRegionBitfield { region: i }.into());
            }
            if let Some(slot) = (0..super::MAX_ERASE_TYPES)
                .find(|&s| region.erase_types.has_slot(s) && !valid.has_slot(s))
            {
                return Err(ParseFailure::InvalidEraseType { region: i, slot }.into());
            }
            if region.size == 0 {
                return Err(ParseFailure::MalformedSectorMap.into());
            }
        }

        let covered = self.total_size();
        if covered != device_size {
            return Err(ParseFailure::RegionsDoNotCoverDevice {
                covered,
                device: device_size,
            }
            .into());
        }

        Ok(())
    }

    /// Number of regions
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Check if no region is defined
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Region at `index`
    pub fn get(&self, index: usize) -> Option<&Region> {
        self.regions.get(index)
    }

    /// All regions in address order
    pub fn as_slice(&self) -> &[Region] {
        &self.regions
    }

    /// Iterate over regions in address order
    pub fn iter(&self) -> core::slice::Iter<'_, Region> {
        self.regions.iter()
    }

    /// End of the last region
    pub fn total_size(&self) -> u64 {
        self.regions.last().map_or(0, |r| r.boundary)
    }

    /// Index of the region containing `offset`
    ///
    /// A boundary address belongs to the region that starts there.
    pub fn find_region(&self, offset: u64) -> Result<usize> {
        let index = self.regions.partition_point(|r| r.boundary <= offset);
        if index < self.regions.len() {
            Ok(index)
        } else {
            Err(Error::AddressOutOfBounds)
        }
    }

    /// Erase type slots legal in every region
    pub fn common_erase_types(&self) -> EraseTypeMask {
        self.regions
            .iter()
            .fold(EraseTypeMask::all(), |m, r| m & r.erase_types)
    }

    /// Smallest erase size legal in every region (0 if there is none)
    pub fn min_common_erase_size(&self, erase_types: &EraseTypes) -> u64 {
        if self.regions.is_empty() {
            return 0;
        }
        erase_types
            .smallest_in(self.common_erase_types())
            .map_or(0, |et| et.size as u64)
    }

    /// Smallest erase size legal at `addr` (0 if out of range)
    pub fn erase_size_at(&self, addr: u64, erase_types: &EraseTypes) -> u64 {
        self.find_region(addr)
            .ok()
            .and_then(|i| erase_types.smallest_in(self.regions[i].erase_types))
            .map_or(0, |et| et.size as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::EraseType;

    const KIB: u64 = 1024;

    fn types() -> EraseTypes {
        EraseTypes::new([
            Some(EraseType::new(0x20, 4096)),
            Some(EraseType::new(0x52, 32768)),
            Some(EraseType::new(0xD8, 65536)),
            None,
        ])
    }

    fn three_regions() -> RegionMap {
        RegionMap::from_sizes([
            (32 * KIB, EraseTypeMask::TYPE_1 | EraseTypeMask::TYPE_2),
            (960 * KIB, EraseTypeMask::TYPE_3),
            (32 * KIB, EraseTypeMask::TYPE_1 | EraseTypeMask::TYPE_2),
        ])
        .unwrap()
    }

    #[test]
    fn test_find_region_boundaries() {
        let map = three_regions();
        assert_eq!(map.find_region(0), Ok(0));
        assert_eq!(map.find_region(32 * KIB - 1), Ok(0));
        assert_eq!(map.find_region(32 * KIB), Ok(1));
        assert_eq!(map.find_region(992 * KIB - 1), Ok(1));
        assert_eq!(map.find_region(992 * KIB), Ok(2));
        assert_eq!(map.find_region(1024 * KIB - 1), Ok(2));
        assert_eq!(map.find_region(1024 * KIB), Err(Error::AddressOutOfBounds));
        assert!(map.get(1).unwrap().contains(32 * KIB));
    }

    #[test]
    fn test_find_region_every_4k_offset() {
        let map = three_regions();
        for offset in (0..map.total_size()).step_by(4096) {
            let index = map.find_region(offset).unwrap();
            let region = map.get(index).unwrap();
            assert!(region.contains(offset), "0x{:X} not in region {}", offset, index);
            if offset == region.start() && index > 0 {
                assert_eq!(map.get(index - 1).unwrap().boundary, offset);
            }
        }
        assert_eq!(
            map.find_region(map.total_size()),
            Err(Error::AddressOutOfBounds)
        );
    }

    #[test]
    fn test_erase_size_at_returns_smallest() {
        let single = RegionMap::single(
            16 * 1024 * KIB,
            EraseTypeMask::TYPE_1 | EraseTypeMask::TYPE_3,
        );
        assert_eq!(single.erase_size_at(0x1234, &types()), 4 * KIB);
        assert_eq!(single.min_common_erase_size(&types()), 4 * KIB);
        assert_eq!(single.erase_size_at(16 * 1024 * KIB, &types()), 0);
    }

    #[test]
    fn test_no_common_erase_size() {
        let map = RegionMap::from_sizes([
            (64 * KIB, EraseTypeMask::TYPE_2),
            (64 * KIB, EraseTypeMask::TYPE_3),
        ])
        .unwrap();
        assert_eq!(map.min_common_erase_size(&types()), 0);

        let map = three_regions();
        assert_eq!(map.min_common_erase_size(&types()), 0);
        assert_eq!(map.erase_size_at(64 * KIB, &types()), 64 * KIB);
    }

    #[test]
    fn test_validate() {
        let map = three_regions();
        assert_eq!(map.validate(&types(), 1024 * KIB), Ok(()));
        assert_eq!(
            map.validate(&types(), 2048 * KIB),
            Err(Error::ParsingFailed(ParseFailure::RegionsDoNotCoverDevice {
                covered: 1024 * KIB,
                device: 2048 * KIB
            }))
        );

        let empty = RegionMap::single(KIB, EraseTypeMask::empty());
        assert_eq!(
            empty.validate(&types(), KIB),
            Err(Error::ParsingFailed(ParseFailure::EmptyRegionBitfield { region: 0 }))
        );

        let invalid = RegionMap::single(KIB, EraseTypeMask::TYPE_4);
        assert_eq!(
            invalid.validate(&types(), KIB),
            Err(Error::ParsingFailed(ParseFailure::InvalidEraseType { region: 0, slot: 3 }))
        );
    }

    #[test]
    fn test_too_many_regions() {
        let sizes = (0..11).map(|_| (KIB, EraseTypeMask::TYPE_1));
        assert_eq!(
            RegionMap::from_sizes(sizes),
            Err(Error::ParsingFailed(ParseFailure::TooManyRegions { count: 11 }))
        );
    }
}
