//! Erase types and largest-fit selection

use bitflags::bitflags;

/// Number of erase type slots in the Basic Flash Parameter Table
pub const MAX_ERASE_TYPES: usize = 4;

bitflags! {
    /// Set of erase type slots (bit N = slot N)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EraseTypeMask: u8 {
        /// Erase type 1
        const TYPE_1 = 1 << 0;
        /// Erase type 2
        const TYPE_2 = 1 << 1;
        /// Erase type 3
        const TYPE_3 = 1 << 2;
        /// Erase type 4
        const TYPE_4 = 1 << 3;
    }
}

impl EraseTypeMask {
    /// Mask with only `slot` set (empty for slots past the last one)
    pub fn slot(slot: usize) -> Self {
        if slot < MAX_ERASE_TYPES {
            Self::from_bits_truncate(1 << slot)
        } else {
            Self::empty()
        }
    }

    /// Check whether `slot` is part of the mask
    pub fn has_slot(&self, slot: usize) -> bool {
        self.contains(Self::slot(slot)) && slot < MAX_ERASE_TYPES
    }
}

/// An erase instruction and the block size it erases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseType {
    /// Erase instruction
    pub opcode: u8,
    /// Erase block size in bytes (power of two)
    pub size: u32,
}

impl EraseType {
    /// Create a new erase type
    pub const fn new(opcode: u8, size: u32) -> Self {
        Self { opcode, size }
    }

    /// Decode a BFPT erase type (size exponent, instruction)
    ///
    /// Exponent 0 marks an unused slot.
    pub fn from_sfdp(size_exp: u8, opcode: u8) -> Option<Self> {
        if size_exp == 0 || size_exp >= 32 {
            return None;
        }
        Some(Self::new(opcode, 1u32 << size_exp))
    }
}

/// The four erase type slots of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EraseTypes {
    slots: [Option<EraseType>; MAX_ERASE_TYPES],
}

impl EraseTypes {
    /// Build from explicit slots
    pub const fn new(slots: [Option<EraseType>; MAX_ERASE_TYPES]) -> Self {
        Self { slots }
    }

    /// Erase type in `slot`, if valid
    pub fn get(&self, slot: usize) -> Option<EraseType> {
        self.slots.get(slot).copied().flatten()
    }

    /// Replace the content of `slot`
    pub fn set(&mut self, slot: usize, erase_type: Option<EraseType>) {
        if let Some(s) = self.slots.get_mut(slot) {
            *s = erase_type;
        }
    }

    /// Iterate over valid slots as (slot, erase type)
    pub fn iter(&self) -> impl Iterator<Item = (usize, EraseType)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, et)| et.map(|et| (i, et)))
    }

    /// Mask of all valid slots
    pub fn valid_mask(&self) -> EraseTypeMask {
        self.iter()
            .fold(EraseTypeMask::empty(), |m, (i, _)| m | EraseTypeMask::slot(i))
    }

    /// Check that no valid slot exists
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Slot of the first erase type of `size` bytes
    pub fn find_size(&self, size: u32) -> Option<usize> {
        self.iter().find(|(_, et)| et.size == size).map(|(i, _)| i)
    }

    /// Smallest erase type enabled in `mask`
    pub fn smallest_in(&self, mask: EraseTypeMask) -> Option<EraseType> {
        self.iter()
            .filter(|(i, _)| mask.has_slot(*i))
            .map(|(_, et)| et)
            .min_by_key(|et| et.size)
    }

    /// Pick the largest erase type that can erase at `offset`
    ///
    /// Among the slots still enabled in `bitfield`, returns the slot of the
    /// largest erase type whose size is at most `remaining`, keeps `offset`
    /// aligned and evenly divides the distance from `offset` to the
    /// exclusive `boundary` of the region. On equal sizes the lower slot
    /// wins.
    ///
    /// Slots larger than `remaining` are removed from `bitfield`, as the
    /// remaining size only shrinks while a range is erased.
    pub fn next_largest_erase_type(
        &self,
        bitfield: &mut EraseTypeMask,
        remaining: u64,
        offset: u64,
        boundary: u64,
    ) -> Option<usize> {
        let span = boundary.checked_sub(offset)?;
        let mut best: Option<(usize, u32)> = None;

        for (slot, et) in self.iter() {
            if !bitfield.has_slot(slot) {
                continue;
            }
            let size = et.size as u64;
            if size > remaining {
                bitfield.remove(EraseTypeMask::slot(slot));
                continue;
            }
            if !offset.is_multiple_of(size) || !span.is_multiple_of(size) {
                continue;
            }
            if best.map_or(true, |(_, s)| et.size > s) {
                best = Some((slot, et.size));
            }
        }

        best.map(|(slot, _)| slot)
    }
}
