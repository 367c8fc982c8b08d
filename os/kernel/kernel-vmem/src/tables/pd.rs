//! # Page Directory (PD)
//!
//! - [`DirectoryIndex`]: index type for virtual-address bits `[31:22]`.
//! - [`PdEntry`]: a directory entry pointing to a page table.
//! - [`PageDirectory`]: a 4 KiB-aligned array of 1024 entries.
//!
//! ## Invariants & Notes
//!
//! - Each present entry covers 4 MiB of virtual address space.
//! - In the recursive layout, entry [`DirectoryIndex::LAST`] points back at the
//!   directory itself.

use super::ENTRIES_PER_TABLE;
use crate::PageEntryBits;
use kernel_memory_addresses::{FrameNumber, VirtualAddress};

/// Index into the page directory (derived from VA bits `[31:22]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DirectoryIndex(u16);

/// A single page directory entry (PDE).
#[doc(alias = "PDE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PdEntry(PageEntryBits);

/// The page directory: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PD")]
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [PdEntry; ENTRIES_PER_TABLE],
}

impl DirectoryIndex {
    /// The last directory slot, used for the recursive self reference.
    pub const LAST: Self = Self(1023);

    /// Build an index from a virtual address (extracts bits `[31:22]`).
    #[inline]
    #[must_use]
    pub const fn from(va: VirtualAddress) -> Self {
        Self((va.as_u32() >> 22) as u16)
    }

    /// Construct from a raw `u16`.
    ///
    /// ### Debug assertions
    /// - Asserts `v < 1024` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < ENTRIES_PER_TABLE);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0 as u32
    }

    /// First virtual address covered by this entry.
    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new(self.as_u32() << 22)
    }
}

impl PdEntry {
    /// A zero (absent) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    /// A present, writable entry referencing the table in `frame`.
    #[inline]
    #[must_use]
    pub const fn make_table(frame: FrameNumber) -> Self {
        Self(PageEntryBits::new_kernel_rw().with_frame_number(frame))
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    /// The referenced table frame, if present.
    #[inline]
    #[must_use]
    pub const fn table_frame(self) -> Option<FrameNumber> {
        if self.is_present() {
            Some(self.0.frame_number())
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }

    #[inline]
    #[must_use]
    pub const fn from_raw(v: u32) -> Self {
        Self(PageEntryBits::from_bits(v))
    }
}

impl PageDirectory {
    /// Read the entry at `i`.
    #[inline]
    #[must_use]
    pub const fn get(&self, i: DirectoryIndex) -> PdEntry {
        self.entries[i.as_usize()]
    }

    /// Write the entry at `i`.
    ///
    /// Caller must handle any required TLB invalidation when changing active mappings.
    #[inline]
    pub const fn set(&mut self, i: DirectoryIndex, e: PdEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Mark every entry absent.
    #[inline]
    pub fn clear(&mut self) {
        self.entries.fill(PdEntry::zero());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_entry_is_present_and_writable() {
        let e = PdEntry::make_table(FrameNumber::new(0x401));
        assert_eq!(e.raw(), 0x0040_1003);
        assert_eq!(e.table_frame(), Some(FrameNumber::new(0x401)));
        assert_eq!(PdEntry::zero().table_frame(), None);
    }

    #[test]
    fn index_covers_four_mib() {
        let i = DirectoryIndex::from(VirtualAddress::new(0x4040_0000));
        assert_eq!(i.as_usize(), 0x101);
        assert_eq!(i.base().as_u32(), 0x4040_0000);
        assert_eq!(DirectoryIndex::LAST.base().as_u32(), 0xFFC0_0000);
    }
}
