//! # Page Table (PT)
//!
//! - [`TableIndex`]: index type for virtual-address bits `[21:12]`.
//! - [`PtEntry`]: a table entry mapping one 4 KiB page.
//! - [`LeafTable`]: a 4 KiB-aligned array of 1024 entries.
//!
//! An entry is in one of three states:
//!
//! | State | `P` | bit 9 |
//! |-------|-----|-------|
//! | absent | 0 | 0 |
//! | reserved-unmapped | 0 | 1 |
//! | mapped | 1 | 0 |
//!
//! Reserved-unmapped entries belong to a table that exists but whose page has
//! not been touched yet, or has been freed.

use super::ENTRIES_PER_TABLE;
use crate::PageEntryBits;
use kernel_memory_addresses::{FrameNumber, VirtualAddress};

/// Index into a page table (derived from VA bits `[21:12]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

/// A single page table entry (PTE).
#[doc(alias = "PTE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PtEntry(PageEntryBits);

/// A page table: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PT")]
#[repr(C, align(4096))]
pub struct LeafTable {
    entries: [PtEntry; ENTRIES_PER_TABLE],
}

impl TableIndex {
    /// Build an index from a virtual address (extracts bits `[21:12]`).
    #[inline]
    #[must_use]
    pub const fn from(va: VirtualAddress) -> Self {
        Self(((va.as_u32() >> 12) & 0x3FF) as u16)
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
}

impl PtEntry {
    /// A zero (absent) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    /// The reserved-unmapped marker: not present, not writable, bit 9 set.
    #[inline]
    #[must_use]
    pub const fn reserved_unmapped() -> Self {
        Self(PageEntryBits::new().with_reserved_unmapped(true))
    }

    /// A present, writable mapping of `frame`.
    #[inline]
    #[must_use]
    pub const fn make_4k(frame: FrameNumber) -> Self {
        Self(PageEntryBits::new_kernel_rw().with_frame_number(frame))
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    #[inline]
    #[must_use]
    pub const fn is_reserved_unmapped(self) -> bool {
        !self.0.present() && self.0.reserved_unmapped()
    }

    /// The mapped frame, if present.
    #[inline]
    #[must_use]
    pub const fn page_frame(self) -> Option<FrameNumber> {
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

impl LeafTable {
    /// Read the entry at `i`.
    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> PtEntry {
        self.entries[i.as_usize()]
    }

    /// Write the entry at `i`.
    ///
    /// Caller must handle any required TLB invalidation when changing active mappings.
    #[inline]
    pub const fn set(&mut self, i: TableIndex, e: PtEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Write `e` into every entry.
    #[inline]
    pub fn fill(&mut self, e: PtEntry) {
        self.entries.fill(e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_is_neither_present_nor_writable() {
        let e = PtEntry::reserved_unmapped();
        assert_eq!(e.raw(), 0x200);
        assert!(!e.is_present());
        assert!(!e.flags().writable());
        assert!(e.is_reserved_unmapped());
        assert_eq!(e.page_frame(), None);
        assert!(!PtEntry::zero().is_reserved_unmapped());
    }

    #[test]
    fn mapped_entry() {
        let e = PtEntry::make_4k(FrameNumber::new(0x1234));
        assert_eq!(e.raw(), 0x0123_4003);
        assert!(!e.is_reserved_unmapped());
        assert_eq!(e.page_frame(), Some(FrameNumber::new(0x1234)));
    }

    #[test]
    fn index_from_address() {
        assert_eq!(TableIndex::from(VirtualAddress::new(0x0040_5000)).as_usize(), 5);
        assert_eq!(TableIndex::from(VirtualAddress::new(0xFFFF_F000)).as_usize(), 1023);
    }
}
