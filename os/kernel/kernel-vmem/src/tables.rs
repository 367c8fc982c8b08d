//! # Paging Structures
//!
//! 32-bit x86 paging uses two levels of 4 KiB tables with 1024 four-byte
//! entries each:
//!
//! ```text
//! | 31‒22     | 21‒12  | 11‒0   |
//! | Directory | Table  | Offset |
//! ```
//!
//! - [`pd`]: the page directory, its entries and [`DirectoryIndex`].
//! - [`pt`]: a page table, its entries and [`TableIndex`].

pub mod pd;
pub mod pt;

pub use pd::{DirectoryIndex, PageDirectory, PdEntry};
pub use pt::{LeafTable, PtEntry, TableIndex};

use kernel_memory_addresses::VirtualAddress;

/// Number of entries in a directory or table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Split a virtual address into its directory and table indices.
#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (DirectoryIndex, TableIndex) {
    (DirectoryIndex::from(va), TableIndex::from(va))
}

const _: () = {
    assert!(size_of::<PageDirectory>() == 4096);
    assert!(size_of::<LeafTable>() == 4096);
    assert!(align_of::<PageDirectory>() == 4096);
    assert!(align_of::<LeafTable>() == 4096);
};
