//! # Recursive Page Table Window
//!
//! The last directory entry points back at the directory itself. During a walk
//! the CPU then treats the directory as a page table, which makes every paging
//! structure of the active address space visible in the top 4 MiB:
//!
//! ```text
//! 0xFFC0_0000 + (d << 12)   page table referenced by directory entry d
//! 0xFFFF_F000               the page directory itself (d = 1023)
//! ```
//!
//! No separate identity map of physical memory is needed to edit tables, but
//! the addresses are only meaningful while the directory is loaded in CR3 and
//! paging is enabled.

use crate::tables::DirectoryIndex;
use kernel_memory_addresses::VirtualAddress;

/// Base of the 4 MiB window through which all page tables are visible.
pub const TABLES_WINDOW: VirtualAddress = VirtualAddress::new(0xFFC0_0000);

/// Virtual address of the active page directory.
pub const DIRECTORY_ADDRESS: VirtualAddress = page_table_address(DirectoryIndex::LAST);

/// Virtual address of the page table referenced by directory entry `pdi`.
#[inline]
#[must_use]
pub const fn page_table_address(pdi: DirectoryIndex) -> VirtualAddress {
    VirtualAddress::new(TABLES_WINDOW.as_u32() | (pdi.as_u32() << 12))
}

/// Whether `va` lies inside the recursive window.
#[inline]
#[must_use]
pub const fn is_in_window(va: VirtualAddress) -> bool {
    va.as_u32() >= TABLES_WINDOW.as_u32()
}
