//! # Physical and Virtual Memory Address Types (32-bit)
//!
//! Strongly typed wrappers for raw memory addresses, physical frame numbers and
//! virtual page numbers as used by the 32-bit, two-level x86 paging unit.
//!
//! ## Overview
//!
//! The frame pool talks in **frame numbers**, the page table talks in
//! **directory/table indices** derived from virtual addresses, and the virtual
//! memory pools talk in **virtual addresses**. Mixing any of these up silently
//! corrupts an address space, so every kind gets its own zero-cost type:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`MemoryAddress`] | A raw 32-bit address, either physical or virtual. |
//! | [`PhysicalAddress`] | A byte address in physical memory (or MMIO). |
//! | [`VirtualAddress`] | A byte address that is translated by the paging unit. |
//! | [`FrameNumber`] | Index of a 4 KiB physical frame (`address >> 12`). |
//! | [`PageNumber`] | Index of a 4 KiB virtual page (`address >> 12`). |
//!
//! Conversions between the kinds are explicit:
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x0040_2123);
//! let frame = pa.frame();
//! assert_eq!(frame.as_u32(), 0x402);
//! assert_eq!(frame.base().as_u32(), 0x0040_2000);
//!
//! let va = VirtualAddress::new(0x2000_1004);
//! assert_eq!(va.page().base().as_u32(), 0x2000_1000);
//! assert_eq!(va.page_offset(), 4);
//! ```
//!
//! There is deliberately no conversion from a physical to a virtual address.
//! Turning either kind into a pointer is the job of the mapper seams in the
//! allocator and paging crates.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

mod frame_number;
mod memory_address;
mod page_number;
mod physical_address;
mod virtual_address;

pub use crate::frame_number::FrameNumber;
pub use crate::memory_address::MemoryAddress;
pub use crate::page_number::PageNumber;
pub use crate::physical_address::PhysicalAddress;
pub use crate::virtual_address::VirtualAddress;

/// Size of a page (virtual) and of a frame (physical) in bytes.
pub const PAGE_SIZE: u32 = 4096;

/// `log2(PAGE_SIZE)`, i.e. the number of offset bits in an address.
pub const PAGE_SHIFT: u32 = 12;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(1 << PAGE_SHIFT == PAGE_SIZE);
};
