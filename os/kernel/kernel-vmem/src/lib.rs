//! # Virtual Memory Support
//!
//! Demand-paged virtual memory for a 32-bit x86 kernel.
//!
//! ## What you get
//! - A [`PageTable`] per address space that identity maps a shared region and
//!   maps everything else lazily from its page fault handler.
//! - [`VmPool`]s that carve a virtual address range into regions and return
//!   their frames on release.
//! - 32-bit page [`PageEntryBits`] and typed directory/table wrappers
//!   ([`tables`]).
//! - The [`Mmu`] trait, the processor interface the paging code is written
//!   against, with a hosted `SimulatedMachine` (`sim` feature) for tests.
//! - [`bootstrap`](bootstrap::bootstrap), which brings up frame pools and paging in order.
//!
//! ## x86 Virtual Address → Physical Address Walk
//!
//! Each 32-bit virtual address is divided into three fields:
//!
//! ```text
//! | 31‒22     | 21‒12 | 11‒0   |
//! | Directory | Table | Offset |
//! ```
//!
//! CR3 holds the frame of the page directory. The directory index selects a
//! page directory entry (PDE) pointing to a page table, the table index selects
//! a page table entry (PTE) mapping a 4 KiB frame, and the offset selects the
//! byte inside it.
//!
//! ```text
//!  CR3 ──► Page Directory ──► Page Table ──► Physical Page
//!            1024 PDEs          1024 PTEs       4 KiB
//! ```
//!
//! ## Recursive Mapping
//!
//! Once paging is on, the kernel can only edit tables it can address. The last
//! directory entry points at the directory itself. A walk through entry 1023
//! then treats the directory as a page table, so every page table appears in
//! the top 4 MiB of the address space:
//!
//! ```text
//! 0xFFC0_0000 + (d << 12)  ──►  page table for directory entry d
//! 0xFFFF_F000              ──►  the page directory itself
//! ```
//!
//! See [`recursive`] for the address arithmetic.
//!
//! ## Memory Layout
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────┐
//!             │ shared region           │ identity mapped in every address space
//! 0x0040_0000 ├─────────────────────────┤
//!             │                         │
//! 0x2000_0000 ├─────────────────────────┤
//!             │ code pool               │ faulted in on demand
//! 0x3000_0000 ├─────────────────────────┤
//!             │                         │
//! 0x4000_0000 ├─────────────────────────┤
//!             │ heap pool               │ faulted in on demand
//! 0x5000_0000 ├─────────────────────────┤
//!             │                         │
//! 0xFFC0_0000 ├─────────────────────────┤
//!             │ recursive table window  │
//! 0xFFFF_FFFF └─────────────────────────┘
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod bootstrap;
pub mod mmu;
mod page_entry_bits;
pub mod page_table;
pub mod paging;
pub mod recursive;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod tables;
pub mod vm_pool;

pub use crate::bootstrap::{BootedMemory, MemoryLayout};
pub use crate::mmu::Mmu;
#[cfg(all(feature = "asm", target_arch = "x86"))]
pub use crate::mmu::X86Mmu;
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::page_table::{FaultResolution, PageFaultError, PageTable, VmPoolRegistration};
pub use crate::paging::{PagingConfig, PagingError, TableLayout, init_paging};
pub use crate::vm_pool::{VmPool, VmPoolError, VmRegion};

/// Re-export constants as info module.
pub use kernel_info::memory as info;
