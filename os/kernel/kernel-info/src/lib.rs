//! # Kernel Memory Layout Configuration
//!
//! This crate is the single source of truth for where the memory manager puts
//! things at boot: which physical frames the frame pools manage, which frames are
//! a hole in physical memory, how large the identity-mapped shared region is, and
//! where the standard virtual memory pools live.
//!
//! ## Physical Memory Layout
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  Low memory and kernel image    │
//! 0x0020_0000 ├─────────────────────────────────┤ KERNEL_POOL_START_FRAME (2 MiB)
//!             │  Kernel frame pool (2 MiB)      │
//! 0x0040_0000 ├─────────────────────────────────┤ PROCESS_POOL_START_FRAME (4 MiB)
//!             │  Process frame pool             │
//! 0x00F0_0000 ├─────────────────────────────────┤ MEM_HOLE_START_FRAME (15 MiB)
//!             │  Memory hole (inaccessible)     │
//! 0x0100_0000 ├─────────────────────────────────┤
//!             │  Process frame pool (cont.)     │
//! 0x0200_0000 └─────────────────────────────────┘ 32 MiB
//! ```
//!
//! The first [`SHARED_SIZE`](memory::SHARED_SIZE) bytes are identity mapped into
//! every address space, so kernel code and the kernel frame pool stay reachable
//! after paging is switched on.
//!
//! ## Virtual Memory Layout
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  Shared, identity mapped        │
//! 0x0040_0000 ├─────────────────────────────────┤
//!             │  (unused)                       │
//! 0x2000_0000 ├─────────────────────────────────┤ CODE_POOL_BASE (512 MiB)
//!             │  Code pool                      │
//! 0x4000_0000 ├─────────────────────────────────┤ HEAP_POOL_BASE (1 GiB)
//!             │  Heap pool                      │
//! 0x5000_0000 ├─────────────────────────────────┤
//!             │  (unused)                       │
//! 0xFFC0_0000 ├─────────────────────────────────┤
//!             │  Recursive page table window    │
//! 0xFFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! All values are compile-time constants guarded by `const` assertions.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
