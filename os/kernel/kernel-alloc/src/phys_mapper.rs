//! # Physical Memory Access
//!
//! The frame pools keep their bitmaps inside the physical frames they manage,
//! and the page table code writes directory and table frames before they are
//! reachable through any virtual address. Both need to turn a physical address
//! into something Rust can dereference.
//!
//! [`PhysMapper`] abstracts over how that happens:
//! - On the bare machine, before paging or inside the identity-mapped shared
//!   region, the physical address *is* the pointer ([`IdentityPhysMapper`]).
//! - In hosted tests, a simulated RAM hands out pointers into heap buffers.

use kernel_memory_addresses::PhysicalAddress;

/// Converts physical addresses into references in the current address space.
pub trait PhysMapper {
    /// Convert a *physical* address to a usable mutable reference.
    ///
    /// # Safety
    /// - `pa` must be reachable through this mapper (identity mapped, or backed
    ///   by simulated RAM).
    /// - The bytes at `pa` must be valid for `T` and suitably aligned.
    /// - The caller must not create overlapping mutable references.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

/// [`PhysMapper`] for code running with paging disabled, or touching only the
/// identity-mapped shared region once paging is enabled.
///
/// # Safety
/// - The referenced physical range must be identity mapped (or paging must be off).
#[derive(Debug, Default, Copy, Clone)]
pub struct IdentityPhysMapper;

impl PhysMapper for IdentityPhysMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let ptr = pa.as_u32() as usize as *mut T;
        // SAFETY: Caller guarantees the address is identity mapped and valid for `T`.
        unsafe { &mut *ptr }
    }
}
