//! # Memory Management Unit Access
//!
//! Everything the paging code needs from the processor goes through [`Mmu`]:
//! reaching physical memory (inherited from [`PhysMapper`]), dereferencing
//! virtual addresses of the active address space, reading the fault address
//! from CR2, and switching CR3 and CR0.PG.
//!
//! [`X86Mmu`] talks to the real registers and is only available with the `asm`
//! feature on a 32-bit x86 target. Hosted tests use
//! `SimulatedMachine`.

use kernel_alloc::PhysMapper;
use kernel_memory_addresses::VirtualAddress;
use kernel_registers::cr3::Cr3;

/// Processor interface of the paging code.
pub trait Mmu: PhysMapper {
    /// Convert a virtual address of the active address space into a reference.
    ///
    /// # Safety
    /// - `va` must be mapped (or paging must be off and `va` valid physical memory).
    /// - The bytes at `va` must be valid for `T` and suitably aligned.
    /// - The caller must not create overlapping mutable references.
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T;

    /// The address of the most recent page fault (CR2).
    fn fault_address(&self) -> VirtualAddress;

    /// Install a page directory (write CR3). Flushes all non-global TLB entries.
    ///
    /// # Safety
    /// The directory must map the code and data currently in use.
    unsafe fn load_page_directory(&self, cr3: Cr3);

    /// The currently installed page directory (CR3).
    fn page_directory(&self) -> Cr3;

    /// Set CR0.PG.
    ///
    /// # Safety
    /// A directory that identity maps the running code must be loaded.
    unsafe fn enable_paging(&self);

    /// Whether CR0.PG is set.
    fn paging_enabled(&self) -> bool;
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
pub use bare::X86Mmu;

#[cfg(all(feature = "asm", target_arch = "x86"))]
mod bare {
    use super::Mmu;
    use kernel_alloc::{IdentityPhysMapper, PhysMapper};
    use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
    use kernel_registers::cr0::Cr0;
    use kernel_registers::cr2::Cr2;
    use kernel_registers::cr3::Cr3;
    use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};

    /// The processor this code runs on.
    ///
    /// Physical memory is reached through the identity mapping, so after paging
    /// is enabled only frames inside the shared region are reachable through
    /// [`PhysMapper`].
    #[derive(Debug, Default, Copy, Clone)]
    pub struct X86Mmu;

    impl PhysMapper for X86Mmu {
        unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
            // SAFETY: Forwarded to the caller.
            unsafe { IdentityPhysMapper.phys_to_mut(pa) }
        }
    }

    impl Mmu for X86Mmu {
        unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T {
            // SAFETY: Caller guarantees `va` is mapped and valid for `T`.
            unsafe { &mut *va.as_mut_ptr::<T>() }
        }

        fn fault_address(&self) -> VirtualAddress {
            // SAFETY: Reading CR2 has no side effects; the kernel runs in ring 0.
            unsafe { Cr2::load_unsafe() }.fault_address()
        }

        unsafe fn load_page_directory(&self, cr3: Cr3) {
            // SAFETY: Forwarded to the caller.
            unsafe { cr3.store_unsafe() };
        }

        fn page_directory(&self) -> Cr3 {
            // SAFETY: Reading CR3 has no side effects; the kernel runs in ring 0.
            unsafe { Cr3::load_unsafe() }
        }

        unsafe fn enable_paging(&self) {
            // SAFETY: Forwarded to the caller.
            unsafe {
                let cr0 = Cr0::load_unsafe().with_pg_paging(true);
                cr0.store_unsafe();
            }
        }

        fn paging_enabled(&self) -> bool {
            // SAFETY: Reading CR0 has no side effects; the kernel runs in ring 0.
            unsafe { Cr0::load_unsafe() }.pg_paging()
        }
    }
}
