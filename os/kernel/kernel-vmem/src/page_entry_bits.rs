use bitfield_struct::bitfield;
use kernel_memory_addresses::FrameNumber;

/// A single 32-bit x86 paging entry in its raw bitfield form.
///
/// Page directory entries (PDEs) and page table entries (PTEs) share this
/// layout. A PDE points to a page table, a PTE maps one 4 KiB page.
///
/// ### Bit layout
///
/// | Bits   | Name / Mnemonic   | Meaning |
/// |--------|-------------------|---------|
/// | 0      | `P` (present)     | Valid entry if set |
/// | 1      | `RW`              | Writable if set |
/// | 2      | `US`              | User-mode accessible if set |
/// | 3      | `PWT`             | Write-through caching |
/// | 4      | `PCD`             | Disable caching |
/// | 5      | `A`               | Accessed |
/// | 6      | `D`               | Dirty (PTE only) |
/// | 7      | `PS`              | 4 MiB page (PDE only, unused here) |
/// | 8      | `G`               | Global (PTE only) |
/// | 9      | OS: reserved      | Known to the kernel, but not mapped |
/// | 10–11  | OS available      | Unused |
/// | 12–31  | `frame`           | Physical frame number |
///
/// ### Example
/// ```rust
/// # use kernel_memory_addresses::FrameNumber;
/// # use kernel_vmem::PageEntryBits;
/// let e = PageEntryBits::new_kernel_rw().with_frame_number(FrameNumber::new(0x123));
/// assert!(e.present());
/// assert_eq!(e.into_bits(), 0x0012_3003);
/// ```
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    ///
    /// Set if the entry points to a valid table (PDE) or page (PTE). Any access
    /// through a clear entry raises a page fault.
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5).
    ///
    /// Set by the CPU on first access through this entry.
    pub accessed: bool,

    /// Dirty (D, bit 6).
    ///
    /// Set by the CPU on first write through a PTE.
    pub dirty: bool,

    /// Page Size (PS, bit 7).
    ///
    /// Selects 4 MiB pages in a PDE when CR4.PSE is set. This kernel never does.
    pub large_page: bool,

    /// Global (G, bit 8).
    pub global_translation: bool,

    /// Reserved-unmapped marker (OS-available bit 9).
    ///
    /// Written into every entry of a freshly created page table and into
    /// entries whose page was freed. Hardware ignores it while `present` is clear.
    pub reserved_unmapped: bool,

    /// OS-available (bits 10..=11).
    #[bits(2)]
    pub os_available: u8,

    /// Physical frame number (bits 12..=31).
    #[bits(20)]
    frame_bits: u32,
}

impl PageEntryBits {
    #[inline]
    #[must_use]
    pub const fn frame_number(&self) -> FrameNumber {
        FrameNumber::new(self.frame_bits())
    }

    #[inline]
    #[must_use]
    pub const fn with_frame_number(self, frame: FrameNumber) -> Self {
        self.with_frame_bits(frame.as_u32())
    }

    /// Present, writable, supervisor-only.
    #[inline]
    #[must_use]
    pub const fn new_kernel_rw() -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user_access(false)
            .with_write_through(false)
            .with_cache_disabled(false)
    }
}
