//! # Virtual Memory Pools
//!
//! A [`VmPool`] hands out page-granular regions of a fixed virtual address
//! range. Allocation only records the region; the pages are mapped lazily by
//! the page fault handler on first access. Releasing a region frees every page
//! through the page table and reloads it so that stale translations are dropped.
//!
//! The region records live inside the pool's own first page:
//!
//! ```text
//! base                 base + 4 KiB                              base + size
//! ┌────────────────────┬───────────┬───────────┬─────┬──────────┐
//! │ RegionTable        │ region 0  │ region 1  │ ... │  unused  │
//! │ count, [VmRegion]  │           │           │     │          │
//! └────────────────────┴───────────┴───────────┴─────┴──────────┘
//! ```
//!
//! Regions are bump allocated in address order. Releasing a region does not
//! make its addresses available again unless it was the most recent one.

use crate::mmu::Mmu;
use crate::page_table::{PageFaultError, PageTable, VmPoolRegistration};
use kernel_alloc::{FramePoolRegistry, PoolHandle};
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress};
use log::{debug, info};

/// Number of region records that fit next to the header in one page.
pub const MAX_REGIONS: usize = (PAGE_SIZE as usize - 8) / size_of::<VmRegion>();

/// Errors reported by [`VmPool`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmPoolError {
    #[error("requested a region of zero bytes")]
    EmptyRequest,
    #[error("region table is full ({MAX_REGIONS} regions)")]
    RegionTableFull,
    #[error("{requested:#x} bytes requested but only {available:#x} bytes left in the pool")]
    OutOfSpace { requested: u32, available: u32 },
    #[error("failed to map the region table: {0}")]
    Fault(#[from] PageFaultError),
}

/// One allocated region: base address and page-rounded size.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct VmRegion {
    base: VirtualAddress,
    size: u32,
}

impl VmRegion {
    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    /// Size in bytes, a multiple of the page size.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Number of pages in the region.
    #[must_use]
    pub const fn pages(&self) -> u32 {
        self.size / PAGE_SIZE
    }
}

/// The region records, stored in the first page of a pool.
#[repr(C, align(4096))]
pub struct RegionTable {
    count: u32,
    _reserved: u32,
    regions: [VmRegion; MAX_REGIONS],
}

const _: () = {
    assert!(size_of::<VmRegion>() == 8);
    assert!(size_of::<RegionTable>() == PAGE_SIZE as usize);
};

impl RegionTable {
    fn as_slice(&self) -> &[VmRegion] {
        &self.regions[..self.count as usize]
    }
}

/// A range of virtual addresses carved into regions.
pub struct VmPool<'m> {
    base: VirtualAddress,
    size: u32,
    frames: PoolHandle,
    regions: &'m mut RegionTable,
}

impl<'m> VmPool<'m> {
    /// Create a pool over `size` bytes at `base`, backed by the frame pool `frames`.
    ///
    /// The pool registers itself with `page_table` and maps its first page, which
    /// holds the region table.
    ///
    /// # Errors
    /// [`VmPoolError::Fault`] if the region table page cannot be mapped. The
    /// pool is not registered with `page_table` in that case.
    ///
    /// # Panics
    /// If `base` or `size` are not page aligned, the pool is smaller than two
    /// pages, it wraps the address space, or `page_table` cannot register it.
    pub fn new<M: Mmu>(
        base: VirtualAddress,
        size: u32,
        frames: PoolHandle,
        page_table: &mut PageTable,
        frame_registry: &mut FramePoolRegistry<'_>,
        mmu: &M,
    ) -> Result<Self, VmPoolError> {
        assert!(
            base.is_page_aligned() && size.is_multiple_of(PAGE_SIZE),
            "VM pool at {base} with size {size:#x} is not page aligned"
        );
        assert!(size >= 2 * PAGE_SIZE, "VM pool at {base} is smaller than two pages");
        assert!(
            base.checked_add(size - 1).is_some(),
            "VM pool at {base} with size {size:#x} wraps the address space"
        );

        page_table.register_pool(VmPoolRegistration { base, size, frames });
        if let Err(e) = page_table.ensure_mapped(base, frame_registry, mmu) {
            page_table.unregister_pool(base);
            return Err(e.into());
        }

        // SAFETY: The first page of the pool is mapped (above) and belongs to this pool.
        let regions: &'m mut RegionTable = unsafe { mmu.virt_to_mut(base) };
        regions.count = 0;

        info!("Created VM pool at {base} ({size:#x} bytes)");
        Ok(Self {
            base,
            size,
            frames,
            regions,
        })
    }

    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Frame pool backing this pool's pages.
    #[must_use]
    pub const fn frame_pool(&self) -> PoolHandle {
        self.frames
    }

    /// The allocated regions, in allocation order.
    #[must_use]
    pub fn regions(&self) -> &[VmRegion] {
        self.regions.as_slice()
    }

    /// Reserve a region of at least `size` bytes and return its base.
    ///
    /// The size is rounded up to whole pages. The page table is not touched.
    ///
    /// # Errors
    /// [`VmPoolError::EmptyRequest`] for `size == 0`,
    /// [`VmPoolError::RegionTableFull`] when no record is left, and
    /// [`VmPoolError::OutOfSpace`] when the pool's range is exhausted.
    pub fn allocate(&mut self, size: u32) -> Result<VirtualAddress, VmPoolError> {
        if size == 0 {
            return Err(VmPoolError::EmptyRequest);
        }

        // Offset of the first byte after the last region.
        let used = self.regions().last().map_or(PAGE_SIZE, |last| {
            last.base.as_u32() - self.base.as_u32() + last.size
        });
        let available = self.size - used;
        let rounded = match size.checked_next_multiple_of(PAGE_SIZE) {
            Some(rounded) if rounded <= available => rounded,
            _ => {
                return Err(VmPoolError::OutOfSpace {
                    requested: size,
                    available,
                });
            }
        };

        let count = self.regions.count as usize;
        if count == MAX_REGIONS {
            return Err(VmPoolError::RegionTableFull);
        }

        let region = VmRegion {
            base: self.base + used,
            size: rounded,
        };
        self.regions.regions[count] = region;
        self.regions.count += 1;

        debug!("Allocated region {} ({rounded:#x} bytes) in VM pool at {}", region.base, self.base);
        Ok(region.base)
    }

    /// Release the region starting at `start`: free every page, drop the record,
    /// and reload the page table.
    ///
    /// Returns the number of frames released.
    ///
    /// # Panics
    /// If no region starts at `start`, or `page_table` is not the active
    /// address space.
    pub fn release<M: Mmu>(
        &mut self,
        start: VirtualAddress,
        page_table: &mut PageTable,
        frames: &mut FramePoolRegistry<'_>,
        mmu: &M,
    ) -> u32 {
        let Some(index) = self.regions().iter().position(|r| r.base == start) else {
            panic!("release of unknown region at {start} in VM pool at {}", self.base);
        };
        let region = self.regions.regions[index];

        let mut released = 0;
        for page in 0..region.pages() {
            if page_table.free_page(region.base.page() + page, frames, mmu) {
                released += 1;
            }
        }

        let count = self.regions.count as usize;
        self.regions.regions.copy_within(index + 1..count, index);
        self.regions.count -= 1;

        page_table.flush_tlb(mmu);
        debug!(
            "Released region {start} ({} pages, {released} mapped) from VM pool at {}",
            region.pages(),
            self.base
        );
        released
    }

    /// Whether `address` lies inside this pool.
    #[must_use]
    pub const fn is_legitimate(&self, address: VirtualAddress) -> bool {
        address.as_u32() >= self.base.as_u32() && address.as_u32() - self.base.as_u32() < self.size
    }
}

impl core::fmt::Debug for VmPool<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VmPool")
            .field("base", &self.base)
            .field("size", &self.size)
            .field("frames", &self.frames)
            .field("regions", &self.regions())
            .finish()
    }
}
