//! # Memory Bootstrap
//!
//! The order in which the kernel brings up memory management:
//!
//! 1. Create the kernel frame pool. It keeps its own bitmap in its first frame.
//! 2. Take one frame from the kernel pool for the process pool's bitmap and
//!    create the process pool.
//! 3. Mark the memory hole inaccessible in the process pool.
//! 4. Record the paging configuration, build the first page table, load it and
//!    turn paging on.
//!
//! Virtual memory pools are created afterwards with
//! [`BootedMemory::create_vm_pool`].

use crate::mmu::Mmu;
use crate::page_table::PageTable;
use crate::paging::{PagingConfig, PagingError, TableLayout, init_paging};
use crate::vm_pool::{VmPool, VmPoolError};
use kernel_alloc::{ContFramePool, FramePoolRegistry, PoolHandle};
use kernel_info::memory;
use kernel_memory_addresses::{FrameNumber, VirtualAddress};
use log::info;

/// Physical layout and paging parameters used at boot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryLayout {
    pub kernel_pool_start: FrameNumber,
    pub kernel_pool_frames: u32,
    pub process_pool_start: FrameNumber,
    pub process_pool_frames: u32,
    /// Frames that exist inside the process pool's range but must never be
    /// handed out. `None` if the machine has no hole.
    pub memory_hole: Option<(FrameNumber, u32)>,
    pub shared_size: u32,
    pub layout: TableLayout,
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self {
            kernel_pool_start: memory::KERNEL_POOL_START_FRAME,
            kernel_pool_frames: memory::KERNEL_POOL_SIZE,
            process_pool_start: memory::PROCESS_POOL_START_FRAME,
            process_pool_frames: memory::PROCESS_POOL_SIZE,
            memory_hole: Some((memory::MEM_HOLE_START_FRAME, memory::MEM_HOLE_SIZE)),
            shared_size: memory::SHARED_SIZE,
            layout: TableLayout::Recursive,
        }
    }
}

/// Memory management state after [`bootstrap`].
#[derive(Debug)]
pub struct BootedMemory<'m> {
    pub frames: FramePoolRegistry<'m>,
    pub kernel_pool: PoolHandle,
    pub process_pool: PoolHandle,
    pub config: PagingConfig,
    pub page_table: PageTable,
}

/// Bring up frame pools and paging.
///
/// # Errors
/// [`PagingError::InvalidSharedSize`] for a malformed shared region and
/// [`PagingError::OutOfFrames`] if the pools cannot hold the first page table.
///
/// # Panics
/// If paging is already enabled, or the layout's pools are malformed (see
/// [`ContFramePool::new`]).
///
/// # Safety
/// - Paging must be off, so physical addresses are usable as-is.
/// - The frames described by `layout` must be unused RAM owned by the caller.
/// - The shared region must cover the running kernel, which keeps running at
///   the same addresses once paging is on.
pub unsafe fn bootstrap<'m, M: Mmu>(
    mmu: &M,
    layout: &MemoryLayout,
) -> Result<BootedMemory<'m>, PagingError> {
    assert!(!mmu.paging_enabled(), "memory bootstrap with paging already enabled");

    let mut frames = FramePoolRegistry::new();

    // SAFETY: Paging is off and the caller hands us the pool's frames.
    let kernel_pool = unsafe {
        frames.create_pool(mmu, layout.kernel_pool_start, layout.kernel_pool_frames, None)
    };

    let info_frames = ContFramePool::needed_info_frames(layout.process_pool_frames);
    let process_info = frames.get_frames(kernel_pool, info_frames)?;

    // SAFETY: As above; the bitmap frame was just taken from the kernel pool.
    let process_pool = unsafe {
        frames.create_pool(
            mmu,
            layout.process_pool_start,
            layout.process_pool_frames,
            Some(process_info),
        )
    };

    if let Some((start, n)) = layout.memory_hole {
        frames.mark_inaccessible(process_pool, start, n);
    }

    let config = init_paging(kernel_pool, process_pool, layout.shared_size)?.with_layout(layout.layout);
    let page_table = PageTable::new(&config, &mut frames, mmu)?;

    // SAFETY: The shared region identity maps the running kernel (caller contract).
    unsafe {
        page_table.load(mmu);
        page_table.enable_paging(mmu);
    }

    info!(
        "Memory management up: {} free frames, shared region {:#x} bytes",
        frames.free_frames(),
        config.shared_size()
    );
    Ok(BootedMemory {
        frames,
        kernel_pool,
        process_pool,
        config,
        page_table,
    })
}

impl<'m> BootedMemory<'m> {
    /// Create a virtual memory pool in the boot address space, backed by the
    /// process pool.
    ///
    /// # Errors
    /// As [`VmPool::new`].
    ///
    /// # Panics
    /// As [`VmPool::new`].
    pub fn create_vm_pool<M: Mmu>(
        &mut self,
        base: VirtualAddress,
        size: u32,
        mmu: &M,
    ) -> Result<VmPool<'m>, VmPoolError> {
        VmPool::new(
            base,
            size,
            self.process_pool,
            &mut self.page_table,
            &mut self.frames,
            mmu,
        )
    }
}
