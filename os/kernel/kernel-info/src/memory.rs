//! # Memory Layout

use kernel_memory_addresses::FrameNumber;

/// Bytes covered by a single page table (1024 entries of 4 KiB).
pub const TABLE_SPAN: u32 = 4 * 1024 * 1024;

/// First frame managed by the kernel frame pool.
pub const KERNEL_POOL_START_FRAME: FrameNumber = FrameNumber::new((2 * 1024 * 1024) / 4096);

/// Number of frames in the kernel frame pool.
pub const KERNEL_POOL_SIZE: u32 = (2 * 1024 * 1024) / 4096;

/// First frame managed by the process frame pool.
pub const PROCESS_POOL_START_FRAME: FrameNumber = FrameNumber::new((4 * 1024 * 1024) / 4096);

/// Number of frames in the process frame pool.
pub const PROCESS_POOL_SIZE: u32 = (28 * 1024 * 1024) / 4096;

/// First frame of the hole in physical memory at 15 MiB.
pub const MEM_HOLE_START_FRAME: FrameNumber = FrameNumber::new((15 * 1024 * 1024) / 4096);

/// Number of frames in the memory hole.
pub const MEM_HOLE_SIZE: u32 = (1024 * 1024) / 4096;

/// Size of the region identity mapped into every address space.
pub const SHARED_SIZE: u32 = TABLE_SPAN;

/// Base of the virtual memory pool for code.
pub const CODE_POOL_BASE: u32 = 512 * 1024 * 1024;

/// Size of the virtual memory pool for code.
pub const CODE_POOL_SIZE: u32 = 256 * 1024 * 1024;

/// Base of the virtual memory pool for heap data.
pub const HEAP_POOL_BASE: u32 = 1024 * 1024 * 1024;

/// Size of the virtual memory pool for heap data.
pub const HEAP_POOL_SIZE: u32 = 256 * 1024 * 1024;

const _: () = {
    assert!(SHARED_SIZE.is_multiple_of(TABLE_SPAN));
    assert!(SHARED_SIZE != 0);

    // Kernel pool lies inside the shared region and ends where the process pool begins.
    assert!((KERNEL_POOL_START_FRAME.as_u32() + KERNEL_POOL_SIZE) * 4096 <= SHARED_SIZE);
    assert!(KERNEL_POOL_START_FRAME.as_u32() + KERNEL_POOL_SIZE <= PROCESS_POOL_START_FRAME.as_u32());

    // The hole must lie inside the process pool so it can be marked there.
    assert!(MEM_HOLE_START_FRAME.as_u32() >= PROCESS_POOL_START_FRAME.as_u32());
    assert!(
        MEM_HOLE_START_FRAME.as_u32() + MEM_HOLE_SIZE
            <= PROCESS_POOL_START_FRAME.as_u32() + PROCESS_POOL_SIZE
    );

    // VM pools are page aligned, disjoint and clear of the shared region.
    assert!(CODE_POOL_BASE.is_multiple_of(4096) && HEAP_POOL_BASE.is_multiple_of(4096));
    assert!(CODE_POOL_BASE >= SHARED_SIZE);
    assert!(CODE_POOL_BASE + CODE_POOL_SIZE <= HEAP_POOL_BASE);
    assert!(HEAP_POOL_BASE + HEAP_POOL_SIZE <= 0xFFC0_0000);
};
