//! # Frame Pool Registry
//!
//! Frames are released by number alone: the caller does not need to know which
//! pool handed a frame out. The [`FramePoolRegistry`] owns every pool in the
//! system, hands out [`PoolHandle`]s for allocation, and routes releases to the
//! pool whose range contains the frame.

use crate::cont_frame_pool::{ContFramePool, FramePoolError};
use crate::phys_mapper::PhysMapper;
use kernel_memory_addresses::FrameNumber;
use log::info;

/// Maximum number of frame pools that can be registered.
pub const MAX_FRAME_POOLS: usize = 8;

/// Identifies a pool registered with a [`FramePoolRegistry`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PoolHandle(usize);

impl PoolHandle {
    /// Slot index of the pool inside its registry.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Owner of all frame pools.
pub struct FramePoolRegistry<'m> {
    pools: [Option<ContFramePool<'m>>; MAX_FRAME_POOLS],
}

impl core::fmt::Debug for FramePoolRegistry<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.pools.iter().flatten()).finish()
    }
}

impl Default for FramePoolRegistry<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'m> FramePoolRegistry<'m> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pools: [const { None }; MAX_FRAME_POOLS],
        }
    }

    /// Take ownership of `pool`.
    ///
    /// # Panics
    /// If the registry is full, or `pool` overlaps a registered pool.
    pub fn register(&mut self, pool: ContFramePool<'m>) -> PoolHandle {
        let start = pool.base_frame().as_u32();
        let end = start + pool.frame_count();
        for other in self.pools.iter().flatten() {
            let other_start = other.base_frame().as_u32();
            let other_end = other_start + other.frame_count();
            assert!(
                end <= other_start || other_end <= start,
                "frame pool at {} overlaps registered pool at {}",
                pool.base_frame(),
                other.base_frame()
            );
        }

        let Some(index) = self.pools.iter().position(Option::is_none) else {
            panic!("frame pool registry is full ({MAX_FRAME_POOLS} pools)");
        };
        info!(
            "Registered frame pool {index} at {} ({} frames)",
            pool.base_frame(),
            pool.frame_count()
        );
        self.pools[index] = Some(pool);
        PoolHandle(index)
    }

    /// Construct a pool and register it.
    ///
    /// # Panics
    /// As [`ContFramePool::new`] and [`register`](Self::register).
    ///
    /// # Safety
    /// As [`ContFramePool::new`].
    pub unsafe fn create_pool<M: PhysMapper>(
        &mut self,
        mapper: &M,
        base: FrameNumber,
        n_frames: u32,
        info_frame: Option<FrameNumber>,
    ) -> PoolHandle {
        // SAFETY: Forwarded to the caller.
        let pool = unsafe { ContFramePool::new(mapper, base, n_frames, info_frame) };
        self.register(pool)
    }

    /// The pool behind `handle`.
    ///
    /// # Panics
    /// If `handle` does not belong to this registry.
    #[must_use]
    pub fn pool(&self, handle: PoolHandle) -> &ContFramePool<'m> {
        match self.pools.get(handle.index()) {
            Some(Some(pool)) => pool,
            _ => panic!("unknown frame pool handle {handle:?}"),
        }
    }

    /// The pool behind `handle`, mutably.
    ///
    /// # Panics
    /// If `handle` does not belong to this registry.
    pub fn pool_mut(&mut self, handle: PoolHandle) -> &mut ContFramePool<'m> {
        match self.pools.get_mut(handle.index()) {
            Some(Some(pool)) => pool,
            _ => panic!("unknown frame pool handle {handle:?}"),
        }
    }

    /// Allocate `n` consecutive frames from the pool behind `handle`.
    ///
    /// # Errors
    /// See [`ContFramePool::get_frames`].
    pub fn get_frames(&mut self, handle: PoolHandle, n: u32) -> Result<FrameNumber, FramePoolError> {
        self.pool_mut(handle).get_frames(n)
    }

    /// Release the run headed by `head`, whichever pool owns it.
    ///
    /// # Panics
    /// If no registered pool owns `head`, or `head` is not the head of a run.
    pub fn release_frames(&mut self, head: FrameNumber) -> u32 {
        let Some(pool) = self.pools.iter_mut().flatten().find(|p| p.contains(head)) else {
            panic!("frame {head} released but no registered pool owns it");
        };
        pool.release(head)
    }

    /// Reserve `n` frames starting at `base` in the pool behind `handle`.
    ///
    /// # Panics
    /// See [`ContFramePool::mark_inaccessible`].
    pub fn mark_inaccessible(&mut self, handle: PoolHandle, base: FrameNumber, n: u32) {
        self.pool_mut(handle).mark_inaccessible(base, n);
    }

    /// Handle of the pool whose range contains `frame`.
    #[must_use]
    pub fn owner_of(&self, frame: FrameNumber) -> Option<PoolHandle> {
        self.pools
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|p| p.contains(frame)))
            .map(PoolHandle)
    }

    /// Total number of free frames across all pools.
    #[must_use]
    pub fn free_frames(&self) -> u32 {
        self.pools.iter().flatten().map(ContFramePool::free_frames).sum()
    }
}
