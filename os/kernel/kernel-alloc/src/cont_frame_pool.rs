//! # Contiguous Frame Pool
//!
//! A [`ContFramePool`] manages a contiguous range of physical frames and hands
//! out runs of consecutive frames. The allocation state lives in a
//! [`FrameBitmap`] that occupies exactly one physical frame, either the first
//! frame of the pool itself or a frame supplied by the caller (typically taken
//! from another pool).
//!
//! A run is stored as one [`HeadOfSequence`](FrameState::HeadOfSequence) frame
//! followed by zero or more [`Allocated`](FrameState::Allocated) frames, so its
//! length can be recovered from the head alone:
//!
//! ```text
//! index:  0   1   2   3   4   5   6   7   8
//! state:  H   H   A   A   H   A   A   A   F
//!         ^   ^-----------^---------------^
//!      bitmap  run of 3    run of 4
//! ```

use crate::frame_state::{FrameBitmap, FrameState};
use crate::phys_mapper::PhysMapper;
use kernel_memory_addresses::FrameNumber;
use log::{debug, info};

/// Reasons why a [`ContFramePool::get_frames`] call could not be served.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramePoolError {
    #[error("requested zero frames")]
    EmptyRequest,
    #[error("no run of {requested} free frames (free frames: {free})")]
    NoContiguousRun { requested: u32, free: u32 },
}

/// Allocator of contiguous physical frame runs backed by a two-bit bitmap.
pub struct ContFramePool<'m> {
    base: FrameNumber,
    n_frames: u32,
    info_frame: FrameNumber,
    free_frames: u32,
    bitmap: &'m mut FrameBitmap,
}

impl<'m> ContFramePool<'m> {
    /// Number of metadata frames a pool of `n_frames` frames needs.
    #[must_use]
    pub const fn needed_info_frames(n_frames: u32) -> u32 {
        n_frames.div_ceil(FrameBitmap::CAPACITY)
    }

    /// Create a pool over `n_frames` frames starting at `base`.
    ///
    /// With `info_frame == None` the bitmap is placed into `base`, which is then
    /// reported as allocated. A supplied `info_frame` is only marked in this
    /// pool when it lies inside the pool's range. Frame 0 is always reserved.
    ///
    /// # Panics
    /// If the pool is empty, wraps the 32-bit frame space, or needs more than one
    /// metadata frame.
    ///
    /// # Safety
    /// - The frames `base .. base + n_frames` and the metadata frame must not be
    ///   used by anything else for as long as the pool lives.
    /// - `mapper` must be able to reach the metadata frame.
    pub unsafe fn new<M: PhysMapper>(
        mapper: &M,
        base: FrameNumber,
        n_frames: u32,
        info_frame: Option<FrameNumber>,
    ) -> Self {
        assert!(n_frames > 0, "frame pool at {base} has no frames");
        assert!(
            base.checked_add(n_frames).is_some(),
            "frame pool at {base} with {n_frames} frames leaves the frame space"
        );
        assert!(
            Self::needed_info_frames(n_frames) == 1,
            "frame pool at {base} with {n_frames} frames needs more than one metadata frame"
        );

        let info_frame = info_frame.unwrap_or(base);

        // SAFETY: The caller hands the metadata frame over to this pool.
        let bitmap: &'m mut FrameBitmap = unsafe { mapper.phys_to_mut(info_frame.base()) };
        bitmap.clear();

        let mut pool = Self {
            base,
            n_frames,
            info_frame,
            free_frames: n_frames,
            bitmap,
        };

        if pool.contains(info_frame) {
            let index = pool.index_of(info_frame);
            pool.bitmap.set(index, FrameState::HeadOfSequence);
            pool.free_frames -= 1;
        }

        // Frame 0 doubles as "no frame" and is never handed out.
        if base.as_u32() == 0 && info_frame != base {
            pool.bitmap.set(0, FrameState::HeadOfSequence);
            pool.free_frames -= 1;
        }

        info!(
            "Frame pool created: frames {base}..{} ({n_frames} frames, metadata at {info_frame})",
            base + n_frames
        );
        pool
    }

    /// First frame of the pool.
    #[must_use]
    pub const fn base_frame(&self) -> FrameNumber {
        self.base
    }

    /// Number of frames managed by the pool, including its metadata frame.
    #[must_use]
    pub const fn frame_count(&self) -> u32 {
        self.n_frames
    }

    /// Frame holding the bitmap.
    #[must_use]
    pub const fn info_frame(&self) -> FrameNumber {
        self.info_frame
    }

    /// Number of frames currently in the [`Free`](FrameState::Free) state.
    #[must_use]
    pub const fn free_frames(&self) -> u32 {
        self.free_frames
    }

    /// Whether `frame` lies inside the pool's range.
    #[must_use]
    pub const fn contains(&self, frame: FrameNumber) -> bool {
        frame.as_u32() >= self.base.as_u32()
            && frame.as_u32() - self.base.as_u32() < self.n_frames
    }

    /// State of `frame`, or `None` if it lies outside the pool.
    #[must_use]
    pub const fn state_of(&self, frame: FrameNumber) -> Option<FrameState> {
        if self.contains(frame) {
            Some(self.bitmap.get(self.index_of(frame)))
        } else {
            None
        }
    }

    /// Allocate `n` consecutive frames, first fit.
    ///
    /// # Errors
    /// [`FramePoolError::EmptyRequest`] for `n == 0`, and
    /// [`FramePoolError::NoContiguousRun`] when no run of `n` free frames
    /// exists. The pool is unchanged in both cases.
    pub fn get_frames(&mut self, n: u32) -> Result<FrameNumber, FramePoolError> {
        if n == 0 {
            return Err(FramePoolError::EmptyRequest);
        }

        let no_run = FramePoolError::NoContiguousRun {
            requested: n,
            free: self.free_frames,
        };
        if n > self.free_frames {
            return Err(no_run);
        }

        let mut run_start = 0;
        let mut run_len = 0;
        for index in 0..self.n_frames {
            if self.bitmap.get(index) != FrameState::Free {
                run_len = 0;
                continue;
            }

            if run_len == 0 {
                run_start = index;
            }
            run_len += 1;

            if run_len == n {
                self.claim(run_start, n);
                let head = self.base + run_start;
                debug!("Allocated {n} frame(s) at {head}");
                return Ok(head);
            }
        }

        Err(no_run)
    }

    /// Release the run headed by `head` and return the number of frames freed.
    ///
    /// # Panics
    /// If `head` is outside the pool or not the head of a run.
    pub fn release(&mut self, head: FrameNumber) -> u32 {
        assert!(
            self.contains(head),
            "frame {head} released to a pool that does not own it"
        );

        let start = self.index_of(head);
        let state = self.bitmap.get(start);
        assert!(
            state == FrameState::HeadOfSequence,
            "frame {head} released but it is not the head of a sequence ({state:?})"
        );

        self.bitmap.set(start, FrameState::Free);
        let mut released = 1;
        let mut index = start + 1;
        while index < self.n_frames && self.bitmap.get(index) == FrameState::Allocated {
            self.bitmap.set(index, FrameState::Free);
            released += 1;
            index += 1;
        }

        self.free_frames += released;
        debug!("Released {released} frame(s) at {head}");
        released
    }

    /// Reserve `n` frames starting at `base` so they are never handed out.
    ///
    /// # Panics
    /// If the range is empty, leaves the pool, or contains a frame that is not free.
    pub fn mark_inaccessible(&mut self, base: FrameNumber, n: u32) {
        assert!(n > 0, "marking zero frames inaccessible at {base}");
        assert!(
            self.contains(base)
                && base.checked_add(n - 1).is_some_and(|last| self.contains(last)),
            "frames {base} (+{n}) are not inside pool {}..{}",
            self.base,
            self.base + self.n_frames
        );

        let start = self.index_of(base);
        for index in start..start + n {
            let state = self.bitmap.get(index);
            assert!(
                state == FrameState::Free,
                "frame {} marked inaccessible but is {state:?}",
                self.base + index
            );
        }

        self.claim(start, n);
        info!("Marked {n} frame(s) at {base} inaccessible");
    }

    /// Turn the free frames `start .. start + n` into one run.
    fn claim(&mut self, start: u32, n: u32) {
        self.bitmap.set(start, FrameState::HeadOfSequence);
        for index in start + 1..start + n {
            self.bitmap.set(index, FrameState::Allocated);
        }
        self.free_frames -= n;
    }

    const fn index_of(&self, frame: FrameNumber) -> u32 {
        frame.distance_from(self.base)
    }
}

impl core::fmt::Debug for ContFramePool<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ContFramePool")
            .field("base", &self.base)
            .field("n_frames", &self.n_frames)
            .field("info_frame", &self.info_frame)
            .field("free_frames", &self.free_frames)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestPhys;

    const BASE: FrameNumber = FrameNumber::new(512);

    fn pool(phys: &TestPhys, n_frames: u32, info: Option<FrameNumber>) -> ContFramePool<'_> {
        // SAFETY: The test RAM is exclusively owned by this pool.
        unsafe { ContFramePool::new(phys, BASE, n_frames, info) }
    }

    fn states(pool: &ContFramePool<'_>, from: u32, n: u32) -> Vec<FrameState> {
        (from..from + n)
            .map(|i| pool.state_of(BASE + i).expect("in range"))
            .collect()
    }

    #[test]
    fn needed_info_frames_rounds_up() {
        assert_eq!(ContFramePool::needed_info_frames(1), 1);
        assert_eq!(ContFramePool::needed_info_frames(16384), 1);
        assert_eq!(ContFramePool::needed_info_frames(16385), 2);
        assert_eq!(ContFramePool::needed_info_frames(7168), 1);
    }

    #[test]
    fn internal_metadata_occupies_first_frame() {
        let phys = TestPhys::new();
        let pool = pool(&phys, 1024, None);
        assert_eq!(pool.info_frame(), BASE);
        assert_eq!(pool.free_frames(), 1023);
        assert_eq!(pool.state_of(BASE), Some(FrameState::HeadOfSequence));
        assert_eq!(pool.state_of(BASE + 1), Some(FrameState::Free));
    }

    #[test]
    fn external_metadata_outside_pool_is_not_marked() {
        let phys = TestPhys::new();
        let pool = pool(&phys, 64, Some(FrameNumber::new(100)));
        assert_eq!(pool.free_frames(), 64);
        assert_eq!(pool.state_of(BASE), Some(FrameState::Free));
        assert_eq!(pool.state_of(FrameNumber::new(100)), None);
    }

    #[test]
    fn frame_zero_is_never_handed_out() {
        let phys = TestPhys::new();
        // SAFETY: The test RAM is exclusively owned by this pool.
        let mut pool = unsafe { ContFramePool::new(&phys, FrameNumber::new(0), 16, Some(FrameNumber::new(100))) };
        assert_eq!(pool.free_frames(), 15);
        assert_eq!(pool.state_of(FrameNumber::new(0)), Some(FrameState::HeadOfSequence));
        assert_eq!(pool.get_frames(1), Ok(FrameNumber::new(1)));
        assert_eq!(pool.get_frames(14), Ok(FrameNumber::new(2)));
        assert!(pool.get_frames(1).is_err());

        // SAFETY: As above.
        let internal = unsafe { ContFramePool::new(&phys, FrameNumber::new(0), 16, None) };
        assert_eq!(internal.free_frames(), 15);
    }

    #[test]
    fn construction_clears_stale_bitmap() {
        let phys = TestPhys::new();
        let pool = pool(&phys, 16384, None);
        assert_eq!(pool.free_frames(), 16383);
        assert!(states(&pool, 1, 16383).iter().all(|s| *s == FrameState::Free));
    }

    #[test]
    #[should_panic(expected = "more than one metadata frame")]
    fn oversized_pool_is_rejected() {
        let phys = TestPhys::new();
        let _ = pool(&phys, 16385, None);
    }

    #[test]
    fn allocate_and_release_scenario() {
        let phys = TestPhys::new();
        let mut pool = pool(&phys, 1024, None);

        let a = pool.get_frames(3).expect("3 frames");
        let b = pool.get_frames(5).expect("5 frames");
        assert_eq!(a, BASE + 1);
        assert_eq!(b, BASE + 4);
        assert_eq!(pool.free_frames(), 1023 - 8);
        assert_eq!(
            states(&pool, 0, 10),
            [
                FrameState::HeadOfSequence,
                FrameState::HeadOfSequence,
                FrameState::Allocated,
                FrameState::Allocated,
                FrameState::HeadOfSequence,
                FrameState::Allocated,
                FrameState::Allocated,
                FrameState::Allocated,
                FrameState::Allocated,
                FrameState::Free,
            ]
        );

        assert_eq!(pool.release(a), 3);
        assert_eq!(pool.free_frames(), 1023 - 5);
        assert!(states(&pool, 1, 3).iter().all(|s| *s == FrameState::Free));
        assert_eq!(pool.state_of(b), Some(FrameState::HeadOfSequence));

        // First fit reuses the hole.
        assert_eq!(pool.get_frames(2), Ok(BASE + 1));
    }

    #[test]
    fn runs_never_overlap() {
        let phys = TestPhys::new();
        let mut pool = pool(&phys, 256, None);

        let mut runs = Vec::new();
        for n in [1, 7, 2, 30, 4, 1, 16] {
            runs.push((pool.get_frames(n).expect("fits"), n));
        }
        pool.release(runs[1].0);
        runs.remove(1);
        runs.push((pool.get_frames(6).expect("fits"), 6));

        for (i, &(a, an)) in runs.iter().enumerate() {
            for &(b, bn) in &runs[i + 1..] {
                let disjoint = a + an <= b || b + bn <= a;
                assert!(disjoint, "{a}+{an} overlaps {b}+{bn}");
            }
        }
    }

    #[test]
    fn release_restores_free_count() {
        let phys = TestPhys::new();
        let mut pool = pool(&phys, 128, None);
        let before = pool.free_frames();

        let head = pool.get_frames(10).expect("fits");
        assert_eq!(pool.free_frames(), before - 10);
        assert_eq!(pool.release(head), 10);
        assert_eq!(pool.free_frames(), before);
        assert!(states(&pool, 1, 127).iter().all(|s| *s == FrameState::Free));
    }

    #[test]
    fn run_at_end_of_pool_releases_cleanly() {
        let phys = TestPhys::new();
        let mut pool = pool(&phys, 8, None);
        let head = pool.get_frames(7).expect("fits");
        assert_eq!(head, BASE + 1);
        assert_eq!(pool.free_frames(), 0);
        assert_eq!(pool.release(head), 7);
    }

    #[test]
    fn exhaustion_leaves_state_unchanged() {
        let phys = TestPhys::new();
        let mut pool = pool(&phys, 16, None);
        let _ = pool.get_frames(4).expect("fits");
        let _ = pool.get_frames(4).expect("fits");
        let snapshot = states(&pool, 0, 16);
        let free = pool.free_frames();

        assert_eq!(
            pool.get_frames(8),
            Err(FramePoolError::NoContiguousRun {
                requested: 8,
                free: 7
            })
        );
        assert_eq!(pool.get_frames(0), Err(FramePoolError::EmptyRequest));
        assert_eq!(pool.free_frames(), free);
        assert_eq!(states(&pool, 0, 16), snapshot);
    }

    #[test]
    fn fragmentation_is_reported_as_exhaustion() {
        let phys = TestPhys::new();
        let mut pool = pool(&phys, 9, None);
        let runs: Vec<_> = (0..4).map(|_| pool.get_frames(2).expect("fits")).collect();
        pool.release(runs[0]);
        pool.release(runs[2]);

        assert_eq!(pool.free_frames(), 4);
        assert!(matches!(
            pool.get_frames(3),
            Err(FramePoolError::NoContiguousRun { requested: 3, .. })
        ));
    }

    #[test]
    #[should_panic(expected = "not the head of a sequence")]
    fn releasing_inner_frame_is_fatal() {
        let phys = TestPhys::new();
        let mut pool = pool(&phys, 64, None);
        let head = pool.get_frames(4).expect("fits");
        pool.release(head + 1);
    }

    #[test]
    #[should_panic(expected = "not the head of a sequence")]
    fn releasing_free_frame_is_fatal() {
        let phys = TestPhys::new();
        let mut pool = pool(&phys, 64, None);
        pool.release(BASE + 10);
    }

    #[test]
    fn mark_inaccessible_reserves_exact_range() {
        let phys = TestPhys::new();
        let mut pool = pool(&phys, 64, None);
        pool.mark_inaccessible(BASE + 2, 4);

        assert_eq!(pool.free_frames(), 63 - 4);
        assert_eq!(pool.state_of(BASE + 2), Some(FrameState::HeadOfSequence));
        assert_eq!(pool.state_of(BASE + 5), Some(FrameState::Allocated));
        assert_eq!(pool.state_of(BASE + 6), Some(FrameState::Free));

        // Frame 1 is the only free frame before the hole.
        assert_eq!(pool.get_frames(2), Ok(BASE + 6));
        assert_eq!(pool.get_frames(1), Ok(BASE + 1));
    }

    #[test]
    #[should_panic(expected = "marked inaccessible but is")]
    fn mark_inaccessible_requires_free_frames() {
        let phys = TestPhys::new();
        let mut pool = pool(&phys, 64, None);
        pool.mark_inaccessible(BASE, 2);
    }

    #[test]
    #[should_panic(expected = "are not inside pool")]
    fn mark_inaccessible_requires_range_inside_pool() {
        let phys = TestPhys::new();
        let mut pool = pool(&phys, 64, None);
        pool.mark_inaccessible(BASE + 60, 8);
    }
}
