//! # Two-Bit Frame States
//!
//! Every frame managed by a [`ContFramePool`](crate::ContFramePool) is described
//! by two bits, four frames to a byte:
//!
//! | Bits | State |
//! |------|-------|
//! | `00` | [`FrameState::Free`] |
//! | `01` | [`FrameState::Allocated`] |
//! | `11` | [`FrameState::HeadOfSequence`] |
//! | `10` | never written; decoding it is fatal |
//!
//! Frame `i` of a pool lives in byte `i / 4`, slot `i % 4`, where slot 0 is the
//! least significant bit pair.

use bitfield_struct::bitfield;

/// Number of frames described by one byte of the bitmap.
pub const FRAMES_PER_BYTE: u32 = 4;

/// Number of frames described by one 4 KiB bitmap frame.
pub const FRAMES_PER_INFO_FRAME: u32 = 4096 * FRAMES_PER_BYTE;

/// Allocation state of a single physical frame.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FrameState {
    /// Not in use.
    Free = 0b00,
    /// Part of a run, but not its first frame.
    Allocated = 0b01,
    /// First frame of an allocated run.
    HeadOfSequence = 0b11,
}

impl FrameState {
    /// Decode a two-bit pattern.
    ///
    /// # Panics
    /// On the unused pattern `0b10`, which indicates a corrupted bitmap.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::Free,
            0b01 => Self::Allocated,
            0b11 => Self::HeadOfSequence,
            _ => panic!("corrupted frame bitmap: invalid state pattern 0b10"),
        }
    }

    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }
}

/// Four frame states packed into one bitmap byte.
#[bitfield(u8)]
pub struct PackedFrameStates {
    /// Frame `4k + 0`.
    #[bits(2, default = FrameState::Free)]
    pub slot0: FrameState,
    /// Frame `4k + 1`.
    #[bits(2, default = FrameState::Free)]
    pub slot1: FrameState,
    /// Frame `4k + 2`.
    #[bits(2, default = FrameState::Free)]
    pub slot2: FrameState,
    /// Frame `4k + 3`.
    #[bits(2, default = FrameState::Free)]
    pub slot3: FrameState,
}

impl PackedFrameStates {
    /// The state stored in `slot` (`0..4`).
    #[must_use]
    pub const fn state(self, slot: u32) -> FrameState {
        match slot {
            0 => self.slot0(),
            1 => self.slot1(),
            2 => self.slot2(),
            3 => self.slot3(),
            _ => panic!("frame state slot out of range"),
        }
    }

    /// A copy with `slot` (`0..4`) replaced by `state`; the other slots are kept.
    #[must_use]
    pub const fn with_state(self, slot: u32, state: FrameState) -> Self {
        match slot {
            0 => self.with_slot0(state),
            1 => self.with_slot1(state),
            2 => self.with_slot2(state),
            3 => self.with_slot3(state),
            _ => panic!("frame state slot out of range"),
        }
    }
}

/// The bitmap of one pool, exactly filling one physical frame.
#[repr(C, align(4096))]
pub struct FrameBitmap {
    bytes: [u8; 4096],
}

const _: () = {
    assert!(size_of::<FrameBitmap>() == 4096);
};

impl FrameBitmap {
    /// Number of frames one bitmap can describe.
    pub const CAPACITY: u32 = FRAMES_PER_INFO_FRAME;

    /// Mark every described frame as [`FrameState::Free`].
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    /// State of the frame at pool-relative `index`.
    #[must_use]
    pub const fn get(&self, index: u32) -> FrameState {
        let byte = self.bytes[(index / FRAMES_PER_BYTE) as usize];
        PackedFrameStates::from_bits(byte).state(index % FRAMES_PER_BYTE)
    }

    /// Update the state of the frame at pool-relative `index`.
    pub const fn set(&mut self, index: u32, state: FrameState) {
        let byte = &mut self.bytes[(index / FRAMES_PER_BYTE) as usize];
        *byte = PackedFrameStates::from_bits(*byte)
            .with_state(index % FRAMES_PER_BYTE, state)
            .into_bits();
    }
}
