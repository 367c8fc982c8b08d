//! # Physical Frame Allocation
//!
//! This crate manages physical memory in units of 4 KiB frames. It is the
//! lowest layer of the memory manager: the page table code draws directory,
//! table and page frames from it, and the virtual memory pools return frames to
//! it when regions are released.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               Frame Pool Registry                   │
//! │    • Owns every pool, hands out pool handles        │
//! │    • Routes releases by frame number                │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │            Contiguous Frame Pool                    │
//! │    • First-fit runs of consecutive frames           │
//! │    • Two bits of state per frame                    │
//! │    • Bitmap stored in one physical frame            │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              Physical Mapper                        │
//! │    • Physical address to usable reference           │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! ### Frame States ([`frame_state`])
//! The packed two-bit encoding of free, allocated and head-of-sequence frames.
//!
//! ### Contiguous Frame Pool ([`cont_frame_pool`])
//! A pool over a fixed frame range. Runs are allocated first fit and released
//! from their head frame. Frames can be reserved permanently, e.g. to cover a
//! hole in physical memory.
//!
//! ### Registry ([`registry`])
//! Multiple pools coexist (kernel and process pools at boot). Allocation goes
//! through a [`PoolHandle`], release only needs the frame number.
//!
//! ### Physical Mapper ([`phys_mapper`])
//! How the pools reach their bitmap frames.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kernel_alloc::{FramePoolRegistry, IdentityPhysMapper};
//! use kernel_memory_addresses::FrameNumber;
//!
//! let mut frames = FramePoolRegistry::new();
//! // SAFETY: Paging is off and frames 512..1024 are unused.
//! let kernel = unsafe {
//!     frames.create_pool(&IdentityPhysMapper, FrameNumber::new(512), 512, None)
//! };
//!
//! let run = frames.get_frames(kernel, 4).expect("kernel pool exhausted");
//! frames.release_frames(run);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod cont_frame_pool;
pub mod frame_state;
pub mod phys_mapper;
pub mod registry;

pub use crate::cont_frame_pool::{ContFramePool, FramePoolError};
pub use crate::frame_state::{FrameBitmap, FrameState};
pub use crate::phys_mapper::{IdentityPhysMapper, PhysMapper};
pub use crate::registry::{FramePoolRegistry, MAX_FRAME_POOLS, PoolHandle};
