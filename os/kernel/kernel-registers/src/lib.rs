//! # Typed 32-bit x86 Control Registers
//!
//! Only the registers the paging code touches are modelled:
//!
//! - [`Cr0`](cr0::Cr0) for the paging enable bit,
//! - [`Cr2`](cr2::Cr2) for the faulting linear address,
//! - [`Cr3`](cr3::Cr3) for the physical base of the page directory.
//!
//! The raw `mov` accessors only exist with the `asm` feature on a 32-bit x86
//! target. Everywhere else the types are plain values, which lets a simulated
//! machine hold them.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cr0")]
pub mod cr0;

#[cfg(feature = "cr2")]
pub mod cr2;

#[cfg(feature = "cr3")]
pub mod cr3;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn store_unsafe(self);
}
