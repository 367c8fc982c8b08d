//! # Simulated Machine
//!
//! A hosted stand-in for the processor and physical memory, used by the tests
//! and available to other crates through the `sim` feature.
//!
//! - **RAM** is sparse: a frame comes into existence, filled with garbage, on
//!   first access, so any structure the paging code forgets to initialize shows up.
//! - **CR0, CR2, CR3** are plain values.
//! - **Translation** walks the two-level tables like the hardware does,
//!   including through the recursive directory entry.
//! - **TLB**: successful translations are cached per page and dropped only when
//!   CR3 is written. Stale mappings therefore survive until the page table is
//!   reloaded, as on the real machine.

extern crate alloc;

use crate::mmu::Mmu;
use crate::page_table::{PageFaultError, PageTable};
use crate::tables::{PdEntry, PtEntry, split_indices};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use core::cell::{Cell, RefCell, UnsafeCell};
use kernel_alloc::{FramePoolRegistry, PhysMapper};
use kernel_memory_addresses::{FrameNumber, PhysicalAddress, VirtualAddress};
use kernel_registers::cr0::Cr0;
use kernel_registers::cr2::Cr2;
use kernel_registers::cr3::Cr3;

/// Byte pattern of never-written simulated RAM.
pub const GARBAGE: u8 = 0xA5;

#[repr(C, align(4096))]
struct SimFrame(UnsafeCell<[u8; 4096]>);

/// A uniprocessor with sparse physical memory and a paging unit.
pub struct SimulatedMachine {
    ram: RefCell<BTreeMap<u32, Box<SimFrame>>>,
    tlb: RefCell<BTreeMap<u32, FrameNumber>>,
    cr0: Cell<Cr0>,
    cr2: Cell<Cr2>,
    cr3: Cell<Cr3>,
    faults: Cell<u32>,
}

impl Default for SimulatedMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedMachine {
    /// A machine with paging disabled and no RAM touched yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ram: RefCell::new(BTreeMap::new()),
            tlb: RefCell::new(BTreeMap::new()),
            cr0: Cell::new(Cr0::new().with_pe_protection_enable(true)),
            cr2: Cell::new(Cr2::default()),
            cr3: Cell::new(Cr3::new()),
            faults: Cell::new(0),
        }
    }

    fn frame_ptr(&self, frame: FrameNumber) -> *mut u8 {
        let mut ram = self.ram.borrow_mut();
        let slot = ram
            .entry(frame.as_u32())
            .or_insert_with(|| Box::new(SimFrame(UnsafeCell::new([GARBAGE; 4096]))));
        slot.0.get().cast::<u8>()
    }

    fn phys_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        self.frame_ptr(pa.frame())
            .wrapping_add(pa.frame_offset() as usize)
    }

    /// Read a 32-bit word of physical memory.
    #[must_use]
    pub fn read_phys_u32(&self, pa: PhysicalAddress) -> u32 {
        assert_eq!(pa.as_u32() % 4, 0, "unaligned physical read at {pa}");
        // SAFETY: The frame is owned by `self.ram` and never freed; the offset is aligned.
        unsafe { self.phys_ptr(pa).cast::<u32>().read() }
    }

    /// Write a 32-bit word of physical memory.
    pub fn write_phys_u32(&self, pa: PhysicalAddress, value: u32) {
        assert_eq!(pa.as_u32() % 4, 0, "unaligned physical write at {pa}");
        // SAFETY: As for `read_phys_u32`.
        unsafe { self.phys_ptr(pa).cast::<u32>().write(value) }
    }

    /// Number of frames that have been touched.
    #[must_use]
    pub fn touched_frames(&self) -> usize {
        self.ram.borrow().len()
    }

    /// Translate `va` like the paging unit would, consulting the TLB first.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        if !self.cr0.get().pg_paging() {
            return Some(PhysicalAddress::new(va.as_u32()));
        }

        let vpn = va.page().as_u32();
        if let Some(frame) = self.tlb.borrow().get(&vpn) {
            return Some(frame.base() + va.page_offset());
        }

        let (pdi, pti) = split_indices(va);
        let directory = self.cr3.get().directory_frame();
        let pde = PdEntry::from_raw(self.read_phys_u32(directory.base() + pdi.as_u32() * 4));
        let table = pde.table_frame()?;

        #[allow(clippy::cast_possible_truncation)]
        let pte_offset = (pti.as_usize() * 4) as u32;
        let pte = PtEntry::from_raw(self.read_phys_u32(table.base() + pte_offset));
        let frame = pte.page_frame()?;

        self.tlb.borrow_mut().insert(vpn, frame);
        Some(frame.base() + va.page_offset())
    }

    /// Latch `va` in CR2 as the hardware does on a page fault.
    pub fn raise_fault(&self, va: VirtualAddress) {
        self.cr2.set(Cr2::from_bits(va.as_u32()));
        self.faults.set(self.faults.get() + 1);
    }

    /// Number of page faults raised so far.
    #[must_use]
    pub fn fault_count(&self) -> u32 {
        self.faults.get()
    }

    /// Access `va`, running the fault handler until the access succeeds.
    ///
    /// Returns the number of faults the access raised.
    ///
    /// # Errors
    /// Whatever the fault handler reports.
    ///
    /// # Panics
    /// If the handler reports success but the address still does not translate.
    pub fn touch(
        &self,
        va: VirtualAddress,
        page_table: &mut PageTable,
        frames: &mut FramePoolRegistry<'_>,
    ) -> Result<u32, PageFaultError> {
        let mut faults = 0;
        while self.translate(va).is_none() {
            assert!(faults == 0, "fault at {va} not resolved by the handler");
            self.raise_fault(va);
            faults += 1;
            page_table.handle_fault(frames, self)?;
        }
        Ok(faults)
    }

    /// Write a word through virtual memory, faulting pages in as needed.
    ///
    /// # Errors
    /// Whatever the fault handler reports.
    pub fn write_u32(
        &self,
        va: VirtualAddress,
        value: u32,
        page_table: &mut PageTable,
        frames: &mut FramePoolRegistry<'_>,
    ) -> Result<(), PageFaultError> {
        self.touch(va, page_table, frames)?;
        let pa = self.resolved(va);
        self.write_phys_u32(pa, value);
        Ok(())
    }

    /// Read a word through virtual memory, faulting pages in as needed.
    ///
    /// # Errors
    /// Whatever the fault handler reports.
    pub fn read_u32(
        &self,
        va: VirtualAddress,
        page_table: &mut PageTable,
        frames: &mut FramePoolRegistry<'_>,
    ) -> Result<u32, PageFaultError> {
        self.touch(va, page_table, frames)?;
        Ok(self.read_phys_u32(self.resolved(va)))
    }

    fn resolved(&self, va: VirtualAddress) -> PhysicalAddress {
        self.translate(va)
            .unwrap_or_else(|| panic!("simulated access to unmapped address {va}"))
    }
}

impl PhysMapper for SimulatedMachine {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        // SAFETY: Frames live as long as the machine; the caller guarantees
        // `T` matches the bytes at `pa`.
        unsafe { &mut *self.phys_ptr(pa).cast::<T>() }
    }
}

impl Mmu for SimulatedMachine {
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T {
        let pa = self.resolved(va);
        // SAFETY: Forwarded to the caller.
        unsafe { self.phys_to_mut(pa) }
    }

    fn fault_address(&self) -> VirtualAddress {
        self.cr2.get().fault_address()
    }

    unsafe fn load_page_directory(&self, cr3: Cr3) {
        self.cr3.set(cr3);
        self.tlb.borrow_mut().clear();
    }

    fn page_directory(&self) -> Cr3 {
        self.cr3.get()
    }

    unsafe fn enable_paging(&self) {
        self.cr0.set(self.cr0.get().with_pg_paging(true));
    }

    fn paging_enabled(&self) -> bool {
        self.cr0.get().pg_paging()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recursive::DIRECTORY_ADDRESS;

    #[test]
    fn fresh_ram_is_garbage() {
        let sim = SimulatedMachine::new();
        assert_eq!(sim.read_phys_u32(PhysicalAddress::new(0x5000)), 0xA5A5_A5A5);
        sim.write_phys_u32(PhysicalAddress::new(0x5004), 7);
        assert_eq!(sim.read_phys_u32(PhysicalAddress::new(0x5004)), 7);
        assert_eq!(sim.touched_frames(), 1);
    }

    #[test]
    fn paging_off_is_identity() {
        let sim = SimulatedMachine::new();
        assert_eq!(
            sim.translate(VirtualAddress::new(0x1234_5678)),
            Some(PhysicalAddress::new(0x1234_5678))
        );
    }

    #[test]
    fn walk_honours_recursive_entry() {
        let sim = SimulatedMachine::new();
        let dir = FrameNumber::new(0x400);
        for i in 0..1024 {
            sim.write_phys_u32(dir.base() + i * 4, 0);
        }
        sim.write_phys_u32(dir.base() + 1023 * 4, PdEntry::make_table(dir).raw());

        // SAFETY: Simulated registers.
        unsafe {
            sim.load_page_directory(Cr3::from_directory_frame(dir, false, false));
            sim.enable_paging();
        }

        assert_eq!(sim.translate(DIRECTORY_ADDRESS), Some(dir.base()));
        assert_eq!(sim.translate(VirtualAddress::new(0x1000)), None);
    }

    #[test]
    fn tlb_keeps_stale_translation_until_reload() {
        let sim = SimulatedMachine::new();
        let dir = FrameNumber::new(0x400);
        let table = FrameNumber::new(0x401);
        for i in 0..1024 {
            sim.write_phys_u32(dir.base() + i * 4, 0);
            sim.write_phys_u32(table.base() + i * 4, 0);
        }
        sim.write_phys_u32(dir.base(), PdEntry::make_table(table).raw());
        sim.write_phys_u32(table.base() + 4, PtEntry::make_4k(FrameNumber::new(0x999)).raw());

        let cr3 = Cr3::from_directory_frame(dir, false, false);
        // SAFETY: Simulated registers.
        unsafe {
            sim.load_page_directory(cr3);
            sim.enable_paging();
        }

        let va = VirtualAddress::new(0x1010);
        assert_eq!(sim.translate(va), Some(PhysicalAddress::new(0x0099_9010)));

        sim.write_phys_u32(table.base() + 4, PtEntry::reserved_unmapped().raw());
        assert!(sim.translate(va).is_some(), "cached until CR3 reload");

        // SAFETY: Simulated registers.
        unsafe { sim.load_page_directory(cr3) };
        assert_eq!(sim.translate(va), None);
    }
}
