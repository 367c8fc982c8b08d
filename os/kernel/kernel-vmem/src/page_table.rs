//! # Page Table
//!
//! A [`PageTable`] owns one page directory and the page tables it references.
//! Apart from the shared region, which is identity mapped when the directory is
//! built, nothing is mapped up front: every first access to a page raises a
//! page fault, and [`PageTable::handle_fault`] installs the missing table
//! and page on demand.
//!
//! ## Fault Resolution
//!
//! ```text
//!  CR2 ──► directory index ──► PDE absent? ── yes ──► allocate table frame,
//!                │                                    fill with reserved markers
//!                ▼
//!          table index ──► PTE present? ── yes ──► protection fault (fatal)
//!                │
//!                ▼
//!          allocate page frame, map present + writable
//! ```
//!
//! ## Table Access
//!
//! In the [`Recursive`](TableLayout::Recursive) layout the directory is reached
//! at [`DIRECTORY_ADDRESS`](crate::recursive::DIRECTORY_ADDRESS) and every table
//! through [`PageTable::pte_address`]. Both only work while this directory is
//! loaded and paging is on. In the [`IdentityMapped`](TableLayout::IdentityMapped)
//! layout the structures are reached through their physical addresses.

use crate::mmu::Mmu;
use crate::paging::{PagingConfig, PagingError, TableLayout};
use crate::recursive;
use crate::tables::{
    DirectoryIndex, ENTRIES_PER_TABLE, LeafTable, PageDirectory, PdEntry, PtEntry, TableIndex,
    split_indices,
};
use kernel_alloc::{FramePoolError, FramePoolRegistry, PoolHandle};
use kernel_memory_addresses::{FrameNumber, PageNumber, PhysicalAddress, VirtualAddress};
use kernel_registers::cr3::Cr3;
use log::{debug, info, trace, warn};

/// Maximum number of virtual memory pools one page table can track.
pub const MAX_VM_POOLS: usize = 8;

#[allow(clippy::cast_possible_truncation)]
const ENTRIES: u32 = ENTRIES_PER_TABLE as u32;

/// Errors reported by [`PageTable::handle_fault`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageFaultError {
    #[error("page fault at {0} outside the shared region and every registered pool")]
    Illegitimate(VirtualAddress),
    #[error("no frame available to resolve page fault at {address}")]
    OutOfFrames {
        address: VirtualAddress,
        #[source]
        source: FramePoolError,
    },
}

/// A virtual memory pool as seen by the page table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VmPoolRegistration {
    /// First address of the pool.
    pub base: VirtualAddress,
    /// Size of the pool in bytes.
    pub size: u32,
    /// Frame pool that backs pages of this range.
    pub frames: PoolHandle,
}

impl VmPoolRegistration {
    /// Whether `address` lies inside the pool.
    #[must_use]
    pub const fn contains(&self, address: VirtualAddress) -> bool {
        address.as_u32() >= self.base.as_u32() && address.as_u32() - self.base.as_u32() < self.size
    }

    const fn end(&self) -> u64 {
        self.base.as_u32() as u64 + self.size as u64
    }

    const fn overlaps(&self, other: &Self) -> bool {
        (self.base.as_u32() as u64) < other.end() && (other.base.as_u32() as u64) < self.end()
    }
}

/// Outcome of a resolved page fault.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FaultResolution {
    /// The page that is now mapped.
    pub page: PageNumber,
    /// The frame backing it.
    pub frame: FrameNumber,
    /// The frame of the page table created on the way, if any.
    pub new_table: Option<FrameNumber>,
}

/// One address space: a page directory and the tables it references.
#[derive(Debug)]
pub struct PageTable {
    config: PagingConfig,
    directory: FrameNumber,
    vm_pools: [Option<VmPoolRegistration>; MAX_VM_POOLS],
}

impl PageTable {
    /// Build a new address space.
    ///
    /// Allocates the directory and the shared region's tables from the
    /// configuration's table pool, identity maps the shared region, and, in the
    /// recursive layout, points the last directory entry at the directory.
    ///
    /// # Errors
    /// [`PagingError::OutOfFrames`] if the table pool cannot supply the frames.
    /// Frames taken before the failure are returned.
    pub fn new<M: Mmu>(
        config: &PagingConfig,
        frames: &mut FramePoolRegistry<'_>,
        mmu: &M,
    ) -> Result<Self, PagingError> {
        let pool = config.table_pool();
        let directory = frames.get_frames(pool, 1)?;

        // SAFETY: The frame was just handed to us by the frame pool, and the
        // mapper reaches table-pool frames while the directory is being built.
        let pd: &mut PageDirectory = unsafe { mmu.phys_to_mut(directory.base()) };
        pd.clear();

        for t in 0..config.shared_tables() {
            let table_frame = match frames.get_frames(pool, 1) {
                Ok(frame) => frame,
                Err(e) => {
                    for done in 0..t {
                        let index = DirectoryIndex::new(index_u16(done));
                        if let Some(frame) = pd.get(index).table_frame() {
                            frames.release_frames(frame);
                        }
                    }
                    frames.release_frames(directory);
                    return Err(e.into());
                }
            };

            // SAFETY: As for the directory.
            let table: &mut LeafTable = unsafe { mmu.phys_to_mut(table_frame.base()) };
            for i in 0..ENTRIES {
                let frame = FrameNumber::new(t * ENTRIES + i);
                table.set(TableIndex::new(index_u16(i)), PtEntry::make_4k(frame));
            }
            pd.set(DirectoryIndex::new(index_u16(t)), PdEntry::make_table(table_frame));
        }

        if config.layout() == TableLayout::Recursive {
            pd.set(DirectoryIndex::LAST, PdEntry::make_table(directory));
        }

        info!(
            "Constructed page table: directory at {directory}, {} shared table(s), {:?} layout",
            config.shared_tables(),
            config.layout()
        );
        Ok(Self {
            config: *config,
            directory,
            vm_pools: [None; MAX_VM_POOLS],
        })
    }

    /// Frame holding the page directory.
    #[must_use]
    pub const fn directory_frame(&self) -> FrameNumber {
        self.directory
    }

    #[must_use]
    pub const fn config(&self) -> &PagingConfig {
        &self.config
    }

    /// Virtual address through which the table for directory entry `pdi` is
    /// visible in the recursive layout.
    #[must_use]
    pub const fn pte_address(pdi: DirectoryIndex) -> VirtualAddress {
        recursive::page_table_address(pdi)
    }

    /// Install this directory in CR3, flushing the TLB.
    ///
    /// # Safety
    /// The code and data in use must stay mapped in this address space. The
    /// shared region guarantees this for the kernel.
    pub unsafe fn load<M: Mmu>(&self, mmu: &M) {
        // SAFETY: Forwarded to the caller.
        unsafe { mmu.load_page_directory(Cr3::from_directory_frame(self.directory, false, false)) };
        info!("Loaded page table with directory at {}", self.directory);
    }

    /// Turn paging on.
    ///
    /// # Panics
    /// If this directory has not been loaded.
    ///
    /// # Safety
    /// As [`Mmu::enable_paging`].
    pub unsafe fn enable_paging<M: Mmu>(&self, mmu: &M) {
        assert!(
            self.is_loaded(mmu),
            "paging enabled before page directory {} was loaded",
            self.directory
        );
        // SAFETY: Forwarded to the caller.
        unsafe { mmu.enable_paging() };
        info!("Enabled paging");
    }

    /// Whether CR3 points at this directory.
    #[must_use]
    pub fn is_loaded<M: Mmu>(&self, mmu: &M) -> bool {
        mmu.page_directory().directory_frame() == self.directory
    }

    /// Whether this directory is loaded and paging is on.
    #[must_use]
    pub fn is_active<M: Mmu>(&self, mmu: &M) -> bool {
        self.is_loaded(mmu) && mmu.paging_enabled()
    }

    /// Reload CR3 to drop stale translations.
    ///
    /// # Panics
    /// If this directory is not loaded.
    pub fn flush_tlb<M: Mmu>(&self, mmu: &M) {
        assert!(
            self.is_loaded(mmu),
            "TLB flush through page table {} which is not loaded",
            self.directory
        );
        // SAFETY: Reloading the directory that is already installed does not
        // change the address space.
        unsafe { mmu.load_page_directory(Cr3::from_directory_frame(self.directory, false, false)) };
    }

    /// Track `pool` so its range counts as legitimate and faults inside it are
    /// backed by its frame pool.
    ///
    /// # Panics
    /// If all slots are taken, `pool` overlaps a registered pool, or it reaches
    /// into the shared region or the recursive table window.
    pub fn register_pool(&mut self, pool: VmPoolRegistration) {
        assert!(
            pool.base.as_u32() >= self.config.shared_size()
                && pool.end() <= u64::from(recursive::TABLES_WINDOW.as_u32()),
            "VM pool at {} ({:#x} bytes) reaches into the shared region or the table window",
            pool.base,
            pool.size
        );
        for other in self.vm_pools.iter().flatten() {
            assert!(
                !pool.overlaps(other),
                "VM pool at {} overlaps registered pool at {}",
                pool.base,
                other.base
            );
        }

        let Some(slot) = self.vm_pools.iter_mut().find(|slot| slot.is_none()) else {
            panic!("page table cannot track more than {MAX_VM_POOLS} VM pools");
        };
        *slot = Some(pool);
        debug!("Registered VM pool at {} ({:#x} bytes)", pool.base, pool.size);
    }

    /// Stop tracking the pool starting at `base`.
    ///
    /// Pages of the pool that are still mapped stay mapped.
    pub fn unregister_pool(&mut self, base: VirtualAddress) -> Option<VmPoolRegistration> {
        let slot = self
            .vm_pools
            .iter_mut()
            .find(|slot| slot.is_some_and(|p| p.base == base))?;
        let pool = slot.take();
        debug!("Unregistered VM pool at {base}");
        pool
    }

    /// Registered pools.
    pub fn vm_pools(&self) -> impl Iterator<Item = &VmPoolRegistration> {
        self.vm_pools.iter().flatten()
    }

    /// Whether a fault at `address` may be resolved.
    ///
    /// The recursive table window never is. Without registered pools every other
    /// address is legitimate; otherwise only the shared region and registered
    /// pools are.
    #[must_use]
    pub fn is_legitimate(&self, address: VirtualAddress) -> bool {
        if recursive::is_in_window(address) {
            return false;
        }
        let mut pools = self.vm_pools().peekable();
        if pools.peek().is_none() {
            return true;
        }
        address.as_u32() < self.config.shared_size() || pools.any(|p| p.contains(address))
    }

    /// Resolve the page fault whose address is in CR2.
    ///
    /// # Errors
    /// [`PageFaultError::Illegitimate`] for addresses no pool covers, and
    /// [`PageFaultError::OutOfFrames`] when a frame pool is exhausted. A table
    /// installed before the page frame ran out stays installed.
    ///
    /// # Panics
    /// If this address space is not active, or the page is already mapped
    /// (protection faults are not handled).
    pub fn handle_fault<M: Mmu>(
        &mut self,
        frames: &mut FramePoolRegistry<'_>,
        mmu: &M,
    ) -> Result<FaultResolution, PageFaultError> {
        let address = mmu.fault_address();
        self.resolve(address, frames, mmu)
    }

    /// Map the page containing `address` unless it is mapped already.
    ///
    /// # Errors
    /// As [`handle_fault`](Self::handle_fault).
    pub fn ensure_mapped<M: Mmu>(
        &mut self,
        address: VirtualAddress,
        frames: &mut FramePoolRegistry<'_>,
        mmu: &M,
    ) -> Result<Option<FaultResolution>, PageFaultError> {
        if self.lookup(address, mmu).is_some() {
            return Ok(None);
        }
        self.resolve(address, frames, mmu).map(Some)
    }

    fn resolve<M: Mmu>(
        &mut self,
        address: VirtualAddress,
        frames: &mut FramePoolRegistry<'_>,
        mmu: &M,
    ) -> Result<FaultResolution, PageFaultError> {
        assert!(
            self.is_active(mmu),
            "page fault at {address} handled by inactive page table {}",
            self.directory
        );

        if !self.is_legitimate(address) {
            warn!("Rejected page fault at illegitimate address {address}");
            return Err(PageFaultError::Illegitimate(address));
        }

        let (pdi, pti) = split_indices(address);
        let out_of_frames = |source| PageFaultError::OutOfFrames { address, source };

        // SAFETY: The directory is active (asserted above).
        let directory = unsafe { self.directory_mut(mmu) };
        let mut pde = directory.get(pdi);
        let mut new_table = None;

        if !pde.is_present() {
            let frame = frames
                .get_frames(self.config.table_pool(), 1)
                .map_err(out_of_frames)?;
            pde = PdEntry::make_table(frame);
            directory.set(pdi, pde);

            // SAFETY: The entry was just installed.
            let table = unsafe { self.table_mut(pdi, pde, mmu) };
            table.fill(PtEntry::reserved_unmapped());
            new_table = Some(frame);
            trace!("Installed page table {frame} for directory entry {}", pdi.as_usize());
        }

        // SAFETY: The directory entry is present.
        let table = unsafe { self.table_mut(pdi, pde, mmu) };
        let pte = table.get(pti);
        assert!(
            !pte.is_present(),
            "protection fault at {address}: page is already mapped to {:?}",
            pte.page_frame()
        );

        let frame = frames
            .get_frames(self.page_pool_for(address), 1)
            .map_err(out_of_frames)?;
        table.set(pti, PtEntry::make_4k(frame));

        debug!("Resolved page fault at {address}: mapped to frame {frame}");
        Ok(FaultResolution {
            page: address.page(),
            frame,
            new_table,
        })
    }

    /// Unmap `page` and return its frame to the owning frame pool.
    ///
    /// The entry becomes the reserved-unmapped marker. Pages that are not
    /// mapped are left alone. The TLB is not flushed.
    ///
    /// Returns whether a frame was released.
    ///
    /// # Panics
    /// In the recursive layout, if this address space is not active. Also if the
    /// mapped frame is not owned by any registered frame pool.
    pub fn free_page<M: Mmu>(
        &mut self,
        page: PageNumber,
        frames: &mut FramePoolRegistry<'_>,
        mmu: &M,
    ) -> bool {
        self.assert_reachable(mmu);

        let (pdi, pti) = split_indices(page.base());
        // SAFETY: Reachable (asserted above).
        let pde = unsafe { self.directory_mut(mmu) }.get(pdi);
        if !pde.is_present() {
            return false;
        }

        // SAFETY: The directory entry is present.
        let table = unsafe { self.table_mut(pdi, pde, mmu) };
        let Some(frame) = table.get(pti).page_frame() else {
            return false;
        };

        frames.release_frames(frame);
        table.set(pti, PtEntry::reserved_unmapped());
        trace!("Freed page {page} (frame {frame})");
        true
    }

    /// Physical address `address` translates to, if mapped.
    ///
    /// # Panics
    /// In the recursive layout, if this address space is not active.
    #[must_use]
    pub fn translate<M: Mmu>(&self, address: VirtualAddress, mmu: &M) -> Option<PhysicalAddress> {
        self.lookup(address, mmu)
            .map(|frame| frame.base() + address.page_offset())
    }

    fn lookup<M: Mmu>(&self, address: VirtualAddress, mmu: &M) -> Option<FrameNumber> {
        self.assert_reachable(mmu);
        let (pdi, pti) = split_indices(address);
        // SAFETY: Reachable (asserted above).
        let pde = unsafe { self.directory_mut(mmu) }.get(pdi);
        pde.table_frame()?;
        // SAFETY: The directory entry is present.
        unsafe { self.table_mut(pdi, pde, mmu) }.get(pti).page_frame()
    }

    /// Frame pool that backs pages at `address`.
    fn page_pool_for(&self, address: VirtualAddress) -> PoolHandle {
        self.vm_pools()
            .find(|p| p.contains(address))
            .map_or(self.config.process_pool(), |p| p.frames)
    }

    fn assert_reachable<M: Mmu>(&self, mmu: &M) {
        if self.config.layout() == TableLayout::Recursive {
            assert!(
                self.is_active(mmu),
                "recursive access to page table {} which is not active",
                self.directory
            );
        }
    }

    /// # Safety
    /// In the recursive layout this address space must be active.
    unsafe fn directory_mut<'a, M: Mmu>(&self, mmu: &M) -> &'a mut PageDirectory {
        match self.config.layout() {
            // SAFETY: The last directory entry maps the directory into the window.
            TableLayout::Recursive => unsafe { mmu.virt_to_mut(recursive::DIRECTORY_ADDRESS) },
            // SAFETY: Directory frames come from the identity-mapped kernel pool.
            TableLayout::IdentityMapped => unsafe { mmu.phys_to_mut(self.directory.base()) },
        }
    }

    /// # Safety
    /// `pde` must be the present entry at `pdi`, and the directory must be
    /// reachable as for [`directory_mut`](Self::directory_mut).
    unsafe fn table_mut<'a, M: Mmu>(
        &self,
        pdi: DirectoryIndex,
        pde: PdEntry,
        mmu: &M,
    ) -> &'a mut LeafTable {
        match self.config.layout() {
            // SAFETY: The present entry maps the table into the window.
            TableLayout::Recursive => unsafe { mmu.virt_to_mut(Self::pte_address(pdi)) },
            TableLayout::IdentityMapped => {
                let Some(frame) = pde.table_frame() else {
                    panic!("directory entry {} has no page table", pdi.as_usize());
                };
                // SAFETY: Table frames come from the identity-mapped kernel pool.
                unsafe { mmu.phys_to_mut(frame.base()) }
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn index_u16(i: u32) -> u16 {
    debug_assert!(i < ENTRIES);
    i as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paging::init_paging;
    use crate::mmu::Mmu;
    use crate::sim::SimulatedMachine;
    use crate::testing::{active_page_table, standard_pools};
    use kernel_info::memory::TABLE_SPAN;

    const HEAP: VirtualAddress = VirtualAddress::new(0x4000_0000);

    fn pde_raw(sim: &SimulatedMachine, directory: FrameNumber, index: u32) -> u32 {
        sim.read_phys_u32(directory.base() + index * 4)
    }

    #[test]
    fn construction_maps_shared_region_and_self_reference() {
        let sim = SimulatedMachine::new();
        let (mut frames, kernel, process) = standard_pools(&sim);
        let config = init_paging(kernel, process, TABLE_SPAN).expect("config");
        let before = frames.pool(process).free_frames();

        let pt = PageTable::new(&config, &mut frames, &sim).expect("page table");
        let dir = pt.directory_frame();

        assert_eq!(frames.pool(process).free_frames(), before - 2);
        assert_eq!(frames.owner_of(dir), Some(process));

        let last = PdEntry::from_raw(pde_raw(&sim, dir, 1023));
        assert_eq!(last.table_frame(), Some(dir));
        assert!(last.flags().writable());

        let first = PdEntry::from_raw(pde_raw(&sim, dir, 0));
        let shared = first.table_frame().expect("shared table");
        for i in 1..1023 {
            assert_eq!(pde_raw(&sim, dir, i), 0, "directory entry {i} must be absent");
        }

        for i in [0_u32, 1, 512, 1023] {
            let pte = PtEntry::from_raw(sim.read_phys_u32(shared.base() + i * 4));
            assert_eq!(pte.page_frame(), Some(FrameNumber::new(i)));
            assert!(pte.flags().writable());
        }
    }

    #[test]
    fn larger_shared_region_uses_consecutive_directory_entries() {
        let sim = SimulatedMachine::new();
        let (mut frames, kernel, process) = standard_pools(&sim);
        let config = init_paging(kernel, process, 2 * TABLE_SPAN).expect("config");
        let pt = PageTable::new(&config, &mut frames, &sim).expect("page table");

        let second = PdEntry::from_raw(pde_raw(&sim, pt.directory_frame(), 1))
            .table_frame()
            .expect("second shared table");
        let pte = PtEntry::from_raw(sim.read_phys_u32(second.base() + 5 * 4));
        assert_eq!(pte.page_frame(), Some(FrameNumber::new(1024 + 5)));
    }

    #[test]
    fn identity_layout_has_no_self_reference() {
        let sim = SimulatedMachine::new();
        let (mut frames, kernel, process) = standard_pools(&sim);
        let config = init_paging(kernel, process, TABLE_SPAN)
            .expect("config")
            .with_layout(TableLayout::IdentityMapped);

        let pt = PageTable::new(&config, &mut frames, &sim).expect("page table");
        assert_eq!(frames.owner_of(pt.directory_frame()), Some(kernel));
        assert_eq!(pde_raw(&sim, pt.directory_frame(), 1023), 0);
    }

    #[test]
    fn construction_failure_returns_frames() {
        let sim = SimulatedMachine::new();
        let (mut frames, kernel, process) = standard_pools(&sim);
        let config = init_paging(kernel, process, 2 * TABLE_SPAN)
            .expect("config")
            .with_layout(TableLayout::IdentityMapped);

        // Leave exactly two kernel frames: enough for the directory and one table.
        let free = frames.pool(kernel).free_frames();
        let hog = frames.get_frames(kernel, free - 2).expect("hog");

        let err = PageTable::new(&config, &mut frames, &sim).expect_err("must fail");
        assert!(matches!(err, PagingError::OutOfFrames(_)));
        assert_eq!(frames.pool(kernel).free_frames(), 2);

        frames.release_frames(hog);
    }

    #[test]
    fn fault_installs_table_and_page_in_one_go() {
        let sim = SimulatedMachine::new();
        let (mut frames, mut pt) = active_page_table(&sim, TableLayout::Recursive);

        let faults = sim.touch(HEAP + 0x10, &mut pt, &mut frames).expect("resolved");
        assert_eq!(faults, 1);

        // The rest of the new table holds reserved markers.
        let pdi = DirectoryIndex::from(HEAP);
        let table = PdEntry::from_raw(pde_raw(&sim, pt.directory_frame(), pdi.as_u32()))
            .table_frame()
            .expect("table");
        let neighbour = PtEntry::from_raw(sim.read_phys_u32(table.base() + 4));
        assert!(neighbour.is_reserved_unmapped());

        // A second page in the same table faults once and needs no new table.
        sim.raise_fault(HEAP + 0x1000);
        let res = pt.handle_fault(&mut frames, &sim).expect("resolved");
        assert_eq!(res.new_table, None);
        assert_eq!(res.page, (HEAP + 0x1000).page());
    }

    #[test]
    fn translate_after_fault() {
        let sim = SimulatedMachine::new();
        let (mut frames, mut pt) = active_page_table(&sim, TableLayout::Recursive);

        assert_eq!(pt.translate(HEAP, &sim), None);
        sim.raise_fault(HEAP + 0x123);
        let res = pt.handle_fault(&mut frames, &sim).expect("resolved");
        assert_eq!(pt.translate(HEAP + 0x123, &sim), Some(res.frame.base() + 0x123));
        assert_eq!(pt.translate(VirtualAddress::new(0x1234), &sim), Some(PhysicalAddress::new(0x1234)));
    }

    #[test]
    #[should_panic(expected = "protection fault")]
    fn fault_on_present_page_is_fatal() {
        let sim = SimulatedMachine::new();
        let (mut frames, mut pt) = active_page_table(&sim, TableLayout::Recursive);
        sim.raise_fault(VirtualAddress::new(0x1000));
        let _ = pt.handle_fault(&mut frames, &sim);
    }

    #[test]
    fn free_page_releases_frame_and_leaves_marker() {
        let sim = SimulatedMachine::new();
        let (mut frames, mut pt) = active_page_table(&sim, TableLayout::Recursive);
        let process = pt.config().process_pool();

        sim.touch(HEAP, &mut pt, &mut frames).expect("resolved");
        let free = frames.pool(process).free_frames();

        assert!(pt.free_page(HEAP.page(), &mut frames, &sim));
        assert_eq!(frames.pool(process).free_frames(), free + 1);
        assert_eq!(pt.translate(HEAP, &sim), None);

        // SAFETY: The table is mapped through the recursive window.
        let table: &mut LeafTable =
            unsafe { sim.virt_to_mut(PageTable::pte_address(DirectoryIndex::from(HEAP))) };
        let entry = table.get(TableIndex::from(HEAP));
        assert!(entry.is_reserved_unmapped());
        assert!(!entry.flags().writable());

        // Freeing again, or freeing a page in a missing table, is a no-op.
        assert!(!pt.free_page(HEAP.page(), &mut frames, &sim));
        assert!(!pt.free_page(VirtualAddress::new(0x8000_0000).page(), &mut frames, &sim));
        assert_eq!(frames.pool(process).free_frames(), free + 1);
    }

    #[test]
    fn identity_layout_resolves_faults_through_physical_addresses() {
        let sim = SimulatedMachine::new();
        let (mut frames, mut pt) = active_page_table(&sim, TableLayout::IdentityMapped);
        let kernel = pt.config().kernel_pool();
        let process = pt.config().process_pool();
        let kernel_free = frames.pool(kernel).free_frames();

        sim.raise_fault(HEAP);
        let res = pt.handle_fault(&mut frames, &sim).expect("resolved");
        let table = res.new_table.expect("new table");
        assert_eq!(frames.owner_of(table), Some(kernel));
        assert_eq!(frames.owner_of(res.frame), Some(process));
        assert_eq!(frames.pool(kernel).free_frames(), kernel_free - 1);

        assert!(pt.free_page(HEAP.page(), &mut frames, &sim));
        assert_eq!(pt.translate(HEAP, &sim), None);
    }

    #[test]
    fn illegitimate_faults_are_rejected_once_pools_exist() {
        let sim = SimulatedMachine::new();
        let (mut frames, mut pt) = active_page_table(&sim, TableLayout::Recursive);
        let process = pt.config().process_pool();

        assert!(pt.is_legitimate(VirtualAddress::new(0x9000_0000)));
        pt.register_pool(VmPoolRegistration {
            base: HEAP,
            size: 0x10_0000,
            frames: process,
        });

        assert!(pt.is_legitimate(HEAP + 0xF_FFFF));
        assert!(pt.is_legitimate(VirtualAddress::new(0x1000)));
        assert!(!pt.is_legitimate(HEAP + 0x10_0000));

        sim.raise_fault(HEAP + 0x10_0000);
        assert_eq!(
            pt.handle_fault(&mut frames, &sim),
            Err(PageFaultError::Illegitimate(HEAP + 0x10_0000))
        );
    }

    #[test]
    fn pool_faults_use_the_pools_frames() {
        let sim = SimulatedMachine::new();
        let (mut frames, mut pt) = active_page_table(&sim, TableLayout::Recursive);

        // SAFETY: Frames 20000.. are unused simulated RAM.
        let extra = unsafe { frames.create_pool(&sim, FrameNumber::new(20_000), 64, None) };
        pt.register_pool(VmPoolRegistration {
            base: HEAP,
            size: 0x10_0000,
            frames: extra,
        });

        sim.raise_fault(HEAP);
        let res = pt.handle_fault(&mut frames, &sim).expect("resolved");
        assert_eq!(frames.owner_of(res.frame), Some(extra));
        // Tables still come from the process pool.
        assert_eq!(frames.owner_of(res.new_table.expect("table")), Some(pt.config().process_pool()));
    }

    #[test]
    fn exhaustion_is_reported() {
        let sim = SimulatedMachine::new();
        let (mut frames, mut pt) = active_page_table(&sim, TableLayout::Recursive);

        // SAFETY: Frames 20000.. are unused simulated RAM.
        let tiny = unsafe { frames.create_pool(&sim, FrameNumber::new(20_000), 2, None) };
        pt.register_pool(VmPoolRegistration {
            base: HEAP,
            size: 0x10_0000,
            frames: tiny,
        });

        sim.touch(HEAP, &mut pt, &mut frames).expect("one frame left");
        sim.raise_fault(HEAP + 0x1000);
        assert!(matches!(
            pt.handle_fault(&mut frames, &sim),
            Err(PageFaultError::OutOfFrames { address, .. }) if address == HEAP + 0x1000
        ));
    }

    #[test]
    #[should_panic(expected = "cannot track more than")]
    fn vm_pool_capacity_is_fixed() {
        let sim = SimulatedMachine::new();
        let (_frames, mut pt) = active_page_table(&sim, TableLayout::Recursive);
        let process = pt.config().process_pool();
        for i in 0..=MAX_VM_POOLS {
            #[allow(clippy::cast_possible_truncation)]
            let base = HEAP + (i as u32) * 0x10_0000;
            pt.register_pool(VmPoolRegistration {
                base,
                size: 0x10_0000,
                frames: process,
            });
        }
    }

    #[test]
    #[should_panic(expected = "overlaps registered pool")]
    fn overlapping_vm_pools_are_rejected() {
        let sim = SimulatedMachine::new();
        let (_frames, mut pt) = active_page_table(&sim, TableLayout::Recursive);
        let process = pt.config().process_pool();
        pt.register_pool(VmPoolRegistration { base: HEAP, size: 0x2000, frames: process });
        pt.register_pool(VmPoolRegistration { base: HEAP + 0x1000, size: 0x2000, frames: process });
    }

    #[test]
    #[should_panic(expected = "before page directory")]
    fn enabling_paging_requires_loaded_directory() {
        let sim = SimulatedMachine::new();
        let (mut frames, kernel, process) = standard_pools(&sim);
        let config = init_paging(kernel, process, TABLE_SPAN).expect("config");
        let pt = PageTable::new(&config, &mut frames, &sim).expect("page table");
        // SAFETY: Simulated machine.
        unsafe { pt.enable_paging(&sim) };
    }

    #[test]
    fn pte_address_matches_recursive_formula() {
        assert_eq!(PageTable::pte_address(DirectoryIndex::new(0)).as_u32(), 0xFFC0_0000);
        assert_eq!(PageTable::pte_address(DirectoryIndex::new(0x100)).as_u32(), 0xFFD0_0000);
        assert_eq!(PageTable::pte_address(DirectoryIndex::LAST).as_u32(), 0xFFFF_F000);
    }

    #[test]
    fn table_window_is_never_legitimate() {
        let sim = SimulatedMachine::new();
        let (mut frames, mut pt) = active_page_table(&sim, TableLayout::Recursive);
        let window_page = VirtualAddress::new(0xFFC0_5000);

        assert!(pt.is_legitimate(VirtualAddress::new(0xFFBF_F000)));
        assert!(!pt.is_legitimate(window_page));
        assert!(!pt.is_legitimate(recursive::DIRECTORY_ADDRESS));

        sim.raise_fault(window_page);
        assert_eq!(
            pt.handle_fault(&mut frames, &sim),
            Err(PageFaultError::Illegitimate(window_page))
        );
        assert_eq!(pde_raw(&sim, pt.directory_frame(), 5), 0);
    }

    #[test]
    #[should_panic(expected = "reaches into the shared region or the table window")]
    fn vm_pool_in_table_window_is_rejected() {
        let sim = SimulatedMachine::new();
        let (_frames, mut pt) = active_page_table(&sim, TableLayout::Recursive);
        let process = pt.config().process_pool();
        pt.register_pool(VmPoolRegistration {
            base: recursive::TABLES_WINDOW,
            size: 0x4000,
            frames: process,
        });
    }

    #[test]
    #[should_panic(expected = "reaches into the shared region or the table window")]
    fn vm_pool_running_into_table_window_is_rejected() {
        let sim = SimulatedMachine::new();
        let (_frames, mut pt) = active_page_table(&sim, TableLayout::Recursive);
        let process = pt.config().process_pool();
        pt.register_pool(VmPoolRegistration {
            base: VirtualAddress::new(0xFFBF_F000),
            size: 0x2000,
            frames: process,
        });
    }

    #[test]
    #[should_panic(expected = "reaches into the shared region or the table window")]
    fn vm_pool_in_shared_region_is_rejected() {
        let sim = SimulatedMachine::new();
        let (_frames, mut pt) = active_page_table(&sim, TableLayout::Recursive);
        let process = pt.config().process_pool();
        pt.register_pool(VmPoolRegistration {
            base: VirtualAddress::new(0x0020_0000),
            size: 0x10_0000,
            frames: process,
        });
    }

    #[test]
    fn vm_pool_may_end_just_below_the_window() {
        let sim = SimulatedMachine::new();
        let (_frames, mut pt) = active_page_table(&sim, TableLayout::Recursive);
        let process = pt.config().process_pool();
        pt.register_pool(VmPoolRegistration {
            base: VirtualAddress::new(0xFFBF_E000),
            size: 0x2000,
            frames: process,
        });
        pt.register_pool(VmPoolRegistration {
            base: VirtualAddress::new(TABLE_SPAN),
            size: 0x1000,
            frames: process,
        });
        assert_eq!(pt.vm_pools().count(), 2);
    }

    #[test]
    fn unregistering_frees_the_slot_and_range() {
        let sim = SimulatedMachine::new();
        let (_frames, mut pt) = active_page_table(&sim, TableLayout::Recursive);
        let process = pt.config().process_pool();
        let heap = VmPoolRegistration {
            base: HEAP,
            size: 0x10_0000,
            frames: process,
        };
        let code = VmPoolRegistration {
            base: VirtualAddress::new(0x2000_0000),
            ..heap
        };
        pt.register_pool(heap);
        pt.register_pool(code);

        assert_eq!(pt.unregister_pool(HEAP), Some(heap));
        assert_eq!(pt.unregister_pool(HEAP), None);
        assert!(!pt.is_legitimate(HEAP));

        // The same range can be registered again.
        pt.register_pool(heap);
        assert_eq!(pt.vm_pools().count(), 2);
    }

    #[test]
    #[should_panic(expected = "has no page table")]
    fn identity_table_access_requires_present_entry() {
        let sim = SimulatedMachine::new();
        let (_frames, pt) = active_page_table(&sim, TableLayout::IdentityMapped);
        let pdi = DirectoryIndex::from(HEAP);
        // SAFETY: The identity layout reaches the directory physically; the
        // entry is absent, which must be caught before any table is touched.
        let _ = unsafe { pt.table_mut(pdi, PdEntry::zero(), &sim) };
    }
}
