//! # Address Spaces and Demand Paging
//!
//! [`Paging`] is the process-wide paging context: the two boot frame pools,
//! the size of the identity-mapped shared region, the machine handles, and
//! the currently loaded [`AddressSpace`]. The exception stub owns a
//! `Paging` and forwards every page fault to it.
//!
//! [`AddressSpace`] is one two-level translation tree. Construction runs
//! with paging disabled and writes the directory and the shared-region
//! tables at their physical addresses; every edit after `enable_paging`
//! goes through the recursive windows (see [`kernel_vmem::recursive`]),
//! because the physical frames of the tree are no longer addressable.
//!
//! Faults are resolved lazily: a fault below an address some registered
//! [`VmPool`] has allocated materializes first the missing page table, then
//! the missing backing frame, both from the process pool. Everything else
//! is a segmentation fault and is only diagnosed; the offending access
//! will simply fault again.

use crate::frame_pool::ContFramePool;
use crate::vm_pool::VmPool;
use core::cell::Cell;
use kernel_addresses::{FrameNumber, PageNumber};
use kernel_info::memory::{BYTES_PER_DIRECTORY_ENTRY, ENTRIES_PER_TABLE, MAX_VM_POOLS};
use kernel_registers::Cr3;
use kernel_sync::SpinLock;
use kernel_vmem::{
    recursive, Cpu, DirIndex, FaultInfo, PageDirectory, PageEntry, PageTable, PhysMapper,
    TableIndex, VirtMapper,
};
use log::{debug, error, warn};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PagingError {
    #[error("out of physical frames")]
    OutOfFrames,
    #[error("address-space pool registry is full")]
    TooManyPools,
}

/// Process-wide paging state.
///
/// One of these exists for the lifetime of the kernel; address spaces and
/// virtual-memory pools borrow it. `M` provides memory access, `C` the
/// control registers; both are mocked in the hosted test harness.
pub struct Paging<'a, M: PhysMapper + VirtMapper, C: Cpu> {
    mapper: &'a M,
    cpu: &'a C,
    kernel_pool: &'a SpinLock<ContFramePool>,
    process_pool: &'a SpinLock<ContFramePool>,
    /// Bytes of low memory identity-mapped into every address space.
    shared_size: u32,
    /// The address space the hardware is walking right now.
    current: Cell<Option<&'a AddressSpace<'a, M, C>>>,
}

impl<'a, M: PhysMapper + VirtMapper, C: Cpu> Paging<'a, M, C> {
    /// Set up the paging system: remember the frame pools backing it and
    /// how much of low memory every address space shares.
    pub fn init_paging(
        mapper: &'a M,
        cpu: &'a C,
        kernel_pool: &'a SpinLock<ContFramePool>,
        process_pool: &'a SpinLock<ContFramePool>,
        shared_size: u32,
    ) -> Self {
        debug_assert!(shared_size % BYTES_PER_DIRECTORY_ENTRY == 0);
        debug!("paging system initialized ({shared_size} shared bytes)");
        Self {
            mapper,
            cpu,
            kernel_pool,
            process_pool,
            shared_size,
            current: Cell::new(None),
        }
    }

    /// Turn translation on (CR0.PG).
    ///
    /// An address space with the shared region identity-mapped must have
    /// been loaded first; the next instruction fetch already goes through
    /// it.
    pub fn enable_paging(&self) {
        let cr0 = self.cpu.read_cr0().with_pg_paging(true);
        // Safety: the loaded directory identity-maps the region the kernel
        // executes from, so the switch is transparent.
        unsafe { self.cpu.write_cr0(cr0) };
        debug!("paging enabled");
    }

    #[must_use]
    pub fn paging_enabled(&self) -> bool {
        self.cpu.read_cr0().pg_paging()
    }

    /// The currently loaded address space, if any.
    #[must_use]
    pub fn current(&self) -> Option<&'a AddressSpace<'a, M, C>> {
        self.current.get()
    }

    /// Page-fault entry point: route to the loaded address space.
    pub fn handle_fault(&self, fault: &FaultInfo) {
        match self.current.get() {
            Some(space) => space.handle_fault(fault),
            None => error!("page fault with no address space loaded"),
        }
    }

    pub(crate) fn mapper(&self) -> &'a M {
        self.mapper
    }
}

/// One two-level translation tree and the virtual-memory pools living in it.
pub struct AddressSpace<'a, M: PhysMapper + VirtMapper, C: Cpu> {
    paging: &'a Paging<'a, M, C>,
    /// Frame holding the page directory.
    directory_frame: FrameNumber,
    /// Pools registered with this space; polled for fault legitimacy.
    pools: SpinLock<PoolList<'a, M, C>>,
}

impl<'a, M: PhysMapper + VirtMapper, C: Cpu> AddressSpace<'a, M, C> {
    /// Build a fresh address space.
    ///
    /// Draws the directory frame from the process pool and one page table
    /// per 4 MiB of the shared region from the kernel pool; identity-maps
    /// the shared region; seeds every other directory slot with the
    /// not-present guard value; and points the last directory entry back at
    /// the directory itself (the recursive self-map every later edit relies
    /// on).
    ///
    /// Must run before paging is enabled; construction writes the tree at
    /// its physical addresses.
    pub fn new(paging: &'a Paging<'a, M, C>) -> Result<Self, PagingError> {
        debug_assert!(
            !paging.paging_enabled(),
            "address spaces are constructed with paging off"
        );
        let mapper = paging.mapper;

        let directory_frame = paging
            .process_pool
            .with_lock(|pool| pool.get_frames(mapper, 1))
            .ok_or(PagingError::OutOfFrames)?;
        // Safety: paging is off, so the frame is addressable at its
        // physical address and nothing else references it yet.
        let directory = unsafe { mapper.phys_to_mut::<PageDirectory>(directory_frame.base()) };
        directory.zero();

        let shared_tables = paging.shared_size / BYTES_PER_DIRECTORY_ENTRY;
        for t in 0..shared_tables {
            let table_frame = paging
                .kernel_pool
                .with_lock(|pool| pool.get_frames(mapper, 1))
                .ok_or(PagingError::OutOfFrames)?;
            // Safety: as above; a fresh kernel-pool frame.
            let table = unsafe { mapper.phys_to_mut::<PageTable>(table_frame.base()) };
            for i in 0..ENTRIES_PER_TABLE {
                let frame = FrameNumber::new(t * ENTRIES_PER_TABLE as u32 + i as u32);
                table.set(TableIndex::new(i as u16), PageEntry::map(frame));
            }
            directory.set(DirIndex::new(t as u16), PageEntry::map(table_frame));
        }

        for i in shared_tables as usize..ENTRIES_PER_TABLE - 1 {
            directory.set(DirIndex::new(i as u16), PageEntry::guard());
        }
        directory.set(DirIndex::RECURSIVE, PageEntry::map(directory_frame));

        debug!("constructed address space with directory at {directory_frame}");
        Ok(Self {
            paging,
            directory_frame,
            pools: SpinLock::new(PoolList::new()),
        })
    }

    /// Frame holding this space's page directory.
    #[must_use]
    pub fn directory_frame(&self) -> FrameNumber {
        self.directory_frame
    }

    /// Point the hardware at this space and make it the fault target.
    pub fn load(&'a self) {
        // Safety: the directory was fully constructed by `new`.
        unsafe {
            self.paging
                .cpu
                .write_cr3(Cr3::from_directory(self.directory_frame));
        }
        self.paging.current.set(Some(self));
        debug!("loaded address space at {}", self.directory_frame);
    }

    /// Register `pool` as part of this address space. Registered pools are
    /// the authority on which faults are legitimate. Append-only.
    pub fn register_pool(&self, pool: &'a VmPool<'a, M, C>) -> Result<(), PagingError> {
        let pushed = self.pools.with_lock(|pools| pools.push(pool));
        if pushed.is_err() {
            error!("cannot register pool: all {MAX_VM_POOLS} slots taken");
        }
        pushed
    }

    /// Service a page fault against this address space.
    ///
    /// The faulting address comes from CR2. Legitimate faults get their
    /// page table and backing frame materialized from the process pool; the
    /// CPU then retries the faulting access. Illegitimate ones are
    /// diagnosed and left alone.
    pub fn handle_fault(&self, fault: &FaultInfo) {
        let addr = self.paging.cpu.read_cr2();
        debug!(
            "page fault at {addr}: {}",
            fault.error_code.explain()
        );

        let claimed = self
            .pools
            .with_lock(|pools| pools.iter().any(|pool| pool.is_legitimate(addr)));
        if !claimed {
            error!("segmentation fault: {addr} is not part of any registered pool");
            return;
        }

        let mapper = self.paging.mapper;

        // Materialize the page table for this 4 MiB slot if it is missing.
        {
            // Safety: the recursive windows alias the loaded directory; the
            // reference dies before the windows are touched again.
            let pde = unsafe { mapper.virt_to_mut::<PageEntry>(recursive::pde_address(addr)) };
            if !pde.present() {
                let Some(table_frame) = self
                    .paging
                    .process_pool
                    .with_lock(|pool| pool.get_frames(mapper, 1))
                else {
                    error!("out of frames for a page table at {addr}");
                    return;
                };
                *pde = PageEntry::map(table_frame);
                // The frame is recycled; scrub whatever translations it
                // held, through the table window it just became visible at.
                // Safety: the window is mapped now that the PDE is present.
                let table = unsafe { mapper.virt_to_mut::<PageTable>(recursive::table_base(addr)) };
                table.zero();
            }
        }

        // Materialize the backing frame if the page itself is missing.
        // Safety: the PDE above is present, so the PTE window is mapped.
        let pte = unsafe { mapper.virt_to_mut::<PageEntry>(recursive::pte_address(addr)) };
        if !pte.present() {
            let Some(frame) = self
                .paging
                .process_pool
                .with_lock(|pool| pool.get_frames(mapper, 1))
            else {
                error!("out of frames backing {addr}");
                return;
            };
            *pte = PageEntry::map(frame);
        }

        debug!("page fault at {addr} handled");
    }

    /// Drop the translation for `page` and flush the TLB. The backing frame
    /// is **not** released; physical reclamation is the caller's policy.
    pub fn free_page(&self, page: PageNumber) {
        match self.unmap_page(page) {
            Some(_) => self.flush_tlb(),
            None => warn!("free_page: {page} is not mapped"),
        }
    }

    /// Clear the translation for `page` without flushing, returning the
    /// frame that backed it. `None` if the page (or its whole table) is not
    /// present. Callers batch a single [`flush_tlb`](Self::flush_tlb).
    pub fn unmap_page(&self, page: PageNumber) -> Option<FrameNumber> {
        let va = page.base();
        let mapper = self.paging.mapper;

        // Safety: recursive-window alias of the loaded directory.
        let pde = unsafe { mapper.virt_to_mut::<PageEntry>(recursive::pde_address(va)) };
        if !pde.present() {
            return None;
        }
        // Safety: PDE present, so the PTE window is mapped.
        let pte = unsafe { mapper.virt_to_mut::<PageEntry>(recursive::pte_address(va)) };
        if !pte.present() {
            return None;
        }
        let frame = pte.frame();
        *pte = PageEntry::new();
        Some(frame)
    }

    /// Flush the TLB by reloading CR3 with its current value.
    pub fn flush_tlb(&self) {
        let cpu = self.paging.cpu;
        // Safety: rewriting the active directory base is a no-op apart from
        // discarding cached translations.
        unsafe { cpu.write_cr3(cpu.read_cr3()) };
    }

    pub(crate) fn paging(&self) -> &'a Paging<'a, M, C> {
        self.paging
    }
}

/// Bounded, append-only list of the pools registered with one space.
struct PoolList<'a, M: PhysMapper + VirtMapper, C: Cpu> {
    pools: [Option<&'a VmPool<'a, M, C>>; MAX_VM_POOLS],
    count: usize,
}

impl<'a, M: PhysMapper + VirtMapper, C: Cpu> PoolList<'a, M, C> {
    const fn new() -> Self {
        Self {
            pools: [None; MAX_VM_POOLS],
            count: 0,
        }
    }

    fn push(&mut self, pool: &'a VmPool<'a, M, C>) -> Result<(), PagingError> {
        if self.count == MAX_VM_POOLS {
            return Err(PagingError::TooManyPools);
        }
        self.pools[self.count] = Some(pool);
        self.count += 1;
        Ok(())
    }

    fn iter(&self) -> impl Iterator<Item = &'a VmPool<'a, M, C>> + '_ {
        self.pools[..self.count].iter().flatten().copied()
    }
}
