//! # Virtual Memory Pools
//!
//! A [`VmPool`] manages a logical address range `[base, base + size)` of one
//! address space, accounting in whole pages with fixed-capacity tables of
//! free and allocated regions. Allocation is pure bookkeeping (no physical
//! memory moves until the first touch faults the page in), which is what
//! makes the pool the authority on fault legitimacy: an address is worth
//! backing iff it lies in some allocated region.
//!
//! Releasing a region undoes both sides: the pages' translations are
//! dropped, their backing frames (if any were ever faulted in) go back to
//! their frame pool, and the region returns to the free list, coalescing
//! with free neighbors so repeated allocate/release cannot fragment the
//! table without bound.

use crate::address_space::AddressSpace;
use crate::frame_pool::{release_frames, ContFramePool};
use kernel_addresses::{PageNumber, VirtualAddress};
use kernel_info::memory::{MAX_VM_REGIONS, PAGE_SIZE};
use kernel_sync::SpinLock;
use kernel_vmem::{Cpu, PhysMapper, VirtMapper};
use log::{debug, warn};

/// A run of pages: `[base_page, base_page + pages)`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
struct Region {
    base_page: PageNumber,
    pages: u32,
}

impl Region {
    const EMPTY: Self = Self {
        base_page: PageNumber::new(0),
        pages: 0,
    };

    /// One past the last page, as a raw page number.
    fn end(&self) -> u32 {
        self.base_page.as_u32() + self.pages
    }

    fn contains(&self, page: PageNumber) -> bool {
        page.as_u32() >= self.base_page.as_u32() && page.as_u32() < self.end()
    }
}

/// Free and allocated region accounting for one pool.
struct RegionTable {
    free: [Region; MAX_VM_REGIONS],
    free_count: usize,
    allocated: [Region; MAX_VM_REGIONS],
    allocated_count: usize,
}

impl RegionTable {
    fn new(initial: Region) -> Self {
        let mut free = [Region::EMPTY; MAX_VM_REGIONS];
        free[0] = initial;
        Self {
            free,
            free_count: 1,
            allocated: [Region::EMPTY; MAX_VM_REGIONS],
            allocated_count: 0,
        }
    }

    /// Return a region to the free list, merging with the free neighbors
    /// that end where it begins or begin where it ends.
    fn insert_free(&mut self, mut region: Region) {
        if let Some(i) = (0..self.free_count).find(|&i| self.free[i].end() == region.base_page.as_u32())
        {
            region = Region {
                base_page: self.free[i].base_page,
                pages: self.free[i].pages + region.pages,
            };
            self.free_count -= 1;
            self.free[i] = self.free[self.free_count];
        }
        if let Some(i) =
            (0..self.free_count).find(|&i| self.free[i].base_page.as_u32() == region.end())
        {
            region.pages += self.free[i].pages;
            self.free_count -= 1;
            self.free[i] = self.free[self.free_count];
        }

        if self.free_count == MAX_VM_REGIONS {
            warn!("free-region table full; leaking {} pages", region.pages);
            return;
        }
        self.free[self.free_count] = region;
        self.free_count += 1;
    }
}

/// A pool of virtual memory, lazily backed by a frame pool through the page
/// faults of its address space.
pub struct VmPool<'a, M: PhysMapper + VirtMapper, C: Cpu> {
    base: VirtualAddress,
    size: u32,
    /// The pool that physically backs this range (via the fault path).
    frame_pool: &'a SpinLock<ContFramePool>,
    space: &'a AddressSpace<'a, M, C>,
    regions: SpinLock<RegionTable>,
}

impl<'a, M: PhysMapper + VirtMapper, C: Cpu> VmPool<'a, M, C> {
    /// Create a pool over `[base, base + size)`. Both ends must be
    /// page-aligned. The whole range starts out free.
    ///
    /// Register the pool with its address space right after construction
    /// (`space.register_pool(&pool)`); faults inside the range are refused
    /// until then.
    pub fn new(
        base: VirtualAddress,
        size: u32,
        frame_pool: &'a SpinLock<ContFramePool>,
        space: &'a AddressSpace<'a, M, C>,
    ) -> Self {
        debug_assert!(base.is_page_aligned());
        debug_assert!(size % PAGE_SIZE == 0);

        let initial = Region {
            base_page: base.page(),
            pages: size / PAGE_SIZE,
        };
        debug!("virtual memory pool over {base}..{}", base + size);
        Self {
            base,
            size,
            frame_pool,
            space,
            regions: SpinLock::new(RegionTable::new(initial)),
        }
    }

    /// Logical start address of the pool.
    #[must_use]
    pub fn base_address(&self) -> VirtualAddress {
        self.base
    }

    /// Size of the pool in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// The frame pool that backs this range.
    #[must_use]
    pub fn frame_pool(&self) -> &'a SpinLock<ContFramePool> {
        self.frame_pool
    }

    /// Allocate `bytes` (rounded up to whole pages) from the pool,
    /// first-fit. Returns the region's start address, or `None` for an
    /// empty request, a saturated region table, or want of a large enough
    /// free region. No physical memory is touched; backing is faulted in on
    /// first use.
    pub fn allocate(&self, bytes: u32) -> Option<VirtualAddress> {
        if bytes == 0 {
            warn!("allocate: empty request");
            return None;
        }
        let pages = bytes.div_ceil(PAGE_SIZE);

        self.regions.with_lock(|table| {
            if table.allocated_count == MAX_VM_REGIONS {
                warn!("allocate: all {MAX_VM_REGIONS} region slots taken");
                return None;
            }

            let Some(i) = (0..table.free_count).find(|&i| table.free[i].pages >= pages) else {
                warn!("allocate: no free region of {pages} pages");
                return None;
            };

            let base_page = table.free[i].base_page;
            table.free[i].base_page = base_page.offset(pages);
            table.free[i].pages -= pages;
            if table.free[i].pages == 0 {
                table.free_count -= 1;
                table.free[i] = table.free[table.free_count];
            }

            table.allocated[table.allocated_count] = Region { base_page, pages };
            table.allocated_count += 1;

            debug!("allocated {pages} pages at {}", base_page.base());
            Some(base_page.base())
        })
    }

    /// Release the region that was allocated at exactly `addr`.
    ///
    /// An address that is not the base of an allocated region (including
    /// pointers into a region's interior) is diagnosed and ignored. On
    /// success the pages' translations are dropped, every frame that had
    /// been faulted in goes back to its frame pool, and the TLB is flushed
    /// once.
    pub fn release(&self, addr: VirtualAddress) {
        let page = addr.page();

        let released = self.regions.with_lock(|table| {
            let found = (0..table.allocated_count).find(|&i| table.allocated[i].base_page == page);
            found.map(|i| {
                let region = table.allocated[i];
                table.allocated_count -= 1;
                table.allocated[i] = table.allocated[table.allocated_count];
                table.insert_free(region);
                region
            })
        });
        let Some(region) = released else {
            warn!("release: {addr} is not the base of an allocated region");
            return;
        };

        // Undo the lazily materialized backing.
        let mapper = self.space.paging().mapper();
        let mut resident = 0u32;
        for i in 0..region.pages {
            if let Some(frame) = self.space.unmap_page(region.base_page.offset(i)) {
                release_frames(mapper, frame);
                resident += 1;
            }
        }
        if resident > 0 {
            self.space.flush_tlb();
        }

        debug!(
            "released {} pages at {addr} ({resident} were resident)",
            region.pages
        );
    }

    /// Whether `addr` lies in a currently allocated region: the predicate
    /// the page-fault handler consults before backing an address.
    #[must_use]
    pub fn is_legitimate(&self, addr: VirtualAddress) -> bool {
        let page = addr.page();
        self.regions.with_lock(|table| {
            (0..table.allocated_count).any(|i| table.allocated[i].contains(page))
        })
    }
}
