//! # Memory Layout
//!
//! The machine is a 32-bit flat-paged architecture: 4 KiB frames, two-level
//! translation, 1024 entries per table. The boot layout below mirrors the
//! physical map the kernel is loaded into.

/// Size of a physical frame in bytes.
pub const FRAME_SIZE: u32 = 4096;

/// Size of a virtual page in bytes. Identical to [`FRAME_SIZE`] on this
/// architecture; both names exist because callers think in different units.
pub const PAGE_SIZE: u32 = 4096;

/// Entries per page directory / page table (4096 bytes of 32-bit entries).
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Bytes of address space covered by one page-directory entry.
pub const BYTES_PER_DIRECTORY_ENTRY: u32 = ENTRIES_PER_TABLE as u32 * PAGE_SIZE;

/// Size of the shared region identity-mapped into every address space.
///
/// Kernel code, the console, and the frame-pool bitmaps all live below this
/// line, so they stay reachable after paging is switched on.
pub const SHARED_SIZE: u32 = 4 * 1024 * 1024;

/// First frame of the kernel frame pool (2 MiB).
pub const KERNEL_POOL_START_FRAME: u32 = 512;

/// Number of frames in the kernel frame pool (2 MiB .. 4 MiB).
pub const KERNEL_POOL_FRAMES: u32 = 512;

/// First frame of the process frame pool (4 MiB).
pub const PROCESS_POOL_START_FRAME: u32 = 1024;

/// Number of frames in the process frame pool (4 MiB .. 32 MiB).
pub const PROCESS_POOL_FRAMES: u32 = 7 * 1024;

/// First frame of the memory hole the firmware reserves (15 MiB).
pub const MEM_HOLE_START_FRAME: u32 = 3840;

/// Number of frames in the memory hole (15 MiB .. 16 MiB).
pub const MEM_HOLE_FRAMES: u32 = 256;

/// Capacity of the process-wide frame-pool registry.
pub const MAX_FRAME_POOLS: usize = 8;

/// How many virtual-memory pools one address space will track.
pub const MAX_VM_POOLS: usize = 8;

/// Free/allocated region slots per virtual-memory pool.
pub const MAX_VM_REGIONS: usize = 256;

const _: () = {
    assert!(FRAME_SIZE == PAGE_SIZE);
    assert!(FRAME_SIZE as usize == ENTRIES_PER_TABLE * 4);
    assert!(SHARED_SIZE % BYTES_PER_DIRECTORY_ENTRY == 0);
    // The kernel pool sits entirely inside the shared region.
    assert!((KERNEL_POOL_START_FRAME + KERNEL_POOL_FRAMES) * FRAME_SIZE <= SHARED_SIZE);
    assert!(KERNEL_POOL_START_FRAME + KERNEL_POOL_FRAMES <= PROCESS_POOL_START_FRAME);
    // The hole is carved out of the process pool.
    assert!(MEM_HOLE_START_FRAME >= PROCESS_POOL_START_FRAME);
    assert!(MEM_HOLE_START_FRAME + MEM_HOLE_FRAMES <= PROCESS_POOL_START_FRAME + PROCESS_POOL_FRAMES);
};
