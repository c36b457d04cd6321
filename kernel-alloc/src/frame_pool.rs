//! # Contiguous Frame Pool
//!
//! Physical-frame allocator over a half-open frame range. Every frame is in
//! one of three states, tracked with two bits apiece in a bitmap that itself
//! lives in physical memory (either carved out of the pool's own first
//! frames or placed in an externally supplied info frame):
//!
//! - `Free`: available.
//! - `HeadOfSequence`: allocated, first frame of a contiguous run.
//! - `Used`: allocated, continuation of the run starting at the nearest
//!   `HeadOfSequence` below it.
//!
//! The head marker is what lets [`release_frames`] recover a run's length
//! from nothing but its first frame number: free the head, then keep
//! freeing until the next frame is `Free`, another head, or the pool ends.
//!
//! Because a release names only a frame number, not a pool, every live
//! pool registers its descriptor in a process-wide registry, and
//! [`release_frames`] dispatches through it.
//!
//! The pool object itself is plain bookkeeping data; all bitmap access goes
//! through a [`PhysMapper`] supplied per call, the way the rest of the core
//! passes its memory access around.

use core::fmt;
use kernel_addresses::{FrameNumber, PhysicalAddress};
use kernel_info::memory::{FRAME_SIZE, MAX_FRAME_POOLS};
use kernel_sync::SpinLock;
use kernel_vmem::PhysMapper;
use log::{debug, warn};

/// Allocation state of one frame, two bits in the pool bitmap.
///
/// The `0b11` pattern is not a state and is never written; reading it means
/// the bitmap storage was corrupted and halts the kernel.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum FrameState {
    Free = 0b00,
    Used = 0b01,
    HeadOfSequence = 0b10,
}

impl FrameState {
    fn from_bits(bits: u8) -> Self {
        match bits {
            0b00 => Self::Free,
            0b01 => Self::Used,
            0b10 => Self::HeadOfSequence,
            _ => panic!("corrupt frame-state bitmap"),
        }
    }

    const fn into_bits(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Free => "free",
            Self::Used => "used",
            Self::HeadOfSequence => "head-of-sequence",
        })
    }
}

/// Read the 2-bit state of bitmap slot `index`.
fn read_state<M: PhysMapper>(mapper: &M, bitmap: PhysicalAddress, index: u32) -> FrameState {
    let shift = (index * 2) % 8;
    // Safety: the bitmap bytes belong to this pool's info frames, which are
    // identity-mapped; nobody holds a lasting reference into them.
    let byte = unsafe { *mapper.phys_to_mut::<u8>(bitmap + index * 2 / 8) };
    FrameState::from_bits((byte >> shift) & 0b11)
}

/// Write the 2-bit state of bitmap slot `index`.
fn write_state<M: PhysMapper>(
    mapper: &M,
    bitmap: PhysicalAddress,
    index: u32,
    state: FrameState,
) {
    let shift = (index * 2) % 8;
    // Safety: as in [`read_state`]; the reference dies at the end of the
    // statement.
    let byte = unsafe { mapper.phys_to_mut::<u8>(bitmap + index * 2 / 8) };
    *byte = (*byte & !(0b11 << shift)) | (state.into_bits() << shift);
}

/// A pool of contiguous physical frames `[base, base + n)`.
///
/// Allocation is first-fit over the state bitmap; a successful allocation of
/// `k` frames marks one `HeadOfSequence` followed by `k - 1` `Used`.
pub struct ContFramePool {
    /// First managed frame. When the pool hosts its own bitmap this is the
    /// original base shifted past the info frames.
    base_frame: FrameNumber,
    /// Number of managed frames.
    n_frames: u32,
    /// Physical address of the state bitmap.
    bitmap: PhysicalAddress,
}

impl ContFramePool {
    /// Create a pool managing `n_frames` frames starting at `base_frame`.
    ///
    /// With `info_frame == None` the bitmap is self-hosted: the first
    /// `needed_info_frames(n_frames)` frames of the range store it and are
    /// excluded from management (the effective base shifts up, the managed
    /// count shrinks). Otherwise the bitmap lives at the given frame; if
    /// that frame (and its successors, for large pools) falls inside the
    /// managed range, the constructor records it as an allocated run so it
    /// can never be handed out.
    ///
    /// The new pool registers itself in the process-wide registry so that
    /// [`release_frames`] can find it. Dropping the pool unregisters it.
    ///
    /// # Panics
    /// If the range is empty, or too small to self-host its bitmap.
    pub fn new<M: PhysMapper>(
        mapper: &M,
        base_frame: FrameNumber,
        n_frames: u32,
        info_frame: Option<FrameNumber>,
    ) -> Self {
        assert!(n_frames > 0, "empty frame pool");
        let info_frames = Self::needed_info_frames(n_frames);

        let (base_frame, n_frames, bitmap) = match info_frame {
            None => {
                assert!(
                    n_frames > info_frames,
                    "frame pool too small to self-host its bitmap"
                );
                (
                    base_frame.offset(info_frames),
                    n_frames - info_frames,
                    base_frame.base(),
                )
            }
            Some(info) => (base_frame, n_frames, info.base()),
        };

        let mut pool = Self {
            base_frame,
            n_frames,
            bitmap,
        };

        for index in 0..n_frames {
            pool.set_state(mapper, index, FrameState::Free);
        }

        // An external info frame inside the managed range must never be
        // handed out; record it (and any further info frames) as a run.
        if let Some(info) = info_frame {
            let first = info.as_u32();
            let last = first + info_frames - 1;
            if first >= base_frame.as_u32() && last < base_frame.as_u32() + n_frames {
                pool.mark_inaccessible(mapper, info, info_frames);
            }
        }

        let registered = FRAME_POOLS.with_lock(|registry| {
            registry.insert(PoolDescriptor {
                base_frame,
                n_frames,
                bitmap,
            })
        });
        if registered.is_err() {
            warn!("frame-pool registry is full; {base_frame} will not be releasable by number");
        }

        debug!("frame pool ready: {n_frames} frames from {base_frame}");
        pool
    }

    /// How many info frames a pool of `n_frames` needs for its bitmap
    /// (two bits per frame, `FRAME_SIZE * 8` bits per info frame).
    #[must_use]
    pub const fn needed_info_frames(n_frames: u32) -> u32 {
        (2 * n_frames).div_ceil(FRAME_SIZE * 8)
    }

    /// First managed frame.
    #[must_use]
    pub const fn base_frame(&self) -> FrameNumber {
        self.base_frame
    }

    /// Number of managed frames.
    #[must_use]
    pub const fn frame_count(&self) -> u32 {
        self.n_frames
    }

    /// State of one managed frame.
    ///
    /// # Panics
    /// If `frame` is outside the managed range.
    #[must_use]
    pub fn frame_state<M: PhysMapper>(&self, mapper: &M, frame: FrameNumber) -> FrameState {
        let index = self.index_of(frame).expect("frame outside pool");
        self.state(mapper, index)
    }

    /// Allocate `count` contiguous frames, first-fit from the bottom of the
    /// pool. Returns the first frame of the run, or `None` when the request
    /// is invalid (`count == 0` or larger than the pool) or no window of
    /// `count` free frames exists.
    pub fn get_frames<M: PhysMapper>(&mut self, mapper: &M, count: u32) -> Option<FrameNumber> {
        if count == 0 || count > self.n_frames {
            warn!("get_frames: invalid request for {count} frames");
            return None;
        }

        let mut start = 0;
        while start + count <= self.n_frames {
            match (start..start + count).find(|&i| self.state(mapper, i) != FrameState::Free) {
                // A window member is taken; no window through it can work.
                Some(busy) => start = busy + 1,
                None => {
                    self.set_state(mapper, start, FrameState::HeadOfSequence);
                    for i in start + 1..start + count {
                        self.set_state(mapper, i, FrameState::Used);
                    }
                    return Some(self.base_frame.offset(start));
                }
            }
        }

        warn!("get_frames: no run of {count} free frames");
        None
    }

    /// Mark `[first, first + count)` as an allocated run without searching:
    /// head at `first`, the remaining `count - 1` frames `Used`.
    ///
    /// The caller must know the range to be currently free; marking frames
    /// that are part of another run corrupts that run's accounting.
    pub fn mark_inaccessible<M: PhysMapper>(&mut self, mapper: &M, first: FrameNumber, count: u32) {
        let Some(start) = self.index_of(first) else {
            warn!("mark_inaccessible: {first} outside pool");
            return;
        };
        if count == 0 || start + count > self.n_frames {
            warn!("mark_inaccessible: range of {count} frames at {first} out of bounds");
            return;
        }

        self.set_state(mapper, start, FrameState::HeadOfSequence);
        for i in start + 1..start + count {
            self.set_state(mapper, i, FrameState::Used);
        }
    }

    /// Bitmap index of `frame`, if it is managed by this pool.
    fn index_of(&self, frame: FrameNumber) -> Option<u32> {
        let index = frame.as_u32().checked_sub(self.base_frame.as_u32())?;
        (index < self.n_frames).then_some(index)
    }

    fn state<M: PhysMapper>(&self, mapper: &M, index: u32) -> FrameState {
        read_state(mapper, self.bitmap, index)
    }

    fn set_state<M: PhysMapper>(&mut self, mapper: &M, index: u32, state: FrameState) {
        write_state(mapper, self.bitmap, index, state);
    }
}

impl Drop for ContFramePool {
    fn drop(&mut self) {
        FRAME_POOLS.with_lock(|registry| registry.remove(self.base_frame));
    }
}

/// Release the run whose head is `frame`, without naming its pool.
///
/// Walks the process-wide registry for the pool whose range contains
/// `frame`; verifies the head marker (a non-head release is diagnosed and
/// ignored); then frees the head and every `Used` frame after it until the
/// run ends. A frame outside every pool is diagnosed and ignored.
pub fn release_frames<M: PhysMapper>(mapper: &M, frame: FrameNumber) {
    let Some(pool) = FRAME_POOLS.with_lock(|registry| registry.find(frame)) else {
        warn!("release_frames: {frame} does not belong to any pool");
        return;
    };

    let head_index = frame.as_u32() - pool.base_frame.as_u32();
    let state = read_state(mapper, pool.bitmap, head_index);
    if state != FrameState::HeadOfSequence {
        warn!("release_frames: {frame} is not the head of a run (it is {state})");
        return;
    }

    write_state(mapper, pool.bitmap, head_index, FrameState::Free);
    let mut index = head_index + 1;
    while index < pool.n_frames && read_state(mapper, pool.bitmap, index) == FrameState::Used {
        write_state(mapper, pool.bitmap, index, FrameState::Free);
        index += 1;
    }

    debug!("released {} frames starting at {frame}", index - head_index);
}

/// What the registry knows about a live pool: enough to find it by frame
/// number and to edit its bitmap. Kept as a copy so that releases do not
/// need the pool object itself.
#[derive(Copy, Clone)]
struct PoolDescriptor {
    base_frame: FrameNumber,
    n_frames: u32,
    bitmap: PhysicalAddress,
}

impl PoolDescriptor {
    fn contains(&self, frame: FrameNumber) -> bool {
        let f = frame.as_u32();
        f >= self.base_frame.as_u32() && f < self.base_frame.as_u32() + self.n_frames
    }
}

#[derive(Copy, Clone)]
struct PoolNode {
    descriptor: PoolDescriptor,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Process-wide registry of live frame pools.
///
/// A doubly-linked list threaded through a fixed arena of
/// [`MAX_FRAME_POOLS`] slots. Insertions prepend. Removals unlink, then
/// compact the arena by moving the last live slot into the vacated one and
/// re-pointing the moved node's neighbors (and `head`/`tail` if they named
/// the moved slot).
///
/// # Invariants
/// - Slots `0..live` are occupied, slots `live..` are `None`.
/// - Every live pool appears exactly once; pool ranges do not overlap.
struct FramePoolRegistry {
    nodes: [Option<PoolNode>; MAX_FRAME_POOLS],
    head: Option<usize>,
    tail: Option<usize>,
    live: usize,
}

/// Registry arena exhausted; the pool stays usable but unfindable.
struct RegistryFull;

impl FramePoolRegistry {
    const fn new() -> Self {
        Self {
            nodes: [None; MAX_FRAME_POOLS],
            head: None,
            tail: None,
            live: 0,
        }
    }

    fn insert(&mut self, descriptor: PoolDescriptor) -> Result<(), RegistryFull> {
        if self.live == MAX_FRAME_POOLS {
            return Err(RegistryFull);
        }

        let slot = self.live;
        self.nodes[slot] = Some(PoolNode {
            descriptor,
            prev: None,
            next: self.head,
        });
        match self.head {
            Some(old_head) => self.nodes[old_head].as_mut().unwrap().prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
        self.live += 1;
        Ok(())
    }

    fn remove(&mut self, base_frame: FrameNumber) {
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            let node = self.nodes[slot].unwrap();
            if node.descriptor.base_frame != base_frame {
                cursor = node.next;
                continue;
            }

            // Unlink.
            match node.prev {
                Some(p) => self.nodes[p].as_mut().unwrap().next = node.next,
                None => self.head = node.next,
            }
            match node.next {
                Some(n) => self.nodes[n].as_mut().unwrap().prev = node.prev,
                None => self.tail = node.prev,
            }

            // Compact: move the last live slot into the hole.
            let last = self.live - 1;
            if slot != last {
                let moved = self.nodes[last].unwrap();
                self.nodes[slot] = Some(moved);
                match moved.prev {
                    Some(p) => self.nodes[p].as_mut().unwrap().next = Some(slot),
                    None => self.head = Some(slot),
                }
                match moved.next {
                    Some(n) => self.nodes[n].as_mut().unwrap().prev = Some(slot),
                    None => self.tail = Some(slot),
                }
            }
            self.nodes[last] = None;
            self.live -= 1;
            return;
        }
    }

    fn find(&self, frame: FrameNumber) -> Option<PoolDescriptor> {
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            let node = self.nodes[slot].unwrap();
            if node.descriptor.contains(frame) {
                return Some(node.descriptor);
            }
            cursor = node.next;
        }
        None
    }
}

static FRAME_POOLS: SpinLock<FramePoolRegistry> = SpinLock::new(FramePoolRegistry::new());
