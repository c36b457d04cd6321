use bitfield_struct::bitfield;
use kernel_addresses::FrameNumber;

/// A single 32-bit paging entry in its raw bitfield form.
///
/// Models the common superset of the two levels (PDE and PTE); on this
/// machine the encodings coincide. An entry either points at a next-level
/// page table (PDE) or maps one 4 KiB frame (PTE).
///
/// ### Bit layout
///
/// | Bits  | Name / Mnemonic | Meaning |
/// |-------|-----------------|---------|
/// | 0     | `P` (present)   | Valid entry if set |
/// | 1     | `RW`            | Writable if set |
/// | 2     | `US`            | User-mode accessible if set (always 0 here) |
/// | 3     | `PWT`           | Write-through caching |
/// | 4     | `PCD`           | Disable caching |
/// | 5     | `A`             | Accessed |
/// | 6     | `D`             | Dirty (leaf only) |
/// | 7     | `PS`/`PAT`      | Page size (PDE) / attribute (PTE); 0 here |
/// | 8     | `G`             | Global (leaf only) |
/// | 9–11  | OS avail        | Ignored by hardware |
/// | 12–31 | frame           | Physical frame number |
///
/// The kernel only ever writes two shapes: supervisor read/write mappings
/// (`frame | 0x3`, see [`PageEntry::map`]) and the not-present guard value
/// `0x2` the directory is seeded with (see [`PageEntry::guard`]).
#[doc(alias = "PDE")]
#[doc(alias = "PTE")]
#[bitfield(u32)]
pub struct PageEntry {
    /// Present (P, bit 0). Clear means any access through the entry faults.
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2). This kernel keeps everything
    /// supervisor-only.
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5). Set by the CPU on first use of the entry.
    pub accessed: bool,

    /// Dirty (D, bit 6). Set by the CPU on first write through a PTE.
    pub dirty: bool,

    /// Page Size in a PDE (must be 0 without 4 MiB pages), PAT in a PTE.
    pub large_page: bool,

    /// Global (G, bit 8). Unused here; the kernel reloads CR3 to flush.
    pub global_translation: bool,

    /// OS-available bits 9–11. Hardware ignores them.
    #[bits(3)]
    pub os_available: u8,

    /// Physical frame number (bits 12–31).
    #[bits(20)]
    frame_bits: u32,
}

impl PageEntry {
    /// The frame this entry points at (next-level table for a PDE, data
    /// frame for a PTE).
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> FrameNumber {
        FrameNumber::new(self.frame_bits())
    }

    #[inline]
    pub const fn set_frame(&mut self, frame: FrameNumber) {
        self.set_frame_bits(frame.as_u32());
    }

    #[inline]
    #[must_use]
    pub const fn with_frame(self, frame: FrameNumber) -> Self {
        self.with_frame_bits(frame.as_u32())
    }

    /// A present, supervisor, read/write mapping of `frame`: the `0x3`
    /// encoding used for every live PDE and PTE in this kernel.
    #[inline]
    #[must_use]
    pub const fn map(frame: FrameNumber) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_frame(frame)
    }

    /// The not-present guard value (`0x2`: supervisor, read/write, absent)
    /// the directory is seeded with before any table exists.
    #[inline]
    #[must_use]
    pub const fn guard() -> Self {
        Self::new().with_writable(true)
    }
}
