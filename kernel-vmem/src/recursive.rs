//! # Recursive-Mapping Windows
//!
//! With the last PDE pointing back at the directory frame, the hardware walk
//! itself exposes the live paging structures at fixed virtual addresses:
//!
//! - PDE `i` of the loaded directory aliases to
//!   `0xFFFF_F000 + 4 * i`: the walk resolves both levels through the
//!   self-map and lands in the directory frame.
//! - PTE `j` of the page table behind PDE `i` aliases to
//!   `0xFFC0_0000 + 4096 * i + 4 * j`: the walk resolves the first level
//!   through the self-map and lands in the table frame.
//!
//! These constants are ABI: the embedding kernel's linker script keeps the
//! top 4 MiB of the address space free for them.

use crate::{DirIndex, TableIndex};
use kernel_addresses::VirtualAddress;

/// Virtual base of the PDE array of the loaded directory.
pub const DIRECTORY_WINDOW: u32 = 0xFFFF_F000;

/// Virtual base of the PTE window; table `i` appears at
/// `TABLE_WINDOW + i * 4096`.
pub const TABLE_WINDOW: u32 = 0xFFC0_0000;

/// Virtual address aliasing the PDE that translates `va`.
#[inline]
#[must_use]
pub const fn pde_address(va: VirtualAddress) -> VirtualAddress {
    VirtualAddress::new(DIRECTORY_WINDOW | (DirIndex::from(va).as_u32() << 2))
}

/// Virtual address aliasing the PTE that translates `va`.
#[inline]
#[must_use]
pub const fn pte_address(va: VirtualAddress) -> VirtualAddress {
    VirtualAddress::new(
        TABLE_WINDOW | (DirIndex::from(va).as_u32() << 12) | (TableIndex::from(va).as_u32() << 2),
    )
}

/// Virtual base address of the whole page table that translates `va`
/// (1024 entries starting at PTE 0).
#[inline]
#[must_use]
pub const fn table_base(va: VirtualAddress) -> VirtualAddress {
    VirtualAddress::new(TABLE_WINDOW | (DirIndex::from(va).as_u32() << 12))
}
