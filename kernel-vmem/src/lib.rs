//! # Two-Level x86 Paging Structures
//!
//! Data model of 32-bit paging for a 4 KiB-page machine, plus the small
//! hardware-access traits the memory core is written against.
//!
//! ## Virtual Address → Physical Address Walk
//!
//! Each 32-bit virtual address divides into three fields:
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |  PDE  |  PTE  | Offset |
//! ```
//!
//! The CPU uses the fields as **indices** into two levels of tables, each
//! 4096 bytes of 1024 × 32-bit entries:
//!
//! ```text
//!  Page Directory  →  Page Table  →  Physical Page
//!       │                 │
//!       │                 └───► PTE maps one 4 KiB page
//!       └─────────────────────► PDE points at one page table (4 MiB reach)
//! ```
//!
//! CR3 holds the physical base of the page directory; CR0.PG turns the walk
//! on; CR2 latches the faulting linear address on a page fault.
//!
//! ## Recursive mapping
//!
//! The last directory entry of every directory points back at the directory
//! frame itself. The hardware walk then exposes the live paging structures
//! at two fixed virtual windows (see [`recursive`]): the directory at
//! `0xFFFF_F000` and every present page table at `0xFFC0_0000 + i * 4096`.
//! Once paging is on, this is the **only** way the core edits a loaded
//! directory.
//!
//! ## Hardware access
//!
//! All machine access is confined behind three traits so the core can run
//! hosted with the hardware mocked:
//!
//! - [`PhysMapper`]: dereference a physical address (pre-paging, and
//!   identity-mapped storage afterwards).
//! - [`VirtMapper`]: dereference a virtual address through the live
//!   translation (the recursive windows).
//! - [`Cpu`]: the control-register helpers (`CR0`/`CR2`/`CR3`).

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod entry;
mod fault;
pub mod recursive;
mod table;

pub use entry::PageEntry;
pub use fault::{FaultInfo, PageFaultCode};
pub use table::{DirIndex, PageDirectory, PageTable, TableIndex};

use kernel_addresses::{PhysicalAddress, VirtualAddress};
use kernel_registers::{Cr0, Cr3};

/// Converts physical addresses to usable pointers.
///
/// Valid while paging is disabled (linear = physical), and afterwards only
/// for storage inside the identity-mapped shared region (kernel image,
/// frame-pool bitmaps).
///
/// # Safety
/// - The caller must ensure `pa` refers to memory that is mapped (or that
///   paging is off) and free of aliasing for the produced `&mut T`.
/// - Type `T` must match the bytes at `pa`.
pub trait PhysMapper {
    /// Reinterpret the memory at `pa` as a `T`.
    ///
    /// # Safety
    /// See the trait-level requirements.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

/// Converts virtual addresses to usable pointers through the **live**
/// translation.
///
/// The core uses this exclusively for the recursive windows; it never
/// dereferences a physical address once paging is enabled.
pub trait VirtMapper {
    /// Reinterpret the memory at `va` as a `T`.
    ///
    /// # Safety
    /// - `va` must be mapped writable in the active address space for the
    ///   whole lifetime of the returned reference, without aliasing.
    /// - Type `T` must match the bytes at `va`.
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T;
}

/// The control-register helpers the paging code consumes.
///
/// On the machine these are `mov`s to and from CR0/CR2/CR3; in the hosted
/// test harness they are plain cells.
pub trait Cpu {
    fn read_cr0(&self) -> Cr0;

    /// # Safety
    /// Flipping CR0 bits (notably PG) changes the meaning of every memory
    /// access that follows; the caller must have the matching translation in
    /// place.
    unsafe fn write_cr0(&self, cr0: Cr0);

    /// The faulting linear address latched by the last page fault.
    fn read_cr2(&self) -> VirtualAddress;

    fn read_cr3(&self) -> Cr3;

    /// # Safety
    /// `cr3` must point at a valid page directory; the switch also discards
    /// non-global TLB entries.
    unsafe fn write_cr3(&self, cr3: Cr3);
}
