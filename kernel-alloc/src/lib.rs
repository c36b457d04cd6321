//! # Kernel Memory Management Core
//!
//! The three cooperating subsystems at the heart of the kernel's memory
//! management, layered bottom-up:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Virtual Memory Pool (VmPool)           │
//! │    • free/allocated region accounting (pages)       │
//! │    • authoritative source of fault legitimacy       │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │        Address Space (Paging / AddressSpace)        │
//! │    • two-level directory construction + load        │
//! │    • demand fault-in through recursive windows      │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │        Contiguous Frame Pool (ContFramePool)        │
//! │    • 2-bit-per-frame state map                      │
//! │    • contiguous-run allocation, pool-less release   │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The [`VmPool`]s never touch physical memory at allocation time; backing
//! is materialized lazily by the fault path, which pulls frames from the
//! process [`ContFramePool`]. Releasing a virtual region returns the backing
//! frames through the process-wide frame-pool registry.
//!
//! All hardware access goes through the `kernel-vmem` traits, so the whole
//! stack runs hosted with a simulated machine (see `tests/`).

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod address_space;
pub mod frame_pool;
pub mod mapper;
pub mod vm_pool;

pub use address_space::{AddressSpace, Paging, PagingError};
pub use frame_pool::{release_frames, ContFramePool, FrameState};
pub use mapper::DirectMapper;
pub use vm_pool::VmPool;
