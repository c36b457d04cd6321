//! # Kernel Synchronization Primitives
//!
//! The memory core runs on a single CPU with a serialized fault path, but
//! its shared structures still need interior mutability behind explicit
//! guards. Two primitives cover everything this kernel does:
//!
//! - [`SpinLock`]: busy-waiting mutual exclusion for the short critical
//!   sections (the frame-pool registry, pool region tables).
//! - [`OnceSlot`]: a write-once slot for values installed during bring-up
//!   and referenced forever after (the console logger).

#![cfg_attr(not(any(test, doctest)), no_std)]

mod once_slot;
mod spin_lock;

pub use once_slot::OnceSlot;
pub use spin_lock::{SpinLock, SpinLockGuard};
