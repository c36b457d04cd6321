//! # Kernel Configuration
//!
//! Central place for the boot-time memory layout and the fixed capacities of
//! the memory-management core. Everything here is a plain constant; the
//! trailing `const` block cross-checks the layout at compile time.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod memory;
