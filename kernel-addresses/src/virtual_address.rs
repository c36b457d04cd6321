use crate::PageNumber;
use core::fmt;
use core::ops::{Add, Sub};

/// A **virtual** memory address (as translated by the active page table).
///
/// Newtype over `u32` to prevent mixing with physical addresses.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u32);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// The page containing this address.
    #[inline]
    #[must_use]
    pub const fn page(self) -> PageNumber {
        PageNumber::new(self.0 >> 12)
    }

    /// Byte offset inside the containing page.
    #[inline]
    #[must_use]
    pub const fn page_offset(self) -> u32 {
        self.0 & 0xFFF
    }

    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }
}

impl Add<u32> for VirtualAddress {
    type Output = Self;

    fn add(self, rhs: u32) -> Self {
        Self(self.0.checked_add(rhs).expect("VirtualAddress add"))
    }
}

impl Sub<u32> for VirtualAddress {
    type Output = Self;

    fn sub(self, rhs: u32) -> Self {
        Self(self.0.checked_sub(rhs).expect("VirtualAddress sub"))
    }
}

impl From<u32> for VirtualAddress {
    fn from(addr: u32) -> Self {
        Self(addr)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x} (virtual)", self.0)
    }
}
