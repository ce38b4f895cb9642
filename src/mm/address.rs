//! User Virtual Address Type
//!
//! Type-safe wrapper for addresses supplied by user processes.
//!
//! # Security Properties
//! - A `VirtAddr` is only a number: it cannot be dereferenced
//! - Arithmetic is checked, an overflowing range is never produced
//! - The user portion of the address range is fixed at compile time

use core::fmt;

use static_assertions::const_assert;

/// Page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;
/// Page size mask
pub const PAGE_MASK: usize = PAGE_SIZE - 1;
/// Bits to shift for page number
pub const PAGE_SHIFT: usize = 12;

/// Lowest user address. Page 0 is never handed to user processes so that
/// null and near-null pointers always fault.
pub const USER_BASE: usize = PAGE_SIZE;

/// One past the highest user address. Everything from here up belongs to
/// the kernel.
pub const USER_TOP: usize = 0xC000_0000;

const_assert!(USER_BASE & PAGE_MASK == 0);
const_assert!(USER_TOP & PAGE_MASK == 0);
const_assert!(USER_BASE < USER_TOP);

/// A virtual address in some process's address space.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(usize);

impl VirtAddr {
    /// The null address.
    pub const NULL: Self = Self(0);

    /// Create a new virtual address.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Create an address from a raw 32-bit argument word.
    #[inline]
    pub const fn from_word(word: u32) -> Self {
        Self(word as usize)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Check if this is the null address.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check if the address lies in the user portion of the address range.
    #[inline]
    pub const fn is_user(self) -> bool {
        self.0 >= USER_BASE && self.0 < USER_TOP
    }

    /// Check if the address is page-aligned.
    #[inline]
    pub const fn is_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    /// Align the address down to the nearest page boundary.
    #[inline]
    pub const fn align_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Get the page number.
    #[inline]
    pub const fn page_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    /// Get the page offset (lowest 12 bits).
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & PAGE_MASK
    }

    /// Add an offset, returning `None` on overflow.
    #[inline]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Start of the page following the one containing this address.
    #[inline]
    pub const fn next_page(self) -> Option<Self> {
        self.align_down().checked_add(PAGE_SIZE)
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#010x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_range() {
        assert!(!VirtAddr::NULL.is_user());
        assert!(!VirtAddr::new(USER_BASE - 1).is_user());
        assert!(VirtAddr::new(USER_BASE).is_user());
        assert!(VirtAddr::new(USER_TOP - 1).is_user());
        assert!(!VirtAddr::new(USER_TOP).is_user());
    }

    #[test]
    fn test_page_alignment() {
        let addr = VirtAddr::new(0x0804_8123);
        assert!(!addr.is_aligned());
        assert_eq!(addr.align_down().as_usize(), 0x0804_8000);
        assert_eq!(addr.page_offset(), 0x123);
        assert_eq!(addr.next_page(), Some(VirtAddr::new(0x0804_9000)));
    }

    #[test]
    fn test_checked_add_overflow() {
        assert_eq!(VirtAddr::new(usize::MAX - 1).checked_add(2), None);
        assert_eq!(VirtAddr::new(usize::MAX).next_page(), None);
    }
}
