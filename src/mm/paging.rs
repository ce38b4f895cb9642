//! Page Permissions
//!
//! Per-page attributes the validator consults before touching user memory.
//!
//! # Security Properties
//! - Only pages carrying both `PRESENT` and `USER` are reachable from a syscall
//! - Kernel writes into user memory additionally require `WRITABLE`

use bitflags::bitflags;

use super::address::VirtAddr;

bitflags! {
    /// Attributes of one mapped page.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PageFlags: u32 {
        /// Page is backed by a physical frame.
        const PRESENT = 1 << 0;
        /// Page may be written.
        const WRITABLE = 1 << 1;
        /// Page is accessible from user mode.
        const USER = 1 << 2;

        /// User code / read-only data.
        const USER_RO = Self::PRESENT.bits() | Self::USER.bits();
        /// User data and stack.
        const USER_RW = Self::USER_RO.bits() | Self::WRITABLE.bits();
    }
}

impl PageFlags {
    /// Check if the page is readable from user mode.
    #[inline]
    pub fn user_readable(self) -> bool {
        self.contains(Self::USER_RO)
    }

    /// Check if the page is writable from user mode.
    #[inline]
    pub fn user_writable(self) -> bool {
        self.contains(Self::USER_RW)
    }
}

/// Error type for page mapping operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingError {
    /// The virtual address is already mapped.
    AlreadyMapped(VirtAddr),
    /// The virtual address is not mapped.
    NotMapped(VirtAddr),
    /// The address is not properly aligned.
    MisalignedAddress(VirtAddr),
    /// The range runs off the end of the address space.
    Overflow,
}

impl core::fmt::Display for MappingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AlreadyMapped(va) => write!(f, "virtual address {} already mapped", va),
            Self::NotMapped(va) => write!(f, "virtual address {} not mapped", va),
            Self::MisalignedAddress(va) => write!(f, "address {} not page aligned", va),
            Self::Overflow => write!(f, "address range overflows"),
        }
    }
}
