//! Memory management interface for the syscall boundary
//!
//! Provides:
//! - User virtual address type and the user address range
//! - Page permission flags
//! - The address-space query/copy interface
//!
//! # Security Principles
//! - User memory is only reached through an `AddressSpace`
//! - Address arithmetic is checked
//! - Mapping state is owned by the memory subsystem, never by the caller

pub mod address;
pub mod paging;
pub mod space;

pub use address::{VirtAddr, PAGE_SIZE, USER_BASE, USER_TOP};
pub use paging::{MappingError, PageFlags};
pub use space::{AddressSpace, PagedMemory};
