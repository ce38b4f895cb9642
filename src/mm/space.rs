//! Process Address Spaces
//!
//! The validator never dereferences a user address directly. It asks the
//! process's address space whether a page is mapped, and only then copies
//! bytes in or out through the same object.
//!
//! # Design
//! - `AddressSpace` is the query/copy interface the memory subsystem provides
//! - `PagedMemory` is a software page map implementing it, used by loaders
//!   that build images in kernel memory

use alloc::boxed::Box;
use alloc::collections::BTreeMap;

use spin::Mutex;

use super::address::{VirtAddr, PAGE_SIZE};
use super::paging::{MappingError, PageFlags};

/// A process's view of virtual memory.
pub trait AddressSpace: Send + Sync {
    /// Attributes of the page containing `addr`, or `None` if unmapped.
    ///
    /// Must only consult mapping metadata, never the page contents.
    fn translate(&self, addr: VirtAddr) -> Option<PageFlags>;

    /// Copy `dst.len()` bytes starting at `addr` into kernel memory.
    fn copy_in(&self, addr: VirtAddr, dst: &mut [u8]) -> Result<(), MappingError>;

    /// Copy `src` into memory starting at `addr`.
    fn copy_out(&self, addr: VirtAddr, src: &[u8]) -> Result<(), MappingError>;

    /// Check if `addr` is mapped and readable by the owning process.
    fn is_mapped(&self, addr: VirtAddr) -> bool {
        self.translate(addr).is_some_and(PageFlags::user_readable)
    }

    /// Check if `addr` is mapped and writable by the owning process.
    fn is_writable(&self, addr: VirtAddr) -> bool {
        self.translate(addr).is_some_and(PageFlags::user_writable)
    }
}

struct Page {
    flags: PageFlags,
    frame: Box<[u8; PAGE_SIZE]>,
}

/// A sparse, software-managed page map.
#[derive(Default)]
pub struct PagedMemory {
    pages: Mutex<BTreeMap<usize, Page>>,
}

impl PagedMemory {
    /// Create an empty address space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map one zero-filled page at `va`.
    pub fn map(&self, va: VirtAddr, flags: PageFlags) -> Result<(), MappingError> {
        if !va.is_aligned() {
            return Err(MappingError::MisalignedAddress(va));
        }
        let mut pages = self.pages.lock();
        if pages.contains_key(&va.page_number()) {
            return Err(MappingError::AlreadyMapped(va));
        }
        pages.insert(
            va.page_number(),
            Page {
                flags: flags | PageFlags::PRESENT,
                frame: Box::new([0; PAGE_SIZE]),
            },
        );
        Ok(())
    }

    /// Map `count` consecutive pages starting at `va`.
    pub fn map_range(&self, va: VirtAddr, count: usize, flags: PageFlags) -> Result<(), MappingError> {
        let mut page = va;
        for _ in 0..count {
            self.map(page, flags)?;
            page = page.checked_add(PAGE_SIZE).ok_or(MappingError::Overflow)?;
        }
        Ok(())
    }

    /// Remove the page at `va`, discarding its contents.
    pub fn unmap(&self, va: VirtAddr) -> Result<(), MappingError> {
        match self.pages.lock().remove(&va.page_number()) {
            Some(_) => Ok(()),
            None => Err(MappingError::NotMapped(va)),
        }
    }

    /// Number of mapped pages.
    pub fn mapped_pages(&self) -> usize {
        self.pages.lock().len()
    }

    /// Walk `[addr, addr + len)` page by page, handing each piece to `f`
    /// as (frame, offset in frame, offset in caller's buffer, length).
    fn walk<F>(&self, addr: VirtAddr, len: usize, mut f: F) -> Result<(), MappingError>
    where
        F: FnMut(&mut [u8; PAGE_SIZE], usize, usize, usize),
    {
        if len == 0 {
            return Ok(());
        }
        addr.checked_add(len - 1).ok_or(MappingError::Overflow)?;

        let mut pages = self.pages.lock();
        let mut done = 0;
        while done < len {
            let va = VirtAddr::new(addr.as_usize() + done);
            let page = pages
                .get_mut(&va.page_number())
                .ok_or(MappingError::NotMapped(va))?;
            let offset = va.page_offset();
            let chunk = (PAGE_SIZE - offset).min(len - done);
            f(&mut page.frame, offset, done, chunk);
            done += chunk;
        }
        Ok(())
    }
}

impl AddressSpace for PagedMemory {
    fn translate(&self, addr: VirtAddr) -> Option<PageFlags> {
        self.pages.lock().get(&addr.page_number()).map(|p| p.flags)
    }

    fn copy_in(&self, addr: VirtAddr, dst: &mut [u8]) -> Result<(), MappingError> {
        self.walk(addr, dst.len(), |frame, offset, at, len| {
            dst[at..at + len].copy_from_slice(&frame[offset..offset + len]);
        })
    }

    fn copy_out(&self, addr: VirtAddr, src: &[u8]) -> Result<(), MappingError> {
        self.walk(addr, src.len(), |frame, offset, at, len| {
            frame[offset..offset + len].copy_from_slice(&src[at..at + len]);
        })
    }
}

impl core::fmt::Debug for PagedMemory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PagedMemory({} pages)", self.mapped_pages())
    }
}
