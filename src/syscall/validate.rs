//! System Call Input Validation
//!
//! Proves that user-supplied addresses, strings and buffers are
//! dereferenceable before the kernel touches them.
//!
//! # Security Principles
//! - Validate ALL inputs before use, on every call
//! - Validate-then-read: no byte is copied before its address is checked
//! - Fail-secure: a failed check is reported, never skipped
//! - Copy to kernel space once validated (no double fetch)

use alloc::vec::Vec;

use crate::mm::{AddressSpace, VirtAddr, PAGE_SIZE};

use super::handler::SyscallError;

/// Check that `addr` is non-null, inside the user range and mapped in `space`.
///
/// Only consults mapping metadata; the byte at `addr` is never read.
pub fn valid_address(space: &dyn AddressSpace, addr: VirtAddr) -> bool {
    !addr.is_null() && addr.is_user() && space.is_mapped(addr)
}

fn writable_address(space: &dyn AddressSpace, addr: VirtAddr) -> bool {
    !addr.is_null() && addr.is_user() && space.is_writable(addr)
}

/// Walk a NUL-terminated string, validating each byte before reading it.
///
/// Every byte before the terminator is handed to `sink`. On failure the
/// address of the first byte that could not be validated is returned.
fn walk_cstring<F>(space: &dyn AddressSpace, addr: VirtAddr, mut sink: F) -> Result<(), VirtAddr>
where
    F: FnMut(u8),
{
    let mut cursor = addr;
    loop {
        if !valid_address(space, cursor) {
            return Err(cursor);
        }
        let mut byte = [0u8; 1];
        space.copy_in(cursor, &mut byte).map_err(|_| cursor)?;
        if byte[0] == 0 {
            return Ok(());
        }
        sink(byte[0]);
        cursor = cursor.checked_add(1).ok_or(cursor)?;
    }
}

/// Check that a NUL-terminated string starting at `addr` lies entirely in
/// mapped user memory.
pub fn valid_cstring(space: &dyn AddressSpace, addr: VirtAddr) -> bool {
    walk_cstring(space, addr, |_| {}).is_ok()
}

/// Copy a NUL-terminated user string into the kernel, without the terminator.
pub fn read_cstring(space: &dyn AddressSpace, addr: VirtAddr) -> Result<Vec<u8>, SyscallError> {
    let mut bytes = Vec::new();
    walk_cstring(space, addr, |b| bytes.push(b)).map_err(SyscallError::BadAddress)?;
    Ok(bytes)
}

/// Check every byte address of `[addr, addr + len)` with `check`.
///
/// Mappings are page granular, so one probe per touched page covers every
/// byte on it. The last probe is the last byte of the buffer; nothing past
/// the end is examined.
fn check_range<F>(addr: VirtAddr, len: usize, check: F) -> Result<(), VirtAddr>
where
    F: Fn(VirtAddr) -> bool,
{
    if len == 0 {
        return Ok(());
    }
    let last = addr.checked_add(len - 1).ok_or(addr)?;

    let mut probe = addr;
    loop {
        if !check(probe) {
            return Err(probe);
        }
        match probe.next_page() {
            Some(next) if next <= last => probe = next,
            _ => break,
        }
    }
    if !check(last) {
        return Err(last);
    }
    Ok(())
}

/// Check that `[addr, addr + len)` is readable user memory.
///
/// A zero-length buffer is valid whatever `addr` is.
pub fn valid_buffer(space: &dyn AddressSpace, addr: VirtAddr, len: usize) -> bool {
    check_range(addr, len, |a| valid_address(space, a)).is_ok()
}

/// Check that `[addr, addr + len)` is writable user memory.
pub fn valid_buffer_mut(space: &dyn AddressSpace, addr: VirtAddr, len: usize) -> bool {
    check_range(addr, len, |a| writable_address(space, a)).is_ok()
}

/// A validated user-space buffer
///
/// This type guarantees that every byte of the buffer was mapped and
/// readable when it was constructed.
#[derive(Clone, Copy)]
pub struct UserBuffer<'a> {
    space: &'a dyn AddressSpace,
    addr: VirtAddr,
    len: usize,
}

impl UserBuffer<'_> {
    /// Buffer length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `dst.len()` bytes starting `offset` bytes into the buffer.
    pub fn read_at(&self, offset: usize, dst: &mut [u8]) -> Result<(), SyscallError> {
        let at = span(self.addr, self.len, offset, dst.len())?;
        self.space
            .copy_in(at, dst)
            .map_err(|_| SyscallError::BadAddress(at))
    }
}

/// Validate a user-space buffer the kernel will read from.
pub fn validate_user_read(
    space: &dyn AddressSpace,
    addr: VirtAddr,
    len: usize,
) -> Result<UserBuffer<'_>, SyscallError> {
    check_range(addr, len, |a| valid_address(space, a)).map_err(SyscallError::BadAddress)?;
    Ok(UserBuffer { space, addr, len })
}

/// A validated mutable user-space buffer
#[derive(Clone, Copy)]
pub struct UserBufferMut<'a> {
    space: &'a dyn AddressSpace,
    addr: VirtAddr,
    len: usize,
}

impl UserBufferMut<'_> {
    /// Buffer length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `src` into the buffer starting `offset` bytes in.
    pub fn write_at(&self, offset: usize, src: &[u8]) -> Result<(), SyscallError> {
        let at = span(self.addr, self.len, offset, src.len())?;
        self.space
            .copy_out(at, src)
            .map_err(|_| SyscallError::BadAddress(at))
    }
}

/// Validate a user-space buffer the kernel will write into.
pub fn validate_user_write(
    space: &dyn AddressSpace,
    addr: VirtAddr,
    len: usize,
) -> Result<UserBufferMut<'_>, SyscallError> {
    check_range(addr, len, |a| writable_address(space, a)).map_err(SyscallError::BadAddress)?;
    Ok(UserBufferMut { space, addr, len })
}

/// Resolve a sub-range of a validated buffer; it must not leave the buffer.
fn span(addr: VirtAddr, len: usize, offset: usize, count: usize) -> Result<VirtAddr, SyscallError> {
    match offset.checked_add(count) {
        Some(end) if end <= len => addr
            .checked_add(offset)
            .ok_or(SyscallError::BadAddress(addr)),
        _ => Err(SyscallError::BadAddress(addr)),
    }
}

/// Chunk size used when streaming a validated buffer through the kernel.
pub const COPY_CHUNK: usize = PAGE_SIZE;
