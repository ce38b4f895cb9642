//! File-system interface used by the syscall layer.
//!
//! The file system itself lives elsewhere; the dispatcher only needs to
//! create, remove and open files by path and to operate on an open handle.
//! Dropping a `Box<dyn File>` closes it.

pub mod fdtable;

use alloc::boxed::Box;

pub use fdtable::{Fd, FdTable, FD_OFFSET, MAX_FILES};

/// An open file.
pub trait File: Send {
    /// Read into `buf` from the current position, returning bytes read.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Write `buf` at the current position, returning bytes written.
    fn write(&mut self, buf: &[u8]) -> usize;

    /// Move the current position to `pos`.
    fn seek(&mut self, pos: u32);

    /// Current position.
    fn tell(&self) -> u32;

    /// File length in bytes.
    fn length(&self) -> u32;

    /// Refuse writes through any handle to this file while this one is open.
    fn deny_write(&mut self) {}
}

/// The file system, as seen by the syscall layer.
pub trait FileSystem: Send + Sync {
    /// Create a file of `initial_size` bytes. Fails if it already exists.
    fn create(&self, path: &str, initial_size: u32) -> bool;

    /// Remove a file.
    fn remove(&self, path: &str) -> bool;

    /// Open a file, or `None` if there is no such file.
    fn open(&self, path: &str) -> Option<Box<dyn File>>;
}
