//! File-Descriptor Table
//!
//! A per-process table mapping small integer descriptors to open files.
//!
//! # Design
//! - Fixed-size array of optional slots
//! - Descriptor = slot index + `FD_OFFSET`; 0 and 1 are the console
//! - Allocation always takes the lowest free slot, so a closed
//!   descriptor is the first one handed out again

use core::fmt;

use static_assertions::const_assert;

/// Number of slots in a descriptor table.
pub const MAX_FILES: usize = 128;

/// Descriptor value of slot 0. Everything below is reserved for the console.
pub const FD_OFFSET: u32 = 2;

const_assert!(FD_OFFSET > 1);
const_assert!(MAX_FILES > 0);

/// A descriptor value as seen by user code.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Fd(u32);

impl Fd {
    /// Console input.
    pub const STDIN: Self = Self(0);

    /// Console output.
    pub const STDOUT: Self = Self(1);

    /// Create a descriptor from a raw argument word.
    #[inline]
    pub const fn from_word(word: u32) -> Self {
        Self(word)
    }

    /// Get the raw descriptor value.
    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Descriptor value as the signed integer user code sees.
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self.0 as i32
    }

    /// Table slot this descriptor names, if it is in range.
    #[inline]
    pub const fn slot(self) -> Option<usize> {
        if self.0 < FD_OFFSET {
            return None;
        }
        let slot = (self.0 - FD_OFFSET) as usize;
        if slot < MAX_FILES {
            Some(slot)
        } else {
            None
        }
    }

    #[inline]
    const fn from_slot(slot: usize) -> Self {
        Self(slot as u32 + FD_OFFSET)
    }
}

impl fmt::Debug for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fd({})", self.0 as i32)
    }
}

/// Descriptor table for one process.
pub struct FdTable<T> {
    slots: [Option<T>; MAX_FILES],
    open: usize,
}

impl<T> FdTable<T> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            open: 0,
        }
    }

    /// Store `file` in the lowest free slot.
    ///
    /// On a full table the file is handed back so the caller can close it.
    pub fn insert(&mut self, file: T) -> Result<Fd, T> {
        match self.slots.iter().position(Option::is_none) {
            Some(slot) => {
                self.slots[slot] = Some(file);
                self.open += 1;
                Ok(Fd::from_slot(slot))
            }
            None => Err(file),
        }
    }

    /// Look up an open descriptor.
    pub fn get(&self, fd: Fd) -> Option<&T> {
        self.slots.get(fd.slot()?)?.as_ref()
    }

    /// Look up an open descriptor for mutation.
    pub fn get_mut(&mut self, fd: Fd) -> Option<&mut T> {
        self.slots.get_mut(fd.slot()?)?.as_mut()
    }

    /// Free the slot for `fd`, returning what it held.
    ///
    /// Unopened or out-of-range descriptors leave the table untouched.
    pub fn remove(&mut self, fd: Fd) -> Option<T> {
        let taken = self.slots.get_mut(fd.slot()?)?.take();
        if taken.is_some() {
            self.open -= 1;
        }
        taken
    }

    /// Empty the table, yielding every open entry.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.open = 0;
        self.slots.iter_mut().filter_map(Option::take)
    }

    /// Number of open descriptors.
    pub fn len(&self) -> usize {
        self.open
    }

    /// Check if no descriptor is open.
    pub fn is_empty(&self) -> bool {
        self.open == 0
    }

    /// Iterate over open descriptors in ascending order.
    pub fn descriptors(&self) -> impl Iterator<Item = Fd> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| Fd::from_slot(i))
    }
}

impl<T> Default for FdTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for FdTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.descriptors()).finish()
    }
}
