//! sysgate - User/Kernel Boundary for a Teaching Kernel
//!
//! Validated system-call dispatch and the process lifecycle protocol.
//!
//! # Components
//! - Address-space validator: proves user pointers, strings and buffers
//!   are mapped before the kernel reads them
//! - File-descriptor table: per-process slots behind small integers
//! - Lifecycle records: the parent/child rendezvous for load and exit
//! - Dispatcher: decodes a trap frame and runs the requested call
//!
//! # Collaborators
//! The file system, memory manager, scheduler, console, power control and
//! program loader are reached through traits supplied in
//! [`KernelServices`]. This crate implements none of them.
//!
//! # Security Features
//! - No kernel read of user memory without prior validation
//! - Validation failures terminate the offending process
//! - Shared parent/child state is reclaimed exactly once

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

pub mod drivers;
pub mod fs;
pub mod kernel;
pub mod mm;
pub mod process;
pub mod sync;
pub mod syscall;
pub mod thread;
pub mod trap;

#[cfg(test)]
mod testing;

pub use kernel::{Kernel, KernelServices};
pub use process::{Pid, Process};
pub use trap::{Flow, Trap, TrapFrame, UserContext};
