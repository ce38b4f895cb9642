//! Kernel thread creation.
//!
//! Scheduling is not this crate's business. A new process runs on a fresh
//! kernel thread created through `Threads`; the thread receives its own
//! `Parker` so it can sleep on rendezvous points.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;

use crate::sync::Parker;

/// Work run on a newly created kernel thread.
pub type ThreadBody = Box<dyn FnOnce(Arc<dyn Parker>) + Send + 'static>;

/// Error returned when a thread cannot be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// No memory for the thread's stack or control block.
    OutOfMemory,
    /// The scheduler refused to create more threads.
    TooManyThreads,
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of memory for new thread"),
            Self::TooManyThreads => write!(f, "thread limit reached"),
        }
    }
}

/// The scheduler's thread-creation entry point.
pub trait Threads: Send + Sync {
    /// Create a thread named `name` that runs `body` and then exits.
    fn spawn(&self, name: &str, body: ThreadBody) -> Result<(), SpawnError>;
}
