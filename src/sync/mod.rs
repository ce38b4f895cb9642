//! Blocking synchronization for kernel threads.
//!
//! Sleeping and waking a thread belongs to the scheduler; this module only
//! needs the two operations a `Parker` exposes.

mod semaphore;

pub use semaphore::{Rendezvous, Semaphore};

/// Scheduler hook that puts one kernel thread to sleep and wakes it.
pub trait Parker: Send + Sync {
    /// Sleep the calling thread until `unpark` is called.
    ///
    /// An `unpark` delivered before `park` must make the next `park`
    /// return immediately. Spurious returns are allowed.
    fn park(&self);

    /// Wake the thread owning this parker.
    fn unpark(&self);
}
